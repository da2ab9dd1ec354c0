use chrono::{DateTime, Local, Utc};
use parkride_core::{EntityState, FILLING_RATE, SUBSCRIPTION_AVAILABILITY};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};

use crate::app::{App, Screen, SiteRow};

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("parkride – CFL park-and-ride availability")
        .block(Block::default().borders(Borders::ALL).title("P+R"));
    frame.render_widget(header, *header_area);

    match app.screen {
        Screen::Connecting => draw_connecting(frame, app, *content_area),
        Screen::SiteSelect => draw_site_select(frame, app, *content_area),
        Screen::Dashboard => draw_dashboard(frame, app, *content_area),
    }

    let nav_hint = match app.screen {
        Screen::Connecting => "q/Ctrl-C quit",
        Screen::SiteSelect => "↑/↓ move · Space toggle site · Enter confirm · q/Ctrl-C quit",
        Screen::Dashboard => "r refresh now · q/Ctrl-C quit",
    };

    let status_text = if app.is_loading {
        format!("Loading… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else if let Some(msg) = &app.status_message {
        format!("{msg} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_connecting(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let text = app
        .status_message
        .as_deref()
        .unwrap_or("Connecting to the park-and-ride API…");
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Setup"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn draw_site_select(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let items = app
        .site_options
        .iter()
        .map(|site| {
            let mark = if app.selected_sites.contains(&site.id) {
                "[x]"
            } else {
                "[ ]"
            };
            ListItem::new(format!("{mark} {} ({})", site.name, site.id))
        })
        .collect::<Vec<ListItem<'_>>>();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Select sites to track (Space, Enter)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.site_options.is_empty() {
        state.select(Some(app.site_list_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_dashboard(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let title = format!(
        "Availability · occupancy {} · subscriptions {}",
        updated_label(app.fast_updated),
        updated_label(app.slow_updated)
    );

    let rows = app.rows();
    if rows.is_empty() {
        let paragraph = Paragraph::new("No sites configured.")
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let table_rows = rows.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.name.clone()),
            Cell::from(fill_rate_label(row.fill_rate, row.fill_rate_unit)),
            Cell::from(count_label(row.free_spaces)),
            Cell::from(count_label(row.free_electric_spaces)),
            Cell::from(count_label(row.free_pmr_spaces)),
            Cell::from(subscription_label(row.subscription)),
        ])
        .style(Style::default().fg(row_color(row)))
    });

    let column_widths = [
        Constraint::Min(20),
        Constraint::Length(8),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(14),
    ];

    let table = Table::new(table_rows, column_widths)
        .header(
            Row::new(vec![
                "Site",
                column_label(FILLING_RATE.translation_key),
                "Free",
                "EV",
                "PMR",
                column_label(SUBSCRIPTION_AVAILABILITY.translation_key),
            ])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title(title))
        .column_spacing(1);

    frame.render_widget(table, area);
}

fn updated_label(updated: Option<DateTime<Utc>>) -> String {
    updated.map_or_else(
        || "never".to_owned(),
        |at| at.with_timezone(&Local).format("%H:%M:%S").to_string(),
    )
}

/// English header for an entity translation key.
fn column_label(translation_key: &str) -> &'static str {
    match translation_key {
        "filling_rate" => "Filled",
        "subscription_availability" => "Subscription",
        _ => "?",
    }
}

fn fill_rate_label(state: EntityState, unit: Option<&str>) -> String {
    match (state, unit) {
        (EntityState::Number(value), Some(unit)) => format!("{value} {unit}"),
        (other, _) => other.to_string(),
    }
}

fn count_label(count: Option<i64>) -> String {
    count.map_or_else(|| "–".to_owned(), |count| count.to_string())
}

fn subscription_label(state: EntityState) -> String {
    match state {
        EntityState::On(true) => "available".to_owned(),
        EntityState::On(false) => "full".to_owned(),
        other => other.to_string(),
    }
}

fn row_color(row: &SiteRow) -> Color {
    match row.fill_rate {
        EntityState::Unavailable => Color::DarkGray,
        EntityState::Number(percent) if percent >= 95 => Color::Red,
        EntityState::Number(percent) if percent >= 75 => Color::Yellow,
        EntityState::Number(_) => Color::Green,
        EntityState::Unknown | EntityState::On(_) => Color::Gray,
    }
}
