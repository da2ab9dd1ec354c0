use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Submit the current site selection to the config flow
    ConfirmSites,
    /// Refresh both coordinators now
    Refresh,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{Char, Down, Enter, Up};

    // Global quit shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    if key.code == Char('q') && key.modifiers.is_empty() {
        return Action::Quit;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::Connecting => {}

        Screen::SiteSelect => match key.code {
            Up | Char('k') => {
                if app.site_list_index > 0 {
                    app.site_list_index -= 1;
                }
            }
            Down | Char('j') => {
                if app.site_list_index + 1 < app.site_options.len() {
                    app.site_list_index += 1;
                }
            }
            Char(' ') => {
                app.toggle_current_site();
            }
            Enter => {
                action = Action::ConfirmSites;
            }
            _ => {}
        },

        Screen::Dashboard => {
            if key.code == Char('r') && !app.is_loading {
                action = Action::Refresh;
            }
        }
    }
    action
}
