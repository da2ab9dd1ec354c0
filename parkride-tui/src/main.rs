//! Terminal UI that sets up a CFL park-and-ride entry and shows live availability.

mod app;
mod input;
mod session;
mod settings;
#[cfg(test)]
mod testing;
mod ui;

use std::{ffi::OsStr, io, path::Path, pin::pin, sync::Arc, time::Duration as StdDuration};

use anyhow::{Context, Result, anyhow, bail};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use parkride_core::{
    ConfigEntry, ConfigFlow, EntryStore, FlowResult, FlowStep, ParkRideIntegration, ParkingPort,
    TokenListener,
};
use parkride_provider_cfl::CflClient;
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{App, Screen};
use crate::input::Action;
use crate::session::{Session, SessionError};
use crate::settings::{Settings, config_path};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Redraw and key polling period while a background step runs.
const FRAME_INTERVAL: StdDuration = StdDuration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    let _guard = setup_tracing(&settings);
    info!(?settings, "starting");

    let client = Client::builder()
        .user_agent("parkride/0.1")
        .timeout(settings.request_timeout())
        .build()?;
    let store = Arc::new(EntryStore::open(settings.entry_path.clone())?);

    if store.entry()?.is_none() && settings.credentials().is_none() {
        bail!(
            "no park-and-ride account configured; set email and password in {} \
             or PARKRIDE_EMAIL / PARKRIDE_PASSWORD",
            config_path().display()
        );
    }

    let base_url = settings.base_url.clone();
    let session = Session::new(
        Arc::clone(&store),
        Box::new(
            move |refresh_token: Option<SecretString>, listener: Option<TokenListener>| {
                Arc::new(
                    CflClient::new(client.clone(), refresh_token, listener)
                        .with_base_url(base_url.as_str()),
                ) as Arc<dyn ParkingPort>
            },
        ),
        settings.credentials(),
        settings.intervals(),
    );
    let runner = Runner { session, store };

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = runner.run(&mut terminal, App::new()).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!(error = %err, "exiting with error");
    }
    res
}

fn setup_tracing(settings: &Settings) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));

    let log_dir = settings
        .log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let log_filename = settings
        .log_file
        .file_name()
        .unwrap_or(OsStr::new("parkride.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}

/// Draw once and translate a key press arriving within `timeout`, if any.
fn next_action(terminal: &mut Tui, app: &mut App, timeout: StdDuration) -> Result<Action> {
    terminal.draw(|frame| ui::draw(frame, app))?;

    if event::poll(timeout)?
        && let CEvent::Key(key) = event::read()?
    {
        return Ok(input::handle_key_event(key, app));
    }
    Ok(Action::None)
}

/// Keep the UI responsive while `task` runs, showing its status updates.
/// `None` means the user quit before it finished.
async fn drive<T>(
    terminal: &mut Tui,
    app: &mut App,
    status: &mut watch::Receiver<Option<String>>,
    task: impl Future<Output = Result<T, SessionError>>,
) -> Result<Option<T>> {
    let mut task = pin!(task);
    let mut frames = tokio::time::interval(FRAME_INTERVAL);
    app.screen = Screen::Connecting;
    app.is_loading = true;

    loop {
        tokio::select! {
            result = &mut task => {
                app.is_loading = false;
                return Ok(Some(result?));
            }
            _ = frames.tick() => {
                if status.has_changed()? {
                    app.status_message = status.borrow_and_update().clone();
                }
                if next_action(terminal, app, StdDuration::ZERO)? == Action::Quit {
                    return Ok(None);
                }
            }
        }
    }
}

struct Runner {
    session: Session,
    store: Arc<EntryStore>,
}

impl Runner {
    async fn run(&self, terminal: &mut Tui, mut app: App) -> Result<()> {
        if self.store.entry()?.is_none() && self.create_entry(terminal, &mut app).await?.is_none()
        {
            return Ok(());
        }

        let mut status = self.session.status();
        let Some(mut integration) =
            drive(terminal, &mut app, &mut status, self.session.start()).await?
        else {
            return Ok(());
        };

        loop {
            app.attach(&integration);
            app.error_message = None;
            app.status_message = None;

            match self.dashboard(terminal, &mut app, &integration).await {
                Ok(true) => {}
                other => {
                    integration.unload().await;
                    other?;
                    return Ok(());
                }
            }

            warn!("credentials expired while polling, signing in again");
            app.status_message = Some("Signing in again…".into());
            let resumed = self.session.resume(integration);
            match drive(terminal, &mut app, &mut status, resumed).await? {
                Some(next) => integration = next,
                None => return Ok(()),
            }
        }
    }

    /// Run the config flow until an entry exists. `None` means the user quit.
    async fn create_entry(&self, terminal: &mut Tui, app: &mut App) -> Result<Option<ConfigEntry>> {
        let credentials = self
            .session
            .credentials()
            .ok_or_else(|| anyhow!("no credentials configured"))?;

        app.status_message = Some(format!("Signing in as {}…", credentials.email));
        terminal.draw(|frame| ui::draw(frame, app))?;

        let mut flow = ConfigFlow::new(self.session.anonymous_port(), Arc::clone(&self.store));
        let mut result = flow.step_user(Some(credentials)).await;

        loop {
            match result {
                FlowResult::ShowForm {
                    step: FlowStep::Sites,
                    error,
                    options,
                } => {
                    if app.screen != Screen::SiteSelect {
                        app.show_site_options(options);
                    }
                    app.error_message = error.map(|err| err.to_string());

                    let action = loop {
                        match next_action(terminal, app, FRAME_INTERVAL)? {
                            Action::None | Action::Refresh => {}
                            action => break action,
                        }
                    };
                    if action == Action::Quit {
                        return Ok(None);
                    }
                    let selected = app.selected_site_ids();
                    result = flow.step_sites(Some(selected.as_slice())).await;
                }
                FlowResult::ShowForm { error, .. } => {
                    if let Some(err) = &error {
                        warn!(form_error = err.key(), "sign-in rejected");
                    }
                    bail!(
                        "sign-in failed: {}",
                        error.map_or_else(|| "no credentials".to_owned(), |err| err.to_string())
                    );
                }
                FlowResult::CreateEntry(entry) | FlowResult::ReauthSuccessful(entry) => {
                    return Ok(Some(entry));
                }
                FlowResult::Abort(reason) => bail!("setup aborted: {reason:?}"),
            }
        }
    }

    /// Show live data until the user quits. Returns `true` when the
    /// credentials expired and can be renewed from the settings.
    async fn dashboard(
        &self,
        terminal: &mut Tui,
        app: &mut App,
        integration: &ParkRideIntegration,
    ) -> Result<bool> {
        loop {
            match next_action(terminal, app, FRAME_INTERVAL)? {
                Action::Quit => return Ok(false),
                Action::Refresh => {
                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, app))?;

                    integration.request_refresh().await;

                    app.is_loading = false;
                    app.status_message = Some("Refreshed".into());
                }
                Action::None | Action::ConfirmSites => {}
            }

            app.sync(integration);
            if app.needs_reauth {
                if self.session.can_reauthenticate() {
                    return Ok(true);
                }
                app.error_message = Some(format!(
                    "Credentials expired; set email and password in {}",
                    config_path().display()
                ));
            }
        }
    }
}
