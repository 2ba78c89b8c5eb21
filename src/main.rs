//! Toast Notifier - Windows toast notifications driven by a JSON configuration
//!
//! Checks for a pending reboot, an outdated OS build or an expiring
//! password and shows at most one toast per run.
//! Intended to run in the logged-on user's context (logon script, scheduled task).

// No console window unless one is requested
#![windows_subsystem = "windows"]

mod compose;
mod config;
mod culture;
mod facts;
mod host;
mod logger;
mod notification;
mod run_target;
mod scenario;
mod validate;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use compose::{compose, RenderContext};
use config::Settings;
use culture::Culture;
use facts::Facts;
use host::Host;
use notification::NotificationDocument;
use scenario::Trigger;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use validate::ClientPresence;

/// Toast Notifier - reminds users to restart, upgrade or change their password
#[derive(Parser)]
#[command(name = "toast_notifier")]
#[command(version, about = "Configuration-driven toast notifications")]
struct Cli {
    /// Configuration file (default: config-toast.json next to the EXE)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log directory (default: %APPDATA%\ToastNotificationScript)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Also log to the console
    #[arg(long, global = true)]
    console: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the host and show the toast if a scenario matches (default)
    Run,
    /// Load and validate the configuration only
    Validate,
    /// Print the toast XML for recorded facts, without touching the host
    Preview {
        /// Facts as JSON (default: everything unknown)
        #[arg(long)]
        facts: Option<PathBuf>,
        /// Local time to compose for (default: now)
        #[arg(long, value_parser = parse_local_time)]
        at: Option<NaiveDateTime>,
    },
    /// Serve a toast button activation such as ToastReboot:
    #[command(hide = true)]
    Protocol {
        /// Activation URI handed over by the shell
        uri: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let diagnostic = matches!(command, Commands::Validate | Commands::Preview { .. });
    if cli.console || diagnostic {
        attach_console();
    }

    let log_dir = cli.log_dir.unwrap_or_else(logger::default_log_dir);
    let _guard = match logger::init_logger(&log_dir, cli.console || diagnostic) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logger::init_console_logger()?;
            warn!("File logging disabled: {:#}", e);
            None
        }
    };
    logger::log_run_header();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let result = match command {
        Commands::Run => run(&config_path),
        Commands::Validate => validate_only(&config_path),
        Commands::Preview { facts, at } => preview(&config_path, facts.as_deref(), at),
        Commands::Protocol { uri } => activate(&uri),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Full pipeline against the real host
fn run(config_path: &Path) -> Result<()> {
    let host = Host::detect()?;
    host.ensure_supported()?;

    let settings = load_settings(&host, config_path)?;
    validate::validate(&settings, client_presence(&host))?;
    info!("Configuration is valid");

    let handler = match std::env::current_exe() {
        Ok(exe) => Some(exe),
        Err(e) => {
            warn!("Could not locate this executable, protocols stay unregistered: {}", e);
            None
        }
    };

    let ctx = RenderContext {
        now: Local::now().naive_local(),
        culture: host.culture(),
    };
    execute(&host, &settings, &ctx, handler.as_deref());
    Ok(())
}

/// Texts follow the display language; regional formats only affect dates
fn load_settings(host: &Host, config_path: &Path) -> Result<Settings> {
    Ok(config::load(config_path, host.ui_language().as_deref())?)
}

/// Everything after validation; returns the trigger that fired
fn execute(
    host: &Host,
    settings: &Settings,
    ctx: &RenderContext,
    handler: Option<&Path>,
) -> Option<Trigger> {
    if let Some(app) = settings.options.display_app() {
        if host.notifications_blocked(app) {
            warn!("Toast notifications are disabled for this user, the toast may not appear");
        }
    }

    if let Some(exe) = handler {
        run_target::register_handlers(host, exe);
    }
    run_target::persist(&settings.options, host);

    let facts = Facts::gather(settings, host, ctx.now);
    let Some(trigger) = scenario::select(settings, &facts) else {
        info!("No scenario matched, nothing to show");
        return None;
    };
    info!("Scenario {} matched", trigger);

    let document = compose(settings, &facts, ctx);
    display(host, settings, &document);
    Some(trigger)
}

/// Shows the toast; failures are logged, never retried
fn display(host: &Host, settings: &Settings, document: &NotificationDocument) {
    let Some(app) = settings.options.display_app() else {
        error!("No display application selected");
        return;
    };

    if let Err(e) = host.notifier.show(app.app_id(), &document.to_xml()) {
        error!("Could not display the toast: {:#}", e);
        return;
    }
    info!("Toast displayed as {}", app.app_id());

    if settings.options.custom_audio {
        let text = &settings.texts.custom_audio_text_to_speech;
        if let Err(e) = host.notifier.speak(text) {
            warn!("Custom audio failed: {:#}", e);
        }
    }
}

/// A toast button was clicked
fn activate(uri: &str) -> Result<()> {
    let host = Host::detect()?;
    info!("Protocol activation {}", uri);
    run_target::handle(uri, &host)
}

fn client_presence(host: &Host) -> ClientPresence {
    if host.client.is_installed() {
        ClientPresence::Installed
    } else {
        ClientPresence::Missing
    }
}

fn validate_only(config_path: &Path) -> Result<()> {
    let settings = config::load(config_path, None)?;
    let presence = match Host::detect() {
        Ok(host) => client_presence(&host),
        Err(_) => ClientPresence::Unknown,
    };
    validate::validate(&settings, presence)?;
    info!("Configuration is valid");
    println!("{}: valid", config_path.display());
    Ok(())
}

fn preview(config_path: &Path, facts_path: Option<&Path>, at: Option<NaiveDateTime>) -> Result<()> {
    let settings = config::load(config_path, None)?;
    validate::validate(&settings, ClientPresence::Unknown)?;

    let facts = match facts_path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("could not read facts {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("malformed facts {}", path.display()))?
        }
        None => Facts::default(),
    };

    let ctx = RenderContext {
        now: at.unwrap_or_else(|| Local::now().naive_local()),
        culture: Culture::en_us(),
    };
    let trigger = scenario::select(&settings, &facts);
    info!(
        "Preview trigger: {}",
        trigger.map(|t| t.as_str()).unwrap_or("none")
    );

    println!("trigger: {}", trigger.map(|t| t.as_str()).unwrap_or("none"));
    print!("{}", compose(&settings, &facts, &ctx).to_xml());
    Ok(())
}

fn parse_local_time(text: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .ok_or_else(|| format!("expected YYYY-MM-DDTHH:MM[:SS], got '{}'", text))
}

/// Reuses the parent console so output reaches the calling shell
#[cfg(windows)]
fn attach_console() {
    use windows::Win32::System::Console::{AttachConsole, ATTACH_PARENT_PROCESS};
    unsafe {
        let _ = AttachConsole(ATTACH_PARENT_PROCESS);
    }
}

#[cfg(not(windows))]
fn attach_console() {}
