//! Run Target Store
//!
//! Remembers which package or application the toast's action launches,
//! but only when the management client confirms it is deployed here.
//! Also registers and serves the URL protocols the toast buttons activate.

use crate::config::{Options, Toggle};
use crate::host::{CatalogEntry, Hive, Host};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Per-user settings store of the notifier
pub const SETTINGS_STORE_KEY: &str = "SOFTWARE\\ToastNotificationScript";

/// Restarts the computer
pub const REBOOT_SCHEME: &str = "ToastReboot";
pub const RUN_PACKAGE_SCHEME: &str = "ToastRunPackageID";
pub const RUN_APPLICATION_SCHEME: &str = "ToastRunApplicationID";

const PROTOCOL_SCHEMES: [&str; 3] = [REBOOT_SCHEME, RUN_PACKAGE_SCHEME, RUN_APPLICATION_SCHEME];

/// Per-user URL protocol registrations
const CLASSES_KEY: &str = "Software\\Classes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Package,
    Application,
}

impl Target {
    fn value_name(&self) -> &'static str {
        match self {
            Target::Package => "RunPackageID",
            Target::Application => "RunApplicationID",
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Target::Package => RUN_PACKAGE_SCHEME,
            Target::Application => RUN_APPLICATION_SCHEME,
        }
    }
}

/// Protocol of the primary action while a run target is enabled
pub fn action_protocol(options: &Options) -> Option<String> {
    enabled_target(options).map(|(target, _)| format!("{}:", target.scheme()))
}

/// Persists the enabled run target; returns true if a value was written
pub fn persist(options: &Options, host: &Host) -> bool {
    let Some((target, id)) = enabled_target(options) else {
        return false;
    };

    if !host.client.is_installed() {
        warn!(
            "{} {} is enabled but the management client is not installed",
            target.value_name(),
            id
        );
        return false;
    }

    let catalog = match target {
        Target::Package => host.client.programs(),
        Target::Application => host.client.applications(),
    };
    let deployed = match catalog {
        Ok(entries) => is_deployed(&entries, id),
        Err(e) => {
            warn!("Could not read the {} catalog: {:#}", target.value_name(), e);
            return false;
        }
    };
    if !deployed {
        warn!("{} {} is not deployed to this computer", target.value_name(), id);
        return false;
    }

    match write(host, target, id) {
        Ok(()) => {
            info!("Stored {} {}", target.value_name(), id);
            true
        }
        Err(e) => {
            warn!("Could not store {}: {:#}", target.value_name(), e);
            false
        }
    }
}

/// Points every toast protocol at `exe protocol "%1"`; false if any failed
pub fn register_handlers(host: &Host, exe: &Path) -> bool {
    let command = format!("\"{}\" protocol \"%1\"", exe.display());
    let mut registered = true;
    for scheme in PROTOCOL_SCHEMES {
        if let Err(e) = register_handler(host, scheme, &command) {
            warn!("Could not register the {} protocol: {:#}", scheme, e);
            registered = false;
        }
    }
    if registered {
        info!("Protocol handlers point at {}", exe.display());
    }
    registered
}

fn register_handler(host: &Host, scheme: &str, command: &str) -> Result<()> {
    let key = format!("{}\\{}", CLASSES_KEY, scheme);
    let registry = &host.registry;
    registry.write_string(Hive::CurrentUser, &key, "", &format!("URL:{} Protocol", scheme))?;
    registry.write_string(Hive::CurrentUser, &key, "URL Protocol", "")?;
    registry.write_string(
        Hive::CurrentUser,
        &format!("{}\\shell\\open\\command", key),
        "",
        command,
    )
}

/// Serves a button activation such as `ToastReboot:` or `ToastRunPackageID:`
pub fn handle(uri: &str, host: &Host) -> Result<()> {
    let scheme = uri.split_once(':').map_or(uri, |(scheme, _)| scheme);

    if scheme.eq_ignore_ascii_case(REBOOT_SCHEME) {
        info!("Restart requested from the toast");
        return host.session.restart();
    }

    let target = [Target::Package, Target::Application]
        .into_iter()
        .find(|target| target.scheme().eq_ignore_ascii_case(scheme))
        .ok_or_else(|| anyhow!("unknown protocol {}", uri))?;
    let id = host
        .registry
        .read_string(Hive::CurrentUser, SETTINGS_STORE_KEY, target.value_name())
        .filter(|id| !id.is_empty())
        .with_context(|| format!("no {} stored in {}", target.value_name(), SETTINGS_STORE_KEY))?;

    info!("Launching {} {}", target.value_name(), id);
    match target {
        Target::Package => host.client.run_program(&id),
        Target::Application => host.client.open_application(&id),
    }
}

fn enabled_target(options: &Options) -> Option<(Target, &str)> {
    fn pick(toggle: &Toggle<String>) -> Option<&str> {
        toggle.active().map(String::as_str)
    }
    pick(&options.run_package_id)
        .map(|id| (Target::Package, id))
        .or_else(|| pick(&options.run_application_id).map(|id| (Target::Application, id)))
}

fn is_deployed(entries: &[CatalogEntry], id: &str) -> bool {
    entries.iter().any(|entry| entry.id.eq_ignore_ascii_case(id))
}

fn write(host: &Host, target: Target, id: &str) -> Result<()> {
    host.registry
        .write_string(Hive::CurrentUser, SETTINGS_STORE_KEY, target.value_name(), id)
}
