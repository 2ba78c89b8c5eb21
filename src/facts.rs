//! Fact Gatherers
//!
//! Point-in-time queries of the host. Each query is read-only and never
//! fails the run: any error is logged and the fact degrades to
//! "unknown", which downstream logic reads as "condition not met".

use crate::config::Settings;
use crate::host::{
    os_build, Account, Directory, Hive, Host, ManagementClient, Registry, Session,
};
use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const CBS_REBOOT_PENDING_KEY: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Component Based Servicing\\RebootPending";
const WU_REBOOT_REQUIRED_KEY: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\WindowsUpdate\\Auto Update\\RebootRequired";
const SESSION_MANAGER_KEY: &str = "SYSTEM\\CurrentControlSet\\Control\\Session Manager";
const LOGON_SESSION_DATA_KEY: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Authentication\\LogonUI\\SessionData";

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;
const SECS_PER_DAY: i64 = 86_400;

/// Password expiry of the current account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordExpiry {
    pub expiring: bool,
    pub expires_at: Option<NaiveDateTime>,
    pub days_remaining: Option<i64>,
}

/// Everything the composer and selector need to know about the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Facts {
    pub installed_build: Option<u32>,
    pub reboot_pending_registry: bool,
    #[serde(rename = "rebootPendingWMI")]
    pub reboot_pending_wmi: bool,
    pub uptime_days: u32,
    pub password_expiry: PasswordExpiry,
    pub dynamic_deadline: Option<NaiveDateTime>,
    pub given_name: Option<String>,
}

impl Facts {
    /// Queries only what the enabled features and options need
    pub fn gather(settings: &Settings, host: &Host, now: NaiveDateTime) -> Facts {
        let features = &settings.features;
        let options = &settings.options;
        let mut facts = Facts::default();

        if features.upgrade_os {
            facts.installed_build = os_build(host.registry.as_ref());
            info!("Installed Windows build: {:?}", facts.installed_build);
        }

        if features.pending_reboot_uptime || options.pending_reboot_uptime_text {
            facts.uptime_days = uptime(host.session.as_ref(), now);
            info!("Computer uptime: {} days", facts.uptime_days);
        }

        if features.pending_reboot_check {
            facts.reboot_pending_registry = reboot_pending_registry(host.registry.as_ref());
            facts.reboot_pending_wmi = reboot_pending_management_client(host.client.as_ref());
        }

        if features.ad_password_expiration || options.ad_password_expiration_text {
            let threshold = options.ad_password_expiration_days.unwrap_or_else(|| {
                warn!("ADPasswordExpirationDays is not set, only same-day expiry counts");
                0
            });
            facts.password_expiry = password_expiry(host.directory.as_ref(), threshold, now);
        }

        if options.greet_given_name {
            facts.given_name = given_name(
                host.directory.as_ref(),
                host.client.as_ref(),
                host.registry.as_ref(),
                host.session.as_ref(),
                options.directory_search_base.as_deref(),
            );
        }

        if let Some(package_id) = options.dynamic_deadline.active() {
            facts.dynamic_deadline = dynamic_deadline(host.client.as_ref(), package_id, now);
        }

        facts
    }
}

/// Any of the servicing, Windows Update or file-rename indicators
pub fn reboot_pending_registry(registry: &dyn Registry) -> bool {
    let servicing = !registry
        .subkeys(Hive::LocalMachine, CBS_REBOOT_PENDING_KEY)
        .is_empty();
    let windows_update = registry.key_exists(Hive::LocalMachine, WU_REBOOT_REQUIRED_KEY);
    let file_renames = registry.value_exists(
        Hive::LocalMachine,
        SESSION_MANAGER_KEY,
        "PendingFileRenameOperations",
    );

    debug!(
        "Reboot indicators: servicing={} windows_update={} file_renames={}",
        servicing, windows_update, file_renames
    );
    servicing || windows_update || file_renames
}

/// The management client's own reboot verdict; false if it is absent
pub fn reboot_pending_management_client(client: &dyn ManagementClient) -> bool {
    if !client.is_installed() {
        info!("Management client not installed, skipping its reboot check");
        return false;
    }
    match client.reboot_pending() {
        Ok(pending) => pending,
        Err(e) => {
            warn!("Management client reboot check failed: {:#}", e);
            false
        }
    }
}

/// Whole days since the last boot (0 if the boot time is unknown)
pub fn uptime(session: &dyn Session, now: NaiveDateTime) -> u32 {
    match session.last_boot() {
        Some(boot) => uptime_days(now, boot),
        None => {
            warn!("Could not determine the last boot time");
            0
        }
    }
}

pub fn uptime_days(now: NaiveDateTime, last_boot: NaiveDateTime) -> u32 {
    let days = (now - last_boot).num_seconds().max(0) / SECS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Given name from the directory, else from the single active logon session
pub fn given_name(
    directory: &dyn Directory,
    client: &dyn ManagementClient,
    registry: &dyn Registry,
    session: &dyn Session,
    search_base: Option<&str>,
) -> Option<String> {
    if let Some(account) = session.user_name() {
        match directory.given_name(&account, search_base) {
            Ok(Some(name)) if !name.trim().is_empty() => return Some(name.trim().to_string()),
            Ok(_) => info!("No given name for {} in the directory", account),
            Err(e) => warn!("Directory lookup of the given name failed: {:#}", e),
        }
    }

    if !client.is_installed() {
        info!("Management client not installed, no session data fallback for the given name");
        return None;
    }
    let sids = match client.active_logon_sids() {
        Ok(sids) => sids,
        Err(e) => {
            warn!("Could not query active logons: {:#}", e);
            return None;
        }
    };
    let sid = match sids.as_slice() {
        [sid] => sid,
        [] => {
            info!("No active logon found for the given name");
            return None;
        }
        _ => {
            warn!("{} active logons, given name is ambiguous", sids.len());
            return None;
        }
    };

    registry
        .subkeys(Hive::LocalMachine, LOGON_SESSION_DATA_KEY)
        .into_iter()
        .map(|entry| format!("{}\\{}", LOGON_SESSION_DATA_KEY, entry))
        .find(|path| {
            registry
                .read_string(Hive::LocalMachine, path, "LoggedOnUserSID")
                .is_some_and(|value| value.eq_ignore_ascii_case(sid))
        })
        .and_then(|path| registry.read_string(Hive::LocalMachine, &path, "LoggedOnDisplayName"))
        .and_then(|display| display.split_whitespace().next().map(str::to_string))
}

/// Expiry of the current account's password against a warning window
pub fn password_expiry(
    directory: &dyn Directory,
    threshold_days: u32,
    now: NaiveDateTime,
) -> PasswordExpiry {
    let account: Account = match directory.current_account() {
        Ok(account) => account,
        Err(e) => {
            warn!("Could not resolve the account for password expiry: {:#}", e);
            return PasswordExpiry::default();
        }
    };
    let raw = match directory.password_expiry_filetime(&account) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            warn!("No password expiry attribute for {}\\{}", account.domain, account.name);
            return PasswordExpiry::default();
        }
        Err(e) => {
            warn!("Password expiry lookup failed: {:#}", e);
            return PasswordExpiry::default();
        }
    };
    let Some(expires_at) = filetime_to_utc(raw).map(|utc| utc.with_timezone(&Local).naive_local())
    else {
        info!("Password of {} never expires", account.name);
        return PasswordExpiry::default();
    };

    let days_remaining = days_until(now, expires_at);
    let expiring = is_expiring(days_remaining, threshold_days);
    info!(
        "Password expires {} ({} days, expiring: {})",
        expires_at, days_remaining, expiring
    );
    PasswordExpiry {
        expiring,
        expires_at: Some(expires_at),
        days_remaining: Some(days_remaining),
    }
}

/// Inside the `[0, threshold]` window; already expired does not count
pub fn is_expiring(days_remaining: i64, threshold_days: u32) -> bool {
    (0..=i64::from(threshold_days)).contains(&days_remaining)
}

/// Whole days from `now` to `then`, rounded down
pub fn days_until(now: NaiveDateTime, then: NaiveDateTime) -> i64 {
    (then - now).num_seconds().div_euclid(SECS_PER_DAY)
}

/// FILETIME ticks to UTC; 0 and `i64::MAX` mean "never"
pub fn filetime_to_utc(raw: i64) -> Option<DateTime<Utc>> {
    if raw <= 0 || raw == i64::MAX {
        return None;
    }
    let secs = raw / FILETIME_TICKS_PER_SEC - FILETIME_UNIX_OFFSET_SECS;
    let nanos = (raw % FILETIME_TICKS_PER_SEC) * 100;
    DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
}

/// Earliest live deadline among the catalog entries of a package
pub fn dynamic_deadline(
    client: &dyn ManagementClient,
    package_id: &str,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    if !client.is_installed() {
        info!("Management client not installed, no dynamic deadline");
        return None;
    }
    let programs = match client.programs() {
        Ok(programs) => programs,
        Err(e) => {
            warn!("Could not read the program catalog: {:#}", e);
            return None;
        }
    };

    let yesterday = now - Duration::days(1);
    let deadline = programs
        .into_iter()
        .filter(|entry| entry.id.eq_ignore_ascii_case(package_id))
        .filter_map(|entry| entry.deadline)
        .filter(|deadline| *deadline > yesterday)
        .min();

    match deadline {
        Some(deadline) => info!("Dynamic deadline for {}: {}", package_id, deadline),
        None => info!("No live deadline for {}", package_id),
    }
    deadline
}
