//! Host Collaborators
//!
//! Narrow query/command interfaces to the external systems the notifier
//! depends on: registry, management client, directory service, logon
//! session and the toast platform. Only `win32` talks to the real thing.

#[cfg(test)]
pub mod fake;
pub mod powershell;
#[cfg(windows)]
mod win32;

use crate::config::DisplayApp;
use crate::culture::Culture;
use anyhow::Result;
use chrono::NaiveDateTime;
use tracing::{debug, warn};

/// Oldest Windows build with actionable toasts (Windows 10 RTM)
pub const MIN_SUPPORTED_BUILD: u32 = 10240;

const CURRENT_VERSION_KEY: &str = "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion";
const INTERNATIONAL_KEY: &str = "Control Panel\\International";
const PUSH_NOTIFICATIONS_KEY: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\PushNotifications";
const NOTIFICATION_SETTINGS_KEY: &str =
    "SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Notifications\\Settings";
const CCMEXEC_SERVICE_KEY: &str = "SYSTEM\\CurrentControlSet\\Services\\CcmExec";

/// Registry root
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Hive {
    LocalMachine,
    CurrentUser,
}

/// Read access to the registry plus the one write the notifier performs
pub trait Registry {
    fn key_exists(&self, hive: Hive, path: &str) -> bool;
    fn subkeys(&self, hive: Hive, path: &str) -> Vec<String>;
    fn value_exists(&self, hive: Hive, path: &str, name: &str) -> bool;
    fn read_string(&self, hive: Hive, path: &str, name: &str) -> Option<String>;
    fn read_dword(&self, hive: Hive, path: &str, name: &str) -> Option<u32>;
    fn write_string(&self, hive: Hive, path: &str, name: &str, value: &str) -> Result<()>;
}

/// A deployment (program or application) known to the management client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub deadline: Option<NaiveDateTime>,
}

/// The systems-management agent (ConfigMgr client)
pub trait ManagementClient {
    fn is_installed(&self) -> bool;
    fn reboot_pending(&self) -> Result<bool>;
    fn programs(&self) -> Result<Vec<CatalogEntry>>;
    fn applications(&self) -> Result<Vec<CatalogEntry>>;
    /// SIDs of logon sessions without a logoff time
    fn active_logon_sids(&self) -> Result<Vec<String>>;
    /// Starts a deployed package program
    fn run_program(&self, package_id: &str) -> Result<()>;
    /// Opens a deployed application in Software Center
    fn open_application(&self, application_id: &str) -> Result<()>;
}

/// Account name plus the domain it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub domain: String,
}

/// Enterprise identity directory
pub trait Directory {
    fn current_account(&self) -> Result<Account>;
    fn given_name(&self, account: &str, search_base: Option<&str>) -> Result<Option<String>>;
    /// Raw `msDS-UserPasswordExpiryTimeComputed` (FILETIME ticks)
    fn password_expiry_filetime(&self, account: &Account) -> Result<Option<i64>>;
}

/// The interactive logon session the notifier runs in
pub trait Session {
    fn user_name(&self) -> Option<String>;
    /// Preferred display language of the user (e.g. `en-US`)
    fn ui_language(&self) -> Option<String>;
    fn last_boot(&self) -> Option<NaiveDateTime>;
    fn is_system_context(&self) -> bool;
    fn restart(&self) -> Result<()>;
}

/// The toast platform and speech output
pub trait Notifier {
    fn show(&self, app_id: &str, xml: &str) -> Result<()>;
    fn speak(&self, text: &str) -> Result<()>;
}

/// All collaborators of one run
pub struct Host {
    pub registry: Box<dyn Registry>,
    pub client: Box<dyn ManagementClient>,
    pub directory: Box<dyn Directory>,
    pub session: Box<dyn Session>,
    pub notifier: Box<dyn Notifier>,
}

impl Host {
    /// Binds to the running platform; fails on hosts without toast support
    #[cfg(windows)]
    pub fn detect() -> Result<Self> {
        Ok(win32::host())
    }

    #[cfg(not(windows))]
    pub fn detect() -> Result<Self> {
        anyhow::bail!(
            "unsupported host: toast notifications require Windows 10 (build {}) or later",
            MIN_SUPPORTED_BUILD
        )
    }

    /// Fatal host conditions: old Windows build, SYSTEM context
    pub fn ensure_supported(&self) -> Result<()> {
        match os_build(self.registry.as_ref()) {
            Some(build) if build >= MIN_SUPPORTED_BUILD => debug!("Windows build {}", build),
            Some(build) => anyhow::bail!(
                "unsupported host: Windows build {} is older than {}",
                build,
                MIN_SUPPORTED_BUILD
            ),
            None => anyhow::bail!("unsupported host: could not determine the Windows build"),
        }

        if self.session.is_system_context() {
            anyhow::bail!("running in the SYSTEM context, toasts must run as the logged-on user");
        }
        Ok(())
    }

    /// Display language used to pick the text block.
    ///
    /// Distinct from `culture()`, which only drives date and time formats.
    pub fn ui_language(&self) -> Option<String> {
        let language = self.session.ui_language().filter(|name| !name.is_empty());
        match &language {
            Some(name) => debug!("UI language {}", name),
            None => warn!("Could not determine the UI language"),
        }
        language
    }

    /// Regional formats of the current user, en-US if unreadable
    pub fn culture(&self) -> Culture {
        let read = |name: &str| {
            self.registry
                .read_string(Hive::CurrentUser, INTERNATIONAL_KEY, name)
                .filter(|value| !value.is_empty())
        };
        match (read("LocaleName"), read("sShortDate"), read("sShortTime")) {
            (Some(name), Some(date), Some(time)) => Culture::from_patterns(&name, &date, &time),
            _ => {
                warn!("Could not read regional settings, using en-US formats");
                Culture::en_us()
            }
        }
    }

    /// True if toasts are switched off globally or for the display app
    pub fn notifications_blocked(&self, app: DisplayApp) -> bool {
        let global = self
            .registry
            .read_dword(Hive::CurrentUser, PUSH_NOTIFICATIONS_KEY, "ToastEnabled");
        let per_app = self.registry.read_dword(
            Hive::CurrentUser,
            &format!("{}\\{}", NOTIFICATION_SETTINGS_KEY, app.app_id()),
            "Enabled",
        );
        global == Some(0) || per_app == Some(0)
    }
}

/// Installed Windows build number
pub fn os_build(registry: &dyn Registry) -> Option<u32> {
    registry
        .read_string(Hive::LocalMachine, CURRENT_VERSION_KEY, "CurrentBuildNumber")
        .and_then(|build| build.trim().parse().ok())
}

/// Machine accounts (`NAME$`) and `SYSTEM`; an unknown name is a user
#[cfg_attr(not(windows), allow(dead_code))]
pub fn is_machine_account(user_name: Option<&str>) -> bool {
    user_name.is_some_and(|name| name.ends_with('$') || name.eq_ignore_ascii_case("SYSTEM"))
}

/// The management client counts as installed when its service is registered
#[cfg_attr(not(windows), allow(dead_code))]
pub fn client_service_registered(registry: &dyn Registry) -> bool {
    registry.key_exists(Hive::LocalMachine, CCMEXEC_SERVICE_KEY)
}
