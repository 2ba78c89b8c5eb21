//! Scenario Selector
//!
//! Picks the one trigger that fires this run, if any.

use crate::config::Settings;
use crate::facts::Facts;
use std::fmt;

/// Why a notification fires, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    UpgradeOs,
    PendingRebootUptime,
    PendingRebootRegistry,
    PendingRebootManagementClient,
    PasswordExpiry,
    /// No scenario feature is enabled: the toast is unconditional
    Default,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::UpgradeOs => "upgrade-os",
            Trigger::PendingRebootUptime => "pending-reboot-uptime",
            Trigger::PendingRebootRegistry => "pending-reboot-registry",
            Trigger::PendingRebootManagementClient => "pending-reboot-management-client",
            Trigger::PasswordExpiry => "password-expiry",
            Trigger::Default => "default",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First matching trigger; `None` is a normal "nothing to show"
pub fn select(settings: &Settings, facts: &Facts) -> Option<Trigger> {
    let features = &settings.features;
    let options = &settings.options;

    let upgrade_due = match (facts.installed_build, options.target_os) {
        (Some(installed), Some(target)) => installed < target,
        _ => false,
    };
    let uptime_exceeded = options
        .max_uptime_days
        .is_some_and(|max| facts.uptime_days > max);

    let candidates = [
        (features.upgrade_os && upgrade_due, Trigger::UpgradeOs),
        (
            features.pending_reboot_uptime && uptime_exceeded,
            Trigger::PendingRebootUptime,
        ),
        (
            features.pending_reboot_check && facts.reboot_pending_registry,
            Trigger::PendingRebootRegistry,
        ),
        (
            features.pending_reboot_check && facts.reboot_pending_wmi,
            Trigger::PendingRebootManagementClient,
        ),
        (
            features.ad_password_expiration && facts.password_expiry.expiring,
            Trigger::PasswordExpiry,
        ),
        (!features.any_scenario(), Trigger::Default),
    ];

    candidates
        .into_iter()
        .find_map(|(matched, trigger)| matched.then_some(trigger))
}
