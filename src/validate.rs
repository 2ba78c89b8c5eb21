//! Configuration Validator
//!
//! Enforces the mutual-exclusion and completeness rules over `Settings`.
//! Rules run in a fixed order and the first violation is reported.

use crate::config::{DisplayApp, Settings};
use thiserror::Error;
use tracing::info;

/// Whether the management client is present on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPresence {
    Installed,
    Missing,
    /// Host not queried (offline validation)
    Unknown,
}

/// The single violated rule of a rejected configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the Toast feature is disabled, nothing to do")]
    ToastDisabled,
    #[error("UpgradeOS cannot be combined with {0}")]
    UpgradeOsConflict(&'static str),
    #[error("features {0} and {1} cannot be enabled together")]
    FeatureConflict(&'static str, &'static str),
    #[error("extra info texts {0} and {1} cannot be enabled together")]
    ExtraTextConflict(&'static str, &'static str),
    #[error("{feature} cannot use {text}, use {expected} instead")]
    MismatchedExtraText {
        feature: &'static str,
        text: &'static str,
        expected: &'static str,
    },
    #[error("no display application selected, enable UseSoftwareCenterApp or UsePowershellApp")]
    NoDisplayApp,
    #[error("UseSoftwareCenterApp and UsePowershellApp cannot be enabled together")]
    ConflictingDisplayApps,
    #[error("UseSoftwareCenterApp requires the management client, which is not installed")]
    ManagementClientMissing,
    #[error("Deadline and DynamicDeadline cannot be enabled together")]
    DeadlineConflict,
    #[error("RunApplicationID and RunPackageID cannot be enabled together")]
    RunTargetConflict,
}

/// Checks every rule in order, stopping at the first violation
pub fn validate(settings: &Settings, client: ClientPresence) -> Result<(), ValidationError> {
    let features = &settings.features;
    let options = &settings.options;

    if !features.toast {
        return Err(ValidationError::ToastDisabled);
    }

    if features.upgrade_os {
        let conflicts = [
            ("PendingRebootCheck", features.pending_reboot_check),
            ("PendingRebootUptime", features.pending_reboot_uptime),
            ("ADPasswordExpiration", features.ad_password_expiration),
            ("PendingRebootUptimeText", options.pending_reboot_uptime_text),
            ("PendingRebootCheckText", options.pending_reboot_check_text),
        ];
        if let Some((name, _)) = conflicts.iter().find(|(_, enabled)| *enabled) {
            return Err(ValidationError::UpgradeOsConflict(*name));
        }
    }

    if let Some((a, b)) = first_pair(&[
        ("PendingRebootCheck", features.pending_reboot_check),
        ("PendingRebootUptime", features.pending_reboot_uptime),
        ("ADPasswordExpiration", features.ad_password_expiration),
    ]) {
        return Err(ValidationError::FeatureConflict(a, b));
    }

    if let Some((a, b)) = first_pair(&[
        ("PendingRebootUptimeText", options.pending_reboot_uptime_text),
        ("PendingRebootCheckText", options.pending_reboot_check_text),
        ("ADPasswordExpirationText", options.ad_password_expiration_text),
    ]) {
        return Err(ValidationError::ExtraTextConflict(a, b));
    }

    if features.pending_reboot_check && options.pending_reboot_uptime_text {
        return Err(ValidationError::MismatchedExtraText {
            feature: "PendingRebootCheck",
            text: "PendingRebootUptimeText",
            expected: "PendingRebootCheckText",
        });
    }
    if features.pending_reboot_uptime && options.pending_reboot_check_text {
        return Err(ValidationError::MismatchedExtraText {
            feature: "PendingRebootUptime",
            text: "PendingRebootCheckText",
            expected: "PendingRebootUptimeText",
        });
    }

    let app = match (options.use_software_center_app, options.use_powershell_app) {
        (true, true) => return Err(ValidationError::ConflictingDisplayApps),
        (false, false) => return Err(ValidationError::NoDisplayApp),
        (true, false) => DisplayApp::SoftwareCenter,
        (false, true) => DisplayApp::PowerShell,
    };
    if app.requires_management_client() && client == ClientPresence::Missing {
        return Err(ValidationError::ManagementClientMissing);
    }

    if options.deadline.enabled && options.dynamic_deadline.enabled {
        return Err(ValidationError::DeadlineConflict);
    }

    if options.run_application_id.enabled && options.run_package_id.enabled {
        return Err(ValidationError::RunTargetConflict);
    }

    info!("Configuration passed validation (display app: {:?})", app);
    Ok(())
}

/// First two enabled entries of an exclusion group, in table order
fn first_pair(group: &[(&'static str, bool)]) -> Option<(&'static str, &'static str)> {
    let mut enabled = group.iter().filter(|(_, on)| *on).map(|(name, _)| *name);
    let first = enabled.next()?;
    enabled.next().map(|second| (first, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        let mut settings = Settings::default();
        settings.features.toast = true;
        settings.options.use_powershell_app = true;
        settings
    }

    #[test]
    fn accepts_minimal_configuration() {
        assert_eq!(validate(&valid(), ClientPresence::Unknown), Ok(()));
    }

    #[test]
    fn toast_must_be_enabled() {
        let mut settings = valid();
        settings.features.toast = false;
        assert_eq!(
            validate(&settings, ClientPresence::Installed),
            Err(ValidationError::ToastDisabled)
        );
    }

    #[test]
    fn upgrade_os_excludes_reboot_and_password_paths() {
        let setters: [(&'static str, fn(&mut Settings)); 5] = [
            ("PendingRebootCheck", |s| s.features.pending_reboot_check = true),
            ("PendingRebootUptime", |s| s.features.pending_reboot_uptime = true),
            ("ADPasswordExpiration", |s| s.features.ad_password_expiration = true),
            ("PendingRebootUptimeText", |s| s.options.pending_reboot_uptime_text = true),
            ("PendingRebootCheckText", |s| s.options.pending_reboot_check_text = true),
        ];
        for (name, set) in setters {
            let mut settings = valid();
            settings.features.upgrade_os = true;
            set(&mut settings);
            assert_eq!(
                validate(&settings, ClientPresence::Unknown),
                Err(ValidationError::UpgradeOsConflict(name)),
                "{name}"
            );
        }

        let mut alone = valid();
        alone.features.upgrade_os = true;
        alone.options.ad_password_expiration_text = true;
        assert_eq!(validate(&alone, ClientPresence::Unknown), Ok(()));
    }

    #[test]
    fn scenario_features_are_pairwise_exclusive() {
        type Set = fn(&mut Settings);
        let features: [(&'static str, Set); 3] = [
            ("PendingRebootCheck", |s| s.features.pending_reboot_check = true),
            ("PendingRebootUptime", |s| s.features.pending_reboot_uptime = true),
            ("ADPasswordExpiration", |s| s.features.ad_password_expiration = true),
        ];
        for (i, (first, set_first)) in features.iter().enumerate() {
            let mut single = valid();
            set_first(&mut single);
            assert_eq!(validate(&single, ClientPresence::Unknown), Ok(()), "{first}");

            for (second, set_second) in &features[i + 1..] {
                let mut settings = valid();
                set_first(&mut settings);
                set_second(&mut settings);
                assert_eq!(
                    validate(&settings, ClientPresence::Unknown),
                    Err(ValidationError::FeatureConflict(*first, *second))
                );
            }
        }
    }

    #[test]
    fn extra_texts_are_pairwise_exclusive() {
        let mut settings = valid();
        settings.options.pending_reboot_check_text = true;
        settings.options.ad_password_expiration_text = true;
        assert_eq!(
            validate(&settings, ClientPresence::Unknown),
            Err(ValidationError::ExtraTextConflict(
                "PendingRebootCheckText",
                "ADPasswordExpirationText"
            ))
        );
    }

    #[test]
    fn reboot_features_need_their_own_text() {
        let mut check = valid();
        check.features.pending_reboot_check = true;
        check.options.pending_reboot_uptime_text = true;
        assert!(matches!(
            validate(&check, ClientPresence::Unknown),
            Err(ValidationError::MismatchedExtraText { feature: "PendingRebootCheck", .. })
        ));

        let mut uptime = valid();
        uptime.features.pending_reboot_uptime = true;
        uptime.options.pending_reboot_check_text = true;
        assert!(matches!(
            validate(&uptime, ClientPresence::Unknown),
            Err(ValidationError::MismatchedExtraText { feature: "PendingRebootUptime", .. })
        ));

        uptime.options.pending_reboot_check_text = false;
        uptime.options.pending_reboot_uptime_text = true;
        assert_eq!(validate(&uptime, ClientPresence::Unknown), Ok(()));
    }

    #[test]
    fn exactly_one_display_app() {
        let mut none = valid();
        none.options.use_powershell_app = false;
        assert_eq!(
            validate(&none, ClientPresence::Unknown),
            Err(ValidationError::NoDisplayApp)
        );

        let mut both = valid();
        both.options.use_software_center_app = true;
        assert_eq!(
            validate(&both, ClientPresence::Unknown),
            Err(ValidationError::ConflictingDisplayApps)
        );
    }

    #[test]
    fn software_center_needs_the_client() {
        let mut settings = valid();
        settings.options.use_powershell_app = false;
        settings.options.use_software_center_app = true;

        assert_eq!(
            validate(&settings, ClientPresence::Missing),
            Err(ValidationError::ManagementClientMissing)
        );
        assert_eq!(validate(&settings, ClientPresence::Installed), Ok(()));
        assert_eq!(validate(&settings, ClientPresence::Unknown), Ok(()));
    }

    #[test]
    fn deadlines_and_run_targets_are_exclusive() {
        let mut deadlines = valid();
        deadlines.options.deadline.enabled = true;
        deadlines.options.dynamic_deadline.enabled = true;
        assert_eq!(
            validate(&deadlines, ClientPresence::Unknown),
            Err(ValidationError::DeadlineConflict)
        );

        let mut targets = valid();
        targets.options.run_application_id.enabled = true;
        targets.options.run_package_id.enabled = true;
        assert_eq!(
            validate(&targets, ClientPresence::Unknown),
            Err(ValidationError::RunTargetConflict)
        );
    }

    #[test]
    fn reports_only_the_first_violation() {
        let mut settings = valid();
        settings.features.upgrade_os = true;
        settings.features.pending_reboot_check = true;
        settings.features.pending_reboot_uptime = true;
        settings.options.use_software_center_app = true;
        settings.options.deadline.enabled = true;
        settings.options.dynamic_deadline.enabled = true;

        assert_eq!(
            validate(&settings, ClientPresence::Missing),
            Err(ValidationError::UpgradeOsConflict("PendingRebootCheck"))
        );
    }
}
