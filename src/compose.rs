//! Notification Composer
//!
//! Builds the toast document from settings and gathered facts. Pure: the
//! clock and the regional formats come in through `RenderContext`.

use crate::config::{Settings, Texts};
use crate::culture::Culture;
use crate::facts::Facts;
use crate::notification::{
    Activation, Button, NotificationDocument, Segment, SnoozeChoice, SnoozeInput,
};
use crate::run_target;
use chrono::{NaiveDateTime, Timelike};

/// Snooze durations offered in the selection input, in minutes
pub const SNOOZE_MINUTES: [u32; 5] = [15, 30, 60, 240, 480];

/// Time and formatting inputs of one composition
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub now: NaiveDateTime,
    pub culture: Culture,
}

pub fn compose(settings: &Settings, facts: &Facts, ctx: &RenderContext) -> NotificationDocument {
    let options = &settings.options;
    let texts = &settings.texts;

    let header = if options.greet_given_name {
        greeting_header(texts, ctx.now.hour(), facts.given_name.as_deref())
    } else {
        texts.header.clone()
    };

    let body = [&texts.body1, &texts.body2]
        .into_iter()
        .filter(|text| !text.is_empty())
        .cloned()
        .collect();

    let snooze = options.snooze_button.then(|| snooze_input(texts));

    NotificationDocument {
        scenario: options.scenario,
        hero_image: options.hero_image.as_deref().map(|name| settings.image_uri(name)),
        logo_image: options.logo_image.as_deref().map(|name| settings.image_uri(name)),
        attribution: texts.attribution.clone(),
        header,
        title: texts.title.clone(),
        body,
        segments: segments(settings, facts, ctx),
        actions: buttons(settings),
        snooze,
        silent: options.custom_audio,
    }
}

/// Greeting text for an hour of the day: [0,12) [12,16) [16,24)
pub fn greeting(texts: &Texts, hour: u32) -> &str {
    match hour {
        0..=11 => &texts.greet_morning,
        12..=15 => &texts.greet_afternoon,
        _ => &texts.greet_evening,
    }
}

fn greeting_header(texts: &Texts, hour: u32, given_name: Option<&str>) -> String {
    let greeting = greeting(texts, hour);
    match given_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{} {}", greeting, name),
        None => greeting.to_string(),
    }
}

/// Snooze forces the action and dismiss buttons on
fn buttons(settings: &Settings) -> Vec<Button> {
    let options = &settings.options;
    let texts = &settings.texts;
    let snooze = options.snooze_button;
    let mut buttons = Vec::new();

    if options.action_button1 || snooze {
        // An enabled run target takes over the primary action
        let protocol = run_target::action_protocol(options)
            .unwrap_or_else(|| options.action1.clone().unwrap_or_default());
        buttons.push(Button {
            label: texts.action_button1.clone(),
            activation: Activation::Protocol(protocol),
        });
    }
    if options.action_button2 {
        buttons.push(Button {
            label: texts.action_button2.clone(),
            activation: Activation::Protocol(options.action2.clone().unwrap_or_default()),
        });
    }
    if snooze {
        buttons.push(Button {
            label: texts.snooze_button.clone(),
            activation: Activation::Snooze,
        });
    }
    if options.dismiss_button || snooze {
        buttons.push(Button {
            label: texts.dismiss_button.clone(),
            activation: Activation::Dismiss,
        });
    }
    buttons
}

fn snooze_input(texts: &Texts) -> SnoozeInput {
    let choices = SNOOZE_MINUTES
        .iter()
        .map(|&minutes| {
            let label = match minutes {
                60 => format!("1 {}", texts.hour),
                m if m > 60 => format!("{} {}", m / 60, texts.hours),
                m => format!("{} {}", m, texts.minutes),
            };
            SnoozeChoice { minutes, label }
        })
        .collect();
    SnoozeInput {
        title: texts.snooze.clone(),
        choices,
    }
}

/// Deadline, pending reboot, password expiry, uptime; in that order
fn segments(settings: &Settings, facts: &Facts, ctx: &RenderContext) -> Vec<Segment> {
    let options = &settings.options;
    let texts = &settings.texts;
    let mut segments = Vec::new();

    let deadline = options.deadline.active().copied().or_else(|| {
        if options.dynamic_deadline.enabled {
            facts.dynamic_deadline
        } else {
            None
        }
    });
    if let Some(deadline) = deadline {
        segments.push(Segment::Deadline {
            label: texts.deadline.clone(),
            value: ctx.culture.format_date_time(deadline),
        });
    }

    if options.pending_reboot_check_text {
        segments.push(Segment::PendingReboot {
            text: texts.pending_reboot_check.clone(),
        });
    }

    if options.ad_password_expiration_text {
        segments.push(Segment::PasswordExpiry {
            text: texts.ad_password_expiration.clone(),
            date: facts
                .password_expiry
                .expires_at
                .map(|date| ctx.culture.format_date(date)),
        });
    }

    let over_uptime = options
        .max_uptime_days
        .is_some_and(|max| facts.uptime_days > max);
    if options.pending_reboot_uptime_text && over_uptime {
        segments.push(Segment::Uptime {
            text: texts.pending_reboot_uptime.clone(),
            summary: format!(
                "{} {} {}",
                texts.computer_uptime, facts.uptime_days, texts.computer_uptime_days
            ),
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToastScenario;
    use crate::facts::PasswordExpiry;
    use crate::notification::tests::text_nodes;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    fn ctx(hour: u32) -> RenderContext {
        RenderContext {
            now: at(hour),
            culture: Culture::from_patterns("da-DK", "dd-MM-yyyy", "HH:mm"),
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.texts = Texts {
            attribution: "Contoso IT".to_string(),
            header: "Helpdesk".to_string(),
            title: "Restart required".to_string(),
            body1: "Updates were installed.".to_string(),
            action_button1: "Restart now".to_string(),
            action_button2: "More info".to_string(),
            dismiss_button: "Dismiss".to_string(),
            snooze_button: "Snooze".to_string(),
            snooze: "Remind me in".to_string(),
            deadline: "Deadline:".to_string(),
            pending_reboot_uptime: "Your computer has not restarted in a while.".to_string(),
            pending_reboot_check: "A restart is pending.".to_string(),
            ad_password_expiration: "Your password expires on".to_string(),
            computer_uptime: "Uptime:".to_string(),
            computer_uptime_days: "days".to_string(),
            greet_morning: "Good morning".to_string(),
            greet_afternoon: "Good afternoon".to_string(),
            greet_evening: "Good evening".to_string(),
            minutes: "minutes".to_string(),
            hour: "hour".to_string(),
            hours: "hours".to_string(),
            ..Texts::default()
        };
        settings.options.action1 = Some("ToastReboot:".to_string());
        settings
    }

    fn activations(doc: &NotificationDocument) -> Vec<Activation> {
        doc.actions.iter().map(|b| b.activation.clone()).collect()
    }

    #[test]
    fn greeting_hour_bands() {
        let texts = settings().texts;
        assert_eq!(greeting(&texts, 0), "Good morning");
        assert_eq!(greeting(&texts, 9), "Good morning");
        assert_eq!(greeting(&texts, 12), "Good afternoon");
        assert_eq!(greeting(&texts, 14), "Good afternoon");
        assert_eq!(greeting(&texts, 16), "Good evening");
        assert_eq!(greeting(&texts, 20), "Good evening");
    }

    #[test]
    fn header_greets_given_name() {
        let mut settings = settings();
        let facts = Facts {
            given_name: Some("Jane".to_string()),
            ..Facts::default()
        };
        assert_eq!(compose(&settings, &facts, &ctx(9)).header, "Helpdesk");

        settings.options.greet_given_name = true;
        assert_eq!(compose(&settings, &facts, &ctx(14)).header, "Good afternoon Jane");
        assert_eq!(
            compose(&settings, &Facts::default(), &ctx(20)).header,
            "Good evening"
        );
    }

    #[test]
    fn snooze_forces_action_and_dismiss() {
        let mut settings = settings();
        settings.options.snooze_button = true;

        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert_eq!(
            activations(&doc),
            vec![
                Activation::Protocol("ToastReboot:".to_string()),
                Activation::Snooze,
                Activation::Dismiss,
            ]
        );

        let snooze = doc.snooze.unwrap();
        assert_eq!(snooze.title, "Remind me in");
        let labels: Vec<_> = snooze.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["15 minutes", "30 minutes", "1 hour", "4 hours", "8 hours"]
        );
    }

    #[test]
    fn button_layouts_follow_flags() {
        let mut settings = settings();
        assert!(compose(&settings, &Facts::default(), &ctx(9)).actions.is_empty());

        settings.options.dismiss_button = true;
        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert_eq!(activations(&doc), vec![Activation::Dismiss]);
        assert!(doc.snooze.is_none());

        settings.options.action_button1 = true;
        settings.options.action_button2 = true;
        settings.options.action2 = Some("https://intranet.example.com/restart".to_string());
        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert_eq!(
            activations(&doc),
            vec![
                Activation::Protocol("ToastReboot:".to_string()),
                Activation::Protocol("https://intranet.example.com/restart".to_string()),
                Activation::Dismiss,
            ]
        );
    }

    #[test]
    fn run_target_replaces_primary_action() {
        let mut settings = settings();
        settings.options.action_button1 = true;
        settings.options.run_package_id.enabled = true;
        settings.options.run_package_id.value = Some("PS100123".to_string());
        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert_eq!(
            activations(&doc),
            vec![Activation::Protocol("ToastRunPackageID:".to_string())]
        );

        settings.options.run_package_id.enabled = false;
        settings.options.run_application_id.enabled = true;
        settings.options.run_application_id.value = Some("ScopeId_1/Application_42".to_string());
        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert_eq!(
            activations(&doc),
            vec![Activation::Protocol("ToastRunApplicationID:".to_string())]
        );

        // Enabled without an id keeps Action1
        settings.options.run_application_id.value = None;
        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert_eq!(
            activations(&doc),
            vec![Activation::Protocol("ToastReboot:".to_string())]
        );
    }

    #[test]
    fn uptime_segment_needs_text_and_excess_uptime() {
        let mut settings = settings();
        settings.options.max_uptime_days = Some(6);
        let facts = Facts {
            uptime_days: 9,
            ..Facts::default()
        };

        let has_uptime = |settings: &Settings, facts: &Facts| {
            compose(settings, facts, &ctx(9))
                .segments
                .iter()
                .any(|s| matches!(s, Segment::Uptime { .. }))
        };

        assert!(!has_uptime(&settings, &facts));
        settings.options.pending_reboot_uptime_text = true;
        assert!(has_uptime(&settings, &facts));
        assert!(!has_uptime(
            &settings,
            &Facts {
                uptime_days: 6,
                ..Facts::default()
            }
        ));

        let doc = compose(&settings, &facts, &ctx(9));
        assert_eq!(
            doc.segments,
            vec![Segment::Uptime {
                text: "Your computer has not restarted in a while.".to_string(),
                summary: "Uptime: 9 days".to_string(),
            }]
        );
    }

    #[test]
    fn segments_in_fixed_order() {
        let mut settings = settings();
        settings.options.deadline.enabled = true;
        settings.options.deadline.value = NaiveDate::from_ymd_opt(2026, 10, 20)
            .and_then(|d| d.and_hms_opt(8, 0, 0));
        settings.options.pending_reboot_check_text = true;
        settings.options.ad_password_expiration_text = true;
        let facts = Facts {
            password_expiry: PasswordExpiry {
                expiring: true,
                expires_at: NaiveDate::from_ymd_opt(2026, 10, 31)
                    .and_then(|d| d.and_hms_opt(10, 0, 0)),
                days_remaining: Some(14),
            },
            ..Facts::default()
        };

        let doc = compose(&settings, &facts, &ctx(9));
        assert_eq!(
            doc.segments,
            vec![
                Segment::Deadline {
                    label: "Deadline:".to_string(),
                    value: "20-10-2026 08:00".to_string(),
                },
                Segment::PendingReboot {
                    text: "A restart is pending.".to_string(),
                },
                Segment::PasswordExpiry {
                    text: "Your password expires on".to_string(),
                    date: Some("31-10-2026".to_string()),
                },
            ]
        );
    }

    #[test]
    fn dynamic_deadline_used_only_when_enabled() {
        let mut settings = settings();
        let facts = Facts {
            dynamic_deadline: NaiveDate::from_ymd_opt(2026, 10, 22)
                .and_then(|d| d.and_hms_opt(18, 0, 0)),
            ..Facts::default()
        };
        assert!(compose(&settings, &facts, &ctx(9)).segments.is_empty());

        settings.options.dynamic_deadline.enabled = true;
        settings.options.dynamic_deadline.value = Some("PS100123".to_string());
        let doc = compose(&settings, &facts, &ctx(9));
        assert_eq!(
            doc.segments,
            vec![Segment::Deadline {
                label: "Deadline:".to_string(),
                value: "22-10-2026 18:00".to_string(),
            }]
        );
    }

    #[test]
    fn composed_xml_recovers_templates() {
        let mut settings = settings();
        settings.texts.title = "Save <all> & restart".to_string();
        settings.texts.body2 = "It's \"quick\"".to_string();
        settings.options.scenario = ToastScenario::Short;
        settings.options.custom_audio = true;
        settings.options.logo_image = Some("logo.png".to_string());
        settings.base_dir = Some(PathBuf::from("/opt/toast"));

        let doc = compose(&settings, &Facts::default(), &ctx(9));
        assert!(doc.silent);
        assert_eq!(doc.logo_image.as_deref(), Some("file:///opt/toast/logo.png"));

        let xml = doc.to_xml();
        assert!(xml.starts_with("<toast duration=\"short\">"));
        assert_eq!(
            text_nodes(&xml),
            vec![
                "Contoso IT",
                "Helpdesk",
                "Save <all> & restart",
                "Updates were installed.",
                "It's \"quick\"",
            ]
        );
    }
}
