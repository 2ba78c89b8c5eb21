//! Notification Document
//!
//! The single toast of a run and its rendering into the platform's
//! toast XML schema.

use crate::config::ToastScenario;

/// Id of the snooze duration selection input
pub const SNOOZE_INPUT_ID: &str = "snoozeTime";

/// What a button does when clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Launches a protocol URI (e.g. `ToastReboot:`)
    Protocol(String),
    Dismiss,
    Snooze,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeChoice {
    pub minutes: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeInput {
    pub title: String,
    pub choices: Vec<SnoozeChoice>,
}

/// Optional text groups below the body, in display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Deadline { label: String, value: String },
    PendingReboot { text: String },
    PasswordExpiry { text: String, date: Option<String> },
    Uptime { text: String, summary: String },
}

/// A fully composed toast; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDocument {
    pub scenario: ToastScenario,
    pub hero_image: Option<String>,
    pub logo_image: Option<String>,
    pub attribution: String,
    pub header: String,
    pub title: String,
    pub body: Vec<String>,
    pub segments: Vec<Segment>,
    pub snooze: Option<SnoozeInput>,
    pub actions: Vec<Button>,
    /// Custom audio replaces the notification sound
    pub silent: bool,
}

impl NotificationDocument {
    /// Renders the toast XML handed to the notification platform
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(2048);

        let presentation = match self.scenario {
            ToastScenario::Reminder => r#"scenario="reminder""#,
            ToastScenario::Short => r#"duration="short""#,
            ToastScenario::Long => r#"duration="long""#,
        };
        xml.push_str(&format!("<toast {}>\n", presentation));
        xml.push_str("  <visual>\n    <binding template=\"ToastGeneric\">\n");

        if let Some(hero) = &self.hero_image {
            xml.push_str(&format!(
                "      <image placement=\"hero\" src=\"{}\"/>\n",
                escape(hero)
            ));
        }
        if let Some(logo) = &self.logo_image {
            xml.push_str(&format!(
                "      <image id=\"1\" placement=\"appLogoOverride\" hint-crop=\"circle\" src=\"{}\"/>\n",
                escape(logo)
            ));
        }
        xml.push_str(&format!(
            "      <text placement=\"attribution\">{}</text>\n",
            escape(&self.attribution)
        ));
        xml.push_str(&format!("      <text>{}</text>\n", escape(&self.header)));

        push_group(&mut xml, &[("title", &self.title)]);
        for body in &self.body {
            push_group(&mut xml, &[("body", body)]);
        }

        for segment in &self.segments {
            match segment {
                Segment::Deadline { label, value } => {
                    push_group(&mut xml, &[("base", label), ("title", value)])
                }
                Segment::PendingReboot { text } => push_group(&mut xml, &[("body", text)]),
                Segment::PasswordExpiry { text, date } => match date {
                    Some(date) => push_group(&mut xml, &[("body", text), ("base", date)]),
                    None => push_group(&mut xml, &[("body", text)]),
                },
                Segment::Uptime { text, summary } => {
                    push_group(&mut xml, &[("body", text), ("base", summary)])
                }
            }
        }

        xml.push_str("    </binding>\n  </visual>\n");

        xml.push_str("  <actions>\n");
        if let Some(snooze) = &self.snooze {
            let default = snooze.choices.first().map(|c| c.minutes).unwrap_or_default();
            xml.push_str(&format!(
                "    <input id=\"{}\" type=\"selection\" title=\"{}\" defaultInput=\"{}\">\n",
                SNOOZE_INPUT_ID,
                escape(&snooze.title),
                default
            ));
            for choice in &snooze.choices {
                xml.push_str(&format!(
                    "      <selection id=\"{}\" content=\"{}\"/>\n",
                    choice.minutes,
                    escape(&choice.label)
                ));
            }
            xml.push_str("    </input>\n");
        }
        for button in &self.actions {
            let attributes = match &button.activation {
                Activation::Protocol(uri) => {
                    format!("activationType=\"protocol\" arguments=\"{}\"", escape(uri))
                }
                Activation::Dismiss => "activationType=\"system\" arguments=\"dismiss\"".to_string(),
                Activation::Snooze => format!(
                    "activationType=\"system\" arguments=\"snooze\" hint-inputId=\"{}\"",
                    SNOOZE_INPUT_ID
                ),
            };
            xml.push_str(&format!(
                "    <action {} content=\"{}\"/>\n",
                attributes,
                escape(&button.label)
            ));
        }
        xml.push_str("  </actions>\n");

        if self.silent {
            xml.push_str("  <audio silent=\"true\"/>\n");
        } else {
            xml.push_str("  <audio src=\"ms-winsoundevent:Notification.Default\"/>\n");
        }
        xml.push_str("</toast>\n");
        xml
    }
}

/// One group/subgroup with a text element per (hint-style, text) pair
fn push_group(xml: &mut String, texts: &[(&str, &String)]) {
    xml.push_str("      <group>\n        <subgroup>\n");
    for (style, text) in texts {
        xml.push_str(&format!(
            "          <text hint-style=\"{}\" hint-wrap=\"true\">{}</text>\n",
            style,
            escape(text)
        ));
    }
    xml.push_str("        </subgroup>\n      </group>\n");
}

/// Escapes text for element content and double-quoted attributes
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
