//! Configuration Loader
//!
//! Reads the JSON toast configuration into a typed, immutable `Settings`.
//! Every recognized feature, option and text slot is enumerated here;
//! anything else in the document is ignored.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default configuration file name (next to the EXE)
pub const DEFAULT_CONFIG_NAME: &str = "config-toast.json";

/// Text block used when the preferred culture has none
pub const FALLBACK_LANGUAGE: &str = "en-US";

/// Accepted static deadline formats
const DEADLINE_FORMATS: &[&str] = &["%d-%m-%Y %H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Configuration load failures (all fatal)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("option {option} has invalid value '{value}'")]
    InvalidValue { option: &'static str, value: String },
}

/// Default configuration path: next to the EXE, else the working directory
pub fn default_config_path() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join(DEFAULT_CONFIG_NAME);
        }
    }
    PathBuf::from(".").join(DEFAULT_CONFIG_NAME)
}

/// Top-level feature flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub toast: bool,
    pub upgrade_os: bool,
    pub pending_reboot_uptime: bool,
    pub pending_reboot_check: bool,
    pub ad_password_expiration: bool,
}

impl Features {
    /// True if any of the four scenario features is on
    pub fn any_scenario(&self) -> bool {
        self.upgrade_os
            || self.pending_reboot_uptime
            || self.pending_reboot_check
            || self.ad_password_expiration
    }
}

/// An option with its own enabled flag and an associated value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle<T> {
    pub enabled: bool,
    pub value: Option<T>,
}

impl<T> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: false,
            value: None,
        }
    }
}

impl<T> Toggle<T> {
    /// The value, only if the option is enabled
    pub fn active(&self) -> Option<&T> {
        if self.enabled {
            self.value.as_ref()
        } else {
            None
        }
    }
}

/// Platform presentation style of the toast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToastScenario {
    #[default]
    Reminder,
    Short,
    Long,
}

impl ToastScenario {
    fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "reminder" => Some(ToastScenario::Reminder),
            "short" => Some(ToastScenario::Short),
            "long" => Some(ToastScenario::Long),
            _ => None,
        }
    }
}

/// Application identity the toast is shown under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayApp {
    SoftwareCenter,
    PowerShell,
}

impl DisplayApp {
    pub fn app_id(&self) -> &'static str {
        match self {
            DisplayApp::SoftwareCenter => "Microsoft.SoftwareCenter.DesktopToasts",
            DisplayApp::PowerShell => {
                "{1AC14E77-02E7-4E5D-B744-2EB1AE5198B7}\\WindowsPowerShell\\v1.0\\powershell.exe"
            }
        }
    }

    /// Software Center only exists where the management client is installed
    pub fn requires_management_client(&self) -> bool {
        matches!(self, DisplayApp::SoftwareCenter)
    }
}

/// Secondary configuration entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub target_os: Option<u32>,
    pub max_uptime_days: Option<u32>,
    pub pending_reboot_uptime_text: bool,
    pub pending_reboot_check_text: bool,
    pub ad_password_expiration_text: bool,
    pub ad_password_expiration_days: Option<u32>,
    pub run_application_id: Toggle<String>,
    pub run_package_id: Toggle<String>,
    pub deadline: Toggle<NaiveDateTime>,
    pub dynamic_deadline: Toggle<String>,
    pub use_software_center_app: bool,
    pub use_powershell_app: bool,
    pub custom_audio: bool,
    pub scenario: ToastScenario,
    pub logo_image: Option<String>,
    pub hero_image: Option<String>,
    pub action_button1: bool,
    pub action_button2: bool,
    pub dismiss_button: bool,
    pub snooze_button: bool,
    pub action1: Option<String>,
    pub action2: Option<String>,
    pub greet_given_name: bool,
    pub multi_language_support: bool,
    pub directory_search_base: Option<String>,
}

impl Options {
    /// The selected display identity (only meaningful after validation)
    pub fn display_app(&self) -> Option<DisplayApp> {
        match (self.use_software_center_app, self.use_powershell_app) {
            (true, false) => Some(DisplayApp::SoftwareCenter),
            (false, true) => Some(DisplayApp::PowerShell),
            _ => None,
        }
    }
}

/// Localized text templates of the selected language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Texts {
    pub attribution: String,
    pub header: String,
    pub title: String,
    pub body1: String,
    pub body2: String,
    pub action_button1: String,
    pub action_button2: String,
    pub dismiss_button: String,
    pub snooze_button: String,
    pub snooze: String,
    pub deadline: String,
    pub pending_reboot_uptime: String,
    pub pending_reboot_check: String,
    pub ad_password_expiration: String,
    pub computer_uptime: String,
    pub computer_uptime_days: String,
    pub greet_morning: String,
    pub greet_afternoon: String,
    pub greet_evening: String,
    pub minutes: String,
    pub hour: String,
    pub hours: String,
    pub custom_audio_text_to_speech: String,
}

impl Texts {
    /// Stores a text slot; false if the name is not recognized
    fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "AttributionText" => &mut self.attribution,
            "HeaderText" => &mut self.header,
            "TitleText" => &mut self.title,
            "BodyText1" => &mut self.body1,
            "BodyText2" => &mut self.body2,
            "ActionButton1" => &mut self.action_button1,
            "ActionButton2" => &mut self.action_button2,
            "DismissButton" => &mut self.dismiss_button,
            "SnoozeButton" => &mut self.snooze_button,
            "SnoozeText" => &mut self.snooze,
            "DeadlineText" => &mut self.deadline,
            "PendingRebootUptimeText" => &mut self.pending_reboot_uptime,
            "PendingRebootCheckText" => &mut self.pending_reboot_check,
            "ADPasswordExpirationText" => &mut self.ad_password_expiration,
            "ComputerUptimeText" => &mut self.computer_uptime,
            "ComputerUptimeDaysText" => &mut self.computer_uptime_days,
            "GreetMorningText" => &mut self.greet_morning,
            "GreetAfternoonText" => &mut self.greet_afternoon,
            "GreetEveningText" => &mut self.greet_evening,
            "MinutesText" => &mut self.minutes,
            "HourText" => &mut self.hour,
            "HoursText" => &mut self.hours,
            "CustomAudioTextToSpeech" => &mut self.custom_audio_text_to_speech,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Complete, immutable settings of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub features: Features,
    pub options: Options,
    pub texts: Texts,
    /// Culture whose text block was selected (None if the document has no texts)
    pub language: Option<String>,
    /// Directory relative image names are resolved against
    pub base_dir: Option<PathBuf>,
}

impl Settings {
    /// Parses a configuration document.
    ///
    /// `ui_culture` is the host's display language, consulted only when
    /// `MultiLanguageSupport` is enabled.
    pub fn from_json(json: &str, ui_culture: Option<&str>) -> Result<Self, ConfigError> {
        let json = json.strip_prefix('\u{feff}').unwrap_or(json);
        let raw: RawConfig = serde_json::from_str(json)?;

        let mut settings = Settings::default();

        for entry in &raw.features {
            apply_feature(&mut settings.features, entry);
        }
        for entry in raw.options {
            apply_option(&mut settings.options, entry)?;
        }

        let preferred = if settings.options.multi_language_support {
            ui_culture
        } else {
            None
        };
        if let Some(language) = select_language(&raw.texts, preferred) {
            for text in &raw.texts[language] {
                if !settings.texts.set(&text.name, text.value.clone()) {
                    debug!("Ignoring unknown text '{}'", text.name);
                }
            }
            settings.language = Some(language.to_string());
        }

        Ok(settings)
    }

    /// Resolves an image name to a URI the toast platform can load
    pub fn image_uri(&self, name: &str) -> String {
        if name.contains("://") {
            return name.to_string();
        }
        let path = match &self.base_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        let path = path.to_string_lossy().replace('\\', "/");
        format!("file:///{}", path.trim_start_matches('/'))
    }
}

/// Loads and parses the configuration file (fatal on any failure)
pub fn load(path: &Path, ui_culture: Option<&str>) -> Result<Settings, ConfigError> {
    // read_to_string rejects anything that is not valid UTF-8
    let json = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut settings = Settings::from_json(&json, ui_culture)?;
    settings.base_dir = path.parent().map(Path::to_path_buf);

    info!(
        "Configuration loaded from {} (language: {})",
        path.display(),
        settings.language.as_deref().unwrap_or("none")
    );
    Ok(settings)
}

fn apply_feature(features: &mut Features, entry: &RawEntry) {
    let enabled = entry.enabled.0;
    match entry.name.as_str() {
        "Toast" => features.toast = enabled,
        "UpgradeOS" => features.upgrade_os = enabled,
        "PendingRebootUptime" => features.pending_reboot_uptime = enabled,
        "PendingRebootCheck" => features.pending_reboot_check = enabled,
        "ADPasswordExpiration" => features.ad_password_expiration = enabled,
        other => debug!("Ignoring unknown feature '{}'", other),
    }
}

fn apply_option(options: &mut Options, entry: RawEntry) -> Result<(), ConfigError> {
    let enabled = entry.enabled.0;
    match entry.name.as_str() {
        "TargetOS" => {
            options.target_os = parse_number("TargetOS", entry.build.or(entry.value))?;
        }
        "MaxUptimeDays" => {
            options.max_uptime_days = parse_number("MaxUptimeDays", entry.value)?;
        }
        "PendingRebootUptimeText" => options.pending_reboot_uptime_text = enabled,
        "PendingRebootCheckText" => options.pending_reboot_check_text = enabled,
        "ADPasswordExpirationText" => options.ad_password_expiration_text = enabled,
        "ADPasswordExpirationDays" => {
            options.ad_password_expiration_days =
                parse_number("ADPasswordExpirationDays", entry.value)?;
        }
        "RunApplicationID" => options.run_application_id = text_toggle(enabled, entry.value),
        "RunPackageID" => options.run_package_id = text_toggle(enabled, entry.value),
        "Deadline" => {
            let value = if enabled {
                parse_deadline(entry.value)?
            } else {
                None
            };
            options.deadline = Toggle { enabled, value };
        }
        "DynamicDeadline" => options.dynamic_deadline = text_toggle(enabled, entry.value),
        "UseSoftwareCenterApp" => options.use_software_center_app = enabled,
        "UsePowershellApp" => options.use_powershell_app = enabled,
        "CustomAudio" => options.custom_audio = enabled,
        "Scenario" => {
            let kind = entry.kind.or_else(|| entry.value.map(|v| v.into_string()));
            options.scenario = match kind.as_deref() {
                None => ToastScenario::default(),
                Some(kind) => ToastScenario::parse(kind).unwrap_or_else(|| {
                    warn!("Unknown scenario type '{}', using reminder", kind);
                    ToastScenario::default()
                }),
            };
        }
        "LogoImageName" => options.logo_image = non_empty(entry.value),
        "HeroImageName" => options.hero_image = non_empty(entry.value),
        "ActionButton1" => options.action_button1 = enabled,
        "ActionButton2" => options.action_button2 = enabled,
        "DismissButton" => options.dismiss_button = enabled,
        "SnoozeButton" => options.snooze_button = enabled,
        "Action1" => options.action1 = non_empty(entry.value),
        "Action2" => options.action2 = non_empty(entry.value),
        "GreetGivenName" => options.greet_given_name = enabled,
        "MultiLanguageSupport" => options.multi_language_support = enabled,
        "DirectorySearchBase" => options.directory_search_base = non_empty(entry.value),
        other => debug!("Ignoring unknown option '{}'", other),
    }
    Ok(())
}

/// Preferred culture, then the fallback language, then the first block by name
fn select_language<'a>(
    blocks: &'a BTreeMap<String, Vec<RawText>>,
    preferred: Option<&str>,
) -> Option<&'a str> {
    let lookup = |culture: &str| {
        blocks
            .keys()
            .find(|key| key.eq_ignore_ascii_case(culture))
            .map(String::as_str)
    };

    if let Some(culture) = preferred {
        if let Some(key) = lookup(culture) {
            return Some(key);
        }
        info!("No texts for culture {}, falling back", culture);
    }
    lookup(FALLBACK_LANGUAGE).or_else(|| blocks.keys().next().map(String::as_str))
}

fn non_empty(value: Option<Scalar>) -> Option<String> {
    value
        .map(Scalar::into_string)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn text_toggle(enabled: bool, value: Option<Scalar>) -> Toggle<String> {
    Toggle {
        enabled,
        value: non_empty(value),
    }
}

fn parse_number<T: FromStr>(
    option: &'static str,
    value: Option<Scalar>,
) -> Result<Option<T>, ConfigError> {
    match non_empty(value) {
        None => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                option,
                value: text,
            }),
    }
}

fn parse_deadline(value: Option<Scalar>) -> Result<Option<NaiveDateTime>, ConfigError> {
    let Some(text) = non_empty(value) else {
        return Ok(None);
    };
    DEADLINE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
        .map(Some)
        .ok_or(ConfigError::InvalidValue {
            option: "Deadline",
            value: text,
        })
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    features: Vec<RawEntry>,
    #[serde(default)]
    options: Vec<RawEntry>,
    #[serde(default)]
    texts: BTreeMap<String, Vec<RawText>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(default)]
    enabled: Flag,
    #[serde(default)]
    value: Option<Scalar>,
    #[serde(default)]
    build: Option<Scalar>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawText {
    name: String,
    #[serde(default)]
    value: String,
}

/// Enabled flag: `true` or any casing of "true"; everything else is off
#[derive(Debug, Default, Deserialize)]
#[serde(from = "FlagRepr")]
struct Flag(bool);

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Text(String),
    Other(serde_json::Value),
}

impl From<FlagRepr> for Flag {
    fn from(repr: FlagRepr) -> Self {
        match repr {
            FlagRepr::Bool(value) => Flag(value),
            FlagRepr::Text(text) => Flag(text.trim().eq_ignore_ascii_case("true")),
            FlagRepr::Other(_) => Flag(false),
        }
    }
}

/// Option value written either as a string or as a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Integer(number) => number.to_string(),
            Scalar::Float(number) => number.to_string(),
        }
    }
}
