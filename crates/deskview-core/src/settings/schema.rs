//! Built-in viewer settings and their defaults

use url::Url;

use super::value::SettingValue;

/// Setting names the viewer resolves at startup
pub mod names {
    pub const LOGGING: &str = "logging";
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const ENCRYPT: &str = "encrypt";
    pub const PASSWORD: &str = "password";
    pub const AUTOCONNECT: &str = "autoconnect";
    pub const VIEW_CLIP: &str = "view_clip";
    pub const RESIZE: &str = "resize";
    pub const QUALITY: &str = "quality";
    pub const COMPRESSION: &str = "compression";
    pub const SHARED: &str = "shared";
    pub const BELL: &str = "bell";
    pub const VIEW_ONLY: &str = "view_only";
    pub const SHOW_DOT: &str = "show_dot";
    pub const PATH: &str = "path";
    pub const REPEATER_ID: &str = "repeaterID";
    pub const RECONNECT: &str = "reconnect";
    pub const RECONNECT_DELAY: &str = "reconnect_delay";
}

/// Type of control a setting is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Number,
    Text,
    Choice(&'static [&'static str]),
}

impl SettingKind {
    /// Normalise a raw layer value for this kind of control
    ///
    /// Booleans get the coercion rule applied, numbers are parsed from text
    /// when possible and choices outside the allowed set are rejected.
    pub fn normalize(&self, value: SettingValue) -> Option<SettingValue> {
        match self {
            SettingKind::Bool => Some(SettingValue::Bool(value.coerce_bool())),
            SettingKind::Number => match value.as_number() {
                Some(n) => Some(SettingValue::Number(n)),
                None if value.is_empty_text() => Some(value),
                None => None,
            },
            SettingKind::Text => Some(value),
            SettingKind::Choice(options) => {
                let text = value.as_text();
                if options.contains(&text.as_str()) {
                    Some(SettingValue::Text(text))
                } else {
                    None
                }
            }
        }
    }
}

/// Schema entry for one built-in setting
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub name: &'static str,
    pub kind: SettingKind,
}

pub const LOGGING_CHOICES: &[&str] = &["error", "warn", "info", "debug"];
pub const RESIZE_CHOICES: &[&str] = &["off", "scale", "remote"];
pub const BELL_CHOICES: &[&str] = &["on", "off"];

/// Every built-in setting, in resolution order
pub const BUILTIN_SETTINGS: &[SettingSpec] = &[
    SettingSpec {
        name: names::LOGGING,
        kind: SettingKind::Choice(LOGGING_CHOICES),
    },
    SettingSpec {
        name: names::HOST,
        kind: SettingKind::Text,
    },
    SettingSpec {
        name: names::PORT,
        kind: SettingKind::Number,
    },
    SettingSpec {
        name: names::ENCRYPT,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::PASSWORD,
        kind: SettingKind::Text,
    },
    SettingSpec {
        name: names::AUTOCONNECT,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::VIEW_CLIP,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::RESIZE,
        kind: SettingKind::Choice(RESIZE_CHOICES),
    },
    SettingSpec {
        name: names::QUALITY,
        kind: SettingKind::Number,
    },
    SettingSpec {
        name: names::COMPRESSION,
        kind: SettingKind::Number,
    },
    SettingSpec {
        name: names::SHARED,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::BELL,
        kind: SettingKind::Choice(BELL_CHOICES),
    },
    SettingSpec {
        name: names::VIEW_ONLY,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::SHOW_DOT,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::PATH,
        kind: SettingKind::Text,
    },
    SettingSpec {
        name: names::REPEATER_ID,
        kind: SettingKind::Text,
    },
    SettingSpec {
        name: names::RECONNECT,
        kind: SettingKind::Bool,
    },
    SettingSpec {
        name: names::RECONNECT_DELAY,
        kind: SettingKind::Number,
    },
];

/// Look up the kind of a built-in setting
pub fn builtin_kind(name: &str) -> Option<SettingKind> {
    BUILTIN_SETTINGS
        .iter()
        .find(|spec| spec.name == name)
        .map(|spec| spec.kind)
}

/// Caller default for a built-in setting, derived from the page location
/// where the viewer falls back to same-origin values
pub fn builtin_default(name: &str, page_url: Option<&Url>) -> Option<SettingValue> {
    let value = match name {
        names::LOGGING => SettingValue::from("warn"),
        names::HOST => SettingValue::from(
            page_url
                .and_then(|url| url.host_str())
                .unwrap_or("localhost"),
        ),
        // An explicit page port only; default ports fall back to 5900
        names::PORT => SettingValue::from(page_url.and_then(Url::port).unwrap_or(5900)),
        names::ENCRYPT => {
            SettingValue::Bool(page_url.map_or(false, |url| url.scheme() == "https"))
        }
        names::PASSWORD => return None,
        names::AUTOCONNECT => SettingValue::Bool(true),
        names::VIEW_CLIP => SettingValue::Bool(false),
        names::RESIZE => SettingValue::from("scale"),
        names::QUALITY => SettingValue::from(6u16),
        names::COMPRESSION => SettingValue::from(2u16),
        names::SHARED => SettingValue::Bool(true),
        names::BELL => SettingValue::from("off"),
        names::VIEW_ONLY => SettingValue::Bool(false),
        names::SHOW_DOT => SettingValue::Bool(false),
        names::PATH => SettingValue::from("websockify"),
        names::REPEATER_ID => SettingValue::from(""),
        names::RECONNECT => SettingValue::Bool(false),
        names::RECONNECT_DELAY => SettingValue::from(5000u16),
        _ => return None,
    };
    Some(value)
}
