//! Connection target derivation

use url::Url;

use crate::errors::TargetError;
use crate::settings::{names, SettingsStore};

/// Settings that determine where a session connects
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetSettings {
    /// Empty or missing means same origin as the page
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: String,
    pub encrypt: bool,
}

impl TargetSettings {
    /// Read the target settings from the store's cache
    pub fn from_store(store: &SettingsStore) -> Self {
        Self {
            host: store.read_text(names::HOST),
            port: store.read_text(names::PORT),
            path: store.read_text(names::PATH).unwrap_or_default(),
            encrypt: store.read_bool(names::ENCRYPT).unwrap_or(false),
        }
    }
}

/// Build the WebSocket URL for a session
///
/// With a host the URL is `ws[s]://host[:port]/path`, the scheme following
/// `encrypt`. Without one the path is resolved against the page location and
/// the scheme follows the page's scheme.
pub fn derive_target(
    settings: &TargetSettings,
    page_url: Option<&Url>,
) -> Result<Url, TargetError> {
    let host = settings.host.as_deref().map(str::trim).filter(|h| !h.is_empty());
    let path = settings.path.trim_start_matches('/');

    match host {
        Some(host) => {
            let mut url = Url::parse(&format!("https://{}", host))?;
            set_scheme(&mut url, if settings.encrypt { "wss" } else { "ws" })?;
            if let Some(port) = settings.port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
                let port = port.parse::<u16>().map_err(|_| TargetError::InvalidPort {
                    value: port.to_string(),
                })?;
                url.set_port(Some(port)).map_err(|_| TargetError::InvalidPort {
                    value: port.to_string(),
                })?;
            }
            url.set_path(&format!("/{}", path));
            Ok(url)
        }
        None => {
            let page = page_url.ok_or(TargetError::InvalidUrl(
                url::ParseError::RelativeUrlWithoutBase,
            ))?;
            let secure = page.scheme() == "https";
            let mut url = page.join(path)?;
            url.set_fragment(None);
            set_scheme(&mut url, if secure { "wss" } else { "ws" })?;
            Ok(url)
        }
    }
}

fn set_scheme(url: &mut Url, scheme: &str) -> Result<(), TargetError> {
    url.set_scheme(scheme).map_err(|_| TargetError::Scheme {
        scheme: scheme.to_string(),
        url: url.to_string(),
    })
}
