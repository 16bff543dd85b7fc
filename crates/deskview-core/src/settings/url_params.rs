//! Setting overrides carried in the page URL

use percent_encoding::percent_decode_str;
use url::Url;

/// `name=value` pairs from the page URL's fragment and query string
///
/// When a name appears more than once in the same component the last
/// occurrence wins. Values are percent-decoded; `+` is left as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams {
    fragment: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl UrlParams {
    pub fn from_url(url: &Url) -> Self {
        Self {
            fragment: url.fragment().map(parse_pairs).unwrap_or_default(),
            query: url.query().map(parse_pairs).unwrap_or_default(),
        }
    }

    pub fn fragment(&self, name: &str) -> Option<&str> {
        last_match(&self.fragment, name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        last_match(&self.query, name)
    }

    /// Fragment value if present, otherwise the query value
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.fragment(name).or_else(|| self.query(name))
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty() && self.query.is_empty()
    }
}

fn parse_pairs(component: &str) -> Vec<(String, String)> {
    component
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| {
            (
                name.to_string(),
                percent_decode_str(value).decode_utf8_lossy().into_owned(),
            )
        })
        .collect()
}

fn last_match<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
