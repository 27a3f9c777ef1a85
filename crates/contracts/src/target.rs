//! Target - a URL submitted for probing

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Scheme used when a raw target carries none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// A resource to probe
///
/// Only identity is the string value; targets are never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Normalize a raw target so that it always carries a scheme
    ///
    /// `example.com` becomes `https://example.com` (or `http://` when
    /// `default_scheme` is `Http`). Targets that already name a scheme are
    /// kept as-is, including schemes the blacklist will refuse (`file://`).
    ///
    /// # Errors
    /// Returns `InvalidTarget` for empty input.
    pub fn normalize(raw: &str, default_scheme: Scheme) -> Result<Self, ContractError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContractError::invalid_target(raw, "empty target"));
        }

        if has_scheme(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }

        Ok(Self(format!("{}://{}", default_scheme.as_str(), trimmed)))
    }

    /// Wrap an already normalized URL string
    pub fn from_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `scheme://` where scheme follows RFC 3986 (ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ))
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
