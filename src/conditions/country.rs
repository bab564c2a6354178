//! Country resolution.

use axum::http::HeaderMap;

use crate::conditions::cookie_value;

/// Cookie carrying a simulated visitor country.
pub const COUNTRY_COOKIE: &str = "nf_country";

/// Country used when no other signal is present.
pub const DEFAULT_COUNTRY: &str = "US";

/// Resolves the two-letter country code of a request.
///
/// Precedence: server-start override, then the `nf_country` cookie, then
/// [`DEFAULT_COUNTRY`].
#[derive(Debug, Clone, Default)]
pub struct CountryResolver {
    override_code: Option<String>,
}

impl CountryResolver {
    pub fn new(override_code: Option<&str>) -> Self {
        Self {
            override_code: override_code.map(|c| c.trim().to_ascii_uppercase()),
        }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> String {
        if let Some(code) = &self.override_code {
            return code.clone();
        }
        cookie_value(headers, COUNTRY_COOKIE)
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string())
    }
}
