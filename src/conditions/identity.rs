//! Signed identity claims.
//!
//! # Responsibilities
//! - Extract the identity token from the `nf_jwt` cookie or a bearer header
//! - Verify the HS256 signature and expiry against the configured secret
//! - Read the role list from a configurable dot path inside the claims
//!
//! # Design Decisions
//! - Any decoding failure yields "no identity", never an error
//! - `exp` is validated when present but not required

use std::fmt;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use serde_json::Value;

use crate::conditions::cookie_value;

/// Cookie carrying the identity token.
pub const JWT_COOKIE: &str = "nf_jwt";

/// Verified identity of the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    /// Raw verified claims.
    pub claims: Value,
    /// Roles read from the configured claim path.
    pub roles: Vec<String>,
}

/// Verifies identity tokens and extracts roles.
#[derive(Clone)]
pub struct IdentityDecoder {
    key: DecodingKey,
    validation: Validation,
    role_path: Vec<String>,
}

impl fmt::Debug for IdentityDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityDecoder")
            .field("role_path", &self.role_path.join("."))
            .finish_non_exhaustive()
    }
}

impl IdentityDecoder {
    pub fn new(secret: &str, role_path: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            role_path: role_path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Verify `token`. Malformed, expired or badly signed tokens yield `None`.
    pub fn decode(&self, token: &str) -> Option<Identity> {
        match decode::<Value>(token, &self.key, &self.validation) {
            Ok(data) => {
                let roles = self.roles(&data.claims);
                Some(Identity {
                    claims: data.claims,
                    roles,
                })
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid identity token");
                None
            }
        }
    }

    /// Decode the identity carried by a request, if any.
    pub fn from_headers(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = cookie_value(headers, JWT_COOKIE).or_else(|| bearer_token(headers))?;
        self.decode(&token)
    }

    fn roles(&self, claims: &Value) -> Vec<String> {
        let mut node = claims;
        for key in &self.role_path {
            match node.get(key) {
                Some(next) => node = next,
                None => return Vec::new(),
            }
        }
        match node {
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(role) => vec![role.clone()],
            _ => Vec::new(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    Some(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn sign(claims: Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_reads_roles_from_default_path() {
        let decoder = IdentityDecoder::new("secret", "app_metadata.authorization.roles");
        let token = sign(
            json!({"sub": "1", "exp": 1_893_456_000u64, "app_metadata": {"authorization": {"roles": ["admin"]}}}),
            "secret",
        );
        let identity = decoder.decode(&token).unwrap();
        assert_eq!(identity.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn test_custom_path_and_secret() {
        let decoder = IdentityDecoder::new("custom", "roles");
        let token = sign(json!({"sub": "1", "roles": ["editor"]}), "custom");
        assert_eq!(decoder.decode(&token).unwrap().roles, vec!["editor".to_string()]);

        let wrong_secret = sign(json!({"sub": "1", "roles": ["editor"]}), "secret");
        assert!(decoder.decode(&wrong_secret).is_none());
    }

    #[test]
    fn test_expired_and_malformed_tokens_are_ignored() {
        let decoder = IdentityDecoder::new("secret", "roles");
        let expired = sign(json!({"sub": "1", "exp": 1_000u64, "roles": ["admin"]}), "secret");
        assert!(decoder.decode(&expired).is_none());
        assert!(decoder.decode("not-a-token").is_none());
    }

    #[test]
    fn test_token_from_cookie_or_bearer() {
        let decoder = IdentityDecoder::new("secret", "roles");
        let token = sign(json!({"sub": "1", "roles": ["admin"]}), "secret");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; nf_jwt={}", token)).unwrap(),
        );
        assert!(decoder.from_headers(&headers).is_some());

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert!(decoder.from_headers(&headers).is_some());

        assert!(decoder.from_headers(&HeaderMap::new()).is_none());
    }
}
