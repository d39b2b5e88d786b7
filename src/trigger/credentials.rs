//! OAuth2 credential snapshot.
//!
//! The credential store is an external collaborator. It is asked once at
//! startup; anything short of a usable record degrades to empty strings.
//!
//! Accepted record shapes:
//!
//! ```json
//! { "accessToken": "...", "clientId": "...", "clientSecret": "..." }
//! ```
//!
//! ```json
//! { "clientId": "...", "clientSecret": "...", "oauthTokenData": { "access_token": "..." } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

// ============================================================================
// CredentialSource
// ============================================================================

/// Supplies the raw credential record.
///
/// `Ok(None)` means no credential is configured.
pub trait CredentialSource: Send + Sync {
    /// Fetches the credential record.
    fn credentials(&self) -> Result<Option<Value>>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Result<Option<Value>> + Send + Sync,
{
    fn credentials(&self) -> Result<Option<Value>> {
        self()
    }
}

// ============================================================================
// AuthContext
// ============================================================================

/// Read-only credential snapshot exposed to the open-event script.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// OAuth2 access token.
    pub access_token: String,
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
}

impl AuthContext {
    /// Creates a snapshot from explicit values.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Resolves a snapshot from an optional source. Never fails.
    #[must_use]
    pub fn resolve(source: Option<&dyn CredentialSource>) -> Self {
        let Some(source) = source else {
            debug!("No credential source configured");
            return Self::default();
        };

        match source.credentials() {
            Ok(Some(record)) => Self::from_record(&record),
            Ok(None) => {
                debug!("Credential source returned nothing");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "Credential resolution failed, continuing without credentials");
                Self::default()
            }
        }
    }

    /// Extracts a snapshot from a credential record.
    ///
    /// Missing or non-string fields become empty strings.
    #[must_use]
    pub fn from_record(record: &Value) -> Self {
        let text = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let access_token = record
            .get("accessToken")
            .or_else(|| record.pointer("/oauthTokenData/access_token"));

        Self {
            access_token: text(access_token),
            client_id: text(record.get("clientId")),
            client_secret: text(record.get("clientSecret")),
        }
    }

    /// Returns `true` if no field is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && self.client_id.is_empty() && self.client_secret.is_empty()
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "" } else { "***" };
        f.debug_struct("AuthContext")
            .field("access_token", &mask(&self.access_token))
            .field("client_id", &self.client_id)
            .field("client_secret", &mask(&self.client_secret))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::Error;

    #[test]
    fn test_flat_record() {
        let auth = AuthContext::from_record(&json!({
            "accessToken": "tok",
            "clientId": "id",
            "clientSecret": "secret"
        }));
        assert_eq!(auth, AuthContext::new("tok", "id", "secret"));
    }

    #[test]
    fn test_oauth_token_data_record() {
        let auth = AuthContext::from_record(&json!({
            "clientId": "id",
            "clientSecret": "secret",
            "oauthTokenData": { "access_token": "tok" }
        }));
        assert_eq!(auth.access_token, "tok");
        assert_eq!(auth.client_id, "id");
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let auth = AuthContext::from_record(&json!({ "clientId": 42 }));
        assert!(auth.is_empty());
    }

    #[test]
    fn test_no_source_is_empty() {
        assert!(AuthContext::resolve(None).is_empty());
    }

    #[test]
    fn test_failing_source_is_empty() {
        let source = || -> Result<Option<Value>> { Err(Error::credentials("store offline")) };
        assert!(AuthContext::resolve(Some(&source)).is_empty());
    }

    #[test]
    fn test_closure_source() {
        let source = || -> Result<Option<Value>> { Ok(Some(json!({ "accessToken": "tok" }))) };
        let auth = AuthContext::resolve(Some(&source));
        assert_eq!(auth.access_token, "tok");
    }

    #[test]
    fn test_debug_masks_secrets() {
        let auth = AuthContext::new("tok-123", "client-7", "sec-456");
        let debug = format!("{auth:?}");
        assert!(!debug.contains("tok-123"));
        assert!(!debug.contains("sec-456"));
        assert!(debug.contains("client-7"));
    }
}
