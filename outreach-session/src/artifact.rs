//! Captured login sessions
//!
//! A [`SessionArtifact`] is the serialized form of a browser storage state:
//!
//! ```json
//! { "cookies": [ { "name": "SID", "value": "...", "domain": ".example.com",
//!                  "path": "/", "expires": 1767225600, "httpOnly": true,
//!                  "secure": true, "sameSite": "Lax" } ],
//!   "origins": [] }
//! ```
//!
//! Artifacts may also be produced from a cookie-editor export, which is a
//! plain array of cookies with slightly different field names.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn from_export(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("strict") => Self::Strict,
            Some("lax") => Self::Lax,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds, `-1` for a session cookie
    pub expires: i64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageState {
    pub cookies: Vec<StorageCookie>,
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
    /// The account the session belongs to, when the capturing side knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

fn root_path() -> String {
    "/".to_string()
}

/// One entry of a cookie-editor export
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: String,
    #[serde(default = "root_path")]
    path: String,
    #[serde(default)]
    http_only: bool,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    expiration_date: Option<f64>,
    #[serde(default)]
    session: bool,
    #[serde(default)]
    same_site: Option<String>,
}

impl From<ExportedCookie> for StorageCookie {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Expiry timestamps are whole seconds well inside i64"
    )]
    fn from(cookie: ExportedCookie) -> Self {
        let expires = match cookie.expiration_date {
            Some(at) if !cookie.session => at.trunc() as i64,
            _ => -1,
        };

        Self {
            name: cookie.name,
            value: cookie.value,
            domain: cookie.domain,
            path: cookie.path,
            expires,
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: SameSite::from_export(cookie.same_site.as_deref()),
        }
    }
}

/// Opaque, serializable representation of a restorable login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArtifact {
    contents: String,
}

impl SessionArtifact {
    /// Wrap artifact contents without inspecting them
    #[must_use]
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }

    /// Build an artifact from a storage state
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized
    pub fn from_state(state: &StorageState) -> Result<Self, SessionError> {
        serde_json::to_string_pretty(state)
            .map(Self::new)
            .map_err(|e| SessionError::InvalidArtifact(e.to_string()))
    }

    /// Accept either a storage-state object, which is kept as is, or a
    /// cookie-editor export array, which is converted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidArtifact`] if the input is not JSON, is
    /// neither shape, or carries no cookies.
    pub fn from_export(input: &str) -> Result<Self, SessionError> {
        let value: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| SessionError::InvalidArtifact(format!("Not valid JSON: {e}")))?;

        match value {
            serde_json::Value::Object(ref map) if map.contains_key("cookies") => {
                let artifact = Self::new(input);
                artifact.storage_state()?;
                Ok(artifact)
            }
            serde_json::Value::Array(_) => {
                let exported: Vec<ExportedCookie> = serde_json::from_value(value)
                    .map_err(|e| SessionError::InvalidArtifact(format!("Malformed cookie: {e}")))?;
                if exported.is_empty() {
                    return Err(SessionError::InvalidArtifact(
                        "The cookie export is empty".to_string(),
                    ));
                }

                Self::from_state(&StorageState {
                    cookies: exported.into_iter().map(StorageCookie::from).collect(),
                    origins: Vec::new(),
                    identity: None,
                })
            }
            _ => Err(SessionError::InvalidArtifact(
                "Expected a cookie export array or a storage-state object".to_string(),
            )),
        }
    }

    /// Parse the artifact as a storage state
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidArtifact`] if it is not one
    pub fn storage_state(&self) -> Result<StorageState, SessionError> {
        serde_json::from_str(&self.contents)
            .map_err(|e| SessionError::InvalidArtifact(format!("Not a storage state: {e}")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.contents
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.contents
    }
}
