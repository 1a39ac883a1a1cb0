//! Bearer credential persistence and local inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, token: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save(&self, token: &str) -> Result<()> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.token.lock().await.take();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    jwt_token: String,
}

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read credential file '{}'", self.path.display())
                })
            }
        };
        let stored: StoredCredential = serde_json::from_str(&raw).with_context(|| {
            format!("malformed credential file '{}'", self.path.display())
        })?;
        let token = stored.jwt_token.trim().to_string();
        Ok((!token.is_empty()).then_some(token))
    }

    async fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!(
                    "failed to create credential directory '{}'",
                    parent.display()
                )
            })?;
        }
        let body = serde_json::to_string(&StoredCredential {
            jwt_token: token.to_string(),
        })?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed to write credential file '{}'", self.path.display()))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("failed to remove credential file '{}'", self.path.display())
            }),
        }
    }
}

/// Claims read from a JWT payload without verifying the signature. Only for
/// display; the backend decides whether a token is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialClaims {
    pub subject: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iat: Option<i64>,
    exp: Option<i64>,
}

pub fn peek_claims(token: &str) -> Option<CredentialClaims> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('=').as_bytes())
        .ok()?;
    let raw: RawClaims = serde_json::from_slice(&decoded).ok()?;
    Some(CredentialClaims {
        subject: raw.sub,
        issued_at: raw.iat.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        expires_at: raw.exp.and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

/// Redacted form of a token for logs: first and last ten characters.
pub fn token_snippet(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 24 {
        return "***".to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
#[path = "tests/credential_tests.rs"]
mod tests;
