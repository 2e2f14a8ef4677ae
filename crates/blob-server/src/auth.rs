use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use blob_types::BlobPath;

use crate::error::ServerResult;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
}

impl Identity {
    pub fn anonymous() -> Self { Self { name: "anonymous".into() } }
    pub fn client(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Credentials carried by an `Authorization: Bearer` header, if any.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self::Bearer(token.to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

#[derive(Clone, Debug)]
pub enum Action {
    Read { path: BlobPath },
    Write { path: BlobPath },
    Delete { path: BlobPath },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path } => write!(f, "read:{path}"),
            Self::Write { path } => write!(f, "write:{path}"),
            Self::Delete { path } => write!(f, "delete:{path}"),
        }
    }
}

/// Client and identity store consulted before every blob operation.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

/// Admits every request. Tokens are recorded in the identity name only.
pub struct OpenClientStore;

#[async_trait]
impl ClientStore for OpenClientStore {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let prefix: String = token.chars().take(8).collect();
                Ok(Identity::client(format!("bearer:{prefix}")))
            }
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}
