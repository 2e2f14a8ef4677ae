use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Listen port for the blob service.
pub const ENV_PORT: &str = "PORT";
/// Listen port for the admin service; the admin service is off when unset.
pub const ENV_ADMIN_PORT: &str = "BLOB_ADMIN_SERVICE_PORT";
/// Interface both services bind to.
pub const ENV_BIND_HOST: &str = "BLOB_BIND_HOST";
/// Directory holding blobs, temp files and the manifest journal.
pub const ENV_STORAGE_ROOT: &str = "BLOB_STORAGE_ROOT";
/// `true`/`false`: fsync blobs and journal records before acknowledging.
pub const ENV_SYNC_WRITES: &str = "BLOB_SYNC_WRITES";

const JOURNAL_FILE: &str = "manifest.journal";

/// Process configuration, built once at startup and passed down explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub admin_addr: Option<SocketAddr>,
    pub storage_root: PathBuf,
    pub sync_writes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000),
            admin_addr: None,
            storage_root: PathBuf::from("data"),
            sync_writes: true,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Override fields from an environment lookup.
    ///
    /// Unset variables leave the field alone; set but unparsable ones are an
    /// error.
    pub fn with_env<F>(mut self, lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BIND_HOST) {
            let ip: IpAddr = host
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid ${ENV_BIND_HOST}: {host:?}")))?;
            self.bind_addr.set_ip(ip);
            if let Some(admin) = self.admin_addr.as_mut() {
                admin.set_ip(ip);
            }
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.bind_addr.set_port(parse_port(ENV_PORT, &port)?);
        }
        if let Some(port) = lookup(ENV_ADMIN_PORT) {
            let port = parse_port(ENV_ADMIN_PORT, &port)?;
            self.admin_addr = Some(SocketAddr::new(self.bind_addr.ip(), port));
        }
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            if root.trim().is_empty() {
                return Err(ServerError::Config(format!("${ENV_STORAGE_ROOT} is empty")));
            }
            self.storage_root = PathBuf::from(root);
        }
        if let Some(sync) = lookup(ENV_SYNC_WRITES) {
            self.sync_writes = sync
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid ${ENV_SYNC_WRITES}: {sync:?}")))?;
        }
        Ok(self)
    }

    /// Location of the manifest journal under the storage root.
    pub fn journal_path(&self) -> PathBuf {
        self.storage_root.join(JOURNAL_FILE)
    }
}

fn parse_port(key: &str, value: &str) -> ServerResult<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::Config(format!("invalid ${key}: {value:?}")))
}
