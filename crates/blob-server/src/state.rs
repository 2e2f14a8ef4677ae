use std::sync::Arc;

use blob_manifest::Manifest;
use blob_types::PathValidator;

use crate::auth::{ClientStore, OpenClientStore};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub manifest: Arc<Manifest>,
    pub validator: Arc<PathValidator>,
    pub clients: Arc<dyn ClientStore>,
}

impl AppState {
    /// State admitting every client.
    pub fn new(manifest: Manifest, validator: PathValidator) -> Self {
        Self {
            manifest: Arc::new(manifest),
            validator: Arc::new(validator),
            clients: Arc::new(OpenClientStore),
        }
    }

    /// Replace the client store.
    pub fn with_clients(mut self, clients: Arc<dyn ClientStore>) -> Self {
        self.clients = clients;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("manifest", &self.manifest)
            .field("root", &self.validator.root())
            .finish()
    }
}
