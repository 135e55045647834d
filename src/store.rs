use std::{fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::credential::{OriginalCredential, UniqueCredential};

/// Storage interface for the credentials held by the wallet.
#[async_trait]
pub trait CredentialStore: Debug + Send + Sync {
    /// Return every stored credential, in storage order.
    async fn fetch_all(&self) -> Result<Vec<UniqueCredential>>;

    /// Return the credential with the given hash.
    async fn fetch_by_hash(&self, hash: &str) -> Result<UniqueCredential>;

    /// Store a credential, returning its hash.
    async fn save(&self, credential: OriginalCredential) -> Result<String>;

    /// Remove a credential. Returns false if no credential had that hash.
    async fn delete(&self, hash: &str) -> Result<bool>;
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// This in-memory store should only be used for test purposes, nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    store: Arc<Mutex<Vec<UniqueCredential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn fetch_all(&self) -> Result<Vec<UniqueCredential>> {
        Ok(self.store.lock().await.clone())
    }

    async fn fetch_by_hash(&self, hash: &str) -> Result<UniqueCredential> {
        if let Some(credential) = self
            .store
            .lock()
            .await
            .iter()
            .find(|credential| credential.hash() == hash)
        {
            return Ok(credential.clone());
        }

        bail!("credential not found: {hash}")
    }

    async fn save(&self, credential: OriginalCredential) -> Result<String> {
        let credential = UniqueCredential::new(credential);
        let hash = credential.hash().to_owned();

        let mut store = self.store.lock().await;
        // Identical content has an identical hash, keep the first copy.
        if !store.iter().any(|stored| stored.hash() == hash) {
            store.push(credential);
        }

        debug!(%hash, "stored credential");
        Ok(hash)
    }

    async fn delete(&self, hash: &str) -> Result<bool> {
        let mut store = self.store.lock().await;
        let before = store.len();
        store.retain(|credential| credential.hash() != hash);
        Ok(store.len() != before)
    }
}
