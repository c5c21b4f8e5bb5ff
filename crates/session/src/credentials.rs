//! Credential persistence contract and the file-backed default store.

use std::path::{Path, PathBuf};

use {async_trait::async_trait, tokio::io::AsyncWriteExt, tracing::debug};

use crate::{
    error::{Error, Result},
    transport::CredentialBundle,
};

/// Persistence contract for the session credential bundle.
///
/// Saves are a critical section: they must complete, in the order received,
/// before the caller processes any further transport event.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<CredentialBundle>>;
    async fn save(&self, bundle: &CredentialBundle) -> Result<()>;
}

/// Stores the bundle as one JSON file under the auth directory, written via
/// temp file + fsync + rename so a crash never leaves a torn bundle.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(auth_dir: &Path) -> Self {
        Self {
            path: auth_dir.join("credentials.json"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<CredentialBundle>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::persistence("reading credential bundle", e)),
        };
        let bundle = serde_json::from_slice(&raw)
            .map_err(|e| Error::persistence("parsing credential bundle", e))?;
        debug!(path = %self.path.display(), "loaded credential bundle");
        Ok(Some(bundle))
    }

    async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::persistence("creating auth directory", e))?;
        }

        let data = serde_json::to_vec_pretty(bundle)
            .map_err(|e| Error::persistence("serializing credential bundle", e))?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| Error::persistence("creating temp credential file", e))?;
        file.write_all(&data)
            .await
            .map_err(|e| Error::persistence("writing credential bundle", e))?;
        file.sync_all()
            .await
            .map_err(|e| Error::persistence("syncing credential bundle", e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::persistence("replacing credential bundle", e))?;

        debug!(path = %self.path.display(), "persisted credential bundle");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(tag: &str) -> CredentialBundle {
        CredentialBundle(serde_json::json!({ "noise_key": tag, "registered": true }))
    }

    #[tokio::test]
    async fn load_returns_none_before_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save(&bundle("abc")).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, bundle("abc"));
    }

    #[tokio::test]
    async fn later_save_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        store.save(&bundle("first")).await.unwrap();
        store.save(&bundle("second")).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, bundle("second"));
    }

    #[tokio::test]
    async fn creates_missing_auth_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("auth");
        let store = FileCredentialStore::new(&nested);

        store.save(&bundle("x")).await.unwrap();
        assert!(store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_bundle_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        tokio::fs::write(store.path(), b"{not json").await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }
}
