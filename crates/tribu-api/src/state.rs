use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use tribu_db::Database;

use crate::error::ApiError;
use crate::storage::MediaStorage;

pub type AppState = Arc<AppStateInner>;

/// Runtime settings the handlers need; assembled by the binary from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HMAC key for session tokens.
    pub secret_key: String,
    pub session_days: i64,
    pub media_dir: PathBuf,
    pub max_avatar_bytes: usize,
}

pub struct AppStateInner {
    pub db: Database,
    pub settings: Settings,
    pub media: MediaStorage,
}

impl AppStateInner {
    pub async fn new(db: Database, settings: Settings) -> anyhow::Result<AppState> {
        let media = MediaStorage::new(settings.media_dir.clone()).await?;
        Ok(Arc::new(Self { db, settings, media }))
    }

    /// Runs a blocking database call off the async runtime.
    pub async fn query<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
            })?;
        Ok(result?)
    }
}
