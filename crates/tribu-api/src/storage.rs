use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use tribu_types::forms::CleanAvatar;
use tribu_types::models::DEFAULT_AVATAR;

const AVATAR_DIR: &str = "avatars";

/// 1x1 transparent PNG served until a user uploads an avatar.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Uploaded media on local disk.
///
/// Files live under `{root}/avatars/{uuid}.{ext}` and are referenced from the
/// database by their root-relative path, which is also their `/media/` URL suffix.
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(root.join(AVATAR_DIR)).await?;

        let storage = Self { root };
        if !storage.exists(DEFAULT_AVATAR).await {
            fs::write(storage.path_of(DEFAULT_AVATAR)?, PLACEHOLDER_PNG).await?;
            info!("Wrote placeholder avatar {}", DEFAULT_AVATAR);
        }

        info!("Media directory: {}", storage.root.display());
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a root-relative media path. Rejects anything that
    /// could escape the media root.
    pub fn path_of(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("Refusing media path outside root: {}", relative);
        }
        Ok(self.root.join(rel))
    }

    /// Writes a new avatar and returns its root-relative path.
    pub async fn save_avatar(&self, avatar: &CleanAvatar) -> Result<String> {
        let relative = format!("{}/{}.{}", AVATAR_DIR, Uuid::new_v4(), avatar.kind.extension());
        let path = self.path_of(&relative)?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&avatar.data).await?;
        file.flush().await?;
        file.sync_all().await?;

        info!("Stored avatar {} ({} bytes)", relative, avatar.data.len());
        Ok(relative)
    }

    /// Deletes a stored file. The shared placeholder is never deleted.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        if relative == DEFAULT_AVATAR {
            return Ok(());
        }
        let path = self.path_of(relative)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted media file {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media file {} already gone", relative);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, relative: &str) -> bool {
        match self.path_of(relative) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }
}
