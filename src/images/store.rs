use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Public path prefix under which the content directory is served.
pub const URL_PREFIX: &str = "/images/";

/// Durable image storage. Filenames are flat (no subdirectories); the store
/// owns the mapping between a filename and its backing file.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, filename: &str, bytes: Bytes) -> anyhow::Result<()>;
    async fn remove(&self, filename: &str) -> anyhow::Result<()>;
}

/// Generates a collision-resistant name for a processed image. Writes are
/// effectively serialized per request, so timestamp + random suffix is enough.
pub fn generate_filename() -> String {
    format!(
        "{}-{}.jpg",
        OffsetDateTime::now_utc().unix_timestamp(),
        Uuid::new_v4().simple()
    )
}

pub fn url_for(filename: &str) -> String {
    format!("{URL_PREFIX}{filename}")
}

/// Maps a stored image URL back to its filename. Returns `None` for URLs
/// outside the content prefix or with path separators smuggled in.
pub fn filename_from_url(url: &str) -> Option<&str> {
    let name = url.strip_prefix(URL_PREFIX)?;
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return None;
    }
    Some(name)
}

/// Deletes the file behind a stored image URL, swallowing any failure.
/// The book record is the source of truth; an orphaned file is logged,
/// never surfaced to the caller.
pub async fn remove_best_effort(store: &dyn ImageStore, image_url: &str) {
    match filename_from_url(image_url) {
        Some(name) => {
            if let Err(e) = store.remove(name).await {
                warn!(error = %e, filename = %name, "failed to remove superseded image");
            }
        }
        None => warn!(url = %image_url, "image url does not map to a content file"),
    }
}

/// Filesystem-backed store rooted at the configured content directory.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create content directory {}", self.root.display()))
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, filename: &str, bytes: Bytes) -> anyhow::Result<()> {
        let path = self.path_for(filename);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("write image {}", path.display()))
    }

    async fn remove(&self, filename: &str) -> anyhow::Result<()> {
        let path = self.path_for(filename);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("remove image {}", path.display()))
    }
}
