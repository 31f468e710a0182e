use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// On-disk cache of fetched documents and media, keyed by URI.
///
/// Each URI maps to `<root>/<host>/<sha256(uri)>[.<ext>]`. Writes go through a
/// temp file and a rename, so readers never observe a partial entry.
#[derive(Debug, Clone)]
pub struct DocumentCache {
    root: PathBuf,
}

impl DocumentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, uri: &Url) -> PathBuf {
        let host = uri.host_str().map(sanitize).unwrap_or_else(|| "local".to_string());
        let hash = Sha256::digest(uri.as_str().as_bytes());
        let mut name = format!("{:x}", hash);
        if let Some(ext) = extension_of(uri) {
            name.push('.');
            name.push_str(&ext);
        }
        self.root.join(host).join(name)
    }

    pub async fn contains(&self, uri: &Url) -> bool {
        tokio::fs::try_exists(self.path_for(uri))
            .await
            .unwrap_or(false)
    }

    /// Returns the cached bytes, or `None` when the URI has not been cached.
    pub async fn load(&self, uri: &Url) -> std::io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(uri)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Atomically stores `bytes` for `uri` using write-to-temp-then-rename.
    pub async fn store(&self, uri: &Url, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.path_for(uri);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // SEC-009: Randomized temp name so a concurrent writer or a planted
        // symlink can't collide with ours.
        use std::time::{SystemTime, UNIX_EPOCH};
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

        let result = write_new(&temp_path, bytes).await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        // On Windows, rename fails if destination exists
        #[cfg(windows)]
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path).await?;
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        tracing::trace!(uri = %uri, path = %path.display(), bytes = bytes.len(), "Cached document");
        Ok(())
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // Fails atomically if file exists (prevents symlink race)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension_of(uri: &Url) -> Option<String> {
    let segment = uri.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}
