//! MediaStore - Uploaded Media Storage
//!
//! ## Responsibilities
//!
//! - Persist uploaded files under a flat directory
//! - Hand back both the local path (for agent processing) and the public
//!   URL (for frontend display)
//!
//! Filenames keep their original name minus any path components. A name
//! that already exists gets a numeric suffix instead of overwriting:
//! media referenced by chat messages must stay immutable once stored.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// URL path under which the upload directory is served
pub const PUBLIC_MOUNT: &str = "/uploaded_media";

/// How many suffixed names to try before giving up
const MAX_RENAME_ATTEMPTS: u32 = 1000;

/// A stored upload
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub file_path: PathBuf,
    pub file_url: String,
}

/// Upload storage rooted at one directory
pub struct MediaStore {
    upload_dir: PathBuf,
    public_base_url: String,
}

impl MediaStore {
    pub fn new(upload_dir: PathBuf, public_base_url: String) -> Self {
        Self {
            upload_dir,
            public_base_url,
        }
    }

    /// Store one upload and return its path and public URL
    pub async fn save(&self, file_name: &str, data: &[u8]) -> Result<StoredMedia> {
        let name = sanitize_name(file_name)
            .ok_or_else(|| Error::Validation(format!("invalid file name: {:?}", file_name)))?;

        fs::create_dir_all(&self.upload_dir).await?;
        let (path, final_name) = self.unique_path(&name).await?;
        fs::write(&path, data).await?;

        tracing::info!(
            file = %path.display(),
            size = data.len(),
            "Stored uploaded media"
        );

        let file_url = format!(
            "{}{}/{}",
            self.public_base_url.trim_end_matches('/'),
            PUBLIC_MOUNT,
            final_name
        );
        Ok(StoredMedia {
            file_path: path,
            file_url,
        })
    }

    /// First non-colliding path for the given name
    async fn unique_path(&self, name: &str) -> Result<(PathBuf, String)> {
        let direct = self.upload_dir.join(name);
        if !fs::try_exists(&direct).await? {
            return Ok((direct, name.to_string()));
        }

        let (stem, ext) = split_name(name);
        for n in 1..=MAX_RENAME_ATTEMPTS {
            let candidate_name = match ext {
                Some(ext) => format!("{}_{}.{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            };
            let candidate = self.upload_dir.join(&candidate_name);
            if !fs::try_exists(&candidate).await? {
                return Ok((candidate, candidate_name));
            }
        }

        Err(Error::Internal(format!(
            "no free name for upload {:?} after {} attempts",
            name, MAX_RENAME_ATTEMPTS
        )))
    }
}

/// Reduce an uploaded filename to its final component
///
/// Returns `None` for names with no usable component (empty, all dots).
fn sanitize_name(file_name: &str) -> Option<String> {
    let name = Path::new(file_name).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
