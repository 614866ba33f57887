//! Index over locally cached model folders.
//!
//! Every immediate subdirectory of the models root is one cached model. Folder
//! names are the filesystem-safe form of a model id: the owner separator `/`
//! becomes `_` (`Owner/name` <-> `Owner_name`). Only the first separator is
//! substituted in either direction, which keeps the mapping reversible for ids
//! whose owner part contains no `_`.

use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Logical model id -> folder name.
pub fn to_filesystem_safe(model_id: &str) -> String {
    model_id.replacen('/', "_", 1)
}

/// Folder name -> logical model id.
pub fn to_logical(folder_name: &str) -> String {
    folder_name.replacen('_', "/", 1)
}

/// One cached model folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCacheEntry {
    /// Logical model id
    pub name: String,
    /// Folder name on disk
    pub original_name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    pub size_formatted: String,
    pub file_count: u64,
    /// Unix time in milliseconds
    pub last_modified: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheListing {
    pub models: Vec<LocalCacheEntry>,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub models_directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LocalCacheIndex {
    root: PathBuf,
}

impl LocalCacheIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder a model id is cached under.
    pub fn path_for(&self, model_id: &str) -> PathBuf {
        self.root.join(to_filesystem_safe(model_id))
    }

    pub async fn contains(&self, model_id: &str) -> bool {
        tokio::fs::metadata(self.path_for(model_id))
            .await
            .is_ok_and(|meta| meta.is_dir())
    }

    /// Enumerate cached folders, most recently modified first.
    ///
    /// A missing root is created and reported as empty. Folders that cannot be
    /// read are skipped.
    pub fn list(&self) -> Result<CacheListing> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }

        let mut models = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let folder_name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            match Self::describe(&folder_name, &path) {
                Ok(described) => models.push(described),
                Err(err) => warn!("Error reading model folder {}: {}", folder_name, err),
            }
        }

        models.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        let total_size = models.iter().map(|m| m.size_bytes).sum();

        Ok(CacheListing {
            models,
            total_size,
            total_size_formatted: format_bytes(total_size),
            models_directory: self.root.clone(),
        })
    }

    /// Remove a cached model folder by its logical name.
    pub fn delete(&self, model_name: &str) -> Result<PathBuf> {
        let model_name = model_name.trim();
        let raw = Path::new(model_name);
        if raw.is_absolute() || raw.components().any(|c| c == Component::ParentDir) {
            return Err(Error::InvalidInput(format!(
                "Invalid model name: {model_name}"
            )));
        }
        let folder_name = to_filesystem_safe(model_name);
        validate_folder_name(&folder_name)?;

        let path = self.root.join(&folder_name);
        if !path.is_dir() {
            return Err(Error::LocalModelNotFound(model_name.to_string()));
        }

        fs::remove_dir_all(&path)?;
        info!("Removed cached model {} at {:?}", model_name, path);
        Ok(path)
    }

    fn describe(folder_name: &str, path: &Path) -> Result<LocalCacheEntry> {
        let (size_bytes, file_count) = dir_stats(path)?;
        let last_modified = fs::metadata(path)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(LocalCacheEntry {
            name: to_logical(folder_name),
            original_name: folder_name.to_string(),
            size_bytes,
            size_formatted: format_bytes(size_bytes),
            file_count,
            last_modified,
            path: path.to_path_buf(),
        })
    }
}

fn validate_folder_name(folder_name: &str) -> Result<()> {
    let mut components = Path::new(folder_name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if folder_name.is_empty() || !single_normal || folder_name.contains(['/', '\\']) {
        return Err(Error::InvalidInput(format!(
            "Invalid model name: {folder_name}"
        )));
    }
    Ok(())
}

/// Total size in bytes and number of files below `path`.
fn dir_stats(path: &Path) -> Result<(u64, u64)> {
    let mut size = 0;
    let mut files = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            let (sub_size, sub_files) = dir_stats(&entry.path())?;
            size += sub_size;
            files += sub_files;
        } else {
            size += metadata.len();
            files += 1;
        }
    }
    Ok((size, files))
}

/// Human readable size with base-1024 units, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exponent])
}
