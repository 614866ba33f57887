//! Model file fetching from the Hugging Face Hub.

use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{LoadEvent, ProgressCallback};
use crate::cache::to_filesystem_safe;
use crate::error::{Error, Result};

/// Downloads repository files into `models_dir/<filesystem-safe id>/`.
#[derive(Clone)]
pub struct ModelFetcher {
    client: Client,
    models_dir: PathBuf,
    hub_url: String,
}

impl ModelFetcher {
    pub fn new(models_dir: PathBuf, hub_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("imgprompt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            models_dir,
            hub_url: hub_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.models_dir.join(to_filesystem_safe(model_id))
    }

    fn file_url(&self, model_id: &str, filename: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.hub_url, model_id, filename)
    }

    /// Make sure every file in `files` is present locally, downloading the
    /// missing ones. Returns the model folder.
    pub async fn fetch(
        &self,
        model_id: &str,
        files: &[&str],
        on_progress: &ProgressCallback,
    ) -> Result<PathBuf> {
        let local_dir = self.model_path(model_id);
        tokio::fs::create_dir_all(&local_dir).await?;

        for file in files {
            let dest = local_dir.join(file);
            if dest.exists() {
                debug!("File already exists: {:?}", dest);
                continue;
            }
            self.download_file(model_id, file, &dest, on_progress).await?;
        }

        Ok(local_dir)
    }

    async fn download_file(
        &self,
        model_id: &str,
        filename: &str,
        dest: &Path,
        on_progress: &ProgressCallback,
    ) -> Result<()> {
        let url = self.file_url(model_id, filename);
        info!("Downloading {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let total = response.content_length();
        let mut partial = dest.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut loaded: u64 = 0;
        let mut last_percent = None;

        on_progress(LoadEvent::downloading(filename, 0, total));

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download(format!("Failed to read response: {}", e)))?;
            file.write_all(&chunk).await?;
            loaded += chunk.len() as u64;

            let event = LoadEvent::downloading(filename, loaded, total);
            let percent = event.percent();
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                on_progress(event);
            }
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, dest).await?;

        debug!("Downloaded {} bytes to {:?}", loaded, dest);
        Ok(())
    }
}
