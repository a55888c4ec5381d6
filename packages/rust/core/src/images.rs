//! Image download stage.
//!
//! Reads the aggregated image URL list written by the clean stage and
//! downloads every image into the local images directory, at the same
//! relative path the transformed documents point to.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use coursebook_runner::{ProgressReporter, TaskRunner};
use coursebook_shared::{CoursebookError, OutputPaths, Result};

/// User-Agent string for image requests.
const USER_AGENT: &str = concat!("coursebook/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ImageFetcher
// ---------------------------------------------------------------------------

/// Downloads single images into the images directory.
pub struct ImageFetcher {
    client: Client,
    images_dir: PathBuf,
}

impl ImageFetcher {
    pub fn new(images_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoursebookError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            images_dir: images_dir.into(),
        })
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Where `url` is stored on disk.
    pub fn local_path(&self, url: &Url) -> PathBuf {
        self.images_dir.join(relative_image_path(url))
    }

    /// Fetch `url` and write it to its local path. Non-2xx is an error.
    pub async fn download(&self, url: &str) -> Result<PathBuf> {
        let parsed = Url::parse(url)
            .map_err(|e| CoursebookError::validation(format!("invalid image URL {url:?}: {e}")))?;
        let relative = relative_image_path(&parsed);
        if relative.is_empty() {
            return Err(CoursebookError::validation(format!(
                "image URL {url} has no path"
            )));
        }
        let output = self.images_dir.join(&relative);

        debug!(%url, "fetching image");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CoursebookError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoursebookError::Network(format!(
                "{url}: HTTP {}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoursebookError::Network(format!("{url}: failed to read body: {e}")))?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoursebookError::io(parent, e))?;
        }
        tokio::fs::write(&output, &bytes)
            .await
            .map_err(|e| CoursebookError::io(&output, e))?;

        debug!(%url, path = %output.display(), bytes = bytes.len(), "image saved");
        Ok(output)
    }
}

/// Path of an image below the images directory: the URL path without its
/// leading slash.
pub fn relative_image_path(url: &Url) -> String {
    url.path().trim_start_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Summary of an image download run.
#[derive(Debug, Clone)]
pub struct ImagesResult {
    pub downloaded: usize,
    /// (url, error message) for every image that could not be fetched.
    pub failed: Vec<(String, String)>,
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Read the image URL list written by the clean stage.
pub async fn load_image_list(path: &Path) -> Result<Vec<String>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoursebookError::io(path, e))?;
    serde_json::from_str(&json).map_err(|e| {
        CoursebookError::validation(format!("{} is not a JSON list of URLs: {e}", path.display()))
    })
}

/// Download every image in `imgs.json` through `runner`.
#[instrument(skip_all, fields(images_dir = %paths.imgs.display()))]
pub async fn download_images(
    paths: &OutputPaths,
    runner: &TaskRunner,
    progress: &dyn ProgressReporter,
) -> Result<ImagesResult> {
    let start = Instant::now();
    let urls = load_image_list(&paths.imgs_json).await?;

    tokio::fs::create_dir_all(&paths.imgs)
        .await
        .map_err(|e| CoursebookError::io(&paths.imgs, e))?;

    info!(count = urls.len(), "downloading images");
    let fetcher = Arc::new(ImageFetcher::new(&paths.imgs)?);

    let batch = runner
        .run(
            urls,
            move |url: String| {
                let fetcher = Arc::clone(&fetcher);
                async move { fetcher.download(&url).await }
            },
            progress,
        )
        .await;

    let failed: Vec<(String, String)> = batch
        .errors
        .into_iter()
        .map(|e| (e.item, e.error.to_string()))
        .collect();
    for (url, error) in &failed {
        warn!(%url, %error, "image download failed");
    }

    let result = ImagesResult {
        downloaded: batch.results.len(),
        failed,
        skipped: batch.skipped,
        elapsed: start.elapsed(),
    };
    info!(
        downloaded = result.downloaded,
        failed = result.failed.len(),
        duration_ms = result.elapsed.as_millis() as u64,
        "image download completed"
    );
    Ok(result)
}
