use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::sources::http::ScrapeClient;

const DATASET_API: &str = "https://www.kaggle.com/api/v1/datasets/download";

/// A single file inside a hosted dataset.
#[derive(Debug, Clone, Copy)]
pub struct DatasetRef {
    pub owner: &'static str,
    pub slug: &'static str,
    pub file: &'static str,
}

pub const QS_DATASET: DatasetRef = DatasetRef {
    owner: "melissamonfared",
    slug: "qs-world-university-rankings-2025",
    file: "qs-world-rankings-2025.csv",
};

pub const THE_DATASET: DatasetRef = DatasetRef {
    owner: "raymondtoo",
    slug: "the-world-university-rankings-2025",
    file: "the-world-rankings-2025.csv",
};

/// Authenticated downloader for hosted dataset files. Credentials are
/// required up front so a batch run fails before any work starts, not
/// halfway through.
#[derive(Debug, Clone)]
pub struct DatasetClient {
    username: String,
    key: String,
    cache_dir: PathBuf,
}

impl DatasetClient {
    pub fn from_env(cache_dir: &Path) -> Result<Self> {
        let username = env::var("KAGGLE_USERNAME").map_err(|_| {
            anyhow!("KAGGLE_USERNAME is not set; dataset downloads need Kaggle API credentials")
        })?;
        let key = env::var("KAGGLE_KEY").map_err(|_| {
            anyhow!("KAGGLE_KEY is not set; dataset downloads need Kaggle API credentials")
        })?;
        Ok(Self {
            username,
            key,
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    pub fn cache_path(&self, dataset: &DatasetRef) -> PathBuf {
        self.cache_dir.join(dataset.file)
    }

    /// Downloads the file into the cache directory, or reuses the cached
    /// copy unless `force` is set.
    pub async fn download(
        &self,
        client: &ScrapeClient,
        dataset: &DatasetRef,
        force: bool,
    ) -> Result<PathBuf> {
        let path = self.cache_path(dataset);
        if path.exists() && !force {
            info!(file = dataset.file, "using cached dataset file");
            return Ok(path);
        }
        fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("failed creating data directory: {}", self.cache_dir.display())
        })?;

        let url = format!(
            "{DATASET_API}/{}/{}/{}",
            dataset.owner,
            dataset.slug,
            urlencoding::encode(dataset.file)
        );
        info!(file = dataset.file, "downloading dataset file");
        let response = client
            .inner()
            .get(&url)
            .basic_auth(&self.username, Some(&self.key))
            .send()
            .await
            .with_context(|| format!("failed GET request: {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(180).collect();
            return Err(anyhow!("GET {url} returned {status}: {preview}"));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed reading response body: {url}"))?;
        fs::write(&path, &bytes)
            .with_context(|| format!("failed writing dataset file: {}", path.display()))?;
        Ok(path)
    }
}

/// Reads a downloaded CSV tolerantly: ranking exports occasionally carry
/// stray non-UTF-8 bytes that would otherwise poison the whole import.
pub fn read_csv_lossy(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed reading CSV: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_checked_before_any_download() {
        env::remove_var("KAGGLE_USERNAME");
        env::remove_var("KAGGLE_KEY");
        let err = DatasetClient::from_env(Path::new("/tmp/uni-enrich-test"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("KAGGLE_USERNAME"));

        env::set_var("KAGGLE_USERNAME", "someone");
        let err = DatasetClient::from_env(Path::new("/tmp/uni-enrich-test"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("KAGGLE_KEY"));

        env::set_var("KAGGLE_KEY", "secret");
        let client = DatasetClient::from_env(Path::new("/tmp/uni-enrich-test")).unwrap();
        assert_eq!(
            client.cache_path(&QS_DATASET),
            PathBuf::from("/tmp/uni-enrich-test/qs-world-rankings-2025.csv")
        );
        env::remove_var("KAGGLE_USERNAME");
        env::remove_var("KAGGLE_KEY");
    }

    #[test]
    fn lossy_read_survives_bad_bytes() {
        let dir = std::env::temp_dir().join("uni-enrich-lossy-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mixed.csv");
        fs::write(&path, b"name,location\nCaf\xe9 U,France\n").unwrap();
        let text = read_csv_lossy(&path).unwrap();
        assert!(text.contains("U,France"));
        fs::remove_file(&path).ok();
    }
}
