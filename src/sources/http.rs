use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::ScrapeConfig;

/// Outbound HTTP handle. Built once in `main` and passed down by
/// reference; nothing else constructs clients.
#[derive(Debug, Clone)]
pub struct ScrapeClient {
    client: Client,
    rate_limit_secs: f64,
}

impl ScrapeClient {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            rate_limit_secs: config.rate_limit_secs,
        })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed GET request: {url}"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body: {url}"))?;
        if !status.is_success() {
            let preview: String = body.chars().take(180).collect();
            return Err(anyhow!("GET {url} returned {status}: {preview}"));
        }
        Ok(body)
    }

    pub async fn fetch_json(&self, url: &str) -> Result<Value> {
        let body = self.fetch_text(url).await?;
        serde_json::from_str(&body).with_context(|| format!("invalid JSON response: {url}"))
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
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
        Ok(bytes.to_vec())
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn rate_limit_secs(&self) -> f64 {
        self.rate_limit_secs
    }

    /// Politeness delay between request groups: base rate limit with
    /// half a second of uniform jitter either way.
    pub async fn polite_sleep(&self) {
        let jitter: f64 = rand::thread_rng().gen_range(-0.5..0.5);
        let secs = (self.rate_limit_secs + jitter).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Shorter fixed pause for bulk API paging where the host publishes
    /// no scraping etiquette but hammering it is still rude.
    pub async fn brief_sleep(&self) {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
