use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::model::{FieldKey, UniversityRecord};

const DB_TIMEOUT_SECS: u64 = 15;

/// Handle to the hosted Postgres-compatible REST API. Built once in
/// `main`; credentials are validated here so a bad environment fails
/// before any batch work starts.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    base_url: String,
    key: String,
    table: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated(i64),
}

/// Null-count summary for one column, for coverage planning.
#[derive(Debug, Clone)]
pub struct FieldGap {
    pub field: FieldKey,
    pub missing: u64,
    pub total: u64,
}

impl FieldGap {
    pub fn have(&self) -> u64 {
        self.total.saturating_sub(self.missing)
    }

    pub fn coverage_pct(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.have() as f64 / self.total as f64) * 100.0
    }
}

impl Database {
    pub fn new(base_url: &str, key: &str, table: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DB_TIMEOUT_SECS))
            .build()
            .context("failed to build database HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            table: table.to_string(),
        })
    }

    /// `SUPABASE_URL` beats the config file; the API key is environment
    /// only and never lands in a file.
    pub fn from_env(config: &DatabaseConfig) -> Result<Self> {
        let base_url = env::var("SUPABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| {
                let configured = config.url.trim();
                (!configured.is_empty()).then(|| configured.to_string())
            })
            .ok_or_else(|| {
                anyhow!("SUPABASE_URL is not set and [database].url is empty; cannot reach the hosted table")
            })?;
        let key = env::var("SUPABASE_KEY")
            .map_err(|_| anyhow!("SUPABASE_KEY is not set; set it to the project API key"))?;
        Self::new(&base_url, &key, &config.table)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn table(&self, name: &str) -> QueryBuilder<'_> {
        QueryBuilder {
            db: self,
            table: name.to_string(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Builder against the configured universities table.
    pub fn query(&self) -> QueryBuilder<'_> {
        let table = self.table.clone();
        self.table(&table)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Insert-or-update keyed by (name, country): select the id for the
    /// pair, patch the row if it exists, insert otherwise.
    pub async fn upsert_university(&self, record: &UniversityRecord) -> Result<UpsertOutcome> {
        let mut lookup = self.query().select("id").eq("name", &record.name);
        lookup = match &record.country {
            Some(country) => lookup.eq("country", country),
            None => lookup.is_null("country"),
        };
        let rows = lookup.limit(1).execute().await?;

        let mut row = record.to_row();
        row.remove("id");
        let body = Value::Object(row);

        match rows.first().and_then(|row| row["id"].as_i64()) {
            Some(id) => {
                self.query().eq("id", &id.to_string()).update(&body).await?;
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                self.query().insert(&body).await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// The stored row for a (name, country) pair, if any.
    pub async fn fetch_by_identity(
        &self,
        name: &str,
        country: Option<&str>,
    ) -> Result<Option<UniversityRecord>> {
        let mut query = self.query().select("*").eq("name", name);
        query = match country {
            Some(country) => query.eq("country", country),
            None => query.is_null("country"),
        };
        let rows: Vec<UniversityRecord> = query.limit(1).execute_as().await?;
        Ok(rows.into_iter().next())
    }

    /// Rows where one column is still null, ranked records first.
    pub async fn fetch_missing(
        &self,
        field: FieldKey,
        country: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UniversityRecord>> {
        let mut query = self
            .query()
            .select("*")
            .is_null(field.as_slug())
            .order("global_rank.asc.nullslast")
            .limit(limit);
        if let Some(country) = country {
            query = query.eq("country", country);
        }
        query.execute_as().await
    }

    /// Oldest-scraped rows first, never-scraped before everything.
    pub async fn fetch_for_refresh(
        &self,
        country: Option<&str>,
        limit: usize,
    ) -> Result<Vec<UniversityRecord>> {
        let mut query = self
            .query()
            .select("*")
            .order("last_scraped_at.asc.nullsfirst")
            .limit(limit);
        if let Some(country) = country {
            query = query.eq("country", country);
        }
        query.execute_as().await
    }

    pub async fn count_rows(&self) -> Result<u64> {
        let (_, total) = self.query().select("id").limit(1).execute_counted().await?;
        total.ok_or_else(|| anyhow!("hosted table returned no row count"))
    }

    pub async fn count_missing(&self, field: FieldKey) -> Result<u64> {
        let (_, total) = self
            .query()
            .select("id")
            .is_null(field.as_slug())
            .limit(1)
            .execute_counted()
            .await?;
        total.ok_or_else(|| anyhow!("hosted table returned no row count"))
    }
}

/// PostgREST-style request builder: filters become query parameters,
/// writes go through POST/PATCH on the same URL.
pub struct QueryBuilder<'a> {
    db: &'a Database,
    table: String,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl<'a> QueryBuilder<'a> {
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push((column.to_string(), "is.null".to_string()));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.filters
            .push((column.to_string(), "not.is.null".to_string()));
        self
    }

    pub fn order(mut self, clause: &str) -> Self {
        self.order = Some(clause.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn url(&self) -> String {
        let mut params: Vec<String> = Vec::new();
        if let Some(select) = &self.select {
            params.push(format!("select={select}"));
        }
        for (column, op_value) in &self.filters {
            params.push(format!("{column}={}", urlencoding::encode(op_value)));
        }
        if let Some(order) = &self.order {
            params.push(format!("order={order}"));
        }
        if let Some(limit) = self.limit {
            params.push(format!("limit={limit}"));
        }
        let mut url = format!("{}/rest/v1/{}", self.db.base_url, self.table);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    pub async fn execute(self) -> Result<Vec<Value>> {
        let url = self.url();
        let response = self
            .db
            .client
            .get(&url)
            .headers(self.db.headers())
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
        serde_json::from_str(&body).with_context(|| format!("invalid JSON response: {url}"))
    }

    pub async fn execute_as<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let url = self.url();
        let rows = self.execute().await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).with_context(|| format!("unexpected row shape: {url}"))
            })
            .collect()
    }

    /// Like `execute`, but asks the API for an exact total and parses it
    /// out of the Content-Range header.
    pub async fn execute_counted(self) -> Result<(Vec<Value>, Option<u64>)> {
        let url = self.url();
        let response = self
            .db
            .client
            .get(&url)
            .headers(self.db.headers())
            .header("Prefer", "count=exact")
            .send()
            .await
            .with_context(|| format!("failed GET request: {url}"))?;
        let status = response.status();
        let total = response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range);
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body: {url}"))?;
        if !status.is_success() {
            let preview: String = body.chars().take(180).collect();
            return Err(anyhow!("GET {url} returned {status}: {preview}"));
        }
        let rows = serde_json::from_str(&body)
            .with_context(|| format!("invalid JSON response: {url}"))?;
        Ok((rows, total))
    }

    pub async fn insert(self, body: &Value) -> Result<()> {
        let url = self.url();
        debug!(url, "insert row");
        let response = self
            .db
            .client
            .post(&url)
            .headers(self.db.headers())
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed POST request: {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(180).collect();
            return Err(anyhow!("POST {url} returned {status}: {preview}"));
        }
        Ok(())
    }

    pub async fn update(self, body: &Value) -> Result<()> {
        let url = self.url();
        debug!(url, "update row");
        let response = self
            .db
            .client
            .patch(&url)
            .headers(self.db.headers())
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed PATCH request: {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(180).collect();
            return Err(anyhow!("PATCH {url} returned {status}: {preview}"));
        }
        Ok(())
    }
}

/// `Content-Range: 0-24/3573` or `*/3573`; the total sits after the slash.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::new("https://db.example.com/", "service-key", "universities").unwrap()
    }

    #[test]
    fn query_urls_follow_the_rest_filter_shape() {
        let db = test_db();
        let url = db
            .query()
            .select("*")
            .eq("name", "Test U")
            .is_null("website")
            .order("global_rank.asc.nullslast")
            .limit(25)
            .url();
        assert_eq!(
            url,
            "https://db.example.com/rest/v1/universities?select=*&name=eq.Test%20U&website=is.null&order=global_rank.asc.nullslast&limit=25"
        );
    }

    #[test]
    fn bare_query_has_no_parameter_separator() {
        let db = test_db();
        assert_eq!(
            db.table("audit").url(),
            "https://db.example.com/rest/v1/audit"
        );
    }

    #[test]
    fn not_null_filter_uses_the_negated_operator() {
        let db = test_db();
        let url = db.query().not_null("website").url();
        assert!(url.ends_with("website=not.is.null"));
    }

    #[test]
    fn content_range_totals_parse() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/12"), Some(12));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("nonsense"), None);
    }

    #[test]
    fn coverage_percentage_handles_empty_tables() {
        let gap = FieldGap {
            field: FieldKey::Website,
            missing: 25,
            total: 100,
        };
        assert!((gap.coverage_pct() - 75.0).abs() < 1e-9);
        let empty = FieldGap {
            field: FieldKey::Website,
            missing: 0,
            total: 0,
        };
        assert_eq!(empty.coverage_pct(), 0.0);
    }
}
