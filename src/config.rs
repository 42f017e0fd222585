use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base URL of the hosted REST endpoint. `SUPABASE_URL` wins over this.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_pages_per_site")]
    pub max_pages_per_site: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Local directory for downloaded CSVs and the page cache.
    #[serde(default = "default_data_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,
    #[serde(default = "default_weekly_hour")]
    pub weekly_hour: u32,
    #[serde(default = "default_monthly_hour")]
    pub monthly_hour: u32,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: usize,
    #[serde(default = "default_weekly_limit")]
    pub weekly_limit: usize,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rate_limit_secs: Option<f64>,
    pub database_url: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/uni-enrich/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(rate_limit) = overrides.rate_limit_secs {
            self.scrape.rate_limit_secs = rate_limit.max(0.0);
        }
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.data.dir)
    }

    pub fn default_template() -> String {
        let template = r#"[database]
# SUPABASE_URL and SUPABASE_KEY environment variables take precedence;
# the API key is never read from this file.
url = ""
table = "universities"

[scrape]
rate_limit_secs = 2.0
request_timeout_secs = 12
connect_timeout_secs = 6
user_agent = "Mozilla/5.0 (compatible; uni-enrich/0.1)"
max_pages_per_site = 10

[data]
dir = "~/.local/share/uni-enrich"

[schedule]
daily_hour = 2
weekly_hour = 3
monthly_hour = 4
daily_limit = 30
weekly_limit = 100
monthly_limit = 300
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scrape: ScrapeConfig::default(),
            data: DataConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            table: default_table(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            rate_limit_secs: default_rate_limit_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            max_pages_per_site: default_max_pages_per_site(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_hour: default_daily_hour(),
            weekly_hour: default_weekly_hour(),
            monthly_hour: default_monthly_hour(),
            daily_limit: default_daily_limit(),
            weekly_limit: default_weekly_limit(),
            monthly_limit: default_monthly_limit(),
        }
    }
}

fn default_table() -> String {
    "universities".to_string()
}

fn default_rate_limit_secs() -> f64 {
    2.0
}

fn default_request_timeout_secs() -> u64 {
    12
}

fn default_connect_timeout_secs() -> u64 {
    6
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; uni-enrich/0.1)".to_string()
}

fn default_max_pages_per_site() -> usize {
    10
}

fn default_data_dir() -> String {
    "~/.local/share/uni-enrich".to_string()
}

fn default_daily_hour() -> u32 {
    2
}

fn default_weekly_hour() -> u32 {
    3
}

fn default_monthly_hour() -> u32 {
    4
}

fn default_daily_limit() -> usize {
    30
}

fn default_weekly_limit() -> usize {
    100
}

fn default_monthly_limit() -> usize {
    300
}
