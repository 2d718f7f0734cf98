//! Command-line and environment configuration

use clap::Args;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;
use crate::kobo::RetryPolicy;
use crate::labels::LabelTable;

const ASSETS_PATH: &str = "/api/v2/assets/";

/// Where to fetch submissions from
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Kobo server origin (https://kf.kobotoolbox.org) or a full .../api/v2/assets/<uid>/data/ URL
    #[arg(long, env = "KOBO_API_URL")]
    pub api_url: Option<String>,

    /// Asset UID of the form (not needed when --api-url is a full data URL)
    #[arg(long, env = "KOBO_ASSET_ID")]
    pub asset_id: Option<String>,

    /// API token
    #[arg(long, env = "KOBO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Submissions per page
    #[arg(long, default_value_t = 300)]
    pub page_size: u32,

    /// Pause between page requests, in milliseconds
    #[arg(long, default_value_t = 150)]
    pub page_delay_ms: u64,

    /// Extra attempts per page on network or server errors
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

/// Validated fetch settings
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub entry_url: Url,
    pub token: String,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_http_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw)
        .map_err(|e| PipelineError::Config(format!("invalid API URL '{}': {}", raw, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PipelineError::Config(format!(
            "API URL '{}' must use http or https",
            raw
        )));
    }
    Ok(url)
}

/// Asset UID from a `.../api/v2/assets/<uid>[/data][/]` path
fn asset_from_path(path: &str) -> Option<&str> {
    let start = path.find(ASSETS_PATH)? + ASSETS_PATH.len();
    path[start..].split('/').next().filter(|uid| !uid.is_empty())
}

/// The asset data endpoint with `format=json` and the page size set, other query
/// parameters kept.
pub fn data_endpoint(
    api_url: &str,
    asset_id: Option<&str>,
    page_size: u32,
) -> Result<Url, PipelineError> {
    let mut url = parse_http_url(api_url)?;

    let path = match asset_from_path(url.path()) {
        Some(uid) => {
            let prefix = &url.path()[..url.path().find(ASSETS_PATH).unwrap_or(0)];
            format!("{}{}{}/data/", prefix, ASSETS_PATH, uid)
        }
        None => {
            let asset = asset_id.ok_or_else(|| {
                PipelineError::Config(
                    "missing asset id (--asset-id or KOBO_ASSET_ID) and the API URL does not name one"
                        .into(),
                )
            })?;
            format!(
                "{}{}{}/data/",
                url.path().trim_end_matches('/'),
                ASSETS_PATH,
                asset
            )
        }
    };
    url.set_path(&path);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "format" && k != "page_size")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("format", "json")
        .append_pair("page_size", &page_size.to_string());

    Ok(url)
}

impl SourceArgs {
    /// Check every required input before anything touches the network.
    pub fn resolve(&self) -> Result<SourceConfig, PipelineError> {
        let api_url = non_blank(&self.api_url).ok_or_else(|| {
            PipelineError::Config("missing API URL (--api-url or KOBO_API_URL)".into())
        })?;
        let token = non_blank(&self.token).ok_or_else(|| {
            PipelineError::Config("missing API token (--token or KOBO_TOKEN)".into())
        })?;
        if self.page_size == 0 {
            return Err(PipelineError::Config("page size must be at least 1".into()));
        }

        let entry_url = data_endpoint(api_url, non_blank(&self.asset_id), self.page_size)?;

        Ok(SourceConfig {
            entry_url,
            token: token.to_string(),
            page_delay: Duration::from_millis(self.page_delay_ms),
            retry: RetryPolicy {
                max_attempts: self.retries.saturating_add(1),
                ..RetryPolicy::default()
            },
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// Where results go and which labels to apply
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Directory for the generated JSON files
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// JSON file of { domain: { code: label } } merged over the built-in labels
    #[arg(long, env = "KOBO_LABELS")]
    pub labels: Option<PathBuf>,
}

impl OutputArgs {
    pub fn label_table(&self) -> Result<LabelTable, PipelineError> {
        load_labels(self.labels.as_deref())
    }
}

pub fn load_labels(path: Option<&Path>) -> Result<LabelTable, PipelineError> {
    match path {
        Some(path) => LabelTable::builtin().with_overrides_file(path),
        None => Ok(LabelTable::builtin()),
    }
}
