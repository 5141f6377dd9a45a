use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::scrapers::osu_api::{OsuApiConfig, OSU_API_BASE};
use crate::scrapers::CallBudgetConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_base: String,
    pub client_id: Option<u64>,
    pub client_secret: Option<String>,
    pub country: String,
    pub mode: String,
    pub snapshot_path: PathBuf,
    pub poll_interval: Duration,
    pub pages: u32,
    pub page_size: u32,
    pub results_cap: u32,
    pub call_budget: u32,
    pub call_budget_window: Duration,
    pub cycle_workers: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base: OSU_API_BASE.to_string(),
            client_id: None,
            client_secret: None,
            country: "UA".to_string(),
            mode: "osu".to_string(),
            snapshot_path: PathBuf::from("track.json"),
            poll_interval: Duration::from_secs(600),
            pages: 4,
            page_size: 50,
            results_cap: 50,
            call_budget: 250,
            call_budget_window: Duration::from_secs(60),
            cycle_workers: 2,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {:?}", name, raw)),
        _ => Ok(default),
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let client_id = string_var("OSU_API_CLIENT_ID")
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .context("Invalid OSU_API_CLIENT_ID")?;

        let config = Self {
            api_base: string_var("OSU_API_BASE").unwrap_or(defaults.api_base),
            client_id,
            client_secret: string_var("OSU_API_CLIENT_SECRET"),
            country: string_var("TRACK_COUNTRY").unwrap_or(defaults.country),
            mode: string_var("TRACK_MODE").unwrap_or(defaults.mode),
            snapshot_path: string_var("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            poll_interval: Duration::from_secs(parse_var(
                "POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            pages: parse_var("RANKING_PAGES", defaults.pages)?,
            page_size: parse_var("RANKING_PAGE_SIZE", defaults.page_size)?,
            results_cap: parse_var("RESULTS_CAP", defaults.results_cap)?,
            call_budget: parse_var("CALL_BUDGET", defaults.call_budget)?,
            call_budget_window: Duration::from_secs(parse_var(
                "CALL_BUDGET_WINDOW_SECS",
                defaults.call_budget_window.as_secs(),
            )?),
            cycle_workers: parse_var("CYCLE_WORKERS", defaults.cycle_workers)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages == 0 || self.page_size == 0 {
            bail!(
                "Window must be non-empty (pages={}, page_size={})",
                self.pages,
                self.page_size
            );
        }
        if self.results_cap == 0 {
            bail!("RESULTS_CAP must be positive");
        }
        if self.call_budget == 0 || self.call_budget_window.is_zero() {
            bail!("Call budget and its window must be positive");
        }
        if self.poll_interval.is_zero() {
            bail!("POLL_INTERVAL_SECS must be positive");
        }
        if self.cycle_workers == 0 {
            bail!("CYCLE_WORKERS must be positive");
        }
        Ok(())
    }

    /// Number of tracked positions: pages × page size.
    pub fn window_size(&self) -> usize {
        self.pages as usize * self.page_size as usize
    }

    pub fn budget_config(&self) -> CallBudgetConfig {
        CallBudgetConfig {
            max_calls: self.call_budget,
            window: self.call_budget_window,
        }
    }

    /// API client settings; fails when credentials are missing.
    pub fn api_config(&self) -> Result<OsuApiConfig> {
        let Some(client_id) = self.client_id else {
            bail!("OSU_API_CLIENT_ID is not set");
        };
        let Some(client_secret) = self.client_secret.clone() else {
            bail!("OSU_API_CLIENT_SECRET is not set");
        };

        Ok(OsuApiConfig {
            base_url: self.api_base.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            country: self.country.clone(),
            mode: self.mode.clone(),
        })
    }
}
