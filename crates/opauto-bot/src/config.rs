//! Application configuration.

use crate::error::{AppError, AppResult};
use opauto_dashboard::DashboardConfig;
use opauto_engine::OrchestratorSettings;
use opauto_gateway::SankhyaConfig;
use opauto_planning::DatabaseConfig;
use serde::Deserialize;
use std::path::Path;

/// Config file used when neither `--config` nor `OPAUTO_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Where planning rows and orders come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// In-memory planning table and simulated ERP.
    #[default]
    Simulation,
    /// Real planning database and Sankhya gateway.
    Live,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info,opauto=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

/// Shape of the generated data in simulation mode.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Pending records generated per (line, round).
    #[serde(default = "default_records_per_round")]
    pub records_per_round: u32,
    /// Rounds `1..=rounds` are seeded.
    #[serde(default = "default_rounds")]
    pub rounds: i32,
    /// Lines `1..=lines` are seeded.
    #[serde(default = "default_lines")]
    pub lines: i32,
    /// First order id handed out by the simulated ERP.
    #[serde(default = "default_first_order_id")]
    pub first_order_id: i64,
    /// Simulated latency of one order creation (ms).
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

fn default_records_per_round() -> u32 {
    3
}

fn default_rounds() -> i32 {
    3
}

fn default_lines() -> i32 {
    2
}

fn default_first_order_id() -> i64 {
    900_111
}

fn default_latency_ms() -> u64 {
    300
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            records_per_round: default_records_per_round(),
            rounds: default_rounds(),
            lines: default_lines(),
            first_order_id: default_first_order_id(),
            latency_ms: default_latency_ms(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sankhya: SankhyaConfig,
    #[serde(default)]
    pub orders: OrchestratorSettings,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Load configuration, then apply environment overrides.
    ///
    /// Path resolution: `path` > `OPAUTO_CONFIG` > [`DEFAULT_CONFIG_PATH`]. A
    /// missing default file falls back to built-in defaults; a missing file
    /// that was asked for explicitly is an error.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let explicit = path
            .map(str::to_string)
            .or_else(|| std::env::var("OPAUTO_CONFIG").ok());

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific file, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Overlay connection settings and secrets from `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: [(&str, &mut String); 8] = [
            ("DATABASE_URL", &mut self.database.url),
            ("SANKHYA_LOGIN_URL", &mut self.sankhya.login_url),
            ("SANKHYA_GATEWAY_URL", &mut self.sankhya.gateway_url),
            ("SANKHYA_APP_KEY", &mut self.sankhya.app_key),
            ("SANKHYA_CLIENT_TOKEN", &mut self.sankhya.client_token),
            ("SANKHYA_USERNAME", &mut self.sankhya.username),
            ("SANKHYA_PASSWORD", &mut self.sankhya.password),
            ("SANKHYA_MGE_SESSION", &mut self.sankhya.mge_session),
        ];
        for (key, target) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        }
    }

    pub fn is_simulation(&self) -> bool {
        self.mode == Mode::Simulation
    }

    /// Reject configurations that cannot work in the selected mode.
    pub fn validate(&self) -> AppResult<()> {
        if self.is_simulation() {
            if self.simulation.rounds < 1 || self.simulation.lines < 1 {
                return Err(AppError::Config(
                    "simulation.rounds and simulation.lines must be at least 1".to_string(),
                ));
            }
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.database.url.is_empty() {
            missing.push("database.url (DATABASE_URL)");
        }
        if self.sankhya.login_url.is_empty() {
            missing.push("sankhya.login_url (SANKHYA_LOGIN_URL)");
        }
        if self.sankhya.gateway_url.is_empty() {
            missing.push("sankhya.gateway_url (SANKHYA_GATEWAY_URL)");
        }
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "live mode requires {}",
                missing.join(", ")
            )));
        }

        let credentials = self.sankhya.missing_credentials();
        if !credentials.is_empty() {
            return Err(AppError::Config(format!(
                "live mode requires Sankhya credentials: {}",
                credentials.join(", ")
            )));
        }
        Ok(())
    }
}
