//! Gateway configuration.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Resource the order services are invoked under.
pub const DEFAULT_RESOURCE_ID: &str = "br.com.sankhya.prod.OrdensProducaoHTML";

/// Sankhya connection settings.
///
/// URLs and credentials normally come from the environment; see the binary's
/// config loader for the variable names.
#[derive(Clone, Deserialize)]
pub struct SankhyaConfig {
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub gateway_url: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub client_token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mge_session: String,
    #[serde(default = "default_resource_id")]
    pub resource_id: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_logout_timeout_ms")]
    pub logout_timeout_ms: u64,
}

fn default_resource_id() -> String {
    DEFAULT_RESOURCE_ID.to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_logout_timeout_ms() -> u64 {
    10_000
}

impl Default for SankhyaConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            gateway_url: String::new(),
            app_key: String::new(),
            client_token: String::new(),
            username: String::new(),
            password: String::new(),
            mge_session: String::new(),
            resource_id: default_resource_id(),
            request_timeout_ms: default_request_timeout_ms(),
            logout_timeout_ms: default_logout_timeout_ms(),
        }
    }
}

impl SankhyaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_millis(self.logout_timeout_ms)
    }

    /// Names of the settings a login cannot do without.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_token.is_empty() {
            missing.push("client_token");
        }
        if self.mge_session.is_empty() {
            missing.push("mge_session");
        }
        missing
    }
}

impl fmt::Debug for SankhyaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SankhyaConfig")
            .field("login_url", &self.login_url)
            .field("gateway_url", &self.gateway_url)
            .field("username", &self.username)
            .field("app_key", &"<redacted>")
            .field("client_token", &"<redacted>")
            .field("password", &"<redacted>")
            .field("mge_session", &"<redacted>")
            .field("resource_id", &self.resource_id)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("logout_timeout_ms", &self.logout_timeout_ms)
            .finish()
    }
}
