use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm::GenerationParams;

pub const DEFAULT_CONDITIONS: [&str; 3] = ["Hypertension", "Diabetes", "Depression"];
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    /// Azure OpenAI deployment: full completion URL plus `api-key` header.
    Azure { endpoint: String, api_key: String },
    OpenAi { api_key: String, model: String, api_base: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub call_timeout: Duration,
    pub generation: GenerationParams,
    pub risk_conditions: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup so it can be exercised without
    /// touching process state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{} must be set", key));

        let provider = match get("MEDCHAT_PROVIDER").as_deref().unwrap_or("azure") {
            "azure" => ProviderConfig::Azure {
                endpoint: require("AZURE_OPENAI_HOST")?,
                api_key: require("AZURE_OPENAI_KEY")?,
            },
            "openai" => ProviderConfig::OpenAi {
                api_key: require("OPENAI_API_KEY")?,
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                api_base: get("OPENAI_API_BASE"),
            },
            other => bail!("MEDCHAT_PROVIDER must be 'azure' or 'openai', got '{}'", other),
        };

        let bind_addr = get("MEDCHAT_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("MEDCHAT_BIND_ADDR is not a socket address")?;

        let timeout_secs = match get("MEDCHAT_CALL_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("MEDCHAT_CALL_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_CALL_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            bail!("MEDCHAT_CALL_TIMEOUT_SECS must be greater than zero");
        }

        let max_tokens = match get("MEDCHAT_MAX_TOKENS") {
            Some(raw) => raw.parse::<u32>().context("MEDCHAT_MAX_TOKENS must be a positive integer")?,
            None => DEFAULT_MAX_TOKENS,
        };

        let risk_conditions: Vec<String> = match get("MEDCHAT_RISK_CONDITIONS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_CONDITIONS.iter().map(|c| c.to_string()).collect(),
        };
        if risk_conditions.is_empty() {
            bail!("MEDCHAT_RISK_CONDITIONS must name at least one condition");
        }

        Ok(Self {
            bind_addr,
            provider,
            call_timeout: Duration::from_secs(timeout_secs),
            generation: GenerationParams { max_tokens, stop: None },
            risk_conditions,
        })
    }
}
