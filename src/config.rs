use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{scheduler::DEFAULT_INTERVAL, site::Timeouts, workflow::Credentials};

/// The env vars needed to run the engine.
#[derive(Debug, Deserialize)]
pub struct EngineEnv {
    site_account: String,
    site_password: String,
    database_url: String,
    telegram_bot_token: String,
    scheduler_interval_secs: Option<u64>,
    element_wait_secs: Option<u64>,
    stable_wait_secs: Option<u64>,
    browser_headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub credentials: Credentials,
    pub database_url: String,
    pub telegram_bot_token: String,
    pub scheduler_interval: Duration,
    pub timeouts: Timeouts,
    pub headless: bool,
}

impl EngineConfig {
    pub fn new() -> anyhow::Result<Self> {
        let env = EngineEnv::load_from_env()?;
        Ok(Self::from_env(env))
    }

    pub fn from_env(env: EngineEnv) -> Self {
        let defaults = Timeouts::default();
        Self {
            credentials: Credentials {
                account: env.site_account,
                password: env.site_password,
            },
            database_url: env.database_url,
            telegram_bot_token: env.telegram_bot_token,
            scheduler_interval: env
                .scheduler_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_INTERVAL),
            timeouts: Timeouts {
                element: env
                    .element_wait_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.element),
                stable: env
                    .stable_wait_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.stable),
            },
            headless: env.browser_headless.unwrap_or(true),
        }
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
