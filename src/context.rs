use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;

use crate::{
    chromium::ChromiumBrowser, config::EngineConfig, engine::CourtEngine, notify::TelegramNotifier,
    scheduler::Scheduler, store::PgStore,
};

/// Everything the running service owns, wired together.
pub struct EngineContext {
    pub config: EngineConfig,
    pub browser: Arc<ChromiumBrowser>,
    pub engine: Arc<CourtEngine>,
    pub store: PgStore,
    pub scheduler: Arc<Scheduler>,
    /// Shared with whatever edits subscriptions while the scheduler runs.
    pub subscriptions_lock: Arc<RwLock<()>>,
}

impl EngineContext {
    pub async fn new() -> anyhow::Result<Self> {
        let config = EngineConfig::new()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
        let browser = Arc::new(
            ChromiumBrowser::launch(config.headless)
                .await
                .context("failed to launch the browser")?,
        );
        let engine = Arc::new(CourtEngine::new(
            browser.clone(),
            config.credentials.clone(),
            config.timeouts,
        ));
        let store = PgStore::connect(&config.database_url).await?;
        let notifier = Arc::new(TelegramNotifier::new(&config.telegram_bot_token)?);
        let subscriptions_lock = Arc::new(RwLock::new(()));
        let scheduler = Arc::new(Scheduler::new(
            engine.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            notifier,
            subscriptions_lock.clone(),
            config.scheduler_interval,
        ));

        Ok(EngineContext {
            config,
            browser,
            engine,
            store,
            scheduler,
            subscriptions_lock,
        })
    }

    /// Pages first, then the browser process, then the pool.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.browser.close().await;
        self.store.close().await;
    }
}
