use courtwatch::EngineContext;
use dotenv::dotenv;
use log::{LevelFilter, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let context = EngineContext::new().await?;
    info!(
        "watching courts every {}s; pay for bookings at {}",
        context.config.scheduler_interval.as_secs(),
        context.engine.payment_location()
    );
    let handle = context.scheduler.start();

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("cannot listen for ctrl-c: {err}");
    }
    info!("shutting down");
    context.scheduler.stop();
    if let Err(err) = handle.await {
        error!("scheduler task ended abnormally: {err}");
    }
    context.shutdown().await;
    Ok(())
}
