mod actions;
mod stores;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::filter::{Directive, EnvFilter};

use circuit_dispatch::{Dispatcher, DispatcherConfig, DispatcherHandle, TracingDiagnostics};

use crate::actions::WardrobeAction;
use crate::stores::Wardrobe;

/// Runtime milestones plus this binary's own.
const DEFAULT_LOG_FILTER: &str = "circuit=info,wardrobe=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_LOG_FILTER.split(',') {
        filter = filter.add_directive(directive.parse::<Directive>()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Wardrobe starting...");

    // Load config
    let config = DispatcherConfig::from_env()?;
    info!(queue_capacity = config.queue_capacity, "Loaded config");

    let builder = Dispatcher::<WardrobeAction>::builder(config)
        .with_diagnostics(Arc::new(TracingDiagnostics));
    let wardrobe = Wardrobe::new(builder.handle());
    let (dispatcher, handle) = wardrobe.register(builder)?.build();
    let task = dispatcher.spawn();

    for action in [
        WardrobeAction::Dress,
        WardrobeAction::Undress,
        WardrobeAction::Dress,
    ] {
        handle.dispatch(action);
    }
    wait_until_idle(&handle).await;

    for (store, worn) in wardrobe.worn() {
        info!(store = %store, worn, "Final state");
    }
    info!(washes = wardrobe.socks.washes(), "Socks laundered");

    handle.shutdown();
    task.await?;

    Ok(())
}

async fn wait_until_idle(handle: &DispatcherHandle<WardrobeAction>) {
    while let Some(status) = handle.status().await {
        if !status.locked && status.queued == 0 {
            info!(
                processed = status.processed,
                dropped = status.dropped,
                aborted = status.aborted,
                "Dispatcher idle"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
