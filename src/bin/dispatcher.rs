use std::sync::Arc;

use consent_webhooks::{
    config::{get_config, init_config, init_tracing},
    database::pool::{create_pool, run_migrations},
    services::{
        delivery_service::DeliveryService, dispatcher_service::Dispatcher,
        ledger_service::PgDeliveryLedger, queue_service::PgEventQueue,
        registry_service::PgWebhookRegistry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(config.log_format);

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;

    let dispatcher = Dispatcher::new(
        Arc::new(PgEventQueue::new(pool.clone(), config.event_claim_timeout_secs)),
        Arc::new(PgWebhookRegistry::new(pool.clone())),
        Arc::new(PgDeliveryLedger::new(pool)),
        DeliveryService::new(&config.delivery())?,
        config.dispatcher(),
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received, draining dispatcher");
                    shutdown.cancel();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    dispatcher.run(shutdown).await;
    Ok(())
}
