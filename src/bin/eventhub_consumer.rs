use std::sync::Arc;

use eventhub_partition_consumer::codec::codec_for;
use eventhub_partition_consumer::config::APP_CONFIG;
use eventhub_partition_consumer::utils::tracing::init_standard_tracing;
use eventhub_partition_consumer::{Coordinator, KafkaEventHubClient, OutputStream, output_queue};
use tokio::io::AsyncWriteExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = &*APP_CONFIG;
    init_standard_tracing(env!("CARGO_CRATE_NAME"), &config.log_level);

    config.validate()?;
    let partitions = config.partition_plan();
    tracing::info!(?partitions, "Configured eventhub partition list");

    let settings = config.consumer_settings()?;
    let client = Arc::new(KafkaEventHubClient::new(&config.eventhub_config()));
    let coordinator = Coordinator::new(client, settings, codec_for(config.codec), partitions);

    let shutdown = coordinator.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        tracing::info!("Shutdown signal received, stopping partition workers");
        shutdown.cancel();
    });

    let (sink, output) = output_queue();
    let writer = tokio::spawn(write_records(output));

    let result = coordinator.run(sink).await;
    writer.await??;
    result?;

    Ok(())
}

/// Write every record to stdout as one JSON document per line.
async fn write_records(mut output: OutputStream) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(record) = output.recv().await {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
    }
    stdout.flush().await?;
    Ok(())
}
