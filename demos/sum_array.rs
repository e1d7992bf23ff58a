//! Sums a large array across one worker per logical processor, then pings a
//! shared worker a few times.
//!
//! ```sh
//! RUST_LOG=hardworker=debug cargo run --example sum_array
//! ```

use std::time::Duration;

use hardworker::worker::BoxError;
use hardworker::{Config, HardWorker, WorkerScope};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hardworker=info".parse()?))
        .init();

    let config = Config::from_json(r#"{ "multiplier": 1, "minThread": 1 }"#)?;
    let mut pool = HardWorker::new(config);
    pool.attach(|mut scope: WorkerScope<Vec<u64>, u64>| async move {
        while let Some(chunk) = scope.recv().await {
            scope.post_message(chunk.iter().map(|n| n * n).sum());
        }
        Ok::<_, BoxError>(())
    });

    let items: Vec<u64> = (1..=100_000).collect();
    let partials = pool.post_array(&items).await?;
    info!(
        workers = partials.len(),
        total = partials.iter().sum::<u64>(),
        "sum of squares"
    );
    pool.terminate();

    let mut echo = HardWorker::new(Config::new());
    echo.attach(|mut scope: WorkerScope<Vec<u64>, u64>| async move {
        while let Some(message) = scope.recv().await {
            scope.post_message(message.len() as u64);
        }
        Ok::<_, BoxError>(())
    });
    echo.on_message(|len| info!(len, "shared worker replied"))?;
    echo.on_error(|error| info!(%error, "shared worker failed"))?;
    for n in 1..=3 {
        echo.post_message(vec![0; n])?;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    echo.terminate();
    Ok(())
}
