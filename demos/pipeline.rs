//! Three slow stages chained together, run once plain and once buffered.
//!
//! Each stage sleeps before every element, standing in for a network call.
//! Unbuffered, the delays add up per element; buffered, the stages overlap.
//!
//! Run with `RUST_LOG=lookahead=debug` to watch the producers.

use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use lookahead::prelude::*;
use tokio::time::sleep;

const DELAY: Duration = Duration::from_millis(200);

type Stage = BoxStream<'static, std::result::Result<u64, std::io::Error>>;

fn numbers() -> Stage {
    stream::iter(0..10)
        .then(|value| async move {
            sleep(DELAY).await; // could be a slow HTTP request
            Ok(value)
        })
        .boxed()
}

fn doubled(upstream: Stage) -> Stage {
    upstream
        .then(|value| async move {
            sleep(DELAY).await;
            value.map(|v| v * 2)
        })
        .boxed()
}

fn shifted(upstream: Stage) -> Stage {
    upstream
        .then(|value| async move {
            sleep(DELAY).await;
            value.map(|v| v + 3)
        })
        .boxed()
}

async fn drain(label: &str, mut pipeline: Stage) -> Result<()> {
    let start = Instant::now();
    while let Some(value) = pipeline.next().await {
        println!("{}: {}", label, value.map_err(Error::source_error)?);
    }
    println!("{} took about {:.2} secs\n", label, start.elapsed().as_secs_f64());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("=== Unbuffered pipeline ===");
    drain("plain", shifted(doubled(numbers()))).await?;

    println!("=== Buffered pipeline ===");
    let config = BufferConfig::new(1)?;
    let first = numbers().lookahead_with(config.clone().with_label("numbers"));
    let second = doubled(first.boxed()).lookahead_with(config.clone().with_label("doubled"));
    let third = shifted(second.boxed()).lookahead_with(config.with_label("shifted"));
    drain("buffered", third.boxed()).await?;

    Ok(())
}
