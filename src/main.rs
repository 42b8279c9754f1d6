//! chat-engine demo driver.
//!
//! Builds a facade over the bundled simulated engine, streams one prompt to
//! stdout and tears the engine down again.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tracing::{error, info, warn};

use chat_engine::config::{Cli, Config};
use chat_engine::{ChatEngine, EngineEvent, EventName, SimulatedEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "chat_engine=debug"
    } else {
        "chat_engine=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("chat-engine v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;
    info!(
        model = %config.engine.model_path,
        backend = config.engine.backend,
        max_tokens = config.engine.max_tokens,
        "Configuration loaded"
    );

    let engine = ChatEngine::new(Arc::new(SimulatedEngine::new(config.simulation.clone())));

    let probe = engine.test_connectivity().await?;
    info!(probe, "Native module reachable");

    engine.subscribe(EventName::Metrics, |event| {
        if let EngineEvent::Metrics(m) = event {
            info!(
                total_ms = m.total_time_ms,
                prefill_ms = m.prefill_time_ms,
                decode_ms = m.decode_time_ms,
                tokens_per_second = m.tokens_per_second,
                decode_tokens = m.decode_tokens,
                "Generation metrics"
            );
        }
    });
    engine.subscribe(EventName::Error, |event| {
        if let EngineEvent::Error(e) = event {
            error!(code = %e.code, "{}", e.message);
        }
    });

    engine.initialize(&config.engine).await?;
    info!(model = %engine.get_model_info().await?, "Model loaded");
    engine.log_message(&format!("prompt: {}", cli.prompt)).await;

    let mut stream = engine.generate_stream(&cli.prompt).await?;
    let mut stdout = std::io::stdout();
    let mut printed = 0;
    while let Some(response) = stream.next().await {
        match response.accumulated_text.get(printed..) {
            Some(delta) => write!(stdout, "{delta}")?,
            None => {
                warn!("Response rewrote earlier text");
                write!(stdout, "\n{}", response.accumulated_text)?;
            }
        }
        stdout.flush()?;
        printed = response.accumulated_text.len();
    }
    writeln!(stdout)?;

    // Metrics trail the final response.
    tokio::task::yield_now().await;

    if cli.debug_history {
        println!("--- native debug history ---");
        println!("{}", engine.get_debug_history().await);
    }

    engine.destroy().await;
    info!("Done");
    Ok(())
}
