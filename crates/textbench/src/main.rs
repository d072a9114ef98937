//! textbench - compare corpus storage backends.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use textbench::{write_report, Args, Harness};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "textbench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config();
    config.validate()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backends = ?config.backends.iter().map(|b| b.kind).collect::<Vec<_>>(),
        source = ?config.source,
        output = %config.output_dir.display(),
        seed = config.seed,
        ingest = config.ingest,
        "configuration loaded"
    );

    let documents = if config.ingest {
        config.source.load(config.seed)?
    } else {
        Vec::new()
    };

    let harness = Harness::new(config);
    let reports = harness.run(&documents);
    for report in &reports {
        write_report(&harness.config().output_dir, report)?;
        tracing::info!(
            backend = %report.backend,
            corpus_size = report.corpus_size,
            failures = report.failures().count(),
            "backend evaluated"
        );
    }

    if reports.len() < harness.config().backends.len() {
        tracing::warn!(
            evaluated = reports.len(),
            configured = harness.config().backends.len(),
            "some backends were aborted"
        );
    }
    Ok(())
}
