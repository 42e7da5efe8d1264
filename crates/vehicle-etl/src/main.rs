mod bootstrap;

use anyhow::{Context, Result};
use clap::Parser;
use etl_core::settings::{Cli, Command};
use etl_data::source::open_source;
use etl_runtime::pipeline::Pipeline;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings;

    bootstrap::setup_logging(&settings.log_level)?;
    bootstrap::ensure_directories(&settings)?;

    tracing::info!("vehicle-etl v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!("settings: {:?}", settings);

    let pipeline = Pipeline::new(&settings);

    match cli.command {
        Command::Extract => {
            let source = open_source(&settings)?;
            let pb = bootstrap::progress_bar(settings.limit.get())?;
            let report = pipeline.extract(source.as_ref(), |n| pb.set_position(n));
            pb.finish_and_clear();
            report.context("extract failed")?;
        }

        Command::Transform => {
            pipeline.transform().context("transform failed")?;
        }

        Command::Metrics => {
            pipeline.metrics().context("metrics failed")?;
        }

        Command::All => {
            let source = open_source(&settings)?;
            let pb = bootstrap::progress_bar(settings.limit.get())?;
            let report = pipeline.run_all(source.as_ref(), |n| pb.set_position(n));
            pb.finish_and_clear();
            let report = report.context("pipeline failed")?;

            tracing::info!(
                "[all] done in {:.1}s (extract {:.1}s, transform {:.1}s, metrics {:.1}s)",
                report.extract.elapsed_seconds
                    + report.transform.elapsed_seconds
                    + report.metrics.elapsed_seconds,
                report.extract.elapsed_seconds,
                report.transform.elapsed_seconds,
                report.metrics.elapsed_seconds
            );
        }
    }

    Ok(())
}
