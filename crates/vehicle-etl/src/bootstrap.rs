use anyhow::Context;
use etl_core::settings::Settings;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the RAW parent directory and the SILVER/GOLD roots exist.
pub fn ensure_directories(settings: &Settings) -> anyhow::Result<()> {
    let mut dirs = vec![settings.silver_dir.as_path(), settings.gold_dir.as_path()];
    if let Some(parent) = settings.raw_path.parent() {
        dirs.push(parent);
    }
    for dir in dirs {
        if dir.as_os_str().is_empty() {
            continue;
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create directory {}", dir.display()))?;
    }
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a level name to an `EnvFilter` directive.
///
/// Accepts `DEBUG/INFO/WARNING/ERROR/CRITICAL` in any case; anything else is
/// passed through so full directives like `etl_data=debug` keep working.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber on stderr.
///
/// `RUST_LOG` wins when set; otherwise `log_level` is used, falling back to
/// `info` if it does not parse.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let subscriber = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .context("tracing subscriber already initialised")?;

    Ok(())
}

// ── Progress ───────────────────────────────────────────────────────────────────

/// Extraction progress: a bar when the record count is bounded, a spinner
/// otherwise.
pub fn progress_bar(limit: Option<u64>) -> anyhow::Result<ProgressBar> {
    let pb = match limit {
        Some(n) => {
            let pb = ProgressBar::new(n);
            pb.set_style(
                ProgressStyle::with_template(
                    "  Extracting {bar:40.cyan/blue} {pos}/{len} records [{elapsed_precise}, ETA {eta_precise}]",
                )?
                .progress_chars("##-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template(
                "  Extracting {spinner} {pos} records [{elapsed_precise}]",
            )?);
            pb.enable_steady_tick(std::time::Duration::from_millis(200));
            pb
        }
    };
    Ok(pb)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
