#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;

use std::io::stdout;
use std::io::Write as _;

use anyhow::Context as _;
use anyhow::Result;

use clap::Parser as _;

use tickproc::symdump;
use tickproc::TickProcessor;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_timer(SystemTime)
        .finish();
    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    let config = args.config();
    let provider = symdump::provider_for(
        config.platform,
        config.nm.clone(),
        config.target_root.clone(),
        config.apk_embedded_library.clone(),
    );

    let mut processor = TickProcessor::new(config, provider);
    let () = processor
        .process_log_file(&args.log_file)
        .with_context(|| format!("failed to process log `{}`", args.log_file.display()))?;

    let report = processor.into_report(&args.log_file.display().to_string());
    let mut stdout = stdout().lock();
    let () = report
        .render(&mut stdout)
        .context("failed to render report")?;
    let () = stdout.flush().context("failed to flush output")?;
    Ok(())
}
