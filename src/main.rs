use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use partfetch::{Args, ConsoleObserver, Download, Options, Outcome, Settings};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const DEFAULT_THREADS: usize = 4;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("partfetch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let settings = Settings::load().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring settings file");
        Settings::default()
    });

    let options = Options {
        threads: Some(args.threads.or(settings.threads).unwrap_or(DEFAULT_THREADS)),
        directory: args.dir.or(settings.default_dir),
        temp_directory: args.temp_dir.or(settings.temp_dir),
        file_name: args.output,
        user_agent: args.user_agent.or(settings.user_agent),
    };

    let pb = ProgressBar::no_length();
    let observer = Arc::new(ConsoleObserver { pb: pb.clone() });

    let download = Download::new(&args.url, options, observer)
        .await
        .with_context(|| format!("Failed to prepare download of {}", args.url))?;
    let download = Arc::new(download);

    let template = match download.descriptor().content_length {
        Some(length) => {
            pb.set_length(length);
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})"
        }
        None => "{msg} [{elapsed_precise}] {bytes} ({bytes_per_sec})",
    };
    pb.set_style(
        ProgressStyle::with_template(template)
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    pb.set_message(format!(
        "{} [{} segment(s)]",
        download.file_name(),
        download.thread_count()
    ));

    let mut run = download.start_async();
    let outcome = tokio::select! {
        joined = &mut run => joined??,
        _ = tokio::signal::ctrl_c() => {
            pb.println("🛑 Received Ctrl+C. Stopping, partial segments are kept for resume...");
            download.stop().await;
            run.await??
        }
    };

    match outcome {
        Outcome::Completed => {
            pb.finish_and_clear();
            println!("✅ Download completed: {}", download.file_path().display());
        }
        Outcome::Stopped => {
            pb.abandon();
            println!("Download stopped. Run the same command again to resume.");
        }
    }

    Ok(())
}
