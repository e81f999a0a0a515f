use indicatif::{ProgressBar, ProgressStyle};
use partfetch::{ConsoleObserver, Download, Options, Outcome};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration
    let url = "https://proof.ovh.net/files/10Mb.dat";

    println!("Starting example download...");
    println!("URL: {}", url);

    // 1. Progress bar, wrapped in the library's observer
    let pb = ProgressBar::no_length();
    let observer = Arc::new(ConsoleObserver { pb: pb.clone() });

    // 2. Probe the server and resolve the configuration
    let options = Options {
        threads: Some(4),
        ..Options::default()
    };
    let download = Download::new(url, options, observer).await?;

    if let Some(size) = download.descriptor().content_length {
        println!("File Size: {} bytes", size);
        pb.set_length(size);
    }
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("=>-"),
    );
    pb.set_message(format!("{} segment(s)", download.thread_count()));

    // 3. Run the transfer; segments are merged when all of them finish
    match download.start().await? {
        Outcome::Completed => {
            println!("Download completed: {}", download.file_path().display())
        }
        Outcome::Stopped => println!("Download stopped, run again to resume"),
    }

    Ok(())
}
