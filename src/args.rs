use clap::Parser;
use std::path::PathBuf;

/// A segmented, resumable file downloader.
///
/// The file is split into byte ranges that are downloaded in parallel when
/// the server supports it. Interrupted downloads resume from the partial
/// files left on disk when the same command is run again.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The URL of the file to download.
    #[arg(short, long)]
    pub url: String,

    /// The name of the output file. Defaults to the name suggested by the server.
    #[arg(short, long)]
    pub output: Option<String>,

    /// The number of concurrent segments to download.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// The directory to save the file in. Defaults to the current directory.
    #[arg(short = 'd', long)]
    pub dir: Option<PathBuf>,

    /// Where segment files are kept until they are merged. Defaults to `--dir`.
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// The User-Agent header to send.
    #[arg(long)]
    pub user_agent: Option<String>,
}
