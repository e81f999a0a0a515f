//! Segment workers: one task per byte range, streaming into one file.
use crate::latch::{Barriers, StopGuard};
use crate::observer::ProgressObserver;
use crate::planner::Segment;
use reqwest::StatusCode;
use reqwest::header::{RANGE, USER_AGENT};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Bytes written (and reported) per step between cancellation checks.
pub const BUFFER_SIZE: usize = 4096;

/// Everything a worker borrows from the run that spawned it.
#[derive(Clone)]
pub struct WorkerContext {
    pub client: reqwest::Client,
    pub url: Url,
    pub user_agent: String,
    pub observer: Arc<dyn ProgressObserver>,
    pub token: CancellationToken,
    pub barriers: Arc<Barriers>,
}

/// How a worker left its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The server stopped sending; the range is on disk.
    Finished,
    /// Cancellation was observed. Whatever was written is flushed.
    Cancelled,
    /// The server answered with a status we cannot write.
    Rejected(StatusCode),
    /// Transport or file error. Bytes written so far stay on disk.
    Failed,
}

/// Downloads a single segment.
///
/// The stop barrier is counted down on every return path. The done barrier
/// is counted down, before the stop barrier, only on [`WorkerExit::Finished`].
pub async fn download_segment(segment: Segment, ctx: WorkerContext) -> WorkerExit {
    let _stop = StopGuard(&ctx.barriers.stop);

    let exit = stream_segment(&segment, &ctx).await;
    if exit == WorkerExit::Finished {
        ctx.barriers.done.count_down();
    }

    debug!(segment = segment.index, ?exit, "worker exited");
    exit
}

async fn stream_segment(segment: &Segment, ctx: &WorkerContext) -> WorkerExit {
    if ctx.token.is_cancelled() {
        return WorkerExit::Cancelled;
    }

    let mut request = ctx
        .client
        .get(ctx.url.clone())
        .header(USER_AGENT, &ctx.user_agent);
    if let Some(range) = segment.range_header() {
        request = request.header(RANGE, range);
    }

    let sent = tokio::select! {
        _ = ctx.token.cancelled() => return WorkerExit::Cancelled,
        sent = request.send() => sent,
    };
    let mut response = match sent {
        Ok(response) => response,
        Err(e) => {
            warn!(segment = segment.index, error = %e, "request failed");
            return WorkerExit::Failed;
        }
    };

    let status = response.status();
    let mut append = segment.append;
    match status {
        StatusCode::PARTIAL_CONTENT => {}
        // Whole resource. Only writable when the segment is the whole resource.
        StatusCode::OK if segment.end.is_none() => {
            if segment.begin > 0 {
                debug!(segment = segment.index, "range ignored, restarting from zero");
            }
            append = false;
        }
        _ => {
            warn!(segment = segment.index, status = status.as_u16(), "unexpected status");
            return WorkerExit::Rejected(status);
        }
    }

    let mut file = match open_target(segment, append).await {
        Ok(file) => file,
        Err(e) => {
            warn!(segment = segment.index, path = %segment.path.display(), error = %e, "cannot open segment file");
            return WorkerExit::Failed;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => {
                let _ = file.flush().await;
                return WorkerExit::Cancelled;
            }
            next = response.chunk() => next,
        };

        let bytes = match next {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                warn!(segment = segment.index, error = %e, "stream interrupted");
                let _ = file.flush().await;
                return WorkerExit::Failed;
            }
        };

        for piece in bytes.chunks(BUFFER_SIZE) {
            if let Err(e) = write_piece(&mut file, piece).await {
                warn!(segment = segment.index, error = %e, "write failed");
                return WorkerExit::Failed;
            }
            ctx.observer.inc(piece.len() as u64);

            if ctx.token.is_cancelled() {
                return WorkerExit::Cancelled;
            }
        }
    }

    if let Err(e) = file.sync_all().await {
        warn!(segment = segment.index, error = %e, "sync failed");
        return WorkerExit::Failed;
    }
    WorkerExit::Finished
}

async fn open_target(segment: &Segment, append: bool) -> std::io::Result<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(&segment.path).await
}

async fn write_piece(file: &mut File, piece: &[u8]) -> std::io::Result<()> {
    file.write_all(piece).await?;
    file.flush().await
}
