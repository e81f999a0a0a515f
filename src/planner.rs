//! Segment planning and resume offsets.
//!
//! Planning walks the segments strictly in index order: every segment's
//! nominal begin is derived from the previous segment's end, so the ranges
//! only stay contiguous when computed sequentially.
use std::path::{Path, PathBuf};

/// A byte range of the resource and the file it is written to.
///
/// `end` is inclusive; `None` means "read until the server stops sending".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    /// First byte still to fetch, after accounting for bytes already on disk.
    pub begin: u64,
    pub end: Option<u64>,
    pub path: PathBuf,
    /// Append to the existing file instead of truncating it.
    pub append: bool,
    /// Bytes found on disk from a previous attempt.
    pub resumed: u64,
    /// Already fully on disk; no worker is dispatched for it.
    pub completed: bool,
}

impl Segment {
    /// Value of the `Range` header for this segment, if one is needed.
    ///
    /// A fetch of the whole resource from byte zero sends no header at all so
    /// servers without range support still answer it.
    pub fn range_header(&self) -> Option<String> {
        match self.end {
            Some(end) => Some(format!("bytes={}-{}", self.begin, end)),
            None if self.begin > 0 => Some(format!("bytes={}-", self.begin)),
            None => None,
        }
    }
}

/// The ordered segment layout for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub segments: Vec<Segment>,
    /// Whether the segments live in temp files that must be merged.
    pub multi: bool,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| !s.completed)
    }

    pub fn completed_count(&self) -> usize {
        self.segments.iter().filter(|s| s.completed).count()
    }

    pub fn resumed_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.resumed).sum()
    }

    /// Temp files to concatenate, in index order. Empty in single-stream mode.
    pub fn temp_paths(&self) -> Vec<PathBuf> {
        if self.multi {
            self.segments.iter().map(|s| s.path.clone()).collect()
        } else {
            Vec::new()
        }
    }
}

/// Multi-segment mode needs more than one worker, a server that honours
/// ranges, and at least one byte per worker.
pub fn use_multiple_segments(
    thread_count: usize,
    supports_ranges: bool,
    content_length: Option<u64>,
) -> bool {
    thread_count > 1
        && supports_ranges
        && content_length.is_some_and(|len| len >= thread_count as u64)
}

/// Nominal inclusive ranges for `count` segments over `total_size` bytes.
///
/// Segment `i` ends at `(i + 1) * (total_size / count)` and begins one past
/// the previous end. The last segment's end is forced to `total_size`, so it
/// absorbs the remainder.
pub fn calculate_ranges(total_size: u64, count: u64) -> Vec<(u64, u64)> {
    let size = total_size / count;
    let mut ranges = Vec::with_capacity(count as usize);
    let mut previous_end: Option<u64> = None;

    for i in 0..count {
        let begin = previous_end.map_or(0, |e| e + 1);
        let end = if i == count - 1 {
            total_size
        } else {
            (i + 1) * size
        };
        ranges.push((begin, end));
        previous_end = Some(end);
    }

    ranges
}

/// Temp file for segment `index`: `{temp_dir}/{file_name}{index}`.
pub fn segment_path(temp_dir: &Path, file_name: &str, index: usize) -> PathBuf {
    temp_dir.join(format!("{file_name}{index}"))
}

/// Length of the file at `path`, if it exists and is a regular file.
async fn existing_len(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Lays out `thread_count` temp-file segments, shifting each begin past the
/// bytes already present in its temp file.
pub async fn plan_multi(
    content_length: u64,
    thread_count: usize,
    temp_dir: &Path,
    file_name: &str,
) -> Plan {
    // The server clamps the last range, but the resource really ends here.
    let last_byte = content_length.saturating_sub(1);
    let mut segments = Vec::with_capacity(thread_count);

    for (index, (begin, end)) in calculate_ranges(content_length, thread_count as u64)
        .into_iter()
        .enumerate()
    {
        let path = segment_path(temp_dir, file_name, index);
        let resumed = existing_len(&path).await.unwrap_or(0);
        let begin = begin + resumed;
        let completed = begin > end.min(last_byte);

        segments.push(Segment {
            index,
            begin,
            end: Some(end),
            path,
            append: true,
            resumed,
            completed,
        });
    }

    Plan {
        segments,
        multi: true,
    }
}

/// One segment written straight to the final path.
///
/// With an unknown length the file is truncated and fetched from scratch,
/// since there is no way to tell whether what is on disk is complete.
pub async fn plan_single(content_length: Option<u64>, file_path: &Path) -> Plan {
    let existing = existing_len(file_path).await;

    let segment = match content_length {
        Some(len) => {
            let resumed = existing.unwrap_or(0);
            Segment {
                index: 0,
                begin: resumed,
                end: None,
                path: file_path.to_path_buf(),
                append: true,
                resumed,
                completed: existing.is_some() && resumed >= len,
            }
        }
        None => Segment {
            index: 0,
            begin: 0,
            end: None,
            path: file_path.to_path_buf(),
            append: false,
            resumed: 0,
            completed: false,
        },
    };

    Plan {
        segments: vec![segment],
        multi: false,
    }
}
