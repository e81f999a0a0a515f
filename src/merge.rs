//! Reassembly of segment files into the final output.
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Concatenates `parts` in order into `output`, then deletes them.
///
/// Missing parts are skipped. When none of the parts exist the output is left
/// untouched, so merging an already merged download is a no-op.
pub async fn merge_segments(parts: &[PathBuf], output: &Path) -> io::Result<u64> {
    let mut present = Vec::with_capacity(parts.len());
    for part in parts {
        if fs::try_exists(part).await? {
            present.push(part.as_path());
        }
    }

    if present.is_empty() {
        debug!(output = %output.display(), "nothing to merge");
        return Ok(0);
    }

    let mut out = fs::File::create(output).await?;
    let mut written = 0;
    for part in &present {
        let mut input = fs::File::open(part).await?;
        written += tokio::io::copy(&mut input, &mut out).await?;
    }
    out.flush().await?;
    out.sync_all().await?;

    for part in &present {
        fs::remove_file(part).await?;
    }

    debug!(output = %output.display(), parts = present.len(), bytes = written, "merged segments");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_merge_in_index_order() -> io::Result<()> {
        let dir = tempdir()?;
        let parts: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("f{i}"))).collect();
        std::fs::write(&parts[0], "Hello")?;
        std::fs::write(&parts[1], ", ")?;
        std::fs::write(&parts[2], "World")?;

        let output = dir.path().join("f");
        std::fs::write(&output, "stale content that is longer")?;

        let written = merge_segments(&parts, &output).await?;

        assert_eq!(written, 12);
        assert_eq!(std::fs::read_to_string(&output)?, "Hello, World");
        assert!(parts.iter().all(|p| !p.exists()));
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_skips_missing_parts() -> io::Result<()> {
        let dir = tempdir()?;
        let parts: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("f{i}"))).collect();
        std::fs::write(&parts[0], "ab")?;
        std::fs::write(&parts[2], "cd")?;

        let output = dir.path().join("f");
        merge_segments(&parts, &output).await?;
        assert_eq!(std::fs::read_to_string(&output)?, "abcd");
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_twice_is_noop() -> io::Result<()> {
        let dir = tempdir()?;
        let parts = vec![dir.path().join("f0"), dir.path().join("f1")];
        std::fs::write(&parts[0], "12")?;
        std::fs::write(&parts[1], "34")?;
        let output = dir.path().join("f");

        merge_segments(&parts, &output).await?;
        let written = merge_segments(&parts, &output).await?;

        assert_eq!(written, 0);
        assert_eq!(std::fs::read_to_string(&output)?, "1234");

        // Single-stream downloads have no parts at all.
        assert_eq!(merge_segments(&[], &output).await?, 0);
        assert_eq!(std::fs::read_to_string(&output)?, "1234");
        Ok(())
    }
}
