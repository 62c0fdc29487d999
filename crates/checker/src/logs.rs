//! Log-file maintenance.

use std::path::Path;

use chrono::Utc;
use tracing::info;

/// Truncate `path` when it exceeds `max_size` bytes, keeping the newest
/// half with a marker line prepended. Runs before anything appends to the
/// log, so a missing file is fine.
pub fn truncate_oversized(path: &Path, max_size: u64) -> std::io::Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.len() <= max_size {
        return Ok(());
    }

    let bytes = std::fs::read(path)?;
    let mut keep_from = bytes.len() / 2;
    // Cut on a line boundary so the kept half starts with a whole record.
    if let Some(offset) = bytes[keep_from..].iter().position(|b| *b == b'\n') {
        keep_from += offset + 1;
    }

    let mut truncated = format!(
        "[log truncated {} bytes at {}]\n",
        keep_from,
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
    .into_bytes();
    truncated.extend_from_slice(&bytes[keep_from..]);
    std::fs::write(path, truncated)?;

    info!(path = %path.display(), dropped = keep_from, "log file truncated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_fine() {
        let dir = TempDir::new().unwrap();
        truncate_oversized(&dir.path().join("absent.log"), 100).unwrap();
    }

    #[test]
    fn test_small_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checker.log");
        std::fs::write(&path, "line one\nline two\n").unwrap();
        truncate_oversized(&path, 1024).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "line one\nline two\n"
        );
    }

    #[test]
    fn test_oversized_file_keeps_newest_half() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checker.log");
        let content: String = (0..200).map(|i| format!("log line number {i}\n")).collect();
        std::fs::write(&path, &content).unwrap();

        truncate_oversized(&path, 100).unwrap();

        let kept = std::fs::read_to_string(&path).unwrap();
        assert!(kept.starts_with("[log truncated"));
        assert!(kept.len() < content.len());
        assert!(kept.contains("log line number 199"));
        assert!(!kept.contains("log line number 0\n"));
        // The kept half starts on a whole line after the marker.
        let second_line = kept.lines().nth(1).unwrap();
        assert!(second_line.starts_with("log line number"));
    }
}
