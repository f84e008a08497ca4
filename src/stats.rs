//! On-disk size reporting and step timing, printed to stdout alongside the
//! command output.

use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

/// Total size in bytes of all regular files under `path`. Unreadable entries
/// are skipped.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Print the total size of a directory.
pub fn print_dir_size(label: &str, path: &Path) {
    println!("{}", label);
    println!("{:>10}  {}", format_bytes(dir_size(path)), path.display());
}

/// Print the size of each top-level entry of a directory.
pub fn print_dir_entries(label: &str, dir: &Path) {
    println!("{}", label);
    let mut entries: Vec<_> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot list directory");
            return;
        }
    };
    entries.sort();
    for entry in entries {
        println!("{:>10}  {}", format_bytes(dir_size(&entry)), entry.display());
    }
}

/// Print `"<label> took [<ms>] ms"` followed by a blank line.
pub fn log_duration(start: Instant, label: &str) {
    println!("{} took [{}] ms", label, start.elapsed().as_millis());
    println!();
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
