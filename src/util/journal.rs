use crate::window::IngestOutcome;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn journal_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("lastn").join("ingest.log"))
}

pub fn format_entry(source: &str, outcome: &IngestOutcome, visits: i64) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let mode = if outcome.overflowed { "overflow" } else if outcome.wrapped { "wrap" } else { "splice" };
    format!(
        "{} {} offered={} copied={} mode={} size={} cursor={} visits={}",
        now, source, outcome.offered, outcome.copied, mode, outcome.size, outcome.cursor, visits
    )
}

/// Append one line per ingested batch (best-effort).
pub fn append(path: &Path, source: &str, outcome: &IngestOutcome, visits: i64) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{}", format_entry(source, outcome, visits));
    }
}

/// The last `n` journal lines, oldest first.
pub fn load_recent(path: &Path, n: usize) -> Vec<String> {
    let text = match fs::read_to_string(path) {
        Ok(t)  => t,
        Err(_) => return Vec::new(),
    };
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].iter().map(|l| l.to_string()).collect()
}
