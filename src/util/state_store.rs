use crate::config::WindowConfig;
use crate::window::{VisitCounter, WindowBuffer};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Window state as handed back and forth between pipeline runs.
/// Stored at ~/.local/share/lastn/state.json unless configured otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedWindow {
    pub buffer: WindowBuffer<f64>,

    #[serde(default)]
    pub visits: VisitCounter,

    /// RFC 3339 timestamp of the last save.
    #[serde(default)]
    pub saved_at: Option<String>,
}

impl PersistedWindow {
    pub fn new(buffer: WindowBuffer<f64>) -> Self {
        Self { buffer, visits: VisitCounter::new(), saved_at: None }
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("lastn").join("state.json"))
}

/// Load persisted state. A missing file is `Ok(None)`; an unreadable one is
/// an error, never silently replaced by an empty window.
pub fn load(path: &Path) -> Result<Option<PersistedWindow>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let state = serde_json::from_str(&text)
        .with_context(|| format!("parsing window state {}", path.display()))?;
    Ok(Some(state))
}

/// Load the window at `path`, or build an empty one from `cfg` when none is
/// persisted yet. `capacity` overrides the configured size for a new window
/// and must match the size of an existing one.
pub fn load_or_create(path: &Path, cfg: &WindowConfig, capacity: Option<i64>) -> Result<PersistedWindow> {
    if let Some(existing) = load(path)? {
        if let Some(n) = capacity {
            if n != existing.buffer.capacity() as i64 {
                bail!(
                    "{} holds a window of capacity {}, not {} (run `lastn reset` first)",
                    path.display(), existing.buffer.capacity(), n
                );
            }
        }
        return Ok(existing);
    }

    let mut wcfg = cfg.clone();
    if let Some(n) = capacity {
        wcfg.capacity = n;
    }
    tracing::info!(capacity = wcfg.capacity, path = %path.display(), "creating window");
    Ok(PersistedWindow::new(wcfg.window_buffer()?))
}

/// Write via a sibling temp file and rename, so a crash mid-save leaves the
/// previous state intact.
pub fn save(path: &Path, state: &mut PersistedWindow) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    state.saved_at = Some(chrono::Local::now().to_rfc3339());
    let json = serde_json::to_string(state)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Delete persisted state. Returns whether anything was removed.
pub fn remove(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
