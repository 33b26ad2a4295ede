use crate::error::Result as IngestResult;
use crate::window::WindowBuffer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Number of most recent records retained (N). Must be positive.
    pub capacity:     i64,
    /// Extra storage reserved on each reallocation, in percent.
    pub growth_pct:   u32,
    /// Maintain the cumulative visit counter alongside the window.
    pub track_visits: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the window state is persisted between runs. Empty = data dir.
    pub state_file: String,
    /// Append one line per ingested batch to the ingest journal.
    pub journal:    bool,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for WindowConfig {
    fn default() -> Self {
        Self { capacity: 1000, growth_pct: 50, track_visits: true }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_file: String::new(), journal: true }
    }
}

impl WindowConfig {
    /// An empty window sized by this config.
    pub fn window_buffer<T>(&self) -> IngestResult<WindowBuffer<T>> {
        WindowBuffer::with_signed_capacity(self.capacity).map(|b| b.with_growth_pct(self.growth_pct))
    }
}

impl StorageConfig {
    pub fn state_path(&self) -> Option<PathBuf> {
        if self.state_file.is_empty() {
            crate::util::state_store::default_path()
        } else {
            Some(PathBuf::from(&self.state_file))
        }
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    pub fn load() -> Self {
        match try_load() {
            Ok(c)  => c,
            Err(_) => {
                // Write defaults on first run (best-effort)
                let _ = try_write_defaults();
                Config::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lastn").join("lastn.toml"))
    }
}

fn try_load() -> Result<Config> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    Config::load_from(&path)
}

fn try_write_defaults() -> Result<()> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(path, format!("# lastn configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    Ok(())
}
