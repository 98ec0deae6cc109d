//! Persistence layer.
//!
//! Agents and favorites are saved as pretty-printed JSON files. The agents
//! file wraps its list as `{ "agents": [...] }`, the favorites file is a
//! bare array. A missing file loads as an empty list.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::types::{Agent, Favorite};

/// Synchronous load/save of the durable lists.
#[cfg_attr(test, mockall::automock)]
pub trait Store: Send + Sync {
    fn load_agents(&self) -> Result<Vec<Agent>>;
    fn save_agents(&self, agents: &[Agent]) -> Result<()>;
    fn load_favorites(&self) -> Result<Vec<Favorite>>;
    fn save_favorites(&self, favorites: &[Favorite]) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<Agent>,
}

/// File-backed [`Store`].
#[derive(Debug, Clone)]
pub struct JsonStore {
    agents_path: PathBuf,
    favorites_path: PathBuf,
}

impl JsonStore {
    pub fn new(agents_path: impl Into<PathBuf>, favorites_path: impl Into<PathBuf>) -> Self {
        Self {
            agents_path: agents_path.into(),
            favorites_path: favorites_path.into(),
        }
    }

    pub fn from_config(cfg: &StorageConfig) -> Self {
        Self::new(&cfg.agents_path, &cfg.favorites_path)
    }
}

impl Store for JsonStore {
    fn load_agents(&self) -> Result<Vec<Agent>> {
        let file: Option<AgentsFile> = read_json(&self.agents_path)?;
        let agents = file.map(|f| f.agents).unwrap_or_default();
        info!(path = %self.agents_path.display(), count = agents.len(), "Agents loaded");
        Ok(agents)
    }

    fn save_agents(&self, agents: &[Agent]) -> Result<()> {
        let file = AgentsFile {
            agents: agents.to_vec(),
        };
        write_json(&self.agents_path, &file)?;
        debug!(path = %self.agents_path.display(), count = agents.len(), "Agents saved");
        Ok(())
    }

    fn load_favorites(&self) -> Result<Vec<Favorite>> {
        let favorites: Vec<Favorite> = read_json(&self.favorites_path)?.unwrap_or_default();
        info!(path = %self.favorites_path.display(), count = favorites.len(), "Favorites loaded");
        Ok(favorites)
    }

    fn save_favorites(&self, favorites: &[Favorite]) -> Result<()> {
        write_json(&self.favorites_path, favorites)?;
        debug!(path = %self.favorites_path.display(), count = favorites.len(), "Favorites saved");
        Ok(())
    }
}

/// Returns `None` if the file doesn't exist (fresh start).
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        info!(path = %path.display(), "No saved file found, starting fresh");
        return Ok(None);
    }

    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write via a sibling temp file and rename, so a crash mid-write leaves
/// the previous file intact.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value).context("Failed to serialise JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
