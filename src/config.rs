use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_key: String,
    pub steam_id: String,
}

impl AppConfig {
    pub fn load(data_dir: &Path) -> Result<Option<Self>> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).context("read config")?;
        let config = serde_json::from_str(&raw).context("parse config")?;
        Ok(Some(config))
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let raw = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, raw).context("write config")?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.steam_id.trim().is_empty()
    }
}

pub fn data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    let dir = base.data_local_dir().join("backloggr");
    fs::create_dir_all(&dir).context("create app data dir")?;
    Ok(dir)
}

pub fn run_setup(data_dir: &Path) -> Result<AppConfig> {
    println!("backloggr setup");
    println!("A Steam Web API key is issued at https://steamcommunity.com/dev/apikey");
    println!("Your SteamID64 is the long number in your profile URL.");
    println!();

    let existing = AppConfig::load(data_dir)?.unwrap_or_default();
    let api_key = prompt("Steam API key", &existing.api_key)?;
    let steam_id = prompt("SteamID64", &existing.steam_id)?;

    let config = AppConfig { api_key, steam_id };
    if !config.is_complete() {
        anyhow::bail!("setup incomplete: both API key and SteamID are required");
    }
    config.save(data_dir)?;
    println!("Saved. Run 'backloggr sync' to fetch your library.");
    Ok(config)
}

// Empty input keeps the current value so re-running setup only changes
// what the user retypes.
fn prompt(label: &str, current: &str) -> Result<String> {
    if current.is_empty() {
        print!("{label}: ");
    } else {
        print!("{label} [{current}]: ");
    }
    io::stdout().flush().context("flush prompt")?;

    let mut input = String::new();
    io::stdin().read_line(&mut input).context("read input")?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(current.to_string())
    } else {
        Ok(trimmed.to_string())
    }
}
