//! Optional config file loading. Search order: ./webarchive.toml, then
//! $XDG_CONFIG_HOME/webarchive/config.toml (or ~/.config/webarchive/config.toml).

use serde::Deserialize;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of lookup attempts per URL (default 3).
    pub retry_count: Option<u32>,
    /// Constant delay in seconds before each retry (default 5).
    pub retry_delay_secs: Option<u64>,
    /// Only use snapshots on or after this date (YYYYMMDD).
    pub from: Option<String>,
    /// Extra hostnames never looked up, in addition to web.archive.org.
    pub skip_hosts: Option<Vec<String>>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Don't log lookups.
    pub silent: Option<bool>,
}

/// Search order: (1) ./webarchive.toml, (2) $XDG_CONFIG_HOME/webarchive/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("webarchive.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("webarchive").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
