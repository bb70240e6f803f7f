use crate::bookmarks::BookmarkItem;
use crate::context_menu::{BlockList, CLSID_NEW_MENU};
use crate::error::Result;
use crate::ids::IconSize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "ShellBridge";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Size of the icons in the bookmark image list.
    pub icon_size: IconSize,
    /// Background threads resolving icons.
    pub fetcher_threads: usize,
    /// Upper bound for the icon cache. `None` keeps every entry.
    pub icon_cache_capacity: Option<usize>,
    /// Context menu extensions that are never loaded, as `{CLSID}` strings.
    pub blocked_context_menu_handlers: Vec<String>,
    pub bookmarks: Vec<BookmarkItem>,
    /// Default filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            icon_size: IconSize::default(),
            fetcher_threads: 4,
            icon_cache_capacity: None,
            blocked_context_menu_handlers: vec![CLSID_NEW_MENU.to_string()],
            bookmarks: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn block_list(&self) -> BlockList {
        BlockList::from_strings(&self.blocked_context_menu_handlers)
    }
}

#[cfg(windows)]
pub fn get_config_dir() -> Result<PathBuf> {
    use windows::Win32::Foundation::{HWND, MAX_PATH};
    use windows::Win32::UI::Shell::{SHGetFolderPathW, CSIDL_APPDATA};

    let mut path: [u16; MAX_PATH as usize] = [0; MAX_PATH as usize];
    unsafe {
        SHGetFolderPathW(HWND(0), CSIDL_APPDATA as i32, None, 0, &mut path)?;
    }

    let len = path.iter().position(|&x| x == 0).unwrap_or(path.len());
    let mut config_dir = PathBuf::from(String::from_utf16_lossy(&path[..len]));
    config_dir.push(CONFIG_DIR_NAME);

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

#[cfg(not(windows))]
pub fn get_config_dir() -> Result<PathBuf> {
    let mut config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir.push(CONFIG_DIR_NAME);

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn get_config_path() -> Result<PathBuf> {
    let mut config_dir = get_config_dir()?;
    config_dir.push(CONFIG_FILE_NAME);
    Ok(config_dir)
}

pub fn load_config() -> AppConfig {
    match get_config_path() {
        Ok(config_path) => load_config_from(&config_path),
        Err(e) => {
            tracing::warn!(target: "config", "Failed to get config path: {}", e);
            AppConfig::default()
        }
    }
}

/// Reads `path`, falling back to defaults when it is missing or unreadable.
pub fn load_config_from(path: &Path) -> AppConfig {
    if !path.exists() {
        tracing::info!(target: "config", "Config file not found, using defaults");
        return AppConfig::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(target: "config", "Failed to read config file: {}", e);
            return AppConfig::default();
        }
    };

    match serde_json::from_str::<AppConfig>(&content) {
        Ok(config) => {
            tracing::debug!(target: "config", "Loaded config: {:?}", config);
            config
        }
        Err(e) => {
            tracing::warn!(target: "config", "Failed to parse config file: {}", e);
            AppConfig::default()
        }
    }
}

/// Writes the defaults to the config file on first run, so there is a file
/// to edit. Returns whether a file was written.
pub fn write_default_config() -> Result<bool> {
    write_default_config_to(&get_config_path()?)
}

pub fn write_default_config_to(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config_to(&AppConfig::default(), path)?;
    tracing::info!(target: "config", "Wrote default config to {}", path.display());
    Ok(true)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    tracing::debug!(target: "config", "Saved config to {}", path.display());
    Ok(())
}
