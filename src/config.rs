//! Configuration module for Roost

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::board::Board;
use crate::models::Vars;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between background refresh cycles (0 = manual only)
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_secs: u64,

    /// Threads to fetch per page
    #[serde(default = "default_threads_per_page")]
    pub threads_per_page: u32,

    /// Posts to fetch per page
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: u32,

    /// Which post a post-list request lands on
    /// (firstunread, firstpost, lastpost)
    #[serde(default = "default_post_list_action")]
    pub post_list_action: String,

    /// Whether to show images in post bodies
    #[serde(default = "default_show_images")]
    pub show_images: bool,

    /// Encrypt stored passwords at rest
    #[serde(default = "default_encrypt_passwords")]
    pub encrypt_passwords: bool,
}

fn default_refresh_rate() -> u64 {
    600
}

fn default_threads_per_page() -> u32 {
    25
}

fn default_posts_per_page() -> u32 {
    25
}

fn default_post_list_action() -> String {
    "firstunread".to_string()
}

fn default_show_images() -> bool {
    true
}

fn default_encrypt_passwords() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_rate_secs: default_refresh_rate(),
            threads_per_page: default_threads_per_page(),
            posts_per_page: default_posts_per_page(),
            post_list_action: default_post_list_action(),
            show_images: default_show_images(),
            encrypt_passwords: default_encrypt_passwords(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        crate::paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Seed a new board's option bag from these settings
    pub fn board_options(&self) -> Vars {
        let mut options = Vars::new();
        options.set(Board::OPT_REFRESH_RATE, self.refresh_rate_secs);
        options.set(Board::OPT_THREADS_PER_PAGE, self.threads_per_page);
        options.set(Board::OPT_POSTS_PER_PAGE, self.posts_per_page);
        options.set(Board::OPT_POST_LIST_ACTION, &self.post_list_action);
        options.set(Board::OPT_SHOW_IMAGES, self.show_images);
        options.set(Board::OPT_USE_ENCRYPTION, self.encrypt_passwords);
        options.set(Board::OPT_DISPLAY_ORDER, 0);
        options
    }
}
