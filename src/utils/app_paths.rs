use anyhow::{anyhow, Result};
use std::fs;
use std::path::PathBuf;

pub struct AppPaths;

impl AppPaths {
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Cannot determine data directory"))?
            .join("sheet-browser");

        fs::create_dir_all(&data_dir)?;
        Ok(data_dir)
    }

    /// Line editor history
    pub fn history_file() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("history.txt"))
    }

    /// Default directory for exported tables
    pub fn download_dir() -> PathBuf {
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
