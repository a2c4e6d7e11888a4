use crate::error::{BleachError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and directory constants
// ---------------------------------------------------------------------------

pub const BLEACH_HOME_DIR: &str = ".bleach";
pub const SESSION_FILE: &str = "session.json";
pub const CONFIG_FILE: &str = "bleach.yaml";
pub const ARCHIVE_EXTENSION: &str = "csv";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn bleach_home() -> Result<PathBuf> {
    home::home_dir()
        .map(|h| h.join(BLEACH_HOME_DIR))
        .ok_or(BleachError::HomeNotFound)
}

pub fn default_session_path() -> Result<PathBuf> {
    Ok(bleach_home()?.join(SESSION_FILE))
}

/// `<dir>/<operation>.csv`
pub fn archive_path(dir: &Path, operation: &str) -> PathBuf {
    dir.join(format!("{operation}.{ARCHIVE_EXTENSION}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
