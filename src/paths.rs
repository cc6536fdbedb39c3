//! Platform application-data locations.

use std::path::PathBuf;

/// Application data directory:
/// `~/Library/Application Support/uget` on macOS, `%APPDATA%\uget` on
/// Windows, `$XDG_DATA_HOME/uget` (or `~/.local/share/uget`) elsewhere.
/// Falls back to the current directory when the platform offers nothing.
#[must_use]
pub fn app_data() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uget")
}

/// Default accounts file.
#[must_use]
pub fn accounts_file() -> PathBuf {
    app_data().join("accounts.json")
}

/// Directory for daily log files.
#[must_use]
pub fn logs_dir() -> PathBuf {
    app_data().join("logs")
}
