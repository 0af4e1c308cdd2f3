use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static CATSUP_HOME: OnceLock<PathBuf> = OnceLock::new();

/// Get the catsup home directory
/// Checks CATSUP_HOME environment variable, falls back to ${HOME}/.catsup
pub fn catsup_home() -> PathBuf {
    CATSUP_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("CATSUP_HOME") {
                PathBuf::from(path)
            } else {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".catsup")
            }
        })
        .clone()
}

/// Get the configuration file path
/// Checks CATSUP_CONFIG environment variable, falls back to CATSUP_HOME/config.toml
pub fn config_path() -> PathBuf {
    match std::env::var("CATSUP_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => catsup_home().join("config.toml"),
    }
}

/// Get the directory submissions live in
/// Checks CATSUP_SUBMISSIONS_DIR, then the configured directory, then the
/// current working directory
pub fn submissions_dir(configured: Option<&str>) -> PathBuf {
    if let Ok(path) = std::env::var("CATSUP_SUBMISSIONS_DIR") {
        return PathBuf::from(path);
    }
    match configured {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from("."),
    }
}
