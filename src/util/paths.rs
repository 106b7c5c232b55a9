use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

const APP_DIR_NAME: &str = "setube";
const CONFIG_DIR_ENV: &str = "SETUBE_CONFIG_DIR";

// Global config directory override (for --config flag and tests)
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Set config directory override (used by --config flag and tests)
pub fn set_config_dir_override(path: Option<PathBuf>) {
    *CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = path;
}

pub fn get_config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Find config directory by searching in priority order:
/// 1. Override from --config flag or set_config_dir_override(), created if missing
/// 2. Environment variable SETUBE_CONFIG_DIR
/// 3. User config directory (`~/.config/setube/` on Unix, `%APPDATA%\setube\` on Windows)
/// 4. Current working directory (`./config/`)
/// 5. Executable directory (`<exe_dir>/config/`)
///
/// If no config directory is found, creates one in the user config directory.
pub fn find_config_directory() -> Result<PathBuf> {
    if let Some(override_path) = get_config_dir_override() {
        std::fs::create_dir_all(&override_path)
            .with_context(|| format!("Failed to create config directory {:?}", override_path))?;
        tracing::trace!("Using config directory override: {:?}", override_path);
        return Ok(override_path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_DIR_ENV) {
        let env_config = PathBuf::from(env_path);
        if env_config.exists() {
            tracing::trace!("Found config directory from {}: {:?}", CONFIG_DIR_ENV, env_config);
            return Ok(env_config);
        }
    }

    if let Ok(user_config) = get_user_config_dir() {
        if user_config.exists() {
            return Ok(user_config);
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let cwd_config = cwd.join("config");
        if cwd_config.exists() {
            tracing::trace!("Found config directory at: {:?}", cwd_config);
            return Ok(cwd_config);
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let exe_config = exe_dir.join("config");
            if exe_config.exists() {
                tracing::trace!("Found config directory at: {:?}", exe_config);
                return Ok(exe_config);
            }
        }
    }

    let user_config = get_user_config_dir()?;
    std::fs::create_dir_all(&user_config).context("Failed to create user config directory")?;
    tracing::info!("Created config directory at: {:?}", user_config);
    Ok(user_config)
}

fn get_user_config_dir() -> Result<PathBuf> {
    let base_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine user config directory"))?;
    Ok(base_dir.join(APP_DIR_NAME))
}

/// Absolute path to settings.toml
pub fn get_app_config_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("settings.toml"))
}

/// Directory holding the persisted URL list
pub fn get_storage_dir() -> Result<PathBuf> {
    find_config_directory()
}

pub fn get_logs_dir() -> Result<PathBuf> {
    Ok(find_config_directory()?.join(".logs"))
}

/// Default directory for converted files
///
/// The platform download directory when known, otherwise `./Downloads`.
pub fn resolve_default_output_directory() -> PathBuf {
    if let Some(downloads) = dirs::download_dir() {
        return downloads;
    }
    if let Ok(cwd) = std::env::current_dir() {
        return cwd.join("Downloads");
    }
    PathBuf::from("Downloads")
}

/// Resolve a relative path against the config directory
///
/// Absolute paths are returned as-is.
pub fn resolve_relative_to_config(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match find_config_directory() {
        Ok(config_dir) => config_dir.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn reset_test_state() {
        set_config_dir_override(None);
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    }

    #[test]
    #[serial]
    fn test_config_dir_override_wins() {
        reset_test_state();
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("nested").join("setube");

        set_config_dir_override(Some(config_dir.clone()));
        let found = find_config_directory().unwrap();
        set_config_dir_override(None);

        assert_eq!(found, config_dir);
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_config_dir_from_env_variable() {
        reset_test_state();
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::create_dir_all(&config_dir).unwrap();

        unsafe { std::env::set_var(CONFIG_DIR_ENV, config_dir.to_str().unwrap()) };
        let found = find_config_directory().unwrap();
        reset_test_state();

        assert_eq!(found, config_dir);
    }

    #[test]
    #[serial]
    fn test_derived_paths() {
        reset_test_state();
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        set_config_dir_override(Some(config_dir.clone()));

        assert_eq!(get_app_config_path().unwrap(), config_dir.join("settings.toml"));
        assert_eq!(get_logs_dir().unwrap(), config_dir.join(".logs"));
        assert_eq!(get_storage_dir().unwrap(), config_dir);
        assert_eq!(
            resolve_relative_to_config(Path::new("out")),
            config_dir.join("out")
        );

        set_config_dir_override(None);
    }

    #[test]
    fn test_user_config_dir_is_app_specific() {
        let user_dir = get_user_config_dir().unwrap();
        assert!(user_dir.ends_with(APP_DIR_NAME));
    }

    #[test]
    fn test_absolute_path_untouched() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(resolve_relative_to_config(temp_dir.path()), temp_dir.path());
    }
}
