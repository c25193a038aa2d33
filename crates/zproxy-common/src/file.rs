use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{GlobalConfigError, GlobalConfigPatch};

pub const APP_DIR: &str = "zproxy";
pub const CONFIG_FILE: &str = "config.json";

/// `$XDG_CONFIG_HOME/zproxy`, falling back to `$HOME/.config/zproxy`.
pub fn config_dir() -> Result<PathBuf, GlobalConfigError> {
    config_dir_from(
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn config_dir_from(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Result<PathBuf, GlobalConfigError> {
    if let Some(dir) = xdg_config_home
        && !dir.as_os_str().is_empty()
    {
        return Ok(dir.join(APP_DIR));
    }
    match home {
        Some(home) if !home.as_os_str().is_empty() => Ok(home.join(".config").join(APP_DIR)),
        _ => Err(GlobalConfigError::NoConfigDir),
    }
}

pub fn config_path() -> Result<PathBuf, GlobalConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Reads the file layer. A missing file is an empty layer, not an error.
pub fn load_patch(path: &Path) -> Result<GlobalConfigPatch, GlobalConfigError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(GlobalConfigPatch::default()),
        Err(source) => {
            return Err(GlobalConfigError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    serde_json::from_slice(&raw).map_err(|source| GlobalConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Persists the file layer as given; unset keys stay absent from the file.
pub fn save(path: &Path, patch: &GlobalConfigPatch) -> Result<(), GlobalConfigError> {
    let io_err = |source| GlobalConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let body = serde_json::to_vec_pretty(patch).map_err(|source| GlobalConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, body).map_err(io_err)
}
