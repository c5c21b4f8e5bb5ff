use std::path::{Path, PathBuf};

use {thiserror::Error, tracing::info};

use crate::schema::BotConfig;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Default config file path (`<platform config dir>/bixbot/bixbot.toml`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "bixbot", "bixbot")
        .map(|dirs| dirs.config_dir().join("bixbot.toml"))
}

/// Load the bot configuration.
///
/// An explicit path must exist; the default path may be absent, in which
/// case built-in defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<BotConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => {
                info!("no platform config directory; using built-in defaults");
                return Ok(BotConfig::default());
            },
        },
    };

    if !path.exists() {
        if required {
            return Err(Error::NotFound {
                path: path.display().to_string(),
            });
        }
        info!(path = %path.display(), "no config file; using built-in defaults");
        return Ok(BotConfig::default());
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config = toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}
