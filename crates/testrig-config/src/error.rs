use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "state dir not provided and could not determine default location based on user home dir"
    )]
    HomeDirNotFound,

    #[error("user config file not found: {}", .0.display())]
    ConfigFileNotFound(PathBuf),

    #[error("error decoding user config {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
