//! Build errors
//!
//! These cover infrastructure failures only (I/O, bad manifests);
//! problems in source code are reported as diagnostics, not errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Manifest(#[from] toml::de::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type BuildResult<T> = Result<T, BuildError>;
