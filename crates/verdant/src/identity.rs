//! Persistent player id.
//!
//! The config may pin one. Otherwise the id lives in a file next to the
//! config, generated on first start and reused ever after.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use verdant_core::generate_player_id;

use crate::error::{AppError, AppResult};

/// Name of the file holding a generated id.
pub const PLAYER_ID_FILE: &str = "verdant_player_id";

/// Id file used for `config_path`.
#[must_use]
pub fn id_file(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map_or_else(|| PathBuf::from(PLAYER_ID_FILE), |dir| dir.join(PLAYER_ID_FILE))
}

/// The configured id, else the stored one, else a fresh one saved for next time.
///
/// # Errors
///
/// Returns [`AppError::Io`] when the id file cannot be read or written.
pub fn resolve<R: Rng>(config_path: &Path, configured: Option<&str>, rng: &mut R) -> AppResult<String> {
    if let Some(id) = configured {
        return Ok(id.to_owned());
    }
    let path = id_file(config_path);
    match fs::read_to_string(&path) {
        Ok(stored) if !stored.trim().is_empty() => {
            tracing::debug!("player id read from {}", path.display());
            return Ok(stored.trim().to_owned());
        }
        Ok(_) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return Err(AppError::io(path, error)),
    }

    let id = generate_player_id(rng);
    fs::write(&path, format!("{id}\n")).map_err(|e| AppError::io(&path, e))?;
    tracing::info!("generated player id {} (saved to {})", id, path.display());
    Ok(id)
}
