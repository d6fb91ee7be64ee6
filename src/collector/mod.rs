pub mod auth;
pub mod directory;
pub mod history;
pub mod link;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use grammers_client::Client;
use grammers_mtsender::SenderPool;
use grammers_session::storages::SqliteSession;
use thiserror::Error;

const APP_DIR: &str = "tg-media-finder";

/// Directory holding session files and logs, unless `DATA_DIR` overrides it.
pub fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Session file for one client identity (`user` or `bot`).
pub fn session_path(data_dir: &Path, identity: &str) -> PathBuf {
    data_dir.join(format!("{}.session", identity))
}

/// Open the session at `path` and build a client on top of it.
///
/// The caller owns the returned pool: its runner must be spawned and kept
/// alive for as long as the client is used.
pub fn connect(path: &Path, api_id: i32) -> Result<(Client, SenderPool), CollectorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(CollectorError::Io)?;
    }

    let session = Arc::new(
        SqliteSession::open(path.to_str().ok_or(CollectorError::InvalidPath)?)
            .map_err(|e| CollectorError::Session(e.to_string()))?,
    );

    let pool = SenderPool::new(Arc::clone(&session), api_id);
    let client = Client::new(&pool);

    Ok((client, pool))
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("session error: {0}")]
    Session(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("flood wait of {0} seconds")]
    FloodWait(u32),
    #[error("invalid session path")]
    InvalidPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_path_per_identity() {
        let dir = PathBuf::from("/tmp/finder");
        assert_eq!(
            session_path(&dir, "user"),
            PathBuf::from("/tmp/finder/user.session")
        );
        assert_eq!(
            session_path(&dir, "bot"),
            PathBuf::from("/tmp/finder/bot.session")
        );
    }

    #[test]
    fn test_default_data_dir() {
        let path = default_data_dir();
        assert!(path.to_string_lossy().contains("tg-media-finder"));
    }

    #[test]
    fn test_flood_wait_display() {
        assert_eq!(
            CollectorError::FloodWait(12).to_string(),
            "flood wait of 12 seconds"
        );
    }
}
