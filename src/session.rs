use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_STATE_FILE: &str = "shortlist_state.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session file {path} is not valid: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The resumable part of a session. Decoded pixels are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "images_root")]
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub current_index: usize,
    pub total_images: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Local>>,
}

impl Session {
    pub fn new(root: PathBuf, output_dir: PathBuf, current_index: usize, total_images: usize) -> Self {
        Self {
            root,
            output_dir,
            current_index,
            total_images,
            saved_at: None,
        }
    }
}

/// JSON file holding the last session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no session has been saved yet.
    pub fn load(&self) -> Result<Option<Session>, SessionError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| SessionError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Overwrite the stored session, stamping `saved_at`.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut record = session.clone();
        record.saved_at = Some(Local::now());

        let json = serde_json::to_string_pretty(&record).map_err(|source| SessionError::Json {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}
