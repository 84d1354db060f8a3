use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::{SecretVerifier, SharedSecrets};
use crate::blob::DirBlobStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub docs: Option<DirBlobStore>,
    pub verifier: Box<dyn SecretVerifier>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            docs: None,
            verifier: Box::new(SharedSecrets::default()),
        }
    }
}
