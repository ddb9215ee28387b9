//! Error types for tandem

use thiserror::Error;

use crate::module::ModuleKind;

#[derive(Debug, Error)]
pub enum TandemError {
    #[error("Invalid tempo: {0} bpm (must be > 0)")]
    InvalidTempo(f64),
    #[error("Unknown module: {0}")]
    UnknownModule(String),
    #[error("Unknown field {field} for module {module:?}")]
    UnknownField { module: ModuleKind, field: String },
    #[error("Module not joined: {0:?}")]
    NotJoined(ModuleKind),
    #[error("Step cycle needs at least one step")]
    EmptyCycle,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TandemError>;
