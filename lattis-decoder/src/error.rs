//! Error types for decoding operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Graph loading error: {0}")]
    GraphLoad(String),

    #[error("Symbol table error: {0}")]
    SymbolTable(String),

    #[error("Acoustic scoring error: {0}")]
    Scoring(String),

    #[error("Feature archive error: {0}")]
    Archive(String),

    #[error("Lattice sink error: {0}")]
    Sink(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown model handle: {0}")]
    UnknownHandle(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub fn graph_load<S: Into<String>>(msg: S) -> Self {
        Self::GraphLoad(msg.into())
    }

    pub fn symbol_table<S: Into<String>>(msg: S) -> Self {
        Self::SymbolTable(msg.into())
    }

    pub fn scoring<S: Into<String>>(msg: S) -> Self {
        Self::Scoring(msg.into())
    }

    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::Sink(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
