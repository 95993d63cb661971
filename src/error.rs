//! Error type shared by the session controller and the REST client.
//!
//! Variants fall in three groups: local validation failures (no remote call
//! was attempted), remote failures (network, non-success status, bad body)
//! and environment failures (configuration, credential storage). Every
//! `Display` string is meant to be shown to the user as-is.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PosError {
    #[error("The cart is empty")]
    EmptyCart,

    #[error("Choose a table or an order name before saving")]
    DestinationRequired,

    #[error("Nothing to charge: the cart is empty and no sale is open")]
    NothingToClose,

    #[error("Another sale operation is still in progress")]
    Busy,

    #[error("Table {0} does not exist")]
    UnknownTable(i64),

    #[error("{0}")]
    Network(String),

    #[error("Session expired, please log in again")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("Invalid response from the backend: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl PosError {
    /// True for requests the client refused to carry out. Nothing was
    /// written to the backend, though `UnknownTable` is decided after
    /// reading the current table list.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PosError::EmptyCart
                | PosError::DestinationRequired
                | PosError::NothingToClose
                | PosError::Busy
                | PosError::UnknownTable(_)
        )
    }
}

pub type PosResult<T> = Result<T, PosError>;
