//! Engine error taxonomy.
//!
//! `Validation`, `Authorization` and `InsufficientFunds` are normal
//! rejected-input outcomes: no state mutation, message delivered only to
//! the originating identity. `Fatal` aborts the table with a terminal
//! `TABLE_CLOSED` rather than leaving it in a corrupted phase.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed command, bet out of bounds, structurally invalid action.
    #[error("{0}")]
    Validation(String),

    /// Wrong turn, wrong occupant, non-creator close, bad access code.
    /// Deliberately generic so a wrong code is indistinguishable from an
    /// unknown table.
    #[error("{0}")]
    Authorization(String),

    /// Wallet refused the debit.
    #[error("solde insuffisant")]
    InsufficientFunds,

    /// Shoe misconfiguration or internal invariant violation.
    #[error("internal table failure: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        EngineError::Authorization(message.into())
    }

    /// The generic not-found/bad-code rejection (same text for both).
    pub fn table_unavailable() -> Self {
        EngineError::Authorization("table introuvable ou code invalide".into())
    }

    /// True when the table must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}
