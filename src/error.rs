//! Error taxonomy (§7)
//!
//! `MarketError` covers the two fatal kinds from the spec: configuration
//! problems caught at init, and runtime invariant violations that must halt
//! the simulation. `BidRejection` and `WarmupDrop` are deliberately *not*
//! variants here — §7 is explicit that `submit` never throws across object
//! boundaries, so those two outcomes live in [`crate::bid::SubmitOutcome`]
//! instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("configuration error in {object}: {reason}")]
    Configuration { object: String, reason: String },

    #[error("runtime invariant violated: {0}")]
    RuntimeInvariant(String),

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },
}

impl MarketError {
    pub fn configuration(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            object: object.into(),
            reason: reason.into(),
        }
    }

    pub fn runtime_invariant(reason: impl Into<String>) -> Self {
        Self::RuntimeInvariant(reason.into())
    }

    pub fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
