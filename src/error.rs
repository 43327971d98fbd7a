//! Error types surfaced to callers.

#[cfg(feature = "no_std")]
use alloc::string::String;

use thiserror::Error;

use crate::{EffectKey, ScopeId};

/// Result type alias for bridge operations.
pub type Result<T> = core::result::Result<T, BridgeError>;

/// Errors reported by the registry, proxies and pending calls.
///
/// Stale unbinds and late cancellations are deliberately absent: both are
/// no-ops reported through boolean return values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A synchronous call was dispatched while nothing was bound.
    #[error("no effect bound for {effect} in {scope}")]
    NoEffectBound { effect: EffectKey, scope: ScopeId },

    /// A second binding was installed while the registry rejects replacements.
    #[error("{effect} is already bound in {scope}")]
    DuplicateBind { effect: EffectKey, scope: ScopeId },

    /// The caller cancelled the pending call.
    #[error("pending call was cancelled")]
    Cancelled,

    /// The implementation dropped its responder without answering.
    #[error("implementation of {effect} dropped the call without answering")]
    Abandoned { effect: EffectKey },

    /// The implementation answered with a failure.
    #[error("implementation failed: {reason}")]
    EffectFailed { reason: String },

    /// The scope the call or subscription lived in was torn down.
    #[error("{scope} was closed")]
    ScopeClosed { scope: ScopeId },
}

impl BridgeError {
    /// Create an implementation failure.
    pub fn failed<S: Into<String>>(reason: S) -> Self {
        Self::EffectFailed {
            reason: reason.into(),
        }
    }

    /// Whether the error comes from the caller giving up rather than the
    /// implementation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
