//! Centralized error handling for deepgraph.
//!
//! Every failure inside a clone invocation is represented as a [`CloneError`] and propagated
//! through [`Result`]. Nothing is retried and there is no partial-result mode: the first error
//! aborts the whole `deep_clone` call and the half-built graph is simply dropped.
//!
//! ## Design Philosophy
//!
//! 1. **No Panics:** All error conditions are represented as `Result` values. The library
//!    enforces this through `#![deny(clippy::panic)]` and `#![deny(clippy::unwrap_used)]`.
//!
//! 2. **Contextual Information:** Errors carry the runtime type name and, where available,
//!    the member name, so a failure deep inside a large graph can still be located.
//!
//! 3. **Cloneable Errors:** [`CloneError`] is `Clone`. Under parallel execution the first
//!    failure is captured by a worker thread and handed back to the invoking thread.
//!
//! ## Error Categories
//!
//! - **Configuration** ([`CloneError::Configuration`]): conflicting builder settings or a type
//!   that cannot be copied with the configured capabilities.
//! - **Registration mismatch** ([`CloneError::RegistrationMismatch`]): a copier that does not
//!   honor the `register` contract.
//! - **Member access** ([`CloneError::MemberAccess`]): reading or writing a member failed.
//! - **Copier** ([`CloneError::Copier`]): a custom copier reported a failure of its own.
//! - **Execution** ([`CloneError::Execution`]): a continuation failed on a worker thread.
//! - **Internal** ([`CloneError::Internal`]): logic errors, poisoned locks.
//!
//! ## Usage
//!
//! ```rust
//! use deepgraph::{CloneError, Cloner, Value};
//!
//! fn copy_payload(cloner: &Cloner, payload: &Value) -> deepgraph::Result<Value> {
//!     match cloner.deep_clone(payload) {
//!         Err(CloneError::Configuration(msg)) => {
//!             eprintln!("cloner is misconfigured: {msg}");
//!             Err(CloneError::Configuration(msg))
//!         }
//!         other => other,
//!     }
//! }
//! # let cloner = Cloner::new();
//! # copy_payload(&cloner, &Value::Int(1))?;
//! # Ok::<(), CloneError>(())
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A specialized `Result` type for deepgraph operations.
pub type Result<T> = std::result::Result<T, CloneError>;

/// The master error enum covering all failure domains of a clone invocation.
#[derive(Debug, Clone, Error)]
pub enum CloneError {
    /// The cloner was configured inconsistently, or a type cannot be copied with the
    /// configured capabilities (no usable instantiation path, no introspection data).
    ///
    /// Raised by `ClonerBuilder::build` or the first time the offending type is met.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// A copier did not call `register` before returning, registered twice, or returned a
    /// clone different from the one it registered.
    ///
    /// This always points at a broken custom copier.
    #[error(
        "Registration Mismatch for '{type_name}': {detail}. Custom copiers must call \
         CopyContext::register(original, clone) exactly once, before copying any child"
    )]
    RegistrationMismatch {
        /// Runtime type of the original being copied.
        type_name: String,
        /// What exactly went wrong.
        detail: String,
    },

    /// Reading or writing a member failed (unknown slot, wrong object shape, type mismatch).
    #[error("Member Access Error on '{type_name}.{member}': {reason}")]
    MemberAccess {
        /// Runtime type of the instance.
        type_name: String,
        /// Member name.
        member: String,
        /// Failure description.
        reason: String,
    },

    /// A custom or self-describing copier failed.
    #[error("Copier Error for '{type_name}': {message}")]
    Copier {
        /// Runtime type the copier was handling.
        type_name: String,
        /// Failure description supplied by the copier.
        message: String,
    },

    /// A deferred continuation failed on a worker thread.
    ///
    /// Only produced by parallel execution; the wrapped error is the first failure observed.
    #[error("Execution Error: {0}")]
    Execution(#[source] Arc<CloneError>),

    /// Logic error in the engine (poisoned lock, broken invariant).
    ///
    /// This should not occur in production; it indicates a bug in the library.
    #[error("Internal Logic Error: {0}")]
    Internal(String),
}

impl CloneError {
    /// Builds a [`CloneError::Copier`] for custom copier implementations.
    pub fn copier(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Copier {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn mismatch(type_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::RegistrationMismatch {
            type_name: type_name.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn member(
        type_name: impl Into<String>,
        member: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MemberAccess {
            type_name: type_name.into(),
            member: member.into(),
            reason: reason.into(),
        }
    }

    /// Returns the innermost error, looking through [`CloneError::Execution`] wrappers.
    pub fn root_cause(&self) -> &CloneError {
        let mut current = self;
        while let Self::Execution(inner) = current {
            current = inner;
        }
        current
    }

    /// Returns `true` for [`CloneError::Configuration`], looking through wrappers.
    pub fn is_configuration(&self) -> bool {
        matches!(self.root_cause(), Self::Configuration(_))
    }
}
