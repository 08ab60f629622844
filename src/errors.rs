//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`WardenError`] separates three families of failure:
//! - Handle-table contract violations (`DuplicateHandle`, `UnknownHandle`, `InvalidParent`)
//! - Precondition failures found before any native call is made (`WrongState`,
//!   `ResourceDestroyed`, `DeviceLost`, `InFlightReference`, ...)
//! - Failures reported by the native layer itself (`NativeOperationFailed`)
//!
//! None of these are retried. Precondition failures leave every piece of
//! tracking state untouched, and so does a native failure: tracking only
//! changes after the native call has confirmed success.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, WardenError>`.
//!
//! ```rust,ignore
//! use gpu_warden::{Result, WardenError};
//!
//! match warden.map_buffer(buffer, MapMode::READ, 0, None) {
//!     Err(WardenError::InFlightReference { .. }) => { /* retry after poll_completions() */ }
//!     other => other?,
//! }
//! ```

use std::fmt;

use thiserror::Error;

use crate::handle::{Generation, Handle, ResourceKind};
use crate::resource::EncoderState;
use crate::submission::SubmissionId;

// ============================================================================
// Subject
// ============================================================================

/// Identifies the resource an error is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub kind: ResourceKind,
    pub generation: Generation,
    pub label: Option<String>,
}

impl Subject {
    #[must_use]
    pub fn new(kind: ResourceKind, generation: Generation, label: Option<String>) -> Self {
        Self {
            kind,
            generation,
            label,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.generation)?;
        if let Some(label) = &self.label {
            write!(f, " '{label}'")?;
        }
        Ok(())
    }
}

// ============================================================================
// NativeError
// ============================================================================

/// Failure code reported by the native graphics library.
///
/// Passed through unchanged; the core never interprets the code.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("native error code {code}{}", message_suffix(.message.as_deref()))]
pub struct NativeError {
    pub code: i32,
    pub message: Option<String>,
}

impl NativeError {
    #[must_use]
    pub fn new(code: i32) -> Self {
        Self {
            code,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

fn message_suffix(message: Option<&str>) -> String {
    message.map(|message| format!(": {message}")).unwrap_or_default()
}

// ============================================================================
// WardenError
// ============================================================================

/// The main error type of the crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WardenError {
    // ========================================================================
    // Handle Table & Graph
    // ========================================================================
    /// The native layer returned a handle that is still registered.
    #[error("Native handle {handle} is already registered as a {kind}")]
    DuplicateHandle { handle: Handle, kind: ResourceKind },

    /// No live resource is registered under this handle.
    #[error("Native handle {0} is not registered")]
    UnknownHandle(Handle),

    /// A child was attached to a parent that is no longer alive.
    #[error("Cannot attach a {child} to {parent}: parent is destroyed")]
    InvalidParent { parent: Subject, child: ResourceKind },

    /// A typed id or parent argument referred to the wrong kind of resource.
    #[error("Expected a {expected}, found a {found}")]
    KindMismatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    // ========================================================================
    // Usage Validation
    // ========================================================================
    /// The resource's current state does not permit the operation.
    #[error("Cannot {op} {subject} while it is {state}")]
    WrongState {
        subject: Subject,
        op: &'static str,
        state: &'static str,
    },

    /// The resource was destroyed, explicitly or by a cascade.
    #[error("{0} has been destroyed")]
    ResourceDestroyed(Subject),

    /// The owning device reported loss; nothing derived from it may be used.
    #[error("Device of {0} is lost")]
    DeviceLost(Subject),

    /// The resource is referenced by submissions the GPU has not finished.
    #[error("Cannot {op} {subject}: referenced by {submissions} in-flight submission(s)")]
    InFlightReference {
        subject: Subject,
        op: &'static str,
        submissions: u32,
    },

    /// Encoder used outside the `Recording → Ended → Submitted` order.
    #[error("Cannot {op} {subject}: encoder is {state}")]
    InvalidEncoderState {
        subject: Subject,
        op: &'static str,
        state: EncoderState,
    },

    /// The resource lacks a usage flag the operation requires.
    #[error("{subject} is missing usage {required}")]
    MissingUsage { subject: Subject, required: String },

    /// A byte range falls outside the buffer or the mapped range.
    #[error("Range {offset}..+{size} is out of bounds for {subject} (limit {limit})")]
    OutOfBounds {
        subject: Subject,
        offset: u64,
        size: u64,
        limit: u64,
    },

    /// An offset or size violates the native alignment rules.
    #[error("Value {value} used with {subject} is not a multiple of {alignment}")]
    Misaligned {
        subject: Subject,
        value: u64,
        alignment: u64,
    },

    /// A descriptor or argument is unusable regardless of state.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Submissions
    // ========================================================================
    /// The submission was never created or has already been retired.
    #[error("Submission {0:?} is not pending")]
    UnknownSubmission(SubmissionId),

    // ========================================================================
    // Native Layer
    // ========================================================================
    /// The native call was made and failed. Tracking state is unchanged.
    #[error("Native {op} failed: {error}")]
    NativeOperationFailed { op: &'static str, error: NativeError },
}

impl WardenError {
    /// Whether this error reports a native-side failure rather than a
    /// precondition the caller violated.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::NativeOperationFailed { .. })
    }
}

/// Alias for `Result<T, WardenError>`.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_message_is_optional() {
        assert_eq!(NativeError::new(7).to_string(), "native error code 7");
        assert_eq!(
            NativeError::with_message(-3, "out of memory").to_string(),
            "native error code -3: out of memory"
        );

        let wrapped = WardenError::NativeOperationFailed {
            op: "create",
            error: NativeError::new(2),
        };
        assert!(wrapped.is_native());
        assert_eq!(wrapped.to_string(), "Native create failed: native error code 2");
    }
}
