//! Error kinds for the AArch64 backend.
//!
//! The three variants here are all *fatal*: the pipeline halts at the first
//! one and produces no partial assembly (spec §7). Non-fatal conditions
//! (e.g. "large frame detected") never construct a [`CodegenError`] — they
//! are pushed onto [`crate::diag::Diagnostics`] instead and the pipeline
//! keeps going.

use crate::il::Location;
use std::fmt;

/// Result type threaded through every pass in the pipeline.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// A fatal error produced by the backend.
#[derive(Debug, Clone)]
pub enum CodegenError {
    /// The input IL violates an invariant this backend requires (missing
    /// terminator, block-argument type mismatch, unknown opcode).
    InvalidIl {
        message: String,
        location: Option<Location>,
    },

    /// A valid IL construct this backend does not yet lower.
    Unsupported {
        message: String,
        location: Option<Location>,
    },

    /// An internal invariant was violated (unresolved parallel-copy cycle,
    /// unassigned vreg at emit time, ...). Always carries a MIR dump so the
    /// failure is diagnosable without re-running with `--dump-mir-full`.
    Internal { message: String, mir_dump: String },
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::InvalidIl { message, location } => {
                write!(f, "invalid IL{}: {message}", at(*location))
            }
            CodegenError::Unsupported { message, location } => {
                write!(f, "unsupported construct{}: {message}", at(*location))
            }
            CodegenError::Internal { message, mir_dump } => {
                write!(f, "internal codegen error: {message}\n{mir_dump}")
            }
        }
    }
}

fn at(location: Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

impl std::error::Error for CodegenError {}

impl CodegenError {
    pub fn invalid_il(message: impl Into<String>) -> Self {
        CodegenError::InvalidIl {
            message: message.into(),
            location: None,
        }
    }

    pub fn invalid_il_at(message: impl Into<String>, location: Location) -> Self {
        CodegenError::InvalidIl {
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CodegenError::Unsupported {
            message: message.into(),
            location: None,
        }
    }

    pub fn internal(message: impl Into<String>, mir_dump: impl fmt::Display) -> Self {
        CodegenError::Internal {
            message: message.into(),
            mir_dump: mir_dump.to_string(),
        }
    }
}
