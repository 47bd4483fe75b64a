// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error types for contract violations.
//!
//! These are caller mistakes: out-of-range indices, counts that disagree
//! with a blob's layout, commands issued in the wrong state. Semantic
//! problems with a manifest are reported separately through
//! [`ValidationError`] so that callers can reject a generated manifest
//! without treating it as a programming error.

use crate::validate::ValidationError;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// A record read or write would cross the end of the blob.
    #[error("access of {size} bytes at offset {offset} exceeds blob length {len}")]
    OutOfBounds {
        offset: usize,
        size: usize,
        len: usize,
    },

    /// An index into a counted array was outside of `0..count`.
    #[error("{what} index {index} out of range (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    /// A computed size or offset does not fit the field that stores it.
    #[error("{what} of {size} bytes exceeds the limit of {limit}")]
    Overflow {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("unknown terminal type tag {0}")]
    UnknownTerminalType(u8),

    #[error("unknown program type tag {0}")]
    UnknownProgramType(u8),

    /// The terminal type has no manifest or runtime layout.
    #[error("terminal type {0} has no binary layout")]
    UnsupportedTerminal(&'static str),

    /// A typed terminal accessor was used on a terminal of another kind.
    #[error("terminal {index} is {actual}, expected {expected}")]
    TerminalKind {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A process group command was issued in a state that does not allow it.
    #[error("process group is {state}, expected {expected}")]
    InvalidState {
        state: &'static str,
        expected: &'static str,
    },

    /// The bytes written by an init walk disagree with the computed size.
    #[error("{what} layout consumed {consumed} bytes but sizeof reported {expected}")]
    LayoutMismatch {
        what: &'static str,
        consumed: usize,
        expected: usize,
    },

    #[error("frame format {0} has no known plane layout")]
    UnknownFrameFormat(u32),

    #[error("manifest is not valid: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn index(what: &'static str, index: usize, count: usize) -> Self {
        Error::IndexOutOfRange { what, index, count }
    }
}
