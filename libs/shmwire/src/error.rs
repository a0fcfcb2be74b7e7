// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    /// Buffers hold at most `u32::MAX` elements.
    #[error("Allocation limit exceeded: {requested} elements (max {})", u32::MAX)]
    AllocationLimitExceeded { requested: usize },

    /// Attempt to mutate or free storage owned by someone else.
    #[error("Borrow violation: cannot {operation} a buffer that does not own its storage")]
    BorrowViolation { operation: &'static str },

    #[error("Length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Transport full: requested {requested} bytes, {available} available")]
    TransportFull { requested: usize, available: usize },

    #[error("Bad alignment: embedded field at offset {offset} is not {alignment}-byte aligned")]
    BadAlignment { offset: usize, alignment: usize },

    #[error("Corrupt transport: {0}")]
    CorruptTransport(String),

    #[error("Handle duplication failed: {0}")]
    HandleDuplicationFailed(#[source] std::io::Error),

    #[error("Failed to map grantor {grantor}: {reason}")]
    MapFailed { grantor: usize, reason: String },

    #[error("Invalid queue descriptor: {0}")]
    InvalidDescriptor(String),

    /// A transaction-level failure travels as a status code, never as a
    /// serialized exception.
    #[error("Transaction failed with status {0}")]
    TransactionFailed(i32),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WireError {
    /// Errors a caller can recover from by retrying with a larger transport
    /// or after the peer drains it.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WireError::TransportFull { .. })
    }

    /// Errors that indicate a programming mistake or a hostile/corrupted
    /// peer; retrying the same operation cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WireError::AllocationLimitExceeded { .. }
                | WireError::BorrowViolation { .. }
                | WireError::BadAlignment { .. }
                | WireError::CorruptTransport(_)
                | WireError::InvalidDescriptor(_)
        )
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        WireError::CorruptTransport(message.into())
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
