// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Call outcome carried back across an interface boundary.

use std::fmt;

use crate::buffers::WireString;
use crate::codec::{Decoder, Encoder, RegionHandle, WireType, get_i32, put_i32};
use crate::error::{Result, WireError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExceptionCode {
    None = 0,
    Security = -1,
    BadParcelable = -2,
    IllegalArgument = -3,
    NullPointer = -4,
    IllegalState = -5,
    NetworkMainThread = -6,
    UnsupportedOperation = -7,
    ServiceSpecific = -8,
    HasReplyHeader = -128,
    TransactionFailed = -129,
}

impl ExceptionCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ExceptionCode {
    type Error = WireError;

    fn try_from(code: i32) -> Result<Self> {
        Ok(match code {
            0 => Self::None,
            -1 => Self::Security,
            -2 => Self::BadParcelable,
            -3 => Self::IllegalArgument,
            -4 => Self::NullPointer,
            -5 => Self::IllegalState,
            -6 => Self::NetworkMainThread,
            -7 => Self::UnsupportedOperation,
            -8 => Self::ServiceSpecific,
            -128 => Self::HasReplyHeader,
            -129 => Self::TransactionFailed,
            other => return Err(WireError::corrupt(format!("unknown exception code {}", other))),
        })
    }
}

/// Exception code, an error code whose meaning depends on the exception,
/// and a message.
///
/// `error_code` is the service-specific code for
/// [`ExceptionCode::ServiceSpecific`], the transport status for
/// [`ExceptionCode::TransactionFailed`], and zero otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    exception: ExceptionCode,
    error_code: i32,
    message: WireString<'static>,
}

impl Status {
    const OFFSET_OF_EXCEPTION: usize = 0;
    const OFFSET_OF_ERROR_CODE: usize = 4;
    const OFFSET_OF_MESSAGE: usize = 8;

    pub fn ok() -> Self {
        Self {
            exception: ExceptionCode::None,
            error_code: 0,
            message: WireString::new(),
        }
    }

    pub fn from_exception(exception: ExceptionCode, message: &str) -> Result<Self> {
        Ok(Self {
            exception,
            error_code: 0,
            message: WireString::try_from(message)?,
        })
    }

    pub fn from_service_specific_error(code: i32, message: &str) -> Result<Self> {
        Ok(Self {
            exception: ExceptionCode::ServiceSpecific,
            error_code: code,
            message: WireString::try_from(message)?,
        })
    }

    /// A transport-level failure. Status `0` means success.
    pub fn from_transaction_error(status: i32) -> Self {
        if status == 0 {
            return Self::ok();
        }
        Self {
            exception: ExceptionCode::TransactionFailed,
            error_code: status,
            message: WireString::new(),
        }
    }

    /// Reports a local runtime failure to the remote side.
    pub fn from_wire_error(err: &WireError) -> Self {
        let exception = match err {
            WireError::TransactionFailed(code) => return Self::from_transaction_error(*code),
            WireError::CorruptTransport(_)
            | WireError::BadAlignment { .. }
            | WireError::TransportFull { .. }
            | WireError::AllocationLimitExceeded { .. } => ExceptionCode::BadParcelable,
            WireError::BorrowViolation { .. }
            | WireError::LengthMismatch { .. }
            | WireError::InvalidDescriptor(_) => ExceptionCode::IllegalArgument,
            _ => ExceptionCode::IllegalState,
        };
        // The rendered message always fits a wire string; fall back to no
        // message rather than fail the conversion.
        let message = WireString::try_from(err.to_string()).unwrap_or_default();
        Self {
            exception,
            error_code: 0,
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exception == ExceptionCode::None
    }

    pub fn exception_code(&self) -> ExceptionCode {
        self.exception
    }

    pub fn exception_message(&self) -> &str {
        self.message.as_str()
    }

    pub fn service_specific_error_code(&self) -> i32 {
        if self.exception == ExceptionCode::ServiceSpecific {
            self.error_code
        } else {
            0
        }
    }

    pub fn transaction_error(&self) -> i32 {
        if self.exception == ExceptionCode::TransactionFailed {
            self.error_code
        } else {
            0
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "No error");
        }
        write!(f, "Status({}): '", self.exception.code())?;
        match self.exception {
            ExceptionCode::ServiceSpecific | ExceptionCode::TransactionFailed => {
                write!(f, "{}: ", self.error_code)?
            }
            _ => {}
        }
        write!(f, "{}'", self.message)
    }
}

impl WireType for Status {
    const INLINE_SIZE: usize = 32;

    fn encode_inline(&self, out: &mut [u8]) {
        put_i32(out, Self::OFFSET_OF_EXCEPTION, self.exception.code());
        put_i32(out, Self::OFFSET_OF_ERROR_CODE, self.error_code);
        self.message.encode_inline(
            &mut out[Self::OFFSET_OF_MESSAGE..Self::OFFSET_OF_MESSAGE + WireString::INLINE_SIZE],
        );
    }

    /// A failed transaction never crossed the boundary, so it cannot be sent
    /// back across it.
    fn encode_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<()> {
        if self.exception == ExceptionCode::TransactionFailed {
            tracing::warn!(
                "[Status] Refusing to encode transaction failure {}",
                self.error_code
            );
            return Err(WireError::TransactionFailed(self.error_code));
        }
        self.message
            .write_embedded(enc, parent, offset + Self::OFFSET_OF_MESSAGE)?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let inline = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
        let exception = ExceptionCode::try_from(get_i32(inline, Self::OFFSET_OF_EXCEPTION))?;
        let error_code = get_i32(inline, Self::OFFSET_OF_ERROR_CODE);
        let message = dec.decode(parent, offset + Self::OFFSET_OF_MESSAGE)?;
        Ok(Self {
            exception,
            error_code,
            message,
        })
    }
}
