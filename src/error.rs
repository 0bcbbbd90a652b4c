/*
 * Copyright (C) 2021 The Android Open Source Project
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::parcel::{Deserialize, Parcel, Serialize};

use std::error;
use std::ffi::CStr;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::result;

/// Low-level status codes from `libutils`.
///
/// All error codes are negative integer values; `OK` is the only success
/// value. These cover transport and protocol failures. Application-level
/// errors are carried inside reply parcels (see [`Status`]) and never appear
/// here.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[allow(non_camel_case_types)]
#[repr(i32)]
pub enum StatusCode {
    OK = 0,
    UNKNOWN_ERROR = i32::MIN,
    BAD_TYPE = i32::MIN + 1,
    FAILED_TRANSACTION = i32::MIN + 2,
    FDS_NOT_ALLOWED = i32::MIN + 7,
    UNEXPECTED_NULL = i32::MIN + 8,
    PERMISSION_DENIED = -1,
    NAME_NOT_FOUND = -2,
    WOULD_BLOCK = -11,
    NO_MEMORY = -12,
    ALREADY_EXISTS = -17,
    NO_INIT = -19,
    BAD_VALUE = -22,
    DEAD_OBJECT = -32,
    INVALID_OPERATION = -38,
    NOT_ENOUGH_DATA = -61,
    UNKNOWN_TRANSACTION = -74,
    BAD_INDEX = -75,
    TIMED_OUT = -110,
}

/// A specialized [`Result`](result::Result) for binder operations.
pub type Result<T> = result::Result<T, StatusCode>;

impl StatusCode {
    /// Convert a raw status value back into a `StatusCode`.
    ///
    /// Values outside the known status space collapse to `UNKNOWN_ERROR`, the
    /// same way unrecognized codes do when they cross the wire.
    pub fn from_raw(status: i32) -> StatusCode {
        match status {
            0 => StatusCode::OK,
            s if s == StatusCode::BAD_TYPE as i32 => StatusCode::BAD_TYPE,
            s if s == StatusCode::FAILED_TRANSACTION as i32 => StatusCode::FAILED_TRANSACTION,
            s if s == StatusCode::FDS_NOT_ALLOWED as i32 => StatusCode::FDS_NOT_ALLOWED,
            s if s == StatusCode::UNEXPECTED_NULL as i32 => StatusCode::UNEXPECTED_NULL,
            -1 => StatusCode::PERMISSION_DENIED,
            -2 => StatusCode::NAME_NOT_FOUND,
            -11 => StatusCode::WOULD_BLOCK,
            -12 => StatusCode::NO_MEMORY,
            -17 => StatusCode::ALREADY_EXISTS,
            -19 => StatusCode::NO_INIT,
            -22 => StatusCode::BAD_VALUE,
            -32 => StatusCode::DEAD_OBJECT,
            -38 => StatusCode::INVALID_OPERATION,
            -61 => StatusCode::NOT_ENOUGH_DATA,
            -74 => StatusCode::UNKNOWN_TRANSACTION,
            -75 => StatusCode::BAD_INDEX,
            -110 => StatusCode::TIMED_OUT,
            _ => StatusCode::UNKNOWN_ERROR,
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StatusCode::{:?}", self)
    }
}

impl error::Error for StatusCode {}

impl From<i32> for StatusCode {
    fn from(status: i32) -> StatusCode {
        StatusCode::from_raw(status)
    }
}

/// Exception codes reported by the upper protocol layer.
///
/// Unlike [`StatusCode`] these describe failures of the remote method itself
/// and travel inside reply parcels as part of a [`Status`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[allow(non_camel_case_types)]
#[repr(i32)]
pub enum ExceptionCode {
    NONE = 0,
    SECURITY = -1,
    BAD_PARCELABLE = -2,
    ILLEGAL_ARGUMENT = -3,
    NULL_POINTER = -4,
    ILLEGAL_STATE = -5,
    NETWORK_MAIN_THREAD = -6,
    UNSUPPORTED_OPERATION = -7,
    SERVICE_SPECIFIC = -8,
    PARCELABLE = -9,
    /// Special case for transport failures smuggled through the exception
    /// channel. The underlying [`StatusCode`] is preserved alongside.
    TRANSACTION_FAILED = -129,
}

impl ExceptionCode {
    fn from_raw(code: i32) -> ExceptionCode {
        match code {
            0 => ExceptionCode::NONE,
            -1 => ExceptionCode::SECURITY,
            -2 => ExceptionCode::BAD_PARCELABLE,
            -3 => ExceptionCode::ILLEGAL_ARGUMENT,
            -4 => ExceptionCode::NULL_POINTER,
            -5 => ExceptionCode::ILLEGAL_STATE,
            -6 => ExceptionCode::NETWORK_MAIN_THREAD,
            -7 => ExceptionCode::UNSUPPORTED_OPERATION,
            -8 => ExceptionCode::SERVICE_SPECIFIC,
            -9 => ExceptionCode::PARCELABLE,
            _ => ExceptionCode::TRANSACTION_FAILED,
        }
    }

    fn to_str(self) -> &'static str {
        match self {
            ExceptionCode::NONE => "EX_NONE",
            ExceptionCode::SECURITY => "EX_SECURITY",
            ExceptionCode::BAD_PARCELABLE => "EX_BAD_PARCELABLE",
            ExceptionCode::ILLEGAL_ARGUMENT => "EX_ILLEGAL_ARGUMENT",
            ExceptionCode::NULL_POINTER => "EX_NULL_POINTER",
            ExceptionCode::ILLEGAL_STATE => "EX_ILLEGAL_STATE",
            ExceptionCode::NETWORK_MAIN_THREAD => "EX_NETWORK_MAIN_THREAD",
            ExceptionCode::UNSUPPORTED_OPERATION => "EX_UNSUPPORTED_OPERATION",
            ExceptionCode::SERVICE_SPECIFIC => "EX_SERVICE_SPECIFIC",
            ExceptionCode::PARCELABLE => "EX_PARCELABLE",
            ExceptionCode::TRANSACTION_FAILED => "EX_TRANSACTION_FAILED",
        }
    }
}

/// Rich status object for transactions following the exception protocol.
///
/// A `Status` is either success, an exception with an optional human-readable
/// message, or a service-specific error (an exception with an additional
/// integer code chosen by the service). Statuses are written into reply
/// parcels by server code and read back by proxies; a transaction that
/// carries a non-ok `Status` still *delivered* successfully.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Status {
    exception: ExceptionCode,
    error: i32,
    message: Option<String>,
}

impl Status {
    /// The success status.
    pub fn ok() -> Status {
        Status { exception: ExceptionCode::NONE, error: 0, message: None }
    }

    /// Create a status object representing the given exception.
    pub fn new_exception(exception: ExceptionCode, message: Option<&CStr>) -> Status {
        Status {
            exception,
            error: 0,
            message: message.map(|m| m.to_string_lossy().into_owned()),
        }
    }

    /// Create a status object from a service-specific error code.
    pub fn new_service_specific_error(err: i32, message: Option<&CStr>) -> Status {
        Status {
            exception: ExceptionCode::SERVICE_SPECIFIC,
            error: err,
            message: message.map(|m| m.to_string_lossy().into_owned()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exception == ExceptionCode::NONE
    }

    pub fn exception_code(&self) -> ExceptionCode {
        self.exception
    }

    /// The underlying transport status, or `OK` if this status does not
    /// represent a failed transaction.
    pub fn transaction_error(&self) -> StatusCode {
        if self.exception == ExceptionCode::TRANSACTION_FAILED {
            StatusCode::from_raw(self.error)
        } else {
            StatusCode::OK
        }
    }

    /// The service-specific error code, or 0 if this is not a
    /// `SERVICE_SPECIFIC` status.
    pub fn service_specific_error(&self) -> i32 {
        if self.exception == ExceptionCode::SERVICE_SPECIFIC {
            self.error
        } else {
            0
        }
    }

    /// A human-readable rendering, matching the classic `Status::toString8`
    /// format.
    pub fn get_description(&self) -> String {
        if self.exception == ExceptionCode::NONE {
            return "No error".to_string();
        }
        let mut description =
            format!("Status({}, {}): '", self.exception as i32, self.exception.to_str());
        match self.exception {
            ExceptionCode::SERVICE_SPECIFIC => {
                description.push_str(&format!("{}: ", self.error));
            }
            ExceptionCode::TRANSACTION_FAILED => {
                description.push_str(&format!("{}: ", StatusCode::from_raw(self.error)));
            }
            _ => {}
        }
        if let Some(message) = &self.message {
            description.push_str(message);
        }
        description.push('\'');
        description
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.get_description())
    }
}

impl error::Error for Status {}

impl From<StatusCode> for Status {
    fn from(status: StatusCode) -> Status {
        Status {
            exception: ExceptionCode::TRANSACTION_FAILED,
            error: status as i32,
            message: None,
        }
    }
}

impl From<ExceptionCode> for Status {
    fn from(exception: ExceptionCode) -> Status {
        Status::new_exception(exception, None)
    }
}

impl From<Status> for Result<()> {
    fn from(status: Status) -> Result<()> {
        if status.is_ok() {
            Ok(())
        } else if status.exception == ExceptionCode::TRANSACTION_FAILED {
            Err(StatusCode::from_raw(status.error))
        } else {
            Err(StatusCode::FAILED_TRANSACTION)
        }
    }
}

impl Serialize for Status {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        // A failed-transaction status has no parcel representation; the
        // underlying transport error is surfaced to the caller instead.
        if self.exception == ExceptionCode::TRANSACTION_FAILED {
            return Err(StatusCode::from_raw(self.error));
        }
        parcel.write_i32(self.exception as i32)?;
        if self.exception == ExceptionCode::NONE {
            return Ok(());
        }
        parcel.write(&self.message)?;
        if self.exception == ExceptionCode::SERVICE_SPECIFIC {
            parcel.write_i32(self.error)?;
        }
        Ok(())
    }
}

impl Deserialize for Status {
    fn deserialize(parcel: &Parcel) -> Result<Status> {
        let exception = ExceptionCode::from_raw(parcel.read_i32()?);
        if exception == ExceptionCode::NONE {
            return Ok(Status::ok());
        }
        let message: Option<String> = parcel.read()?;
        let error = if exception == ExceptionCode::SERVICE_SPECIFIC {
            parcel.read_i32()?
        } else {
            0
        };
        Ok(Status { exception, error, message })
    }
}
