//! The tagged result every boundary function returns.
//!
//! A boundary call resolves to a `(tag, message)` pair returned by value:
//! tag `Ok` with a null message on success, otherwise one of the closed
//! error tags with an owned message string the caller must release through
//! `free_string` (or consume through [`FfiResult::into_result`]).

use std::ffi::c_char;
use std::ptr;

use marketlink_core::{ExchangeError, Result};

use crate::string::{consume_cstring, owned_string};

/// Classification tag of an [`FfiResult`].
///
/// Mirrors `ExchangeError` one-to-one, with `Ok = 0` reserved for success.
/// The set is closed: bindings hard-code these discriminants, so extending
/// it is a boundary version bump.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTag {
    /// Success.
    Ok = 0,
    /// An argument failed validation.
    InvalidArgument = 1,
    /// A required parameter was not supplied.
    MissingParameter = 2,
    /// The venue rejected the request.
    Exchange = 3,
    /// Unknown asset.
    AssetNotFound = 4,
    /// Unknown symbol.
    SymbolNotFound = 5,
    /// Credentials refused.
    Unauthorized = 6,
    /// Private endpoint called without an API key.
    NoApiKeySet = 7,
    /// Venue-side internal error.
    InternalServerError = 8,
    /// Venue temporarily unavailable.
    ServiceUnavailable = 9,
    /// Raw socket failure.
    Socket = 10,
    /// Websocket-layer failure.
    Websocket = 11,
    /// Request timestamp could not be produced.
    GetTimestampFailed = 12,
    /// Timestamp outside the accepted window.
    Timestamp = 13,
    /// HTTP request layer failed.
    RequestFailed = 14,
    /// Malformed header.
    InvalidHeader = 15,
    /// Payload signing failed.
    InvalidPayloadSignature = 16,
    /// Unrecognized venue response.
    UnknownResponse = 17,
    /// Unparsable venue response.
    NotParsableResponse = 18,
    /// Unsupported websocket message kind.
    MessageNotSupported = 19,
    /// JSON decoding failed.
    Json = 20,
    /// Decimal field could not be parsed.
    ParseDecimal = 21,
    /// URL could not be parsed.
    UrlParse = 22,
    /// I/O failure.
    Io = 23,
    /// Poisoned lock.
    Poisoned = 24,
    /// Operation not implemented for this venue.
    MissingImplementation = 25,
    /// Client construction failed.
    InitializationFailed = 26,
    /// Subscription setup or delivery failed.
    SubscriptionFailed = 27,
    /// No market pair matched.
    NoMarketPair = 28,
}

impl ResultTag {
    /// Map a raw discriminant back into the closed set.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        let tag = match value {
            0 => Self::Ok,
            1 => Self::InvalidArgument,
            2 => Self::MissingParameter,
            3 => Self::Exchange,
            4 => Self::AssetNotFound,
            5 => Self::SymbolNotFound,
            6 => Self::Unauthorized,
            7 => Self::NoApiKeySet,
            8 => Self::InternalServerError,
            9 => Self::ServiceUnavailable,
            10 => Self::Socket,
            11 => Self::Websocket,
            12 => Self::GetTimestampFailed,
            13 => Self::Timestamp,
            14 => Self::RequestFailed,
            15 => Self::InvalidHeader,
            16 => Self::InvalidPayloadSignature,
            17 => Self::UnknownResponse,
            18 => Self::NotParsableResponse,
            19 => Self::MessageNotSupported,
            20 => Self::Json,
            21 => Self::ParseDecimal,
            22 => Self::UrlParse,
            23 => Self::Io,
            24 => Self::Poisoned,
            25 => Self::MissingImplementation,
            26 => Self::InitializationFailed,
            27 => Self::SubscriptionFailed,
            28 => Self::NoMarketPair,
            _ => return None,
        };
        Some(tag)
    }
}

impl From<&ExchangeError> for ResultTag {
    fn from(err: &ExchangeError) -> Self {
        // The error's tag space is the same closed set shifted past Ok, so
        // the lookup cannot miss.
        Self::from_u32(err.tag()).unwrap_or(Self::InternalServerError)
    }
}

/// Result of a boundary call, returned by value.
///
/// Invariant: `tag == ResultTag::Ok` if and only if `message` is null.
/// A non-null `message` is an owned string the caller releases exactly
/// once, either with `free_string` or by consuming the result through
/// [`FfiResult::into_result`].
#[repr(C)]
#[derive(Debug)]
pub struct FfiResult {
    /// Success/error classification.
    pub tag: ResultTag,
    /// Owned error message, null on success.
    pub message: *mut c_char,
}

impl FfiResult {
    /// The success result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            tag: ResultTag::Ok,
            message: ptr::null_mut(),
        }
    }

    /// Whether this result carries the success tag.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.tag == ResultTag::Ok
    }

    /// Consume the result into a plain `Result`, releasing the message.
    ///
    /// This is the host-side single-use accessor: the message string is
    /// read and freed in the same step, so the invariant of exactly one
    /// release holds by construction.
    ///
    /// # Errors
    ///
    /// Returns the reconstructed [`ExchangeError`] for any non-`Ok` tag.
    ///
    /// # Safety
    ///
    /// `self.message` must be null or an unreleased pointer produced by
    /// this library. The pointer is invalid after this call.
    pub unsafe fn into_result(self) -> Result<()> {
        // SAFETY: caller guarantees the message is ours and unreleased.
        let message = unsafe { consume_cstring(self.message) };
        match ExchangeError::from_tag(self.tag as u32, message) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<ExchangeError> for FfiResult {
    fn from(err: ExchangeError) -> Self {
        Self {
            tag: ResultTag::from(&err),
            message: owned_string(err.message()),
        }
    }
}

/// Collapse a boundary operation's outcome into an [`FfiResult`].
pub(crate) fn ffi_result(outcome: Result<()>) -> FfiResult {
    match outcome {
        Ok(()) => FfiResult::ok(),
        Err(err) => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_ok_has_null_message() {
        let result = FfiResult::ok();
        assert!(result.is_ok());
        assert!(result.message.is_null());
    }

    #[test]
    fn test_error_has_message() {
        let result = FfiResult::from(ExchangeError::symbol_not_found("BTC-USD"));
        assert_eq!(result.tag, ResultTag::SymbolNotFound);
        assert!(!result.message.is_null());

        // SAFETY: message was just allocated by the conversion
        let text = unsafe { CStr::from_ptr(result.message).to_str().unwrap() };
        assert!(text.contains("BTC-USD"));

        // SAFETY: message is unreleased
        unsafe { crate::string::free_string(result.message) };
    }

    #[test]
    fn test_into_result_round_trips_error() {
        let original = ExchangeError::invalid_argument("size must be positive");
        let result = FfiResult::from(original.clone());
        // SAFETY: message is unreleased
        let back = unsafe { result.into_result() }.unwrap_err();
        assert_eq!(back, original);
    }

    #[test]
    fn test_into_result_ok() {
        // SAFETY: message is null
        assert!(unsafe { FfiResult::ok().into_result() }.is_ok());
    }

    #[test]
    fn test_tag_discriminants_are_stable() {
        assert_eq!(ResultTag::Ok as u32, 0);
        assert_eq!(ResultTag::InvalidArgument as u32, 1);
        assert_eq!(ResultTag::NoMarketPair as u32, 28);
        for value in 0..=28 {
            assert_eq!(ResultTag::from_u32(value).unwrap() as u32, value);
        }
        assert!(ResultTag::from_u32(29).is_none());
    }

    #[test]
    fn test_every_error_variant_maps_to_its_tag() {
        for tag in 1..=28 {
            let err = ExchangeError::from_tag(tag, "m".into()).unwrap();
            assert_eq!(ResultTag::from(&err) as u32, tag);
        }
    }
}
