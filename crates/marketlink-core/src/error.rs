//! The closed boundary error type.
//!
//! Every operation that crosses the C boundary resolves to exactly one of
//! these variants. The set is closed by design: the FFI result tag is a
//! fixed enumeration mirrored one-to-one by bindings on the other side of
//! the boundary, so adding a variant is a breaking change that requires a
//! version bump of the boundary contract.

use thiserror::Error;

/// Result alias for engine and boundary operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Error type for all boundary-crossing operations.
///
/// Variants are grouped by taxonomy: input validation, exchange-reported,
/// transport/protocol, serialization, runtime/internal, and binding-level.
/// Each carries the message text delivered verbatim across the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    // ---- Input validation ----
    /// An argument failed validation before reaching the venue.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required parameter was not supplied.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    // ---- Exchange-reported ----
    /// The venue rejected the request with its own error payload.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// The requested asset does not exist on the venue.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// The requested symbol does not exist on the venue.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// The venue refused the credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A private endpoint was called without an API key configured.
    #[error("no API key set: {0}")]
    NoApiKeySet(String),

    /// The venue reported an internal server error.
    #[error("internal server error: {0}")]
    InternalServerError(String),

    /// The venue is temporarily unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // ---- Transport / protocol ----
    /// Raw socket failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// Websocket-layer failure.
    #[error("websocket error: {0}")]
    Websocket(String),

    /// The local clock could not produce a request timestamp.
    #[error("failed to get timestamp: {0}")]
    GetTimestampFailed(String),

    /// A timestamp was outside the window the venue accepts.
    #[error("timestamp error: {0}")]
    Timestamp(String),

    /// The HTTP request layer failed.
    #[error("request error: {0}")]
    RequestFailed(String),

    /// A request or response header was malformed.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Request payload signing failed or was rejected.
    #[error("invalid payload signature: {0}")]
    InvalidPayloadSignature(String),

    /// The venue answered with something the protocol does not know.
    #[error("unknown response: {0}")]
    UnknownResponse(String),

    /// The venue answered with bytes that could not be parsed at all.
    #[error("response not parsable: {0}")]
    NotParsableResponse(String),

    /// A websocket message kind is not supported by this boundary.
    #[error("message not supported: {0}")]
    MessageNotSupported(String),

    // ---- Serialization ----
    /// Structured-format (JSON) decoding failed.
    #[error("json error: {0}")]
    Json(String),

    /// A decimal field could not be parsed.
    #[error("decimal parse error: {0}")]
    ParseDecimal(String),

    /// A URL could not be constructed or parsed.
    #[error("url parse error: {0}")]
    UrlParse(String),

    // ---- Runtime / internal ----
    /// I/O failure outside the transport layer.
    #[error("io error: {0}")]
    Io(String),

    /// A lock guarding shared state was poisoned.
    #[error("poisoned lock: {0}")]
    Poisoned(String),

    /// The operation is not implemented for this venue.
    #[error("missing implementation: {0}")]
    MissingImplementation(String),

    // ---- Binding-level ----
    /// Client construction failed.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Subscription setup or delivery failed.
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    /// No market pair matched the request.
    #[error("no market pair found: {0}")]
    NoMarketPair(String),
}

impl ExchangeError {
    /// Create an input-validation error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a missing-parameter error.
    pub fn missing_parameter(message: impl Into<String>) -> Self {
        Self::MissingParameter(message.into())
    }

    /// Create a symbol-not-found error for `market`.
    #[must_use]
    pub fn symbol_not_found(market: &str) -> Self {
        Self::SymbolNotFound(format!("unknown market pair: {market}"))
    }

    /// Create a no-API-key error.
    pub fn no_api_key(message: impl Into<String>) -> Self {
        Self::NoApiKeySet(message.into())
    }

    /// Create a subscription error.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::SubscriptionFailed(message.into())
    }

    /// Create an initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::InitializationFailed(message.into())
    }

    /// The message text carried across the boundary.
    ///
    /// This is the inner payload, not the `Display` rendering: bindings
    /// prepend their own classification and want the venue text verbatim.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::MissingParameter(m)
            | Self::Exchange(m)
            | Self::AssetNotFound(m)
            | Self::SymbolNotFound(m)
            | Self::Unauthorized(m)
            | Self::NoApiKeySet(m)
            | Self::InternalServerError(m)
            | Self::ServiceUnavailable(m)
            | Self::Socket(m)
            | Self::Websocket(m)
            | Self::GetTimestampFailed(m)
            | Self::Timestamp(m)
            | Self::RequestFailed(m)
            | Self::InvalidHeader(m)
            | Self::InvalidPayloadSignature(m)
            | Self::UnknownResponse(m)
            | Self::NotParsableResponse(m)
            | Self::MessageNotSupported(m)
            | Self::Json(m)
            | Self::ParseDecimal(m)
            | Self::UrlParse(m)
            | Self::Io(m)
            | Self::Poisoned(m)
            | Self::MissingImplementation(m)
            | Self::InitializationFailed(m)
            | Self::SubscriptionFailed(m)
            | Self::NoMarketPair(m) => m,
        }
    }

    /// Rebuild a variant from its tag discriminant and message.
    ///
    /// Used by host bindings converting a wire tag back into an error.
    /// Returns `None` for the success discriminant (`0`) and for values
    /// outside the closed set.
    #[must_use]
    pub fn from_tag(tag: u32, message: String) -> Option<Self> {
        let err = match tag {
            1 => Self::InvalidArgument(message),
            2 => Self::MissingParameter(message),
            3 => Self::Exchange(message),
            4 => Self::AssetNotFound(message),
            5 => Self::SymbolNotFound(message),
            6 => Self::Unauthorized(message),
            7 => Self::NoApiKeySet(message),
            8 => Self::InternalServerError(message),
            9 => Self::ServiceUnavailable(message),
            10 => Self::Socket(message),
            11 => Self::Websocket(message),
            12 => Self::GetTimestampFailed(message),
            13 => Self::Timestamp(message),
            14 => Self::RequestFailed(message),
            15 => Self::InvalidHeader(message),
            16 => Self::InvalidPayloadSignature(message),
            17 => Self::UnknownResponse(message),
            18 => Self::NotParsableResponse(message),
            19 => Self::MessageNotSupported(message),
            20 => Self::Json(message),
            21 => Self::ParseDecimal(message),
            22 => Self::UrlParse(message),
            23 => Self::Io(message),
            24 => Self::Poisoned(message),
            25 => Self::MissingImplementation(message),
            26 => Self::InitializationFailed(message),
            27 => Self::SubscriptionFailed(message),
            28 => Self::NoMarketPair(message),
            _ => return None,
        };
        Some(err)
    }

    /// The tag discriminant for this variant (`0` is reserved for success).
    #[must_use]
    pub fn tag(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 1,
            Self::MissingParameter(_) => 2,
            Self::Exchange(_) => 3,
            Self::AssetNotFound(_) => 4,
            Self::SymbolNotFound(_) => 5,
            Self::Unauthorized(_) => 6,
            Self::NoApiKeySet(_) => 7,
            Self::InternalServerError(_) => 8,
            Self::ServiceUnavailable(_) => 9,
            Self::Socket(_) => 10,
            Self::Websocket(_) => 11,
            Self::GetTimestampFailed(_) => 12,
            Self::Timestamp(_) => 13,
            Self::RequestFailed(_) => 14,
            Self::InvalidHeader(_) => 15,
            Self::InvalidPayloadSignature(_) => 16,
            Self::UnknownResponse(_) => 17,
            Self::NotParsableResponse(_) => 18,
            Self::MessageNotSupported(_) => 19,
            Self::Json(_) => 20,
            Self::ParseDecimal(_) => 21,
            Self::UrlParse(_) => 22,
            Self::Io(_) => 23,
            Self::Poisoned(_) => 24,
            Self::MissingImplementation(_) => 25,
            Self::InitializationFailed(_) => 26,
            Self::SubscriptionFailed(_) => 27,
            Self::NoMarketPair(_) => 28,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        let err = ExchangeError::symbol_not_found("BTC-USD");
        let rebuilt = ExchangeError::from_tag(err.tag(), err.message().to_string()).unwrap();
        assert_eq!(err, rebuilt);
    }

    #[test]
    fn test_all_tags_round_trip() {
        for tag in 1..=28 {
            let err = ExchangeError::from_tag(tag, "m".into()).unwrap();
            assert_eq!(err.tag(), tag);
        }
    }

    #[test]
    fn test_zero_and_out_of_range_tags_rejected() {
        assert!(ExchangeError::from_tag(0, "m".into()).is_none());
        assert!(ExchangeError::from_tag(29, "m".into()).is_none());
        assert!(ExchangeError::from_tag(u32::MAX, "m".into()).is_none());
    }

    #[test]
    fn test_message_is_verbatim() {
        let err = ExchangeError::Exchange("insufficient balance".into());
        assert_eq!(err.message(), "insufficient balance");
        assert!(err.to_string().contains("insufficient balance"));
    }
}
