//! The closed error taxonomy used across the crate.
//!
//! Every fallible public operation returns [`ApnsResult<T>`]. Variants are
//! grouped by concern: configuration, lifecycle, transport, Apple
//! protocol, and input/encoding errors.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ApnsResult<T> = std::result::Result<T, ApnsError>;

/// The closed set of errors this client can surface.
///
/// `Display` doubles as `error_string()`: every variant has a
/// human-readable message, and unknown APNs status bytes are preserved
/// on [`ApnsError::Unknown`] rather than discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApnsError {
    // --- Configuration ---
    /// `send`/`connect` was attempted before a certificate was configured.
    #[error("certificate is not set")]
    CertificateIsNotSet,
    /// `send`/`connect` was attempted before a private key was configured.
    #[error("private key is not set")]
    PrivateKeyIsNotSet,
    /// The configured PEM certificate could not be read or parsed.
    #[error("unable to use the specified certificate")]
    UnableToUseSpecifiedCertificate,
    /// The configured PEM private key could not be read, parsed, or it does
    /// not match the certificate.
    #[error("unable to use the specified private key")]
    UnableToUseSpecifiedPrivateKey,
    /// The configured PKCS#12 bundle could not be read, parsed, or the
    /// password was rejected.
    #[error("unable to use the specified PKCS#12 bundle")]
    UnableToUseSpecifiedPkcs12,

    // --- Lifecycle ---
    /// Library-global initialization failed.
    #[error("failed to initialize the library")]
    FailedInit,
    /// A delivery operation was attempted on a context with no open
    /// gateway connection.
    #[error("not connected to the APNs gateway")]
    NotConnected,
    /// A feedback operation was attempted on a context with no open
    /// feedback connection.
    #[error("not connected to the APNs feedback service")]
    NotConnectedFeedback,

    // --- Transport ---
    /// TCP connect failed against every resolved address.
    #[error("could not initialize the TCP connection")]
    CouldNotInitializeConnection,
    /// The TLS handshake failed after the TCP connection was established.
    #[error("could not initialize the SSL connection")]
    CouldNotInitializeSslConnection,
    /// The peer closed the connection cleanly.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// A read or write exceeded its deadline.
    #[error("connection timed out")]
    ConnectionTimedOut,
    /// The peer was unreachable (e.g. a write hit EPIPE).
    #[error("network unreachable")]
    NetworkUnreachable,
    /// A TLS write failed for a reason other than the above.
    #[error("SSL write failed")]
    SslWriteFailed,
    /// A TLS read failed for a reason other than the above.
    #[error("SSL read failed")]
    SslReadFailed,

    // --- Protocol (Apple-originated) ---
    /// APNs status 1.
    #[error("APNs reported a processing error")]
    ProcessingError,
    /// APNs status 10.
    #[error("APNs is shutting down the service")]
    ServiceShutdown,
    /// APNs status 8 or 5 (invalid token / invalid token size).
    #[error("APNs rejected a device token as invalid")]
    TokenInvalid,
    /// APNs status 7.
    #[error("APNs rejected the notification payload size")]
    InvalidPayloadSize,

    // --- Input / encoding ---
    /// Reserved for a higher layer that enforces a maximum batch size;
    /// this crate never returns it itself.
    #[error("too many tokens in a single batch")]
    TokenTooMany,
    /// The external payload encoder failed to produce a binary message.
    #[error("payload encoding failed: {0}")]
    PayloadEncodingFailed(String),
    /// A hex token contained non-UTF-8 bytes.
    #[error("token string contains non-UTF-8 characters")]
    StringContainsNonUtf8Characters,
    /// `send` was called with an empty token list.
    #[error("token list must not be empty")]
    EmptyTokenList,
    /// An APNs error frame carried a command byte other than 8, or a
    /// status byte this crate does not recognize. The raw status is
    /// preserved for logs.
    #[error("unknown APNs status byte: {raw_status}")]
    Unknown {
        /// The unrecognized status byte from the error frame.
        raw_status: u8,
    },
}

impl ApnsError {
    /// Human-readable string for this error code. `Display` already does
    /// this; this is a thin, explicitly-named wrapper callers can reach
    /// for without importing `std::fmt::Display`.
    #[must_use]
    pub fn error_string(&self) -> String {
        self.to_string()
    }

    /// True for the transport errors the delivery loop is allowed to
    /// reconnect past.
    #[must_use]
    pub fn is_reconnectable(&self) -> bool {
        matches!(
            self,
            ApnsError::ConnectionClosed | ApnsError::ServiceShutdown | ApnsError::TokenInvalid
        )
    }
}
