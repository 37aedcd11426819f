//! # apns-client
//!
//! A client for Apple's legacy binary Push Notification Service (APNs)
//! and its companion feedback service: deliver a notification payload to
//! a list of device tokens over a persistent TLS connection, detect and
//! classify the gateway's asynchronous error frames, and resume delivery
//! at the correct offset after a reconnect.
//!
//! ## Module organization
//!
//! ```text
//! apns-client/
//! ├── error       # the closed ApnsError taxonomy
//! ├── servers     # the static sandbox/production endpoint table
//! ├── frame       # wire-level error-frame and feedback-record parsing
//! ├── encode      # BinaryMessage/PayloadEncoder traits, token hex<->binary
//! ├── session     # the blocking Session I/O trait and its TLS impl
//! ├── tls         # credential loading (PEM / PKCS#12) into an SslConnector
//! ├── connector   # TCP connect + TLS handshake
//! ├── context     # Context: credentials, mode, options, callbacks, lifecycle
//! ├── delivery    # the batch delivery loop
//! └── feedback    # the feedback collector
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use apns_client::{Context, EnhancedEncoder};
//!
//! let mut ctx = Context::init();
//! ctx.set_certificate("cert.pem", "key.pem", None);
//! ctx.connect()?;
//!
//! let tokens = vec!["a".repeat(64)];
//! let outcome = apns_client::send(&mut ctx, &EnhancedEncoder::default(), b"{\"aps\":{}}", &tokens)?;
//! println!("rejected: {:?}", outcome.invalid_tokens);
//! # Ok::<(), apns_client::ApnsError>(())
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::all
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod connector;
pub mod context;
pub mod delivery;
pub mod encode;
pub mod error;
pub mod feedback;
pub mod frame;
pub mod servers;
pub mod session;
mod tls;

pub use context::{
    library_free, library_init, Context, Credentials, InvalidTokenCallback, LogCallback,
    LogLevel, Mode, Options,
};
pub use delivery::{send, SendOutcome};
pub use encode::{
    token_binary_to_hex, token_hex_to_binary, BinaryMessage, EnhancedEncoder,
    EnhancedNotification, PayloadEncoder,
};
pub use error::{ApnsError, ApnsResult};
pub use feedback::feedback;
pub use frame::{classify, ErrorFrame};
pub use session::{Readiness, Session};

/// The crate's version, as recorded in `Cargo.toml`.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Human-readable string for an error code. A thin free-function wrapper
/// around [`ApnsError::error_string`].
#[must_use]
pub fn error_string(error: &ApnsError) -> String {
    error.error_string()
}
