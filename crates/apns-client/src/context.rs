//! The `Context` handle: credentials, mode, behavior/log-level bitsets,
//! callbacks, and the open transport (if any).

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

use bitflags::bitflags;

use crate::connector;
use crate::error::{ApnsError, ApnsResult};
use crate::servers::{feedback_endpoint, gateway_endpoint};
use crate::session::Session;
use crate::tls::HandshakeLog;

pub use crate::servers::Mode;

bitflags! {
    /// The context's behavior bitset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Options: u8 {
        /// Auto-reconnect and resume after a recoverable delivery error.
        const RECONNECT_ON_ERROR = 0b0000_0001;
        /// Mirror log messages to stderr in addition to the log callback.
        const LOG_TO_STDERR      = 0b0000_0010;
    }
}

bitflags! {
    /// The context's log-level bitset. Bits are AND-tested: a message at
    /// a given level is only delivered to the callback/stderr when that
    /// bit is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogLevel: u8 {
        /// Handshake/connect milestones.
        const INFO  = 0b0000_0001;
        /// Rejected tokens and terminal failures.
        const ERROR = 0b0000_0010;
        /// Per-frame detail.
        const DEBUG = 0b0000_0100;
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::ERROR
    }
}

/// Exactly one of a PEM cert+key pair or a PKCS#12 bundle.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A PEM certificate and private key, with an optional key
    /// passphrase.
    Pem {
        cert_path: PathBuf,
        key_path: PathBuf,
        key_password: Option<String>,
    },
    /// A PKCS#12 bundle. The password is required by the container
    /// format, not just by this API.
    Pkcs12 { path: PathBuf, password: String },
}

/// `(level, message)` log sink. Side-effect-free with respect to
/// `Context` state.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// `(hex_token, index)` notifier, invoked exactly once per rejected
/// token during a `send`.
pub type InvalidTokenCallback = Arc<dyn Fn(&str, usize) + Send + Sync>;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

static LIB_INIT: Once = Once::new();

/// Idempotent, process-wide library initialization. Safe to call any
/// number of times from any number of threads; [`Context::init`] already
/// calls this on first use, so most callers never need to call it
/// directly.
pub fn library_init() -> ApnsResult<()> {
    LIB_INIT.call_once(openssl::init);
    Ok(())
}

/// Process-wide teardown. There is no global resource this crate holds
/// past process exit; provided for API symmetry with [`library_init`].
pub fn library_free() {}

enum Transport {
    Gateway(Box<dyn Session>),
    Feedback(Box<dyn Session>),
}

/// A process-local handle holding credentials, mode, behavior, and (when
/// open) the live transport to either the gateway or the feedback
/// service. Not safe for concurrent use from multiple threads.
pub struct Context {
    credentials: Option<Credentials>,
    mode: Mode,
    options: Options,
    log_level: LogLevel,
    log_callback: Option<LogCallback>,
    invalid_token_callback: Option<InvalidTokenCallback>,
    transport: Option<Transport>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("mode", &self.mode)
            .field("options", &self.options)
            .field("log_level", &self.log_level)
            .field("has_credentials", &self.credentials.is_some())
            .field(
                "transport",
                &match &self.transport {
                    Some(Transport::Gateway(_)) => "gateway",
                    Some(Transport::Feedback(_)) => "feedback",
                    None => "closed",
                },
            )
            .finish()
    }
}

struct ContextLogSink {
    log_level: LogLevel,
    options: Options,
    callback: Option<LogCallback>,
}

impl HandshakeLog for ContextLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        emit_log(self.log_level, self.options, &self.callback, level, message);
    }
}

fn emit_log(
    enabled: LogLevel,
    options: Options,
    callback: &Option<LogCallback>,
    level: LogLevel,
    message: &str,
) {
    match level {
        LogLevel::DEBUG => tracing::debug!("{message}"),
        LogLevel::ERROR => tracing::error!("{message}"),
        _ => tracing::info!("{message}"),
    }
    if !enabled.contains(level) {
        return;
    }
    if let Some(cb) = callback {
        cb(level, message);
    }
    if options.contains(Options::LOG_TO_STDERR) {
        eprintln!("[{level:?}] {message}");
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::init()
    }
}

impl Context {
    /// Fresh context with safe defaults: production mode,
    /// `log_level = ERROR`, no credentials, no transport.
    #[must_use]
    pub fn init() -> Self {
        let _ = library_init();
        Self {
            credentials: None,
            mode: Mode::Production,
            options: Options::empty(),
            log_level: LogLevel::default(),
            log_callback: None,
            invalid_token_callback: None,
            transport: None,
        }
    }

    /// Configure a PEM certificate and private key, with an optional key
    /// passphrase. Credentials are immutable while a transport is open;
    /// calling this on an open context is a programmer error.
    pub fn set_certificate(
        &mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        key_password: Option<String>,
    ) {
        debug_assert!(
            self.transport.is_none(),
            "credentials are immutable while a transport is open"
        );
        self.credentials = Some(Credentials::Pem {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            key_password,
        });
    }

    /// Configure a PKCS#12 bundle. The password is required.
    pub fn set_pkcs12(&mut self, path: impl Into<PathBuf>, password: impl Into<String>) {
        debug_assert!(
            self.transport.is_none(),
            "credentials are immutable while a transport is open"
        );
        self.credentials = Some(Credentials::Pkcs12 {
            path: path.into(),
            password: password.into(),
        });
    }

    /// Select the sandbox or production APNs environment.
    pub fn set_mode(&mut self, mode: Mode) {
        debug_assert!(
            self.transport.is_none(),
            "mode is immutable while a transport is open"
        );
        self.mode = mode;
    }

    /// Replace the behavior bitset (`RECONNECT_ON_ERROR`, `LOG_TO_STDERR`).
    pub fn set_behavior(&mut self, options: Options) {
        self.options = options;
    }

    /// Replace the log-level bitset.
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    /// Register the log sink. `None` clears a previously-set callback.
    pub fn set_log_callback(
        &mut self,
        callback: Option<impl Fn(LogLevel, &str) + Send + Sync + 'static>,
    ) {
        self.log_callback = callback.map(|cb| Arc::new(cb) as LogCallback);
    }

    /// Register the invalid-token notifier. `None` clears a
    /// previously-set callback.
    pub fn set_invalid_token_callback(
        &mut self,
        callback: Option<impl Fn(&str, usize) + Send + Sync + 'static>,
    ) {
        self.invalid_token_callback = callback.map(|cb| Arc::new(cb) as InvalidTokenCallback);
    }

    /// True while connected to the delivery gateway.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.transport, Some(Transport::Gateway(_)))
    }

    /// True while connected to the feedback service.
    #[must_use]
    pub fn is_feedback_connected(&self) -> bool {
        matches!(self.transport, Some(Transport::Feedback(_)))
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current behavior bitset.
    #[must_use]
    pub fn behavior(&self) -> Options {
        self.options
    }

    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        emit_log(self.log_level, self.options, &self.log_callback, level, message);
    }

    pub(crate) fn notify_invalid_token(&self, hex_token: &str, index: usize) {
        if let Some(cb) = &self.invalid_token_callback {
            cb(hex_token, index);
        }
    }

    fn log_sink(&self) -> Arc<dyn HandshakeLog> {
        Arc::new(ContextLogSink {
            log_level: self.log_level,
            options: self.options,
            callback: self.log_callback.clone(),
        })
    }

    /// Connect to the delivery gateway for the current mode. Idempotent
    /// when already connected to the gateway.
    pub fn connect(&mut self) -> ApnsResult<()> {
        self.connect_to(false)
    }

    /// Connect to the feedback service for the current mode. Idempotent
    /// when already connected to feedback.
    pub fn feedback_connect(&mut self) -> ApnsResult<()> {
        self.connect_to(true)
    }

    fn connect_to(&mut self, feedback: bool) -> ApnsResult<()> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ApnsError::CertificateIsNotSet)?;

        if let Some(existing) = &self.transport {
            let already_right_kind = matches!(
                (existing, feedback),
                (Transport::Gateway(_), false) | (Transport::Feedback(_), true)
            );
            if already_right_kind {
                return Ok(());
            }
            self.close();
        }

        let (host, port) = if feedback {
            feedback_endpoint(self.mode)
        } else {
            gateway_endpoint(self.mode)
        };
        let session: Box<dyn Session> =
            Box::new(connector::connect(credentials, host, port, self.log_sink())?);
        self.transport = Some(if feedback {
            Transport::Feedback(session)
        } else {
            Transport::Gateway(session)
        });
        Ok(())
    }

    /// Install a pre-built session directly, bypassing TCP/TLS. Used by
    /// tests to exercise the delivery loop and feedback collector against
    /// a mock [`Session`] without a real gateway.
    #[cfg(test)]
    pub(crate) fn attach_gateway_session_for_test(&mut self, session: Box<dyn Session>) {
        self.transport = Some(Transport::Gateway(session));
    }

    #[cfg(test)]
    pub(crate) fn attach_feedback_session_for_test(&mut self, session: Box<dyn Session>) {
        self.transport = Some(Transport::Feedback(session));
    }

    /// Close, wait the fixed backoff, and reconnect to the gateway.
    /// Used by the delivery loop's auto-reconnect step.
    pub(crate) fn reconnect_gateway(&mut self) -> ApnsResult<()> {
        self.close();
        std::thread::sleep(RECONNECT_DELAY);
        self.connect()
    }

    pub(crate) fn gateway_session_mut(&mut self) -> ApnsResult<&mut dyn Session> {
        match &mut self.transport {
            Some(Transport::Gateway(session)) => Ok(session.as_mut()),
            _ => Err(ApnsError::NotConnected),
        }
    }

    pub(crate) fn feedback_session_mut(&mut self) -> ApnsResult<&mut dyn Session> {
        match &mut self.transport {
            Some(Transport::Feedback(session)) => Ok(session.as_mut()),
            _ => Err(ApnsError::NotConnectedFeedback),
        }
    }

    /// Idempotent close: best-effort TLS shutdown, falling back to a
    /// socket-level shutdown on an incomplete one; safe to call on an
    /// already-closed context.
    pub fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            match transport {
                Transport::Gateway(mut session) | Transport::Feedback(mut session) => {
                    session.shutdown();
                }
            }
        }
    }

    /// Close and release the context. In Rust, `Drop` already does this
    /// if a caller forgets; `free` exists for parity with the abstract
    /// operation list.
    pub fn free(mut self) {
        self.close();
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.close();
    }
}
