//! A synchronous, blocking read/write contract around what a non-blocking
//! OpenSSL connection really does, where "want read" / "want write"
//! conditions are retried transparently. This module expresses that
//! contract as a [`Session`] trait so the delivery loop and feedback
//! collector can be exercised against a plain-TCP mock gateway in tests
//! without a real TLS handshake, while [`TlsSession`] is the production
//! implementation backed by `openssl` and a `mio` readiness poller.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Interest, Poll, Token};
use openssl::ssl::{ErrorCode, SslStream};

use crate::error::{ApnsError, ApnsResult};

/// Which side(s) of a socket became ready during a [`Session::wait`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// The socket has data to read (or the peer closed the connection).
    pub readable: bool,
    /// The socket can accept more bytes without blocking.
    pub writable: bool,
}

/// The blocking, multiplexable I/O surface the delivery loop and feedback
/// collector need.
pub trait Session {
    /// `select()` on the socket: wait up to `timeout` for readability, and
    /// for writability too when `want_write` is set. A `Readiness` with
    /// both flags false means the wait timed out with nothing ready, and
    /// the caller is expected to retry.
    fn wait(&mut self, want_write: bool, timeout: Duration) -> ApnsResult<Readiness>;

    /// `write(session, bytes)`: loops until every byte is written,
    /// retrying transient conditions internally.
    fn write_all(&mut self, buf: &[u8]) -> ApnsResult<()>;

    /// `read(session, buffer, len)`: a single read, returning the number
    /// of bytes actually read (which may be less than `buf.len()`).
    fn read(&mut self, buf: &mut [u8]) -> ApnsResult<usize>;

    /// Best-effort shutdown; never fails loudly. `close` tolerates an
    /// incomplete TLS shutdown and falls back to a socket-level one.
    fn shutdown(&mut self);
}

/// `select()` with read-only interest, used by the drain wait and the
/// feedback collector.
pub fn wait_readable(session: &mut dyn Session, timeout: Duration) -> ApnsResult<bool> {
    Ok(session.wait(false, timeout)?.readable)
}

fn map_io_error(e: &io::Error, on_write: bool) -> ApnsError {
    match e.kind() {
        io::ErrorKind::BrokenPipe => ApnsError::NetworkUnreachable,
        io::ErrorKind::TimedOut => ApnsError::ConnectionTimedOut,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => ApnsError::ConnectionClosed,
        _ if on_write => ApnsError::SslWriteFailed,
        _ => ApnsError::SslReadFailed,
    }
}

/// Production [`Session`]: a non-blocking TCP stream wrapped in an
/// OpenSSL TLS session, multiplexed with a `mio` poller so the "want
/// read"/"want write" conditions openssl surfaces for a non-blocking
/// socket are retried the same way EINTR would be on a blocking one.
pub struct TlsSession {
    ssl: SslStream<MioTcpStream>,
    poll: Poll,
    events: Events,
}

const SOCKET_TOKEN: Token = Token(0);

impl TlsSession {
    pub(crate) fn new(ssl: SslStream<MioTcpStream>) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry().register(
            ssl.get_ref(),
            SOCKET_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        Ok(Self {
            ssl,
            poll,
            events: Events::with_capacity(8),
        })
    }

    /// Wait (with an optional deadline) for the poller to report
    /// readiness in `interest`, retrying transparently on `EINTR`.
    ///
    /// mio's poller is edge-triggered: once a condition (e.g. writable)
    /// has been reported and nothing changes, epoll will not report it
    /// again on a later `poll`. Reregistering the socket's interest set
    /// before every wait forces a fresh edge and makes this behave like
    /// the level-triggered `select()` the rest of this module is built
    /// around, so a socket that has been continuously writable since the
    /// last write is still reported ready on the next call.
    fn poll_once(&mut self, interest: Interest, timeout: Option<Duration>) -> io::Result<Readiness> {
        self.poll
            .registry()
            .reregister(self.ssl.get_mut(), SOCKET_TOKEN, interest)?;
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let mut readiness = Readiness::default();
        for event in self.events.iter() {
            if event.token() == SOCKET_TOKEN {
                readiness.readable |= event.is_readable();
                readiness.writable |= event.is_writable();
            }
        }
        Ok(readiness)
    }

    /// Block (no timeout) until the poller says the direction we need is
    /// ready, retrying EINTR-equivalents transparently. Used internally
    /// by `write_all`/`read` to turn openssl's non-blocking want-read /
    /// want-write signal into a blocking contract.
    fn block_until_ready(&mut self, want_write: bool) -> io::Result<()> {
        let interest = if want_write {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        loop {
            let readiness = self.poll_once(interest, None)?;
            let ready = if want_write {
                readiness.writable
            } else {
                readiness.readable
            };
            if ready {
                return Ok(());
            }
        }
    }
}

impl Session for TlsSession {
    fn wait(&mut self, want_write: bool, timeout: Duration) -> ApnsResult<Readiness> {
        let interest = if want_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.poll_once(interest, Some(remaining)) {
                Ok(readiness) => {
                    if !want_write {
                        return Ok(Readiness {
                            readable: readiness.readable,
                            writable: false,
                        });
                    }
                    return Ok(readiness);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if Instant::now() >= deadline {
                        return Ok(Readiness::default());
                    }
                    continue;
                }
                Err(e) => return Err(map_io_error(&e, want_write)),
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> ApnsResult<()> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.ssl.write(&buf[offset..]) {
                Ok(0) => return Err(ApnsError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(e) => match e.code() {
                    ErrorCode::WANT_READ => self
                        .block_until_ready(false)
                        .map_err(|e| map_io_error(&e, true))?,
                    ErrorCode::WANT_WRITE => self
                        .block_until_ready(true)
                        .map_err(|e| map_io_error(&e, true))?,
                    ErrorCode::ZERO_RETURN => return Err(ApnsError::ConnectionClosed),
                    _ => {
                        if let Some(io_err) = e.io_error() {
                            if io_err.kind() == io::ErrorKind::Interrupted {
                                continue;
                            }
                            return Err(map_io_error(io_err, true));
                        }
                        return Err(ApnsError::SslWriteFailed);
                    }
                },
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> ApnsResult<usize> {
        loop {
            match self.ssl.read(buf) {
                Ok(0) => return Err(ApnsError::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(e) => match e.code() {
                    ErrorCode::WANT_READ => self
                        .block_until_ready(false)
                        .map_err(|e| map_io_error(&e, false))?,
                    ErrorCode::WANT_WRITE => self
                        .block_until_ready(true)
                        .map_err(|e| map_io_error(&e, false))?,
                    ErrorCode::ZERO_RETURN => return Err(ApnsError::ConnectionClosed),
                    _ => {
                        if let Some(io_err) = e.io_error() {
                            if io_err.kind() == io::ErrorKind::Interrupted {
                                continue;
                            }
                            return Err(map_io_error(io_err, false));
                        }
                        return Err(ApnsError::SslReadFailed);
                    }
                },
            }
        }
    }

    fn shutdown(&mut self) {
        // Best-effort: a half-closed or already-dead peer is common right
        // after Apple sends an error frame, so the shutdown handshake is
        // allowed to fail silently.
        if self.ssl.shutdown().is_err() {
            let _ = self.ssl.get_ref().shutdown(std::net::Shutdown::Both);
            let _ = self.ssl.shutdown();
        }
    }
}
