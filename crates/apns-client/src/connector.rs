//! The connector: resolves the gateway/feedback host, opens a TCP
//! socket, and drives the TLS handshake to completion.

use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Interest, Poll, Token};
use openssl::ssl::{HandshakeError, SslConnector, SslStream};
use openssl::x509::X509NameRef;

use crate::context::{Credentials, LogLevel};
use crate::error::{ApnsError, ApnsResult};
use crate::session::TlsSession;
use crate::tls::{build_connector, HandshakeLog};

/// How long a single TCP connect attempt, and the handshake as a whole,
/// are allowed to take before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a TLS connection to `host:port` using `credentials`. `log_sink`
/// receives INFO-level handshake progress and the peer certificate's
/// subject/issuer once the handshake completes.
pub(crate) fn connect(
    credentials: &Credentials,
    host: &str,
    port: u16,
    log_sink: Arc<dyn HandshakeLog>,
) -> ApnsResult<TlsSession> {
    let connector = build_connector(credentials, log_sink.clone())?;

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| ApnsError::CouldNotInitializeConnection)?
        .filter(SocketAddr::is_ipv4)
        .collect();
    if addrs.is_empty() {
        return Err(ApnsError::CouldNotInitializeConnection);
    }

    let std_stream = addrs
        .iter()
        .find_map(|addr| StdTcpStream::connect_timeout(addr, CONNECT_TIMEOUT).ok())
        .ok_or(ApnsError::CouldNotInitializeConnection)?;
    std_stream
        .set_nonblocking(true)
        .map_err(|_| ApnsError::CouldNotInitializeConnection)?;
    let mio_stream = MioTcpStream::from_std(std_stream);

    let ssl_stream = complete_handshake(connector, host, mio_stream)
        .map_err(|_| ApnsError::CouldNotInitializeSslConnection)?;

    if let Some(peer_cert) = ssl_stream.ssl().peer_certificate() {
        log_sink.log(
            LogLevel::INFO,
            &format!(
                "connected to {host}:{port}; peer subject=[{}] issuer=[{}]",
                format_name(peer_cert.subject_name()),
                format_name(peer_cert.issuer_name()),
            ),
        );
    }

    TlsSession::new(ssl_stream).map_err(|_| ApnsError::CouldNotInitializeSslConnection)
}

/// Drive a non-blocking handshake to completion, waiting for readiness
/// between retries instead of busy-spinning on `WouldBlock`.
fn complete_handshake(
    connector: SslConnector,
    host: &str,
    stream: MioTcpStream,
) -> Result<SslStream<MioTcpStream>, ()> {
    let poll = Poll::new().map_err(|_| ())?;
    let mut events = Events::with_capacity(4);
    let mut registered = false;

    let mut attempt = connector.connect(host, stream);
    loop {
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(HandshakeError::WouldBlock(mut mid)) => {
                // mio is edge-triggered, so a socket that is still
                // readable/writable from the previous round won't produce
                // a new event unless its interest is reregistered first.
                let registry = poll.registry();
                if !registered {
                    registry
                        .register(
                            mid.get_mut(),
                            Token(0),
                            Interest::READABLE | Interest::WRITABLE,
                        )
                        .map_err(|_| ())?;
                    registered = true;
                } else {
                    registry
                        .reregister(
                            mid.get_mut(),
                            Token(0),
                            Interest::READABLE | Interest::WRITABLE,
                        )
                        .map_err(|_| ())?;
                }
                poll.poll(&mut events, Some(CONNECT_TIMEOUT)).map_err(|_| ())?;
                if events.is_empty() {
                    return Err(());
                }
                attempt = mid.handshake();
            }
            Err(_) => return Err(()),
        }
    }
}

fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = String::from_utf8_lossy(entry.data().as_slice());
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
