//! Transport plumbing for CFTP sessions.
//!
//! [`Channel`] wraps any byte stream and moves whole frames and unframed
//! payloads over it, applying the configured read/write timeout to every
//! operation. The TCP helpers set up sockets the way CFTP wants them:
//! keep-alive on, Nagle off, listen backlog of one.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::protocol::{self, Frame, FRAME_SIZE};

/// Idle time before the first keep-alive probe.
const KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// Interval between keep-alive probes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

async fn guarded<T, F>(limit: Option<Duration>, op: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    let result = match limit {
        Some(duration) => tokio::time::timeout(duration, op)
            .await
            .map_err(|_| Error::Timeout(duration.as_secs()))?,
        None => op.await,
    };

    result.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::ConnectionClosed("connection closed by peer".to_string())
        }
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => Error::ConnectionClosed(e.to_string()),
        _ => Error::Io(e),
    })
}

/// A framed CFTP connection.
///
/// Every call performs exactly one send or receive; callers drive the
/// lock-step exchange themselves.
///
/// A timed-out [`recv_frame`](Self::recv_frame) keeps the bytes it already
/// read and the next call picks up where it stopped. Any other timed-out
/// operation may have moved part of a frame or payload, so the channel is
/// marked out of step and every later call fails with
/// `Error::ConnectionClosed`.
#[derive(Debug)]
pub struct Channel<S> {
    stream: S,
    timeout: Option<Duration>,
    partial: [u8; FRAME_SIZE],
    filled: usize,
    out_of_step: bool,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream`; `timeout` bounds each read and write (`None` waits forever).
    pub fn new(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            stream,
            timeout,
            partial: [0u8; FRAME_SIZE],
            filled: 0,
            out_of_step: false,
        }
    }

    /// Configured per-operation timeout.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether an interrupted write or payload read left the stream unusable.
    pub const fn is_out_of_step(&self) -> bool {
        self.out_of_step
    }

    fn ensure_in_step(&self) -> Result<()> {
        if self.out_of_step {
            return Err(Error::ConnectionClosed(
                "stream out of step after an interrupted operation".to_string(),
            ));
        }
        Ok(())
    }

    fn mark_interrupted<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::Timeout(_))) {
            self.out_of_step = true;
        }
        result
    }

    /// Send one 32-byte frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the write does not complete in time, or
    /// an I/O error.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.ensure_in_step()?;
        let buf = frame.encode();
        let stream = &mut self.stream;
        let result = guarded(self.timeout, async move {
            stream.write_all(&buf).await?;
            stream.flush().await
        })
        .await;
        self.mark_interrupted(result)?;
        tracing::trace!("-> {}", frame.message_type());
        Ok(())
    }

    /// Receive and decode one 32-byte frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` on end of stream, `Error::Timeout`
    /// if no complete frame arrives in time, or `Error::Decode` for a
    /// malformed frame.
    pub async fn recv_frame(&mut self) -> Result<Frame> {
        self.ensure_in_step()?;
        let Self {
            stream,
            timeout,
            partial,
            filled,
            ..
        } = &mut *self;
        guarded(*timeout, async move {
            while *filled < FRAME_SIZE {
                match stream.read(&mut partial[*filled..]).await? {
                    0 => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                    n => *filled += n,
                }
            }
            Ok::<_, io::Error>(())
        })
        .await?;

        self.filled = 0;
        let frame = protocol::decode(&self.partial)?;
        tracing::trace!("<- {}", frame.message_type());
        Ok(frame)
    }

    /// Send an unframed payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the write does not complete in time, or
    /// an I/O error.
    pub async fn send_payload(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_in_step()?;
        let stream = &mut self.stream;
        let result = guarded(self.timeout, async move {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;
        self.mark_interrupted(result)
    }

    /// Receive exactly `len` bytes of unframed payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` if the stream ends early, or
    /// `Error::Timeout` if the bytes do not arrive in time.
    pub async fn recv_payload(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_in_step()?;
        let mut buf = vec![0u8; len];
        let stream = &mut self.stream;
        let result = guarded(self.timeout, stream.read_exact(&mut buf)).await;
        self.mark_interrupted(result)?;
        Ok(buf)
    }

    /// Shut down the write half, ignoring errors.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Enable keep-alive and disable Nagle on a connected socket.
///
/// # Errors
///
/// Returns an error if a socket option cannot be set.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;

    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Connect to a receiver.
///
/// # Errors
///
/// Returns `Error::Timeout` if the connection is not established within
/// `limit`, or an I/O error.
pub async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(limit.as_secs()))??;
    configure_stream(&stream)?;
    tracing::debug!("Connected to {}", addr);
    Ok(stream)
}

/// Bind a listener with a backlog of one.
///
/// # Errors
///
/// Returns an error if the socket cannot be created or bound.
pub fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Parse a host string into a `SocketAddr`.
///
/// Accepts `IP`, `IP:PORT`, `[IPv6]` and `[IPv6]:PORT`; forms without a
/// port use `default_port`.
///
/// # Examples
///
/// ```
/// use cftp_core::connection::parse_host_address;
///
/// let addr = parse_host_address("192.168.1.100", 9400).unwrap();
/// assert_eq!(addr.port(), 9400);
///
/// let addr = parse_host_address("[::1]:9500", 9400).unwrap();
/// assert_eq!(addr.port(), 9500);
/// ```
///
/// # Errors
///
/// Returns an error if the host string cannot be parsed.
pub fn parse_host_address(host: &str, default_port: u16) -> Result<SocketAddr> {
    let host = host.trim();
    let invalid = || Error::InvalidInput(format!("invalid host '{host}', use IP or IP:PORT"));

    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        let ip: IpAddr = inner.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(ip, default_port));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    match host.rsplit_once(':') {
        Some((ip_part, port_part)) if !ip_part.contains(':') => {
            let ip: IpAddr = ip_part.parse().map_err(|_| invalid())?;
            let port: u16 = port_part
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid port '{port_part}'")))?;
            Ok(SocketAddr::new(ip, port))
        }
        _ => Err(invalid()),
    }
}

/// Resolve a server name or address, falling back to DNS.
///
/// # Errors
///
/// Returns an error if the name does not resolve to any address.
pub async fn resolve(server: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(addr) = parse_host_address(server, port) {
        return Ok(addr);
    }

    tokio::net::lookup_host((server.trim(), port))
        .await
        .map_err(|e| Error::InvalidInput(format!("cannot resolve '{server}': {e}")))?
        .next()
        .ok_or_else(|| Error::InvalidInput(format!("no addresses found for '{server}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, MessageType};

    #[test]
    fn test_parse_host_ipv4() {
        let addr = parse_host_address("192.168.1.100", 9400).unwrap();
        assert_eq!(addr.ip().to_string(), "192.168.1.100");
        assert_eq!(addr.port(), 9400);

        let addr = parse_host_address("  10.0.0.7:9500 ", 9400).unwrap();
        assert_eq!(addr.port(), 9500);
    }

    #[test]
    fn test_parse_host_ipv6() {
        let addr = parse_host_address("[::1]", 9400).unwrap();
        assert_eq!(addr.ip().to_string(), "::1");
        assert_eq!(addr.port(), 9400);

        let addr = parse_host_address("[2001:db8::1]:9500", 9400).unwrap();
        assert_eq!(addr.ip().to_string(), "2001:db8::1");
        assert_eq!(addr.port(), 9500);
    }

    #[test]
    fn test_parse_host_invalid() {
        assert!(parse_host_address("not-an-ip", 9400).is_err());
        assert!(parse_host_address("192.168.1.100:abc", 9400).is_err());
        assert!(parse_host_address("192.168.1.256", 9400).is_err());
        assert!(parse_host_address("[::1", 9400).is_err());
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve("127.0.0.1", 9401).await.unwrap();
        assert_eq!(addr.port(), 9401);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_channel_frame_and_payload() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = Channel::new(a, Some(Duration::from_secs(5)));
        let mut right = Channel::new(b, Some(Duration::from_secs(5)));

        left.send_frame(&Frame::data_transfer(9, 4, 0)).await.unwrap();
        left.send_payload(b"ping").await.unwrap();

        let frame = right.recv_frame().await.unwrap();
        assert_eq!(frame, Frame::data_transfer(9, 4, 0));
        assert_eq!(right.recv_payload(4).await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_channel_reports_peer_close() {
        let (a, b) = tokio::io::duplex(64);
        let mut channel = Channel::new(a, None);
        drop(b);

        let err = channel.recv_frame().await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_channel_surfaces_decode_error() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut channel = Channel::new(a, None);
        b.write_all(&[0xEE; FRAME_SIZE]).await.unwrap();

        let err = channel.recv_frame().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_times_out() {
        let (a, _b) = tokio::io::duplex(64);
        let mut channel = Channel::new(a, Some(Duration::from_secs(3)));

        let err = channel.recv_frame().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_split_across_timeout_is_kept() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut channel = Channel::new(a, Some(Duration::from_secs(1)));
        let bytes = Frame::data_ack(7, 42).encode();

        b.write_all(&bytes[..10]).await.unwrap();
        let err = channel.recv_frame().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(1)));
        assert!(!channel.is_out_of_step());

        b.write_all(&bytes[10..]).await.unwrap();
        assert_eq!(channel.recv_frame().await.unwrap(), Frame::data_ack(7, 42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_timeout_leaves_channel_unusable() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut channel = Channel::new(a, Some(Duration::from_secs(1)));

        b.write_all(b"half").await.unwrap();
        let err = channel.recv_payload(8).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(1)));
        assert!(channel.is_out_of_step());

        let err = channel.send_frame(&Frame::file_finish(7)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed(_)));
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_tcp_listen_and_connect() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            configure_stream(&stream).unwrap();
            let mut channel = Channel::new(stream, Some(Duration::from_secs(5)));
            channel.recv_frame().await.unwrap()
        });

        let stream = connect(addr, Duration::from_secs(5)).await.unwrap();
        let mut channel = Channel::new(stream, Some(Duration::from_secs(5)));
        channel
            .send_frame(&Frame::session_close(1, ErrorCode::Overloaded))
            .await
            .unwrap();

        let received = accept.await.unwrap();
        assert_eq!(received.message_type(), MessageType::SessionClose);
        assert_eq!(received.error_code(), Some(ErrorCode::Overloaded));
    }
}
