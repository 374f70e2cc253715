//! # Byte-stream Transport
//!
//! [`Transport`] abstracts the reliable, ordered byte stream the built-in
//! [`PubSubBackend`](crate::pubsub::PubSubBackend) talks MQTT over: a TCP
//! socket, a modem UART, a TLS session. All calls are blocking and bounded by
//! the timeout they receive.
//!
//! With the `std` feature a [`TcpTransport`] over `std::net::TcpStream` is
//! provided.

use embassy_time::Duration;

/// A blocking, timeout-bounded byte stream.
pub trait Transport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Opens the stream to `host:port`, giving up after `timeout`.
    fn open(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), Self::Error>;

    /// Writes the whole buffer, giving up after `timeout`.
    fn send(&mut self, buf: &[u8], timeout: Duration) -> Result<(), Self::Error>;

    /// Reads whatever is available into `buf`, waiting at most `timeout`.
    ///
    /// `Ok(0)` means nothing arrived in time. A peer that closed the stream is
    /// an error.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error>;

    /// Closes the stream. Closing a closed stream does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

#[cfg(feature = "std")]
pub use tcp::{TcpError, TcpTransport};

#[cfg(feature = "std")]
mod tcp {
    use std::io::{self, Read, Write};
    use std::net::{Shutdown, TcpStream, ToSocketAddrs};

    use embassy_time::Duration;

    use super::Transport;

    /// Errors of [`TcpTransport`].
    #[derive(Debug)]
    pub enum TcpError {
        /// The stream is not open.
        NotOpen,
        /// The host name resolved to no address.
        Unresolved,
        /// The peer closed the connection.
        Closed,
        Io(io::Error),
    }

    impl From<io::Error> for TcpError {
        fn from(err: io::Error) -> Self {
            TcpError::Io(err)
        }
    }

    /// TCP transport over `std::net`.
    #[derive(Debug, Default)]
    pub struct TcpTransport {
        stream: Option<TcpStream>,
    }

    impl TcpTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn stream(&mut self) -> Result<&mut TcpStream, TcpError> {
            self.stream.as_mut().ok_or(TcpError::NotOpen)
        }
    }

    /// std refuses zero timeouts, so they become the shortest one it accepts.
    fn std_timeout(timeout: Duration) -> std::time::Duration {
        std::time::Duration::from_micros(timeout.as_micros().max(1))
    }

    impl Transport for TcpTransport {
        type Error = TcpError;

        fn open(&mut self, host: &str, port: u16, timeout: Duration) -> Result<(), TcpError> {
            self.close();
            let mut last_err = TcpError::Unresolved;
            for addr in (host, port).to_socket_addrs()? {
                match TcpStream::connect_timeout(&addr, std_timeout(timeout)) {
                    Ok(stream) => {
                        stream.set_nodelay(true)?;
                        debug!("tcp connected to {}:{}", host, port);
                        self.stream = Some(stream);
                        return Ok(());
                    }
                    Err(err) => last_err = TcpError::Io(err),
                }
            }
            Err(last_err)
        }

        fn send(&mut self, buf: &[u8], timeout: Duration) -> Result<(), TcpError> {
            let stream = self.stream()?;
            stream.set_write_timeout(Some(std_timeout(timeout)))?;
            stream.write_all(buf)?;
            stream.flush()?;
            trace!("tcp sent {} bytes", buf.len());
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TcpError> {
            let stream = self.stream()?;
            stream.set_read_timeout(Some(std_timeout(timeout)))?;
            match stream.read(buf) {
                Ok(0) => {
                    warn!("tcp connection closed by peer");
                    self.stream = None;
                    Err(TcpError::Closed)
                }
                Ok(n) => Ok(n),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    Ok(0)
                }
                Err(err) => Err(TcpError::Io(err)),
            }
        }

        fn close(&mut self) {
            if let Some(stream) = self.stream.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }

        fn is_open(&self) -> bool {
            self.stream.is_some()
        }
    }

}
