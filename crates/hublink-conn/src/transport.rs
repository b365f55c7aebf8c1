//! Byte-stream capability consumed by the connection states.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Full-duplex byte socket.
///
/// One reader thread and one writer thread use it concurrently; `close`
/// may come from any thread and must unblock both.
pub trait Socket: Send + Sync {
    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()>;
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;
    fn close(&self);
}

/// Opens sockets to the hub.
pub trait Transport: Send + Sync {
    fn connect(&self, host: &str, port: u16) -> io::Result<Arc<dyn Socket>>;
}

/// Plain TCP transport.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    connect_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }

    fn open(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect((host, port));
        };

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address resolved for {host}:{port}"),
            )
        }))
    }
}

impl Transport for TcpTransport {
    fn connect(&self, host: &str, port: u16) -> io::Result<Arc<dyn Socket>> {
        let stream = self.open(host, port)?;
        stream.set_nodelay(true)?;
        Ok(Arc::new(TcpSocket { stream }))
    }
}

struct TcpSocket {
    stream: TcpStream,
}

impl Socket for TcpSocket {
    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
        (&self.stream).read_exact(buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        (&self.stream).write_all(buf)
    }

    fn close(&self) {
        // Already shut down or reset by the peer; nothing left to release.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_round_trip_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
            buf
        });

        let socket = TcpTransport::new(Some(Duration::from_secs(2)))
            .connect("127.0.0.1", port)
            .unwrap();
        socket.write_all(b"ping").unwrap();
        let mut echo = [0u8; 4];
        socket.read_exact(&mut echo).unwrap();
        assert_eq!(&echo, b"ping");
        assert_eq!(&peer.join().unwrap(), b"ping");

        socket.close();
        assert!(socket.read_exact(&mut echo).is_err());
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(TcpTransport::default().connect("127.0.0.1", port).is_err());
    }
}
