//! Destination resolution and the active connection.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, TcpStream};
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::ShipError;

/// Maximum byte length of a Unix domain socket path, per the address
/// structure's `sun_path` field.
pub const MAX_UNIX_PATH_LEN: usize = 108;

/// Collector destination: a Unix domain socket path or a loopback TCP port.
#[derive(Clone, Debug)]
pub enum Endpoint {
    Unix(PathBuf),
    Loopback(u16),
}

impl Endpoint {
    /// A Unix domain socket destination. The path must be non-empty and no
    /// longer than [`MAX_UNIX_PATH_LEN`] bytes.
    pub fn unix(path: impl Into<PathBuf>) -> Result<Self, ShipError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ShipError::InvalidArgument(
                "socket path must not be empty".into(),
            ));
        }
        let len = path.as_os_str().len();
        if len > MAX_UNIX_PATH_LEN {
            return Err(ShipError::InvalidArgument(format!(
                "socket path is {len} bytes; the maximum is {MAX_UNIX_PATH_LEN}"
            )));
        }
        Ok(Endpoint::Unix(path))
    }

    /// A TCP destination on the loopback interface.
    pub fn loopback(port: u16) -> Result<Self, ShipError> {
        if port == 0 {
            return Err(ShipError::InvalidArgument("port must not be zero".into()));
        }
        Ok(Endpoint::Loopback(port))
    }

    pub(crate) fn connect(&self) -> io::Result<ActiveConnection> {
        match self {
            Endpoint::Unix(path) => {
                #[cfg(unix)]
                {
                    UnixStream::connect(path).map(ActiveConnection::Unix)
                }
                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "unix domain sockets are not supported on this platform",
                    ))
                }
            }
            Endpoint::Loopback(port) => {
                TcpStream::connect((Ipv4Addr::LOCALHOST, *port)).map(ActiveConnection::Tcp)
            }
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Loopback(port) => write!(f, "tcp:127.0.0.1:{port}"),
        }
    }
}

/// The one live connection. Reads and writes go through `try_clone`d
/// handles of the same underlying socket, so a blocked reader and an active
/// writer never contend on a lock.
pub(crate) enum ActiveConnection {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl ActiveConnection {
    pub fn try_clone(&self) -> io::Result<ActiveConnection> {
        match self {
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.try_clone().map(ActiveConnection::Unix),
            ActiveConnection::Tcp(stream) => stream.try_clone().map(ActiveConnection::Tcp),
        }
    }

    /// Shut the socket down for reading and writing. Blocked peers in
    /// `read`/`write` wake up deterministically; the descriptor itself is
    /// released when the last clone drops.
    pub fn shutdown(&self) {
        match self {
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            ActiveConnection::Tcp(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.read(buf),
            ActiveConnection::Tcp(stream) => stream.read(buf),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.write_all(buf),
            ActiveConnection::Tcp(stream) => stream.write_all(buf),
        }
    }
}
