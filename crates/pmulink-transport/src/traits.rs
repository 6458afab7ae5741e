use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::error::{Result, TransportError};

/// Write side of a PMU link.
///
/// A call hands over one complete frame. Implementations must either put every
/// byte on the wire or fail; the channel never retries a partial write.
pub trait Transport: Send {
    /// Write the whole buffer to the link.
    fn write_all_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<W: Write + Send> Transport for W {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

/// A connected PMU link: implements `Read + Write`.
///
/// Wraps either a serial device node the host has already configured, or a
/// Unix stream socket (used by the emulator and for bench setups that bridge
/// a UART onto a socket).
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Device(File),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Device(file) => file.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Device(file) => file.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Device(file) => file.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl LinkStream {
    /// Open a link by path.
    ///
    /// Unix socket paths are connected to; anything else is opened read/write
    /// as a device node.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let is_socket = std::fs::metadata(path)
                .map(|metadata| metadata.file_type().is_socket())
                .unwrap_or(false);
            if is_socket {
                return crate::uds::UnixDomainSocket::connect(path);
            }
        }

        Self::open_device(path)
    }

    /// Open a serial device node read/write.
    pub fn open_device(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| TransportError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(?path, "opened device link");
        Ok(Self::from_device(file))
    }

    /// Wrap an already opened device file.
    pub fn from_device(file: File) -> Self {
        Self {
            inner: LinkStreamInner::Device(file),
        }
    }

    /// Wrap a connected Unix stream socket.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Set a read timeout. Device nodes ignore this; their blocking behavior
    /// is part of the host's tty configuration.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Device(_) => Ok(()),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Clone the handle so one copy can feed the receive path while the other
    /// is used for writes.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkStreamInner::Device(file) => Ok(Self::from_device(file.try_clone()?)),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Link kind for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Device(_) => "device",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("kind", &self.kind())
            .finish()
    }
}
