use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 elsewhere.
#[cfg(target_os = "linux")]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_LEN: usize = 104;

/// Listening Unix socket standing in for a serial port.
///
/// The PMU emulator binds one; hosts reach it through [`LinkStream::open`] or
/// [`UnixDomainSocket::connect`]. The socket file is removed on drop unless
/// something else has replaced it in the meantime.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    /// (device, inode) of the file this socket created.
    identity: (u64, u64),
}

impl UnixDomainSocket {
    /// Mode applied to the socket file: owner read/write only.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind and listen at `path`. A stale socket file there is replaced; any
    /// other kind of file is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        let bind_failed = |source: io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        remove_stale_socket(&path).map_err(bind_failed)?;
        let listener = UnixListener::bind(&path).map_err(bind_failed)?;
        fs::set_permissions(&path, Permissions::from_mode(Self::DEFAULT_SOCKET_MODE))
            .map_err(bind_failed)?;
        let metadata = fs::symlink_metadata(&path).map_err(bind_failed)?;

        info!(?path, "link socket listening");
        Ok(Self {
            listener,
            identity: (metadata.dev(), metadata.ino()),
            path,
        })
    }

    /// Wait for the next connection.
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, _) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "link socket accepted connection");
        Ok(LinkStream::from_unix(stream))
    }

    /// Connect to a socket bound by another process.
    pub fn connect(path: impl AsRef<Path>) -> Result<LinkStream> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to link socket");
        Ok(LinkStream::from_unix(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn still_owns_path(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok_and(|metadata| {
            metadata.file_type().is_socket()
                && (metadata.dev(), metadata.ino()) == self.identity
        })
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        if self.still_owns_path() {
            debug!(path = ?self.path, "removing link socket");
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= SUN_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: SUN_PATH_LEN,
        });
    }
    Ok(())
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(?path, "replacing stale socket");
            fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        )),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pmulink-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("scratch dir should be creatable");
        dir
    }

    #[test]
    fn frame_bytes_cross_the_socket() {
        let dir = scratch_dir("uds");
        let path = dir.join("pmu.sock");
        let socket = UnixDomainSocket::bind(&path).expect("bind should succeed");

        let client_path = path.clone();
        let host = std::thread::spawn(move || {
            let mut link = UnixDomainSocket::connect(&client_path).expect("connect should succeed");
            link.write_all(&[0xA5, 0x01, 0x81]).expect("write should succeed");
            let mut reply = [0u8; 1];
            link.read_exact(&mut reply).expect("reply should arrive");
            reply[0]
        });

        let mut pmu = socket.accept().expect("accept should succeed");
        let mut header = [0u8; 3];
        pmu.read_exact(&mut header).expect("header should arrive");
        assert_eq!(header, [0xA5, 0x01, 0x81]);
        pmu.write_all(&[0x5A]).expect("reply should send");
        assert_eq!(host.join().expect("host thread should not panic"), 0x5A);

        drop(socket);
        assert!(!path.exists(), "socket file should be removed on drop");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_connects_to_socket_paths() {
        let dir = scratch_dir("uds-open");
        let path = dir.join("pmu.sock");
        let _socket = UnixDomainSocket::bind(&path).expect("bind should succeed");

        let link = LinkStream::open(&path).expect("open should connect");
        assert_eq!(link.kind(), "unix");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn overlong_path_is_rejected() {
        let path = std::env::temp_dir().join("p".repeat(SUN_PATH_LEN));
        assert!(matches!(
            UnixDomainSocket::bind(&path),
            Err(TransportError::PathTooLong { max: SUN_PATH_LEN, .. })
        ));
    }

    #[test]
    fn socket_file_is_owner_only() {
        let dir = scratch_dir("uds-mode");
        let path = dir.join("pmu.sock");
        let _socket = UnixDomainSocket::bind(&path).expect("bind should succeed");

        let mode = fs::metadata(&path)
            .expect("socket file should exist")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, UnixDomainSocket::DEFAULT_SOCKET_MODE);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn regular_file_is_not_replaced() {
        let dir = scratch_dir("uds-file");
        let path = dir.join("ttyS4");
        fs::write(&path, b"not a socket").expect("file should be writable");

        assert!(matches!(
            UnixDomainSocket::bind(&path),
            Err(TransportError::Bind { .. })
        ));
        assert_eq!(fs::read(&path).expect("file should survive"), b"not a socket");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn replaced_socket_file_is_left_alone() {
        let dir = scratch_dir("uds-replaced");
        let path = dir.join("pmu.sock");
        let first = UnixDomainSocket::bind(&path).expect("first bind should succeed");
        let second = UnixDomainSocket::bind(&path).expect("second bind should replace");

        drop(first);
        assert!(path.exists(), "newer socket must survive the old owner");
        drop(second);
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
