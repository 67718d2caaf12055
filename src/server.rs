//! Socket server exposing the core to consoles, CLI clients and overlays
//!
//! The server only accepts connections; all state lives in the service loop
//! behind a `ServiceHandle`.

mod handler;

use crate::service::ServiceHandle;
use crate::transport::SocketError;
use std::path::Path;
use tokio::net::UnixListener;

use handler::handle_connection;

// Server result type using SocketError for structured error handling
type ServerResult<T> = std::result::Result<T, SocketError>;

pub struct SocketServer {
    listener: UnixListener,
}

impl SocketServer {
    /// Bind the service socket, enforcing a single running instance.
    ///
    /// Fails with `AlreadyRunning` when another service answers on the path.
    /// A leftover socket file nobody listens on is replaced.
    pub fn bind<P: AsRef<Path>>(socket_path: P) -> ServerResult<Self> {
        let path = socket_path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            match std::os::unix::net::UnixStream::connect(path) {
                Ok(_) => {
                    return Err(SocketError::AlreadyRunning(path.display().to_string()));
                }
                Err(_) => {
                    log::info!("Removing stale socket at {}", path.display());
                    std::fs::remove_file(path)?;
                }
            }
        }

        let listener = UnixListener::bind(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                SocketError::AlreadyRunning(path.display().to_string())
            } else {
                SocketError::Connection(format!("Failed to bind socket: {}", e))
            }
        })?;

        // Set socket permissions to 0600 (owner read/write only) for security
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(path)
                .map_err(|e| {
                    SocketError::Connection(format!("Failed to read socket metadata: {}", e))
                })?
                .permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(path, permissions).map_err(|e| {
                SocketError::Connection(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        log::info!("Listening on {}", path.display());
        Ok(Self { listener })
    }

    pub async fn run(self, handle: ServiceHandle) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handle).await {
                            log::warn!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

pub fn remove_socket_file(path: &Path) {
    if path.exists()
        && let Err(e) = std::fs::remove_file(path)
    {
        log::warn!("Failed to remove socket file: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_socket() -> PathBuf {
        std::env::temp_dir()
            .join(format!("scarify-test-{}", uuid::Uuid::new_v4()))
            .join("scarify.sock")
    }

    #[tokio::test]
    async fn test_second_bind_reports_running_instance() {
        let path = temp_socket();
        let first = SocketServer::bind(&path).unwrap();

        let second = SocketServer::bind(&path);
        assert!(matches!(second, Err(SocketError::AlreadyRunning(_))));

        drop(first);
        remove_socket_file(&path);
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let path = temp_socket();
        let first = SocketServer::bind(&path).unwrap();
        drop(first);
        assert!(path.exists());

        let second = SocketServer::bind(&path);
        assert!(second.is_ok());
        remove_socket_file(&path);
    }
}
