//! Socket path resolution

/// Default Unix socket path for the scarify service
pub const DEFAULT_SOCKET_PATH: &str = "/run/user/$UID/scarify/scarify.sock";

fn get_uid() -> String {
    std::env::var("UID").unwrap_or_else(|_| {
        // Fallback: use nix to get actual UID
        nix::unistd::getuid().to_string()
    })
}

/// Expand `$UID` and `$RUNTIME_DIRECTORY` in a configured socket path
pub fn expand_socket_path(path: &str) -> String {
    let expanded = path.replace("$UID", &get_uid());

    // Support $RUNTIME_DIRECTORY for systemd RuntimeDirectory=
    if let Ok(runtime_dir) = std::env::var("RUNTIME_DIRECTORY") {
        expanded.replace("$RUNTIME_DIRECTORY", &runtime_dir)
    } else {
        expanded
    }
}
