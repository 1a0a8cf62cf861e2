use std::io;
use tracing::debug;

/// Errors worth one more attempt: locks, permission flaps on network shares,
/// interrupted syscalls.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::PermissionDenied
    )
}

/// Run `op`, retrying exactly once when the first failure is transient.
pub fn retry_once<T, F>(what: &str, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    match op() {
        Err(err) if is_transient(&err) => {
            debug!("Transient error during {}: {}, retrying once", what, err);
            op()
        }
        other => other,
    }
}
