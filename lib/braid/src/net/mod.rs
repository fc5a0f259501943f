//! The transport stack: byte buffers, wire framing, per-peer channels, and
//! the single-threaded multiplexer that drives an engine over real sockets.

pub mod buffer;
pub mod channel;
pub mod frame;
pub mod multiplexer;
pub mod transport;

use std::io;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    Io(io::ErrorKind),
    BadControl,
    PayloadTooLarge,
    ConnectTimeout,
    PreambleMismatch,
    AddressMissing,
}

/// `Wait` means "not now, try again after the next poll"; `Fatal` tears the
/// run down.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> NetworkError {
        match err.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    fn has_failed(&self) -> bool {
        matches!(self, Err(NetworkError::Fatal(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_folds_to_wait() {
        let err: NetworkError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, NetworkError::Wait);
    }

    #[test]
    fn hard_errors_fold_to_fatal() {
        let err: NetworkError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert_eq!(err, NetworkError::Fatal(ErrorType::Io(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn has_failed_ignores_wait() {
        let wait: NetworkResult<()> = Err(NetworkError::Wait);
        let fatal: NetworkResult<()> = Err(NetworkError::Fatal(ErrorType::BadControl));
        let fine: NetworkResult<()> = Ok(());
        assert!(!wait.has_failed());
        assert!(fatal.has_failed());
        assert!(!fine.has_failed());
    }
}
