//! Error taxonomy for the thread library (spec section 7).
//!
//! Every public entry point still returns the C-shaped `i32`/`ThreadId`
//! values spec section 6 mandates, logging a `thread library error: `
//! diagnostic before returning. This enum is the richer, `Result`-returning
//! view of the same failures for callers who want to match on a cause.

use crate::thread::ThreadId;

/// Failure cases for the public thread-library API.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A non-positive quantum, or an attempt to block/terminate thread 0
    /// where the operation forbids it.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// `tid` does not name a live thread.
    #[error("unknown thread id {0}")]
    UnknownThread(ThreadId),

    /// `spawn` was called with `MAX_THREADS` threads already alive.
    #[error("maximum thread count ({0}) reached")]
    ResourceExhausted(usize),

    /// A double-lock by the holder, or an unlock of an unheld mutex or one
    /// held by a different thread.
    #[error("mutex protocol violation: {0}")]
    MutexProtocol(&'static str),
}

/// Writes `thread library error: {err}` to stderr, per spec section 6.
pub(crate) fn log_library_error(err: &Error) {
    eprintln!("thread library error: {err}");
    log::error!("{err}");
}

/// Writes `system error: {msg}` to stderr for non-recoverable host-facility
/// failures (signal/timer install). These are diagnostics only; spec
/// section 7 says callers should treat the resulting state as undefined,
/// so this does not return `-1` from anywhere.
pub(crate) fn log_system_error(msg: &str) {
    eprintln!("system error: {msg}");
    log::error!("{msg}");
}
