//! Lifecycle API (spec section 4.A.3): `init`, `spawn`, `terminate`,
//! `block`, `resume`, and the quantum-accounting queries.
//!
//! Every function here begins by taking a [`SignalGuard`], matching spec
//! section 4.A.2's "signal masking discipline": all scheduler-state
//! mutation happens with `SIGVTALRM` blocked. Failures are reported by
//! returning `Err` *and* logging a `thread library error: ` diagnostic
//! (spec section 6), so a caller that only checks for `-1`-style failure
//! (by mapping `Err` to a sentinel) sees exactly the behavior spec
//! describes.

use crate::error::{log_library_error, Error};
use crate::scheduler::{self, dispatch, with_scheduler, with_scheduler_mut, SignalGuard};
use crate::thread::ThreadId;

fn fail(err: Error) -> Error {
    log_library_error(&err);
    err
}

/// Install the scheduler, the timer signal handler, and the virtual
/// interval timer. Must be called exactly once before any other function
/// in this module.
pub fn init(quantum_usecs: i64) -> Result<(), Error> {
    if quantum_usecs <= 0 {
        return Err(fail(Error::InvalidArgument("quantum_usecs must be positive")));
    }
    scheduler::install(quantum_usecs);
    Ok(())
}

/// Spawn a new thread running `entry`. Returns its id.
pub fn spawn(entry: extern "C" fn()) -> Result<ThreadId, Error> {
    let _guard = SignalGuard::block();
    with_scheduler_mut(|s| s.spawn(entry)).map_err(fail)
}

/// Terminate thread `tid`.
///
/// `tid == 0` destroys every thread record and exits the process with
/// status 0 (spec section 4.A.3), regardless of which thread is currently
/// running. Terminating the running thread does not return: it falls
/// through to a dispatch that never comes back to this call.
pub fn terminate(tid: ThreadId) -> Result<(), Error> {
    let _guard = SignalGuard::block();

    if tid == ThreadId(0) {
        scheduler::destroy_all();
        std::process::exit(0);
    }

    if !with_scheduler(|s| s.contains(tid)) {
        return Err(fail(Error::UnknownThread(tid)));
    }

    if with_scheduler(|s| s.running_id()) == tid {
        let freed = with_scheduler_mut(|s| s.begin_self_terminate());
        drop(freed);
        dispatch();
        unreachable!("a terminated thread is never dispatched again");
    }

    let freed = with_scheduler_mut(|s| s.terminate_other(tid));
    drop(freed);
    Ok(())
}

/// Block thread `tid`. A no-op if it is already blocked. Blocking the
/// running thread triggers an immediate dispatch.
pub fn block(tid: ThreadId) -> Result<(), Error> {
    let _guard = SignalGuard::block();
    with_scheduler_mut(|s| s.block(tid)).map_err(fail)?;
    if with_scheduler(|s| s.running_id()) == tid {
        dispatch();
    }
    Ok(())
}

/// Resume thread `tid` if it is blocked. A no-op otherwise.
pub fn resume(tid: ThreadId) -> Result<(), Error> {
    let _guard = SignalGuard::block();
    with_scheduler_mut(|s| s.resume(tid)).map_err(fail)
}

/// The currently-running thread's id.
pub fn get_tid() -> ThreadId {
    let _guard = SignalGuard::block();
    with_scheduler(|s| s.running_id())
}

/// The global count of quantums started since `init`.
pub fn get_total_quantums() -> u64 {
    let _guard = SignalGuard::block();
    with_scheduler(|s| s.total_quantums())
}

/// The number of quantums thread `tid` has been running for.
pub fn get_quantums(tid: ThreadId) -> Result<u64, Error> {
    let _guard = SignalGuard::block();
    with_scheduler(|s| s.quantums_of(tid)).ok_or_else(|| fail(Error::UnknownThread(tid)))
}

/// Acquire the global mutex, blocking (via dispatch) until it is free.
///
/// A double-lock by the current holder is a protocol error; no other
/// thread can observe the mutex mid-acquisition since all mutation happens
/// under the timer mask.
pub fn mutex_lock() -> Result<(), Error> {
    let _guard = SignalGuard::block();
    let running = with_scheduler(|s| s.running_id());

    let outcome = with_scheduler_mut(|s| {
        if s.mutex.holder() == Some(running) {
            return Err(Error::MutexProtocol("lock: already held by this thread"));
        }
        if !s.mutex.is_locked() {
            s.mutex.grant(running);
            return Ok(true);
        }
        s.mutex.add_waiter(running);
        Ok(false)
    });

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => {
            dispatch();
            Ok(())
        }
        Err(e) => Err(fail(e)),
    }
}

/// Release the global mutex, waking the first non-blocked waiter if any
/// (spec section 4.A.4). Acquisition by that waiter completes at its next
/// dispatch, not synchronously here.
pub fn mutex_unlock() -> Result<(), Error> {
    let _guard = SignalGuard::block();
    let running = with_scheduler(|s| s.running_id());

    with_scheduler_mut(|s| {
        if s.mutex.holder() != Some(running) {
            return Err(Error::MutexProtocol("unlock: not held by this thread"));
        }
        s.mutex.release();
        s.wake_mutex_waiter();
        Ok(())
    })
    .map_err(fail)
}
