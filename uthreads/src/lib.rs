//! A user-level cooperative/preemptive thread library.
//!
//! Multiplexes any number of logical threads of control onto a single OS
//! thread using a hand-rolled machine-context switch and a periodic
//! virtual-time timer signal (`SIGVTALRM`). Thread 0 is implicit, created
//! by [`init`]; every other thread is created by [`spawn`] and runs until
//! it calls [`terminate`] on itself, is terminated by another thread, or
//! its entry function returns.
//!
//! ```no_run
//! uthreads::init(100_000).unwrap();
//! extern "C" fn worker() {
//!     loop {}
//! }
//! let tid = uthreads::spawn(worker).unwrap();
//! uthreads::terminate(tid).unwrap();
//! ```
//!
//! Only `target_arch = "x86_64"` is supported; the context switch in
//! [`context`] is written directly against the System V calling
//! convention.

mod context;
mod error;
mod lifecycle;
mod mutex;
mod scheduler;
mod thread;

pub use error::Error;
pub use lifecycle::{
    block, get_quantums, get_tid, get_total_quantums, init, mutex_lock, mutex_unlock, resume,
    spawn, terminate,
};
pub use thread::{ThreadId, ThreadState, MAX_THREADS, STACK_SIZE};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    // The scheduler is one process-wide singleton (it must be, to be
    // reachable from a signal handler with no context parameter), so
    // these tests cannot run concurrently with each other.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    // A long quantum keeps the virtual timer from firing mid-test: these
    // tests drive dispatch only through explicit API calls (`block`,
    // `terminate` on the running thread), never by letting `SIGVTALRM`
    // preempt in the background.
    fn reset() -> std::sync::MutexGuard<'static, ()> {
        let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        init(60_000_000).expect("init");
        guard
    }

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    extern "C" fn bump_forever() {
        loop {
            COUNTER.fetch_add(1, Ordering::SeqCst);
        }
    }

    extern "C" fn returns_immediately() {}

    #[test]
    fn init_rejects_non_positive_quantum() {
        let _g = reset();
        assert_eq!(init(0), Err(Error::InvalidArgument("quantum_usecs must be positive")));
        assert_eq!(init(-5), Err(Error::InvalidArgument("quantum_usecs must be positive")));
    }

    #[test]
    fn spawn_assigns_smallest_free_id_and_reuses_it() {
        let _g = reset();
        let a = spawn(returns_immediately).unwrap();
        let b = spawn(returns_immediately).unwrap();
        assert_eq!(a, ThreadId(1));
        assert_eq!(b, ThreadId(2));
        terminate(a).unwrap();
        let c = spawn(returns_immediately).unwrap();
        assert_eq!(c, ThreadId(1));
        let _ = terminate(b);
        let _ = terminate(c);
    }

    #[test]
    fn spawn_fails_at_max_threads() {
        let _g = reset();
        let mut ids = Vec::new();
        for _ in 1..MAX_THREADS {
            ids.push(spawn(returns_immediately).unwrap());
        }
        assert_eq!(spawn(returns_immediately), Err(Error::ResourceExhausted(MAX_THREADS)));
        for id in ids {
            let _ = terminate(id);
        }
    }

    #[test]
    fn get_quantums_of_unknown_thread_errors() {
        let _g = reset();
        assert_eq!(get_quantums(ThreadId(42)), Err(Error::UnknownThread(ThreadId(42))));
    }

    #[test]
    fn block_rejects_main_thread() {
        let _g = reset();
        assert_eq!(
            block(ThreadId(0)),
            Err(Error::InvalidArgument("cannot block the main thread"))
        );
    }

    #[test]
    fn resume_of_non_blocked_thread_is_a_no_op() {
        let _g = reset();
        let tid = spawn(bump_forever).unwrap();
        assert!(resume(tid).is_ok());
        let _ = terminate(tid);
    }

    #[test]
    fn block_marks_thread_blocked_until_resumed() {
        let _g = reset();
        let tid = spawn(bump_forever).unwrap();
        assert_eq!(
            scheduler::with_scheduler(|s| s.thread_state(tid)),
            Some(ThreadState::Ready)
        );

        block(tid).unwrap();
        assert_eq!(
            scheduler::with_scheduler(|s| s.thread_state(tid)),
            Some(ThreadState::Blocked)
        );
        assert!(!scheduler::with_scheduler(|s| s.ready_queue_contains(tid)));

        resume(tid).unwrap();
        assert_eq!(
            scheduler::with_scheduler(|s| s.thread_state(tid)),
            Some(ThreadState::Ready)
        );
        assert!(scheduler::with_scheduler(|s| s.ready_queue_contains(tid)));

        let _ = terminate(tid);
    }

    #[test]
    fn thread_ids_reflects_the_live_table() {
        let _g = reset();
        let tid = spawn(returns_immediately).unwrap();
        let ids = scheduler::with_scheduler(|s| s.thread_ids());
        assert!(ids.contains(&ThreadId(0)));
        assert!(ids.contains(&tid));
        let _ = terminate(tid);
    }

    #[test]
    fn double_lock_by_holder_is_a_protocol_error() {
        let _g = reset();
        assert!(mutex_lock().is_ok());
        assert_eq!(
            mutex_lock(),
            Err(Error::MutexProtocol("lock: already held by this thread"))
        );
        assert!(mutex_unlock().is_ok());
    }

    #[test]
    fn unlock_of_unheld_mutex_errors() {
        let _g = reset();
        assert_eq!(
            mutex_unlock(),
            Err(Error::MutexProtocol("unlock: not held by this thread"))
        );
    }

    #[test]
    fn get_tid_on_main_thread_is_zero() {
        let _g = reset();
        assert_eq!(get_tid(), ThreadId(0));
        assert_eq!(get_total_quantums(), 1);
        assert_eq!(get_quantums(ThreadId(0)), Ok(1));
    }

    // P-A3: sum of per-thread quantums equals the global count, from the
    // very first dispatch onward.
    #[test]
    fn per_thread_quantums_sum_to_total() {
        let _g = reset();
        let a = spawn(returns_immediately).unwrap();
        let b = spawn(returns_immediately).unwrap();
        let sum: u64 = scheduler::with_scheduler(|s| s.thread_ids())
            .into_iter()
            .map(|tid| get_quantums(tid).unwrap())
            .sum();
        assert_eq!(sum, get_total_quantums());
        let _ = terminate(a);
        let _ = terminate(b);
    }

    // Unlike the tests above, this one runs with a short real quantum and
    // lets `SIGVTALRM` actually preempt, the way scenario 1 of the testable
    // properties (two-thread ping-pong) requires. Bounds are deliberately
    // loose: real timer delivery jitter under a test harness means exact
    // quantum counts aren't reproducible, only "preemption happened".
    #[test]
    fn real_preemption_advances_a_background_worker() {
        let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        init(5_000).expect("init");
        COUNTER.store(0, Ordering::SeqCst);
        let worker = spawn(bump_forever).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(150));

        assert!(get_total_quantums() > 1, "timer never preempted");
        assert!(COUNTER.load(Ordering::SeqCst) > 0, "worker never ran");
        assert_eq!(get_tid(), ThreadId(0), "test body always resumes as the main thread");

        let _ = terminate(worker);
        drop(guard);
    }

    static FIRST_ACQUIRED: AtomicBool = AtomicBool::new(false);
    static SECOND_ACQUIRED: AtomicBool = AtomicBool::new(false);
    static HOLD_SPINS: AtomicU64 = AtomicU64::new(0);

    extern "C" fn holder_then_release() {
        mutex_lock().expect("uncontended lock must succeed");
        FIRST_ACQUIRED.store(true, Ordering::SeqCst);
        // Hold the mutex across several real quantums so the second thread
        // is forced to suspend inside `mutex_lock` (scenario 3's handoff)
        // before this one releases it.
        while HOLD_SPINS.load(Ordering::SeqCst) < 2_000_000 {
            HOLD_SPINS.fetch_add(1, Ordering::SeqCst);
        }
        mutex_unlock().expect("still the holder");
        loop {}
    }

    extern "C" fn waiter_then_mark() {
        mutex_lock().expect("eventually granted once the holder unlocks");
        SECOND_ACQUIRED.store(true, Ordering::SeqCst);
        loop {}
    }

    // Scenario 3 (mutex handoff) / P-A5: a contended `mutex_lock()` call
    // suspends its caller rather than busy-waiting, and the dispatch-step
    // handoff (scheduler.rs's mutex-grant on dispatch) grants the mutex to
    // the waiter the next time it runs after `mutex_unlock`. This is the
    // only test that drives the lock/suspend/handoff path across a real
    // context switch rather than just the single-thread error paths.
    #[test]
    fn mutex_handoff_grants_to_the_contended_waiter_on_unlock() {
        let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        init(5_000).expect("init");
        FIRST_ACQUIRED.store(false, Ordering::SeqCst);
        SECOND_ACQUIRED.store(false, Ordering::SeqCst);
        HOLD_SPINS.store(0, Ordering::SeqCst);

        let holder = spawn(holder_then_release).unwrap();
        let waiter = spawn(waiter_then_mark).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(300));

        assert!(FIRST_ACQUIRED.load(Ordering::SeqCst), "thread 1 never acquired the mutex");
        assert!(
            SECOND_ACQUIRED.load(Ordering::SeqCst),
            "thread 2 was never granted the mutex after unlock"
        );
        assert_eq!(
            scheduler::with_scheduler(|s| s.mutex.holder()),
            Some(waiter),
            "mutex handoff did not complete: thread 2 should hold the mutex"
        );

        let _ = terminate(holder);
        let _ = terminate(waiter);
        drop(guard);
    }
}
