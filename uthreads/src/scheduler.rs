//! Scheduler & Timer Handler (spec section 4.A.2): ready queue, running
//! pointer, dispatch, and the signal-masking discipline that makes it all
//! safe to mutate from a signal handler.
//!
//! Mirrors `valibali-cluu/kernel/src/scheduler/sched_core.rs`'s
//! mechanism/policy split and `.../scheduler/mod.rs`'s singleton-accessor
//! pattern (`with_scheduler`/`with_scheduler_mut`), generalized from that
//! kernel's pluggable policies down to one fixed round-robin policy.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::context::{self, RawContext};
use crate::error::{log_system_error, Error};
use crate::mutex::MutexState;
use crate::thread::{ThreadId, ThreadRecord, ThreadState, MAX_THREADS};

lazy_static! {
    /// The global scheduler singleton. `None` until [`install`] runs.
    static ref SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);
}

/// The set of signals this library masks around every critical section:
/// just `SIGVTALRM`, the virtual-timer signal that drives preemption.
fn timer_sigset() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        set
    }
}

/// RAII signal mask. Blocks `SIGVTALRM` on construction and unblocks it on
/// drop, realizing spec section 4.A.2's "signal masking discipline": every
/// public entry point, and every re-entry into the dispatch handler, holds
/// one of these for the duration of its critical section.
pub(crate) struct SignalGuard;

impl SignalGuard {
    pub(crate) fn block() -> Self {
        let set = timer_sigset();
        unsafe {
            libc::sigprocmask(libc::SIG_SETMASK, &set, std::ptr::null_mut());
        }
        SignalGuard
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        let set = timer_sigset();
        unsafe {
            libc::sigprocmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
        }
    }
}

/// Scheduler state: thread table, ready queue, free-id pool, mutex, and the
/// global quantum counter (spec section 3.1).
pub struct Scheduler {
    threads: HashMap<ThreadId, ThreadRecord>,
    ready_queue: VecDeque<ThreadId>,
    free_ids: BinaryHeap<Reverse<usize>>,
    running: ThreadId,
    pub(crate) mutex: MutexState,
    total_quantums: u64,
    /// Set by `begin_self_terminate`; tells `prepare_dispatch` to skip the
    /// save/re-enqueue steps for the outgoing thread (spec section 4.A.2
    /// step 1-2), since that thread's record has already been destroyed.
    self_terminating: bool,
    /// Throwaway landing spot for the register save half of a dispatch that
    /// follows self-termination: nothing ever reads it back, but `switch`
    /// unconditionally writes through its `from` pointer, so it must point
    /// at valid memory.
    scratch: RawContext,
}

impl Scheduler {
    fn new() -> Self {
        let mut threads = HashMap::new();
        let mut initial = ThreadRecord::new_initial();
        initial.quantums_run = 1;
        threads.insert(ThreadId(0), initial);
        Scheduler {
            threads,
            ready_queue: VecDeque::new(),
            free_ids: BinaryHeap::new(),
            running: ThreadId(0),
            mutex: MutexState::default(),
            total_quantums: 1,
            self_terminating: false,
            scratch: RawContext::new_for_current(),
        }
    }

    pub fn running_id(&self) -> ThreadId {
        self.running
    }

    pub fn total_quantums(&self) -> u64 {
        self.total_quantums
    }

    pub fn quantums_of(&self, tid: ThreadId) -> Option<u64> {
        self.threads.get(&tid).map(|t| t.quantums_run)
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.threads.contains_key(&tid)
    }

    pub fn is_blocked(&self, tid: ThreadId) -> bool {
        self.threads.get(&tid).map(|t| t.blocked).unwrap_or(false)
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.keys().copied().collect()
    }

    /// Thread state as spec section 3.1 defines it: Running / Ready /
    /// Blocked, with mutex-waiting tracked separately. Exposed for tests and
    /// diagnostics (spec's external surface never calls for it directly).
    pub fn thread_state(&self, tid: ThreadId) -> Option<ThreadState> {
        let record = self.threads.get(&tid)?;
        Some(if record.blocked {
            ThreadState::Blocked
        } else if self.running == tid {
            ThreadState::Running
        } else {
            ThreadState::Ready
        })
    }

    pub fn ready_queue_contains(&self, tid: ThreadId) -> bool {
        self.ready_queue.contains(&tid)
    }

    fn smallest_free_id(&mut self) -> ThreadId {
        match self.free_ids.pop() {
            Some(Reverse(id)) => ThreadId(id),
            None => ThreadId(self.threads.len()),
        }
    }

    /// Spawn (spec section 4.A.3). Caller already holds a [`SignalGuard`].
    pub fn spawn(&mut self, entry: extern "C" fn()) -> Result<ThreadId, Error> {
        if self.threads.len() == MAX_THREADS {
            return Err(Error::ResourceExhausted(MAX_THREADS));
        }
        let id = self.smallest_free_id();
        self.threads.insert(id, ThreadRecord::new_spawned(id, entry));
        self.ready_queue.push_front(id);
        Ok(id)
    }

    /// Remove every trace of `tid` from the ready queue and mutex-wait set,
    /// releasing the mutex if `tid` held it. Common to both termination
    /// paths (spec section 4.A.3's `terminate`).
    fn scrub(&mut self, tid: ThreadId) {
        self.ready_queue.retain(|&t| t != tid);
        self.mutex.remove_waiter(tid);
        if self.mutex.holder() == Some(tid) {
            // Spec section 9's documented policy: release, wake nobody.
            self.mutex.release();
        }
    }

    /// Terminate a thread that is not the currently-running one. Returns
    /// the freed record so the caller can drop it (and its stack) outside
    /// any lock.
    pub fn terminate_other(&mut self, tid: ThreadId) -> ThreadRecord {
        self.scrub(tid);
        self.free_ids.push(Reverse(tid.0));
        self.threads.remove(&tid).expect("tid existence checked by caller")
    }

    /// Terminate the running thread: scrub its bookkeeping, remove and
    /// return its record (so the caller drops its stack immediately,
    /// before any dispatch happens — spec section 9's stack-ownership
    /// note), and mark the scheduler so the next `dispatch` skips the
    /// save/re-enqueue steps for it.
    pub fn begin_self_terminate(&mut self) -> ThreadRecord {
        let tid = self.running;
        let record = self.terminate_other(tid);
        self.self_terminating = true;
        record
    }

    pub fn block(&mut self, tid: ThreadId) -> Result<(), Error> {
        if !self.threads.contains_key(&tid) {
            return Err(Error::UnknownThread(tid));
        }
        if tid == ThreadId(0) {
            return Err(Error::InvalidArgument("cannot block the main thread"));
        }
        self.threads.get_mut(&tid).unwrap().blocked = true;
        self.ready_queue.retain(|&t| t != tid);
        Ok(())
    }

    /// Wake the first non-blocked mutex waiter (spec section 4.A.4's
    /// `unlock`): move it into the ready queue, but leave it in the wait
    /// set. Its actual acquisition completes in `prepare_dispatch`'s
    /// mutex-handoff step once it is dispatched, not here.
    pub fn wake_mutex_waiter(&mut self) {
        let threads = &self.threads;
        let woken = self
            .mutex
            .next_ready_waiter(|tid| threads.get(&tid).map(|t| t.blocked).unwrap_or(false));
        if let Some(tid) = woken {
            self.ready_queue.push_front(tid);
        }
    }

    pub fn resume(&mut self, tid: ThreadId) -> Result<(), Error> {
        let record = self.threads.get_mut(&tid).ok_or(Error::UnknownThread(tid))?;
        if record.blocked {
            record.blocked = false;
            self.ready_queue.push_front(tid);
        }
        Ok(())
    }

    /// Core of spec section 4.A.2's dispatch algorithm. Returns the raw
    /// context pointers to switch from/to; the actual [`context::switch`]
    /// happens after the caller releases the scheduler lock, so the switch
    /// never runs while the mutex guarding this struct is held.
    fn prepare_dispatch(&mut self) -> (*mut RawContext, *const RawContext) {
        let outgoing = self.running;
        let from_ptr: *mut RawContext = if self.self_terminating {
            &mut self.scratch as *mut _
        } else {
            if !self.is_blocked(outgoing) && !self.mutex.is_waiting(outgoing) {
                self.ready_queue.push_front(outgoing);
            }
            &mut self.threads.get_mut(&outgoing).unwrap().context as *mut _
        };

        let next = self.ready_queue.pop_back().expect("ready queue empty: no thread to dispatch");
        self.running = next;

        if self.mutex.is_waiting(next) && !self.mutex.is_locked() {
            self.mutex.grant(next);
        }

        let record = self.threads.get_mut(&next).unwrap();
        record.quantums_run += 1;
        self.total_quantums += 1;
        self.self_terminating = false;

        let to_ptr: *const RawContext = &record.context as *const _;
        (from_ptr, to_ptr)
    }
}

/// Run one dispatch cycle (spec section 4.A.2): save the outgoing thread
/// (unless self-terminating), pick the next ready thread, hand off the
/// mutex if applicable, and switch. Safe to call both from the
/// `SIGVTALRM` handler and directly as a voluntary-yield primitive, as long
/// as the caller already holds a [`SignalGuard`].
pub(crate) fn dispatch() {
    let (from, to) = with_scheduler_mut(Scheduler::prepare_dispatch);
    unsafe {
        context::switch(from, to);
    }
}

extern "C" fn timer_handler(_signo: libc::c_int) {
    // SIGVTALRM arrives with itself already blocked by default kernel
    // signal delivery semantics, so re-entering scheduler state here is
    // safe without taking out an additional SignalGuard.
    dispatch();
}

/// Called by [`crate::context::trampoline`] if a spawned thread's entry
/// function returns instead of calling `terminate` on itself.
pub(crate) fn terminate_running_thread_after_return() -> ! {
    let _guard = SignalGuard::block();
    let freed = with_scheduler_mut(Scheduler::begin_self_terminate);
    drop(freed); // stack released before dispatch touches anything
    dispatch();
    unreachable!("a terminated thread is never dispatched again");
}

/// Run `f` with shared access to the scheduler singleton.
pub(crate) fn with_scheduler<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    let guard = SCHEDULER.lock().unwrap();
    f(guard.as_ref().expect("uthreads: not initialized"))
}

/// Run `f` with exclusive access to the scheduler singleton.
pub(crate) fn with_scheduler_mut<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mut guard = SCHEDULER.lock().unwrap();
    f(guard.as_mut().expect("uthreads: not initialized"))
}

pub(crate) fn is_initialized() -> bool {
    SCHEDULER.lock().unwrap().is_some()
}

/// Destroy every thread record (releasing their stacks) without
/// dispatching. Used by `terminate(0)`, which exits the process afterward.
pub(crate) fn destroy_all() {
    *SCHEDULER.lock().unwrap() = None;
}

/// Install the scheduler singleton, the `SIGVTALRM` handler, and the
/// virtual-interval timer (spec section 4.A.3's `init`).
pub(crate) fn install(quantum_usecs: i64) {
    *SCHEDULER.lock().unwrap() = Some(Scheduler::new());

    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = timer_handler as usize;
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }
    action.sa_flags = 0;

    unsafe {
        if libc::sigaction(libc::SIGVTALRM, &action, std::ptr::null_mut()) < 0 {
            log_system_error("sigaction error.");
        }
    }

    let interval = libc::timeval { tv_sec: 0, tv_usec: quantum_usecs };
    let timer = libc::itimerval { it_interval: interval, it_value: interval };
    unsafe {
        if libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) != 0 {
            log_system_error("timer error");
        }
    }
}
