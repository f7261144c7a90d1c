//! Coordination between the owner thread that edits a document and the
//! workers rendering it: one coarse mutex plus a cooperative abort flag.

use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared cancellation token.  Cloning shares the same flag.
///
/// The owner sets it, renderers poll it between tiles and scan rows.  A
/// render that observes it returns no result; it is never reset implicitly.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
    #[cfg(test)]
    polls_left: Option<Arc<AtomicUsize>>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.count_poll();
        self.raised.load(Ordering::Acquire)
    }

    #[cfg(not(test))]
    #[inline(always)]
    fn count_poll(&self) {}

    #[cfg(test)]
    fn count_poll(&self) {
        if let Some(left) = &self.polls_left {
            let prev = left
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
                .unwrap_or_else(|n| n);
            if prev <= 1 {
                self.request();
            }
        }
    }

    /// Flag that raises itself on its `polls`-th check, for stopping a
    /// render at a known point.
    #[cfg(test)]
    pub(crate) fn tripping_after(polls: usize) -> Self {
        Self { raised: Arc::default(), polls_left: Some(Arc::new(AtomicUsize::new(polls))) }
    }
}

/// `true` when an optional flag is present and raised.
#[inline]
pub(crate) fn aborted(abort: Option<&AbortFlag>) -> bool {
    abort.is_some_and(AbortFlag::is_set)
}

/// State guarded by a single non-reentrant mutex, paired with the abort flag
/// its renderers poll.
///
/// All edits of the guarded value (including on-demand tile creation) happen
/// under [`Synchronizer::lock`].  Renderers hold the lock only long enough to
/// snapshot what they need.
#[derive(Debug, Default)]
pub struct Synchronizer<T> {
    state: Mutex<T>,
    abort: AbortFlag,
}

impl<T> Synchronizer<T> {
    pub fn new(state: T) -> Self {
        Self { state: Mutex::new(state), abort: AbortFlag::new() }
    }

    /// Acquire the document lock.  A panic on another thread while holding
    /// it does not poison the document for everyone else.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    pub fn request_abort(&self) {
        self.abort.request();
    }

    pub fn clear_abort(&self) {
        self.abort.clear();
    }

    pub fn into_inner(self) -> T {
        self.state.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn flag_is_shared_between_clones() {
        let a = AbortFlag::new();
        let b = a.clone();
        assert!(!b.is_set());
        a.request();
        assert!(b.is_set());
        assert!(aborted(Some(&b)));
        assert!(!aborted(None));
        b.clear();
        assert!(!a.is_set());
    }

    #[test]
    fn tripping_flag_raises_on_the_counted_poll() {
        let flag = AbortFlag::tripping_after(3);
        assert!(!flag.is_set());
        assert!(!flag.is_set());
        assert!(flag.is_set());
    }

    #[test]
    fn flag_crosses_threads() {
        let flag = AbortFlag::new();
        let worker = {
            let flag = flag.clone();
            thread::spawn(move || {
                while !flag.is_set() {
                    thread::yield_now();
                }
            })
        };
        flag.request();
        worker.join().unwrap();
    }

    #[test]
    fn lock_survives_poisoning() {
        let sync = Arc::new(Synchronizer::new(1u32));
        let s = Arc::clone(&sync);
        let _ = thread::spawn(move || {
            let _guard = s.lock();
            panic!("worker died holding the lock");
        })
        .join();
        *sync.lock() += 1;
        assert_eq!(*sync.lock(), 2);
    }
}
