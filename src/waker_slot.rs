//! Single-waker slot guarded by a small atomic state machine
//!
//! Each future waiting on a [`Deferred`](crate::deferred::Deferred) owns one slot.
//! The slot is shared with the listener that the future registers on the unit's
//! settle channel, so a wake coming from another thread always reaches the most
//! recently registered waker.
//!
//! 由小型原子状态机保护的单 waker 槽位
//!
//! 每个等待 `Deferred` 的 future 拥有一个槽位，并与其在结算通道上注册的监听器共享。

use std::fmt;
use std::task::Waker;

use crate::shim::atomic::{AtomicUsize, Ordering};
use crate::shim::cell::UnsafeCell;

const IDLE: usize = 0;
const REGISTERING: usize = 0b01;
const WAKING: usize = 0b10;

pub(crate) struct WakerSlot {
    state: AtomicUsize,
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: the waker cell is only touched by whoever moved the state out of IDLE.
unsafe impl Send for WakerSlot {}
unsafe impl Sync for WakerSlot {}

impl WakerSlot {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicUsize::new(IDLE),
            waker: UnsafeCell::new(None),
        }
    }

    /// Store `waker`, replacing any previous one.
    ///
    /// If a wake lands while the slot is held, the fresh waker is woken before
    /// returning so the notification is not lost.
    pub(crate) fn register(&self, waker: &Waker) {
        match self
            .state
            .compare_exchange(IDLE, REGISTERING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                let stale = self.waker.with_mut(|slot| {
                    // SAFETY: REGISTERING gives exclusive access to the cell.
                    let slot = unsafe { &mut *slot };
                    if slot.as_ref().is_some_and(|current| current.will_wake(waker)) {
                        None
                    } else {
                        slot.replace(waker.clone())
                    }
                });

                if self
                    .state
                    .compare_exchange(REGISTERING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // state is REGISTERING | WAKING: the waker owes a wake-up
                    // SAFETY: the concurrent waker backed off, access is still exclusive.
                    let pending = self.waker.with_mut(|slot| unsafe { (*slot).take() });
                    self.state.store(IDLE, Ordering::Release);
                    if let Some(pending) = pending {
                        pending.wake();
                    }
                }
                drop(stale);
            }
            Err(WAKING) => waker.wake_by_ref(),
            // Wait futures are polled by one task at a time.
            Err(_) => {}
        }
    }

    /// Wake and clear the stored waker, if any.
    pub(crate) fn wake(&self) {
        if self.state.fetch_or(WAKING, Ordering::AcqRel) != IDLE {
            return;
        }
        // SAFETY: WAKING gives exclusive access to the cell.
        let waker = self.waker.with_mut(|slot| unsafe { (*slot).take() });
        self.state.store(IDLE, Ordering::Release);
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl fmt::Debug for WakerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakerSlot").finish_non_exhaustive()
    }
}
