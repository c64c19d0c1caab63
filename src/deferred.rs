//! Manually resolvable unit of future work.
//!
//! A [`Deferred`] is created pending and settled exactly once by whoever holds a
//! handle, independent of who awaits it. Any number of [`Wait`] futures can be
//! taken from it; they all complete with a clone of the resolved value.
//!
//! 可手动解决的未来工作单元。
//!
//! `Deferred` 以待处理状态创建，由任意持有句柄者恰好结算一次，与等待者无关。
//! 可以从中获取任意数量的 `Wait` future，它们都以解决值的克隆完成。

use std::fmt;
use std::future::Future;
use std::mem::MaybeUninit;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{Cancelled, TryWaitError};
use crate::notify::{OnceNotify, Subscription};
use crate::shim::atomic::{AtomicU8, Ordering};
use crate::shim::cell::UnsafeCell;
use crate::shim::sync::Arc;
use crate::waker_slot::WakerSlot;

// States for the value cell
const PENDING: u8 = 0; // Nothing stored yet
const WRITING: u8 = 1; // A resolver owns the cell
const SETTLED: u8 = 2; // Value is readable
const CANCELLED: u8 = 3; // Torn down, no value will arrive

/// Observable state of a [`Deferred`]
///
/// `Deferred` 的可观察状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredState {
    /// Waiting to be resolved.
    Pending,
    /// Resolved; the value is available.
    Settled,
    /// Cancelled before resolution.
    Cancelled,
}

struct Inner<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
    settled: OnceNotify,
}

// SAFETY: the value is written once under WRITING and only read through shared
// references after SETTLED is published with Release ordering.
unsafe impl<T: Send + Sync> Send for Inner<T> {}
unsafe impl<T: Send + Sync> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            settled: OnceNotify::new(),
        }
    }

    #[inline]
    fn state(&self) -> DeferredState {
        match self.state.load(Ordering::Acquire) {
            SETTLED => DeferredState::Settled,
            CANCELLED => DeferredState::Cancelled,
            _ => DeferredState::Pending,
        }
    }
}

impl<T: Clone> Inner<T> {
    /// `None` while pending.
    #[inline]
    fn outcome(&self) -> Option<Result<T, Cancelled>> {
        match self.state.load(Ordering::Acquire) {
            // SAFETY: SETTLED is only published after the value was written,
            // and the value is never mutated again.
            SETTLED => Some(Ok(self
                .value
                .with(|slot| unsafe { (*slot).assume_init_ref().clone() }))),
            CANCELLED => Some(Err(Cancelled)),
            _ => None,
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) == SETTLED {
            // SAFETY: SETTLED means the value was initialized and never taken.
            self.value.with_mut(|slot| unsafe { (*slot).assume_init_drop() });
        }
    }
}

/// Manually resolvable future value
///
/// Cloning a `Deferred` yields another handle to the same unit.
///
/// 可手动解决的未来值。克隆 `Deferred` 得到同一单元的另一个句柄。
///
/// # Example
///
/// ```
/// use lite_ready::deferred::Deferred;
///
/// # tokio_test::block_on(async {
/// let unit = Deferred::<u32>::new();
/// let waiter = unit.future();
///
/// let resolver = unit.clone();
/// tokio::spawn(async move {
///     resolver.resolve(7);
/// });
///
/// assert_eq!(waiter.await, Ok(7));
/// assert!(!unit.resolve(8)); // second resolution is a no-op
/// # });
/// ```
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.inner.state())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// Create a pending unit
    ///
    /// 创建一个待处理单元
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Settle the unit with `value` and wake every waiter
    ///
    /// Returns `false` (and drops `value`) if the unit was already settled or
    /// cancelled. Never errors and never re-delivers.
    ///
    /// 以 `value` 结算单元并唤醒所有等待者
    ///
    /// 如果单元已结算或已取消，返回 `false`（并丢弃 `value`）。
    pub fn resolve(&self, value: T) -> bool {
        if self
            .inner
            .state
            .compare_exchange(PENDING, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("deferred unit already settled, ignoring resolve");
            return false;
        }

        // SAFETY: WRITING gives this call exclusive access to the cell.
        self.inner.value.with_mut(|slot| unsafe {
            (*slot).write(value);
        });
        self.inner.state.store(SETTLED, Ordering::Release);
        self.inner.settled.fire();
        true
    }

    /// Cancel a pending unit; waiters complete with [`Cancelled`]
    ///
    /// Returns `false` if the unit was already settled or cancelled.
    ///
    /// 取消待处理单元；等待者以 `Cancelled` 完成
    pub fn cancel(&self) -> bool {
        if self
            .inner
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.inner.settled.fire();
        true
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> DeferredState {
        self.inner.state()
    }

    /// Whether the unit holds a value
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.state() == DeferredState::Settled
    }

    /// Read the value without waiting
    ///
    /// 不等待地读取值
    #[inline]
    pub fn try_value(&self) -> Result<T, TryWaitError> {
        match self.inner.outcome() {
            Some(outcome) => outcome.map_err(TryWaitError::from),
            None => Err(TryWaitError::Pending),
        }
    }

    /// Future completing once the unit settles
    ///
    /// Every future taken from the same unit observes the same settlement.
    ///
    /// 在单元结算时完成的 future。来自同一单元的所有 future 观察到相同的结算。
    #[inline]
    pub fn future(&self) -> Wait<T> {
        Wait {
            inner: self.inner.clone(),
            slot: None,
            subscription: None,
        }
    }

    /// Block the current thread until the unit settles
    ///
    /// Intended for synchronous callers. Do not call from inside an async task.
    ///
    /// 阻塞当前线程直到单元结算。仅用于同步代码，不要在异步任务中调用。
    pub fn blocking_wait(&self) -> Result<T, Cancelled> {
        futures::executor::block_on(self.future())
    }

    /// Number of waiter registrations held by the unit
    ///
    /// Includes dropped waiters not yet reclaimed; stays within a constant
    /// factor of the live waiters.
    ///
    /// 单元持有的等待者注册数量（包括尚未回收的已丢弃等待者）
    #[inline]
    pub fn waiters(&self) -> usize {
        self.inner.settled.pending()
    }

    /// Whether both handles refer to the same unit
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Future returned by [`Deferred::future`]
///
/// `Deferred::future` 返回的 Future
pub struct Wait<T> {
    inner: Arc<Inner<T>>,
    slot: Option<Arc<WakerSlot>>,
    subscription: Option<Subscription>,
}

impl<T> Unpin for Wait<T> {}

impl<T> Wait<T> {
    /// Whether this future waits on `unit`
    #[inline]
    pub fn is_for(&self, unit: &Deferred<T>) -> bool {
        Arc::ptr_eq(&self.inner, &unit.inner)
    }
}

impl<T> fmt::Debug for Wait<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("state", &self.inner.state())
            .field("registered", &self.slot.is_some())
            .finish()
    }
}

impl<T: Clone> Future for Wait<T> {
    type Output = Result<T, Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // Fast path: already settled
        if let Some(outcome) = this.inner.outcome() {
            return Poll::Ready(outcome);
        }

        match &this.slot {
            Some(slot) => slot.register(cx.waker()),
            None => {
                let slot = Arc::new(WakerSlot::new());
                slot.register(cx.waker());
                let listener = slot.clone();
                this.subscription = Some(this.inner.settled.once(move || listener.wake()));
                this.slot = Some(slot);
            }
        }

        // Check again after registering
        match this.inner.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> Drop for Wait<T> {
    fn drop(&mut self) {
        if let Some(subscription) = &self.subscription {
            subscription.detach();
        }
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolve_before_await() {
        let unit = Deferred::<String>::new();
        assert!(unit.resolve("ready".to_string()));

        assert_eq!(unit.future().await, Ok("ready".to_string()));
        assert_eq!(unit.state(), DeferredState::Settled);
    }

    #[tokio::test]
    async fn test_resolve_from_task() {
        let unit = Deferred::<i32>::new();
        let resolver = unit.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(42);
        });

        assert_eq!(unit.future().await, Ok(42));
    }

    #[tokio::test]
    async fn test_every_waiter_completes() {
        let unit = Deferred::<u64>::new();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let waiter = unit.future();
                tokio::spawn(waiter)
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        unit.resolve(9);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok(9));
        }
    }

    #[tokio::test]
    async fn test_second_resolve_is_noop() {
        let unit = Deferred::<i32>::new();
        let waiter = unit.future();

        assert!(unit.resolve(1));
        assert!(!unit.resolve(2));
        assert!(!unit.cancel());

        assert_eq!(waiter.await, Ok(1));
        assert_eq!(unit.try_value(), Ok(1));
    }

    #[tokio::test]
    async fn test_cancel_completes_waiters() {
        let unit = Deferred::<i32>::new();
        let waiter = tokio::spawn(unit.future());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(unit.cancel());
        assert!(!unit.resolve(5));

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
        assert_eq!(unit.state(), DeferredState::Cancelled);
        assert_eq!(unit.try_value(), Err(TryWaitError::Cancelled));
    }

    #[test]
    fn test_try_value_pending() {
        let unit = Deferred::<i32>::new();
        assert_eq!(unit.try_value(), Err(TryWaitError::Pending));
        assert!(!unit.is_settled());
    }

    #[test]
    fn test_handles_share_identity() {
        let unit = Deferred::<()>::new();
        let other = Deferred::<()>::new();

        assert!(unit.ptr_eq(&unit.clone()));
        assert!(!unit.ptr_eq(&other));
        assert!(unit.future().is_for(&unit));
        assert!(!unit.future().is_for(&other));
    }

    #[test]
    fn test_dropped_waiter_detaches() {
        let unit = Deferred::<i32>::new();
        let mut waiter = unit.future();

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut waiter).poll(&mut cx).is_pending());
        assert_eq!(unit.inner.settled.pending(), 1);

        drop(waiter);
        assert_eq!(unit.inner.settled.compact(), 1);
        assert!(unit.resolve(3));
    }

    #[test]
    fn test_polled_then_dropped_waiters_are_reclaimed() {
        let unit = Deferred::<i32>::new();
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        for _ in 0..10_000 {
            let mut waiter = unit.future();
            assert!(Pin::new(&mut waiter).poll(&mut cx).is_pending());
        }
        assert!(unit.waiters() <= 64);
        assert_eq!(unit.state(), DeferredState::Pending);

        let last = unit.future();
        assert!(unit.resolve(4));
        assert_eq!(futures::executor::block_on(last), Ok(4));
    }

    #[test]
    fn test_blocking_wait_across_threads() {
        let unit = Deferred::<String>::new();
        let resolver = unit.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            resolver.resolve("hello".to_string());
        });

        assert_eq!(unit.blocking_wait(), Ok("hello".to_string()));
    }

    #[test]
    fn test_value_dropped_with_unit() {
        let payload = Arc::new(());
        let unit = Deferred::<Arc<()>>::new();
        unit.resolve(payload.clone());
        assert_eq!(Arc::strong_count(&payload), 2);

        drop(unit);
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
