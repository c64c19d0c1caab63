//! One-shot, multi-listener notification channel
//!
//! A host resource owns one [`OnceNotify`] per readiness transition. Subscribers
//! attach a callback with [`OnceNotify::once`]; the host calls
//! [`OnceNotify::fire`] exactly once, which invokes every registered callback
//! and clears the registry.
//!
//! A listener registered after the channel fired is invoked immediately, inline,
//! before `once` returns. A registration racing a concurrent `fire` is delivered
//! by whichever side observes it last, never twice.
//!
//! 一次性、多监听者通知通道
//!
//! 宿主资源为每次就绪转换持有一个 `OnceNotify`。订阅者通过 `once` 注册回调；
//! 宿主恰好调用一次 `fire`，调用所有已注册的回调并清空注册表。
//!
//! 在通道触发之后注册的监听者会在 `once` 返回之前被立即调用。

use std::fmt;

use crate::shim::atomic::{fence, AtomicU8, AtomicUsize, Ordering};
use crate::shim::queue::Queue;
use crate::shim::sync::Arc;

// Channel states
const IDLE: u8 = 0;
const FIRED: u8 = 1;

// Per-listener claim states
const ARMED: u8 = 0;
const DELIVERED: u8 = 1;
const DETACHED: u8 = 2;

// Registry size below which registration never compacts
const COMPACT_FLOOR: usize = 32;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Listener {
    claim: Arc<AtomicU8>,
    callback: Callback,
}

impl Listener {
    /// Run the callback unless it was detached or already delivered.
    #[inline]
    fn deliver(self) -> bool {
        if self
            .claim
            .compare_exchange(ARMED, DELIVERED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            (self.callback)();
            true
        } else {
            false
        }
    }

    #[inline]
    fn is_armed(&self) -> bool {
        self.claim.load(Ordering::Acquire) == ARMED
    }
}

/// One-shot notification with any number of listeners
///
/// 带任意数量监听者的一次性通知
pub struct OnceNotify {
    state: AtomicU8,
    listeners: Queue<Listener>,
    // registry size left by the last compaction
    watermark: AtomicUsize,
}

impl OnceNotify {
    /// Create a channel that has not fired yet
    ///
    /// 创建一个尚未触发的通道
    #[inline]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            listeners: Queue::new(),
            watermark: AtomicUsize::new(0),
        }
    }

    /// Whether [`fire`](Self::fire) has been called
    ///
    /// 是否已调用 `fire`
    #[inline]
    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    /// Number of registered listeners still waiting in the registry
    ///
    /// Detached listeners are counted until they are reclaimed. Registration
    /// reclaims them once the registry doubles past the size left by the last
    /// compaction, so the count stays within a constant factor of the live
    /// listeners.
    ///
    /// 注册表中仍在等待的监听者数量。已分离的监听者在注册时被摊还回收，
    /// 因此数量始终与存活监听者数量成常数倍关系。
    #[inline]
    pub fn pending(&self) -> usize {
        self.listeners.len()
    }

    /// Register `listener` to run when the channel fires
    ///
    /// If the channel already fired, `listener` runs on the calling thread before
    /// this method returns.
    ///
    /// 注册在通道触发时运行的 `listener`
    ///
    /// 如果通道已经触发，`listener` 会在此方法返回前在调用线程上运行。
    pub fn once<F>(&self, listener: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let claim = Arc::new(AtomicU8::new(ARMED));
        let subscription = Subscription {
            claim: claim.clone(),
        };
        let listener = Listener {
            claim,
            callback: Box::new(listener),
        };

        if self.is_fired() {
            tracing::trace!("channel already fired, delivering late listener inline");
            listener.deliver();
            return subscription;
        }

        self.listeners.push(listener);
        fence(Ordering::SeqCst);

        // fire() may have drained the registry before our push became visible
        if self.is_fired() {
            self.drain();
        } else {
            self.reclaim_detached();
        }

        subscription
    }

    /// Deliver to every registered listener, then clear the registry
    ///
    /// Returns the number of listeners invoked. Only the first call delivers;
    /// later calls are no-ops returning `0`. Safe with zero listeners.
    ///
    /// 通知所有已注册的监听者，然后清空注册表
    ///
    /// 返回被调用的监听者数量。只有第一次调用会投递，之后的调用返回 `0`。
    pub fn fire(&self) -> usize {
        if self.state.swap(FIRED, Ordering::SeqCst) == FIRED {
            return 0;
        }
        fence(Ordering::SeqCst);

        let delivered = self.drain();
        tracing::debug!(delivered, "notification fired");
        delivered
    }

    /// Drop detached listeners from the registry
    ///
    /// Returns how many were removed.
    ///
    /// 从注册表中移除已分离的监听者，返回移除数量
    pub fn compact(&self) -> usize {
        let mut removed = 0;
        for _ in 0..self.listeners.len() {
            let Some(listener) = self.listeners.pop() else {
                break;
            };
            if listener.is_armed() {
                self.listeners.push(listener);
            } else {
                removed += 1;
            }
        }
        fence(Ordering::SeqCst);

        // a concurrent fire() may have missed listeners we were holding
        if self.is_fired() {
            self.drain();
        }
        removed
    }

    /// Amortized compaction: only runs once the registry has doubled since the
    /// last pass.
    fn reclaim_detached(&self) {
        let threshold = self
            .watermark
            .load(Ordering::Relaxed)
            .saturating_mul(2)
            .max(COMPACT_FLOOR);
        if self.listeners.len() <= threshold {
            return;
        }

        let removed = self.compact();
        let remaining = self.listeners.len();
        self.watermark.store(remaining, Ordering::Relaxed);
        tracing::trace!(removed, remaining, "reclaimed detached listeners");
    }

    fn drain(&self) -> usize {
        let mut delivered = 0;
        while let Some(listener) = self.listeners.pop() {
            if listener.deliver() {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Default for OnceNotify {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OnceNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceNotify")
            .field("fired", &self.is_fired())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Handle to a listener registered with [`OnceNotify::once`]
///
/// Dropping the handle leaves the listener armed; call
/// [`detach`](Self::detach) to withdraw it.
///
/// 通过 `OnceNotify::once` 注册的监听者句柄
///
/// 丢弃句柄不会撤销监听者；调用 `detach` 以撤销。
pub struct Subscription {
    claim: Arc<AtomicU8>,
}

impl Subscription {
    /// Withdraw the listener
    ///
    /// Returns `true` if the listener had not run yet and now never will.
    ///
    /// 撤销监听者。如果监听者尚未运行且此后永远不会运行，返回 `true`
    #[inline]
    pub fn detach(&self) -> bool {
        self.claim
            .compare_exchange(ARMED, DETACHED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the listener has been invoked
    ///
    /// 监听者是否已被调用
    #[inline]
    pub fn is_delivered(&self) -> bool {
        self.claim.load(Ordering::Acquire) == DELIVERED
    }

    /// Whether the listener was withdrawn before it ran
    ///
    /// 监听者是否在运行前被撤销
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.claim.load(Ordering::Acquire) == DETACHED
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("delivered", &self.is_delivered())
            .field("detached", &self.is_detached())
            .finish()
    }
}
