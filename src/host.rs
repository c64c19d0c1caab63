//! Host resources whose initialization gates a computation.
//!
//! 其初始化控制计算的宿主资源。

use crate::notify::OnceNotify;
use crate::shim::atomic::{AtomicBool, Ordering};

/// The consumed interface of a host resource (a rendering view, for instance)
///
/// Implementors must set whatever [`is_ready`](Self::is_ready) reads *before*
/// firing [`on_ready`](Self::on_ready), and must fire it at most once per
/// readiness transition. Readiness never reverts.
///
/// 宿主资源（例如渲染视图）的接口
///
/// 实现者必须在触发 `on_ready` 之前设置 `is_ready` 读取的状态，
/// 并且每次就绪转换最多触发一次。就绪状态不会回退。
pub trait HostResource {
    /// Synchronous, side-effect-free readiness query.
    fn is_ready(&self) -> bool;

    /// Channel fired once when the resource becomes ready.
    fn on_ready(&self) -> &OnceNotify;

    /// Channel fired if the resource is destroyed; `None` if it cannot fail.
    fn on_teardown(&self) -> Option<&OnceNotify> {
        None
    }
}

/// Ready-made host resource: a readiness flag with ready and teardown channels
///
/// Dropping a `View` fires its teardown channel, so gates suspended on a view
/// that never became ready are released instead of leaking.
///
/// 现成的宿主资源：带就绪与销毁通道的就绪标志
///
/// 丢弃 `View` 会触发其销毁通道，因此挂起在从未就绪的视图上的门会被释放。
#[derive(Debug, Default)]
pub struct View {
    ready: AtomicBool,
    torn_down: AtomicBool,
    on_ready: OnceNotify,
    on_teardown: OnceNotify,
}

impl View {
    /// Create a view that is neither ready nor torn down
    ///
    /// 创建一个既未就绪也未销毁的视图
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the view ready and notify subscribers
    ///
    /// Only the first call fires. Returns `false` for repeated calls and for a
    /// view that was already torn down.
    ///
    /// 将视图标记为就绪并通知订阅者。只有第一次调用会触发。
    pub fn mark_ready(&self) -> bool {
        if self.torn_down.load(Ordering::Acquire) {
            tracing::debug!("view torn down, ignoring readiness");
            return false;
        }
        if self.ready.swap(true, Ordering::AcqRel) {
            return false;
        }
        let delivered = self.on_ready.fire();
        tracing::debug!(delivered, "view ready");
        true
    }

    /// Tear the view down, releasing anything still waiting for readiness
    ///
    /// Returns `false` if the view was already torn down.
    ///
    /// 销毁视图，释放仍在等待就绪的所有对象
    pub fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let delivered = self.on_teardown.fire();
        tracing::debug!(delivered, "view torn down");
        true
    }

    /// Whether [`teardown`](Self::teardown) has run
    ///
    /// 是否已执行 `teardown`
    #[inline]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl HostResource for View {
    #[inline]
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    #[inline]
    fn on_ready(&self) -> &OnceNotify {
        &self.on_ready
    }

    #[inline]
    fn on_teardown(&self) -> Option<&OnceNotify> {
        Some(&self.on_teardown)
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.teardown();
    }
}
