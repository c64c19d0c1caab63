//! Error types.
//!
//! 错误类型。

use thiserror::Error;

/// Failure surfaced by [`ReadinessGate`](crate::gate::ReadinessGate) instead of a value
///
/// 由 `ReadinessGate` 代替值返回的失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    /// The gate is not bound to a live host resource.
    ///
    /// A programming error in the caller: never suspends and must not be retried.
    ///
    /// 门未绑定到存活的宿主资源（调用方编程错误，不会挂起，不应重试）
    #[error("no host resource in scope")]
    NoScope,
    /// The host resource was torn down before it became ready.
    ///
    /// 宿主资源在就绪之前被销毁
    #[error("host resource was torn down before it became ready")]
    TornDown,
}

/// Returned by a [`Wait`](crate::deferred::Wait) whose unit was cancelled
///
/// 当 deferred 单元被取消时由 `Wait` 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deferred unit was cancelled before it resolved")]
pub struct Cancelled;

/// Returned by [`Deferred::try_value`](crate::deferred::Deferred::try_value)
///
/// 由 `Deferred::try_value` 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryWaitError {
    /// Not resolved yet.
    #[error("deferred unit is still pending")]
    Pending,
    /// Cancelled before resolution; no value will ever arrive.
    #[error("deferred unit was cancelled before it resolved")]
    Cancelled,
}

impl From<Cancelled> for TryWaitError {
    fn from(_: Cancelled) -> Self {
        TryWaitError::Cancelled
    }
}
