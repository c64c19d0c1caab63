//! # lite-ready
//!
//! Lightweight readiness gate: suspend a unit of work until a host resource has
//! finished its own asynchronous initialization.
//!
//! 轻量级就绪门：挂起一个工作单元，直到宿主资源完成其异步初始化。
//!
//! ## Overview / 概述
//!
//! UI code often depends on a value that only exists once an event-driven
//! component (a rendering view, say) is ready. `lite-ready` turns the view's
//! one-shot "ready" event into a suspension token a scheduler can await, and
//! guarantees the computation runs exactly once the view is ready: no missed or
//! duplicate notifications, no stale subscriptions, and no suspension at all if
//! the view is already ready.
//!
//! UI 代码经常依赖只有在事件驱动组件（例如渲染视图）就绪后才存在的值。
//! `lite-ready` 将视图的一次性"就绪"事件转换为调度器可以等待的挂起令牌，
//! 并保证计算在视图就绪时恰好运行一次：不会丢失或重复通知，不会留下过期订阅，
//! 视图已就绪时也完全不会挂起。
//!
//! ## Modules / 模块
//!
//! ### [`gate`]
//!
//! The [`ReadinessGate`](gate::ReadinessGate): runs a computation if the host is
//! ready, otherwise returns a [`Suspend`](gate::Suspend) token and re-evaluates
//! when invoked again.
//!
//! 就绪门：宿主就绪时运行计算，否则返回挂起令牌，并在再次调用时重新求值。
//!
//! ### [`deferred`]
//!
//! A manually resolvable future. Resolution is idempotent-safe, any number of
//! waiters can await it, and it can be cancelled when its producer goes away.
//!
//! 可手动解决的 future。重复解决是安全的空操作，支持任意数量的等待者，
//! 并可在生产者消失时取消。
//!
//! ### [`notify`]
//!
//! [`OnceNotify`](notify::OnceNotify): a one-shot, multi-listener, lock-free
//! event. Listeners registered after it fired run immediately.
//!
//! 一次性、多监听者、无锁的事件。在触发之后注册的监听者会立即运行。
//!
//! ### [`host`]
//!
//! The [`HostResource`](host::HostResource) interface the gate consumes, and
//! [`View`](host::View), a ready-made implementation with a teardown channel.
//!
//! 门所使用的宿主资源接口，以及带销毁通道的现成实现 `View`。
//!
//! ## Example / 示例
//!
//! ```
//! use std::sync::Arc;
//! use lite_ready::gate::{Readiness, ReadinessGate};
//! use lite_ready::host::View;
//!
//! # tokio_test::block_on(async {
//! let view = Arc::new(View::new());
//! let mut gate = ReadinessGate::new(&view);
//!
//! // Not ready yet: the gate hands back a suspension token.
//! let token = match gate.await_ready(|| 42).unwrap() {
//!     Readiness::Suspended(token) => token,
//!     Readiness::Ready(_) => unreachable!(),
//! };
//!
//! view.mark_ready();
//! token.await;
//!
//! // Resumed: the computation now runs.
//! assert_eq!(gate.await_ready(|| 42).unwrap().ready(), Some(42));
//! # });
//! ```
//!
//! ## Safety / 安全性
//!
//! `deferred` and the internal waker slot use `unsafe` cells guarded by atomic
//! state machines; every public API is safe. Build with `--features loom` to
//! model-check the primitives.
//!
//! `deferred` 和内部 waker 槽位使用由原子状态机保护的 `unsafe` 单元；
//! 所有公共 API 都是安全的。使用 `--features loom` 构建以进行模型检查。

mod shim;
mod waker_slot;

pub mod deferred;
pub mod error;
pub mod gate;
pub mod host;
pub mod notify;
pub mod status;

pub use deferred::{Deferred, DeferredState, Wait};
pub use error::{Cancelled, GateError, TryWaitError};
pub use gate::{Readiness, ReadinessGate, Suspend};
pub use host::{HostResource, View};
pub use notify::{OnceNotify, Subscription};
pub use status::Status;
