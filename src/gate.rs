//! Suspension-aware readiness gate.
//!
//! A [`ReadinessGate`] belongs to one subscriber instance (one component, one
//! task) and one host resource. Each call to [`ReadinessGate::await_ready`]
//! either runs the supplied computation, because the host is ready, or returns a
//! [`Suspend`] token that completes when the host fires its readiness
//! notification. The scheduler awaits the token and calls the gate again.
//!
//! 可感知挂起的就绪门。
//!
//! `ReadinessGate` 属于一个订阅者实例和一个宿主资源。每次调用 `await_ready`
//! 要么因宿主已就绪而运行计算，要么返回一个在宿主触发就绪通知时完成的 `Suspend`
//! 令牌。调度器等待该令牌后再次调用门。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc as HostArc, Weak};
use std::task::{Context, Poll};

use crate::deferred::{Deferred, Wait};
use crate::error::GateError;
use crate::host::HostResource;
use crate::notify::Subscription;
use crate::shim::sync::Arc;
use crate::status::{Status, StatusCell};

/// Result of one gate invocation
///
/// 单次门调用的结果
#[derive(Debug)]
pub enum Readiness<T> {
    /// The host was ready; the computation ran.
    Ready(T),
    /// The host was not ready; await the token, then invoke again.
    Suspended(Suspend),
}

impl<T> Readiness<T> {
    /// Whether the invocation ran the computation
    ///
    /// 本次调用是否运行了计算
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }

    /// The computed value, if the invocation did not suspend
    ///
    /// 若本次调用未挂起，返回计算出的值
    #[inline]
    pub fn ready(self) -> Option<T> {
        match self {
            Readiness::Ready(value) => Some(value),
            Readiness::Suspended(_) => None,
        }
    }
}

/// Suspension token
///
/// Completes once the host becomes ready or is torn down. It carries no value:
/// the caller re-invokes the gate, which then returns the value or the error.
///
/// 挂起令牌。在宿主就绪或被销毁时完成，不携带值：调用方需再次调用门。
#[derive(Debug)]
pub struct Suspend {
    wait: Wait<()>,
}

impl Suspend {
    /// Whether this token waits on `unit`
    #[inline]
    pub fn is_for(&self, unit: &Deferred<()>) -> bool {
        self.wait.is_for(unit)
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Cancellation is reported by the next gate invocation, not here.
        Pin::new(&mut self.wait).poll(cx).map(|_| ())
    }
}

/// Readiness gate for one subscriber instance
///
/// The gate holds its host weakly: a host that has been dropped is no longer a
/// valid scope.
///
/// 单个订阅者实例的就绪门。门以弱引用持有宿主：已被丢弃的宿主不再是有效作用域。
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lite_ready::gate::ReadinessGate;
/// use lite_ready::host::View;
///
/// # tokio_test::block_on(async {
/// let view = Arc::new(View::new());
/// let mut gate = ReadinessGate::new(&view);
///
/// let host = view.clone();
/// tokio::spawn(async move {
///     host.mark_ready();
/// });
///
/// let value = gate.wait_ready(|| 42).await;
/// assert_eq!(value, Ok(42));
/// # });
/// ```
pub struct ReadinessGate<H> {
    scope: Weak<H>,
    status: Arc<StatusCell>,
    unit: Option<Deferred<()>>,
    subscriptions: Vec<Subscription>,
    suspensions: usize,
}

impl<H> ReadinessGate<H> {
    fn with_scope(scope: Weak<H>) -> Self {
        Self {
            scope,
            status: Arc::new(StatusCell::new()),
            unit: None,
            subscriptions: Vec::new(),
            suspensions: 0,
        }
    }

    /// Create a gate bound to `host`
    ///
    /// 创建绑定到 `host` 的门
    pub fn new(host: &HostArc<H>) -> Self {
        Self::with_scope(HostArc::downgrade(host))
    }

    /// Create a gate outside any host scope
    ///
    /// Every invocation fails with [`GateError::NoScope`].
    ///
    /// 创建不在任何宿主作用域内的门，每次调用都以 `GateError::NoScope` 失败
    pub fn unscoped() -> Self {
        Self::with_scope(Weak::new())
    }

    /// Current readiness status
    #[inline]
    pub fn status(&self) -> Status {
        self.status.load()
    }

    /// Number of invocations that suspended
    #[inline]
    pub fn suspensions(&self) -> usize {
        self.suspensions
    }

    /// The deferred unit, once the gate has suspended at least once
    #[inline]
    pub fn unit(&self) -> Option<&Deferred<()>> {
        self.unit.as_ref()
    }
}

impl<H: HostResource> ReadinessGate<H> {
    /// Run `compute` if the host is ready, otherwise suspend
    ///
    /// `compute` runs synchronously, at most once, and only while the host is
    /// ready. On [`Readiness::Suspended`] it is dropped without running.
    ///
    /// # Errors
    ///
    /// - [`GateError::NoScope`] if the gate has no live host. Not retryable.
    /// - [`GateError::TornDown`] if the host was torn down before becoming ready.
    ///
    /// 如果宿主已就绪则运行 `compute`，否则挂起
    ///
    /// `compute` 同步运行，最多一次，且仅在宿主就绪时运行。
    pub fn await_ready<T, F>(&mut self, compute: F) -> Result<Readiness<T>, GateError>
    where
        F: FnOnce() -> T,
    {
        let Some(host) = self.scope.upgrade() else {
            return match self.status.load() {
                Status::Error => Err(GateError::TornDown),
                Status::Pending | Status::Success => Err(GateError::NoScope),
            };
        };

        let ready = host.is_ready();
        if ready {
            self.status.advance(Status::Success);
        }

        match self.status.load() {
            Status::Success if ready => Ok(Readiness::Ready(compute())),
            Status::Error => Err(GateError::TornDown),
            // Success with the host not ready means the host fired before
            // publishing its flag; wait on the (settled) unit and re-check.
            Status::Pending | Status::Success => {
                let suspend = self.suspend(&*host);
                // an already torn-down host delivers the teardown listener
                // inline while subscribing
                match self.status.load() {
                    Status::Error => Err(GateError::TornDown),
                    Status::Pending | Status::Success => Ok(Readiness::Suspended(suspend)),
                }
            }
        }
    }

    /// Drive the gate to completion
    ///
    /// Awaits each suspension token and re-invokes until the host is ready or
    /// an error surfaces. `compute` runs exactly once, on the successful call.
    ///
    /// 驱动门直至完成：等待每个挂起令牌并重新调用，直到宿主就绪或出现错误。
    pub async fn wait_ready<T, F>(&mut self, mut compute: F) -> Result<T, GateError>
    where
        F: FnMut() -> T,
    {
        loop {
            match self.await_ready(&mut compute)? {
                Readiness::Ready(value) => return Ok(value),
                Readiness::Suspended(suspend) => suspend.await,
            }
        }
    }

    fn suspend(&mut self, host: &H) -> Suspend {
        let unit = match &self.unit {
            Some(unit) => unit.clone(),
            None => {
                let unit = self.subscribe(host);
                self.unit = Some(unit.clone());
                unit
            }
        };

        self.suspensions += 1;
        tracing::debug!(suspensions = self.suspensions, "host not ready, suspending");
        Suspend {
            wait: unit.future(),
        }
    }

    /// Create the unit and attach the listeners that settle it.
    fn subscribe(&mut self, host: &H) -> Deferred<()> {
        let unit = Deferred::new();

        let status = self.status.clone();
        let resolver = unit.clone();
        self.subscriptions.push(host.on_ready().once(move || {
            status.advance(Status::Success);
            resolver.resolve(());
        }));

        if let Some(teardown) = host.on_teardown() {
            let status = self.status.clone();
            let canceller = unit.clone();
            self.subscriptions.push(teardown.once(move || {
                if status.advance(Status::Error) {
                    canceller.cancel();
                }
            }));
        }

        unit
    }
}

impl<H> Drop for ReadinessGate<H> {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.detach();
        }
    }
}

impl<H> fmt::Debug for ReadinessGate<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("status", &self.status.load())
            .field("suspensions", &self.suspensions)
            .field("unit", &self.unit)
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::host::View;
    use std::cell::Cell;

    #[test]
    fn test_ready_host_runs_immediately() {
        let view = HostArc::new(View::new());
        view.mark_ready();
        let mut gate = ReadinessGate::new(&view);

        let outcome = gate.await_ready(|| "x").unwrap();
        assert_eq!(outcome.ready(), Some("x"));
        assert_eq!(gate.status(), Status::Success);
        assert_eq!(gate.suspensions(), 0);
        assert!(gate.unit().is_none());
        assert_eq!(view.on_ready().pending(), 0);
    }

    #[test]
    fn test_pending_host_suspends_without_computing() {
        let view = HostArc::new(View::new());
        let mut gate = ReadinessGate::new(&view);
        let calls = Cell::new(0);

        let outcome = gate
            .await_ready(|| calls.set(calls.get() + 1))
            .unwrap();
        assert!(!outcome.is_ready());
        assert_eq!(calls.get(), 0);
        assert_eq!(gate.status(), Status::Pending);
        assert_eq!(gate.suspensions(), 1);
    }

    #[test]
    fn test_repeated_suspensions_share_one_unit() {
        let view = HostArc::new(View::new());
        let mut gate = ReadinessGate::new(&view);

        let first = gate.await_ready(|| ()).unwrap();
        let second = gate.await_ready(|| ()).unwrap();
        let unit = gate.unit().cloned().unwrap();

        for outcome in [first, second] {
            match outcome {
                Readiness::Suspended(token) => assert!(token.is_for(&unit)),
                Readiness::Ready(_) => panic!("host is not ready"),
            }
        }
        assert_eq!(gate.suspensions(), 2);
        // one ready listener and one teardown listener, registered once
        assert_eq!(view.on_ready().pending(), 1);
        assert_eq!(view.on_teardown().map(|n| n.pending()), Some(1));
    }

    #[test]
    fn test_fire_resolves_unit_and_status() {
        let view = HostArc::new(View::new());
        let mut gate = ReadinessGate::new(&view);
        gate.await_ready(|| ()).unwrap();

        view.mark_ready();
        assert_eq!(gate.status(), Status::Success);
        assert!(gate.unit().is_some_and(|unit| unit.is_settled()));

        let calls = Cell::new(0);
        let outcome = gate
            .await_ready(|| {
                calls.set(calls.get() + 1);
                42
            })
            .unwrap();
        assert_eq!(outcome.ready(), Some(42));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_unscoped_gate_fails_fast() {
        let mut gate = ReadinessGate::<View>::unscoped();
        assert_eq!(gate.await_ready(|| 1).unwrap_err(), GateError::NoScope);
        assert_eq!(gate.suspensions(), 0);
        assert_eq!(gate.status(), Status::Pending);
    }

    #[test]
    fn test_teardown_routes_through_error_status() {
        let view = HostArc::new(View::new());
        let mut gate = ReadinessGate::new(&view);
        gate.await_ready(|| ()).unwrap();

        view.teardown();
        assert_eq!(gate.status(), Status::Error);
        assert_eq!(gate.await_ready(|| ()).unwrap_err(), GateError::TornDown);

        // a late mark_ready cannot revive it
        assert!(!view.mark_ready());
        assert_eq!(gate.await_ready(|| ()).unwrap_err(), GateError::TornDown);
    }

    #[test]
    fn test_dropped_host_after_suspension_reports_teardown() {
        let view = HostArc::new(View::new());
        let mut gate = ReadinessGate::new(&view);
        gate.await_ready(|| ()).unwrap();

        drop(view);
        assert_eq!(gate.await_ready(|| ()).unwrap_err(), GateError::TornDown);
    }

    #[test]
    fn test_dropped_gate_detaches_listeners() {
        let view = HostArc::new(View::new());
        let mut gate = ReadinessGate::new(&view);
        gate.await_ready(|| ()).unwrap();
        let unit = gate.unit().cloned().unwrap();

        drop(gate);
        assert!(view.mark_ready());
        assert!(!unit.is_settled());
    }

    #[test]
    fn test_torn_down_view_fails_on_first_call() {
        let view = HostArc::new(View::new());
        view.teardown();
        let mut gate = ReadinessGate::new(&view);
        let calls = Cell::new(0);

        let result = gate.await_ready(|| calls.set(calls.get() + 1));
        assert_eq!(result.unwrap_err(), GateError::TornDown);
        assert_eq!(calls.get(), 0);
        assert_eq!(gate.status(), Status::Error);
        assert!(gate.unit().is_some_and(|unit| !unit.is_settled()));
    }
}
