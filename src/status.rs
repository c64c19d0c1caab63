//! Per-subscriber readiness status.
//!
//! 每个订阅者的就绪状态。

use crate::shim::atomic::{AtomicU8, Ordering};

/// Readiness of one gate
///
/// `Pending` moves to either `Success` or `Error`; both are terminal.
///
/// 单个门的就绪状态。`Pending` 只能转换为 `Success` 或 `Error`，两者均为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The host resource has not become ready yet.
    Pending,
    /// The host resource is ready.
    Success,
    /// The host resource failed (torn down) before becoming ready.
    Error,
}

impl Status {
    #[inline]
    const fn to_u8(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Success => 1,
            Status::Error => 2,
        }
    }

    #[inline]
    const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Status::Pending),
            1 => Some(Status::Success),
            2 => Some(Status::Error),
            _ => None,
        }
    }

    /// Whether no further transition can happen
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

/// Atomic storage for a [`Status`], shared between a gate and its listeners
#[derive(Debug)]
pub(crate) struct StatusCell {
    state: AtomicU8,
}

impl StatusCell {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(Status::Pending.to_u8()),
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> Status {
        // Only this module writes the cell, so an unknown byte cannot appear.
        Status::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(Status::Error)
    }

    /// Move out of `Pending`. Returns `false` if the status was already terminal.
    #[inline]
    pub(crate) fn advance(&self, next: Status) -> bool {
        self.state
            .compare_exchange(
                Status::Pending.to_u8(),
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
