//! Shim module to abstract over core and loom primitives.
//!
//! Production builds use `core`/`std` atomics and `crossbeam-queue`; with the
//! `loom` feature the same names resolve to loom's instrumented versions so the
//! model checker can explore every interleaving of fire/subscribe/resolve.

#[cfg(not(feature = "loom"))]
pub(crate) mod atomic {
    pub(crate) use core::sync::atomic::*;
}

#[cfg(feature = "loom")]
pub(crate) mod atomic {
    pub(crate) use loom::sync::atomic::*;
}

#[cfg(not(feature = "loom"))]
pub(crate) mod cell {
    #[derive(Debug)]
    #[repr(transparent)]
    pub(crate) struct UnsafeCell<T: ?Sized>(core::cell::UnsafeCell<T>);

    impl<T> UnsafeCell<T> {
        #[inline]
        pub(crate) const fn new(data: T) -> UnsafeCell<T> {
            UnsafeCell(core::cell::UnsafeCell::new(data))
        }
    }

    impl<T: ?Sized> UnsafeCell<T> {
        #[inline]
        pub(crate) fn with<F, R>(&self, f: F) -> R
        where
            F: FnOnce(*const T) -> R,
        {
            f(self.0.get())
        }

        #[inline]
        pub(crate) fn with_mut<F, R>(&self, f: F) -> R
        where
            F: FnOnce(*mut T) -> R,
        {
            f(self.0.get())
        }
    }
}

#[cfg(feature = "loom")]
pub(crate) mod cell {
    pub(crate) use loom::cell::UnsafeCell;
}

#[cfg(not(feature = "loom"))]
pub(crate) mod sync {
    pub(crate) use std::sync::Arc;
}

#[cfg(feature = "loom")]
pub(crate) mod sync {
    pub(crate) use loom::sync::Arc;
}

/// Unbounded MPMC queue holding registered listeners.
#[cfg(not(feature = "loom"))]
pub(crate) mod queue {
    pub(crate) use crossbeam_queue::SegQueue as Queue;
}

/// Loom cannot see inside `crossbeam-queue`, so the model uses a mutex-guarded
/// deque with the same surface.
#[cfg(feature = "loom")]
pub(crate) mod queue {
    use loom::sync::Mutex;
    use std::collections::VecDeque;
    use std::fmt;

    pub(crate) struct Queue<T> {
        inner: Mutex<VecDeque<T>>,
    }

    impl<T> Queue<T> {
        pub(crate) fn new() -> Self {
            Self {
                inner: Mutex::new(VecDeque::new()),
            }
        }

        pub(crate) fn push(&self, value: T) {
            if let Ok(mut items) = self.inner.lock() {
                items.push_back(value);
            }
        }

        pub(crate) fn pop(&self) -> Option<T> {
            self.inner.lock().ok()?.pop_front()
        }

        pub(crate) fn len(&self) -> usize {
            self.inner.lock().map(|items| items.len()).unwrap_or(0)
        }
    }

    impl<T> fmt::Debug for Queue<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Queue").field("len", &self.len()).finish()
        }
    }
}
