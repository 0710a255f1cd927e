//! Lock used around ledgers and the allocation-info table
//!
//! With the `lock` feature (default) this is a `parking_lot::Mutex`. Without
//! it the state sits in a `RefCell`, which keeps the owning types `!Sync`.

#[cfg(feature = "lock")]
pub(crate) struct Guarded<T>(parking_lot::Mutex<T>);

#[cfg(feature = "lock")]
impl<T> Guarded<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(parking_lot::Mutex::new(value))
    }

    /// Run `f` inside the critical section
    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut guard)
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}

#[cfg(not(feature = "lock"))]
pub(crate) struct Guarded<T>(core::cell::RefCell<T>);

#[cfg(not(feature = "lock"))]
impl<T> Guarded<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(core::cell::RefCell::new(value))
    }

    #[inline]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}
