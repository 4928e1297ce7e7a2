use std::cell::Cell;

#[cfg(test)]
thread_local! {
    static LIVE_RECORDS: Cell<usize> = const { Cell::new(0) };
}

/// The bookkeeping record shared by every handle that owns the same object.
///
/// Single-threaded: the count is a plain [`Cell`] and is never synchronized.
#[derive(Debug)]
pub(crate) struct RefCount {
    count: Cell<usize>,
}

impl RefCount {
    /// Creates a record for a freshly adopted object, owned by exactly one handle.
    #[must_use]
    pub(crate) fn new() -> Self {
        #[cfg(test)]
        LIVE_RECORDS.with(|live| live.set(live.get().wrapping_add(1)));

        Self {
            count: Cell::new(1),
        }
    }

    /// Increments the reference count.
    ///
    /// # Panics
    ///
    /// Panics if the reference count would overflow.
    ///
    /// Panics if the reference count was zero (indicating resurrection).
    pub(crate) fn inc_ref(&self) {
        let previous = self.count.get();

        assert_ne!(
            0, previous,
            "reference count resurrected from zero - indicates a serious bug in reference counting logic"
        );

        self.count.set(previous.checked_add(1).expect(
            "reference count overflow - indicates a serious bug in reference counting logic",
        ));
    }

    /// Decrements the reference count and returns true if this was the last reference.
    ///
    /// # Panics
    ///
    /// Panics if the reference count would underflow (go below zero).
    pub(crate) fn dec_ref(&self) -> bool {
        let previous = self.count.get();

        let new = previous.checked_sub(1).expect(
            "reference count underflow - indicates a serious bug in reference counting logic",
        );

        self.count.set(new);
        new == 0
    }

    /// Returns the current reference count.
    #[must_use]
    pub(crate) fn get(&self) -> usize {
        self.count.get()
    }
}

#[cfg(test)]
impl Drop for RefCount {
    fn drop(&mut self) {
        LIVE_RECORDS.with(|live| live.set(live.get().wrapping_sub(1)));
    }
}

/// Number of records created on the current thread that have not been freed yet.
#[cfg(test)]
pub(crate) fn live_records() -> usize {
    LIVE_RECORDS.with(Cell::get)
}
