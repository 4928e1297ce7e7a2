use thiserror::Error;

/// Errors that can occur when reserving or handing out pool slots.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The storage block backing the pool could not be obtained.
    ///
    /// This is fatal to the pool being constructed. No partially usable pool is returned.
    #[error("failed to reserve storage for {slot_count} slots of {slot_size} bytes each")]
    ReservationFailed {
        /// Size in bytes of one slot in the requested pool.
        slot_size: usize,

        /// Number of slots in the requested pool.
        slot_count: usize,
    },

    /// The requested slot size cannot keep every slot aligned to the requested alignment.
    #[error("slot size {slot_size} is not a multiple of slot alignment {slot_align}")]
    InvalidLayout {
        /// Size in bytes of one slot in the requested pool.
        slot_size: usize,

        /// Alignment in bytes requested for each slot.
        slot_align: usize,
    },

    /// Every slot of the pool is currently allocated.
    ///
    /// The pool remains usable. Allocation succeeds again once a slot is returned.
    #[error("all {slot_count} slots of the pool are allocated")]
    Exhausted {
        /// Total number of slots in the pool.
        slot_count: usize,
    },
}

/// A specialized `Result` type for slot pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
