use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DropPolicy, Result, SlotPool};

/// Largest alignment the builder picks on its own when only a slot size is given.
///
/// Matches the guarantee of the platform `malloc` on common 64-bit targets.
const MAX_DEFAULT_SLOT_ALIGN: usize = 16;

/// Builder for creating an instance of [`SlotPool`].
///
/// The slot size and the slot count are mandatory, whereas other settings are optional.
/// Use either `.slot_size()` to provide a raw byte size, `.layout()` to provide a specific
/// layout or `.layout_of::<T>()` to size the slots for a type.
///
/// # Examples
///
/// Using a raw slot size:
///
/// ```
/// use new_zealand::nz;
/// use slot_pool::SlotPool;
///
/// let pool = SlotPool::builder()
///     .slot_size(nz!(24))
///     .slot_count(nz!(100))
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.slot_size(), 24);
/// assert_eq!(pool.slot_align(), 8);
/// ```
///
/// Using type-based sizing:
///
/// ```
/// use new_zealand::nz;
/// use slot_pool::SlotPool;
///
/// let pool = SlotPool::builder()
///     .layout_of::<String>()
///     .slot_count(nz!(10))
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.slot_count(), 10);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct SlotPoolBuilder {
    slot_size: Option<NonZero<usize>>,
    slot_align: Option<usize>,
    slot_count: Option<NonZero<usize>>,
    drop_policy: DropPolicy,

    _not_sync: PhantomData<Cell<()>>,
}

impl SlotPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            slot_size: None,
            slot_align: None,
            slot_count: None,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the size in bytes of every slot in the pool.
    ///
    /// Unless [`slot_align`](Self::slot_align) is also called, slots are aligned to the
    /// largest power of two that divides the size, up to 16 bytes.
    #[inline]
    pub fn slot_size(mut self, slot_size: NonZero<usize>) -> Self {
        self.slot_size = Some(slot_size);
        self
    }

    /// Sets the alignment in bytes of every slot in the pool.
    ///
    /// # Panics
    ///
    /// Panics if `slot_align` is not a power of two.
    #[inline]
    pub fn slot_align(mut self, slot_align: NonZero<usize>) -> Self {
        assert!(
            slot_align.is_power_of_two(),
            "slot alignment must be a power of two, got {slot_align}"
        );
        self.slot_align = Some(slot_align.get());
        self
    }

    /// Sizes and aligns the slots to hold one value with the given layout.
    ///
    /// The slot size is the layout size padded up to its alignment, so that consecutive
    /// slots stay aligned.
    ///
    /// # Panics
    ///
    /// Panics if the layout has a zero size.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::alloc::Layout;
    ///
    /// use new_zealand::nz;
    /// use slot_pool::SlotPool;
    ///
    /// let layout = Layout::from_size_align(12, 8).unwrap();
    /// let pool = SlotPool::builder()
    ///     .layout(layout)
    ///     .slot_count(nz!(4))
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(pool.slot_size(), 16);
    /// ```
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        let padded = layout.pad_to_align();
        let slot_size =
            NonZero::new(padded.size()).expect("SlotPool must have non-zero slot size");

        self.slot_size = Some(slot_size);
        self.slot_align = Some(padded.align());
        self
    }

    /// Sizes and aligns the slots to hold one value of type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is a zero-sized type.
    #[inline]
    pub fn layout_of<T>(self) -> Self {
        self.layout(Layout::new::<T>())
    }

    /// Sets the number of slots in the pool. The pool never grows beyond this.
    #[inline]
    pub fn slot_count(mut self, slot_count: NonZero<usize>) -> Self {
        self.slot_count = Some(slot_count);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat slots
    /// that are still allocated when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Reserves the storage block and builds the pool with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`][crate::Error::InvalidLayout] if the slot size is
    /// not a multiple of an explicitly requested slot alignment.
    ///
    /// Returns [`Error::ReservationFailed`][crate::Error::ReservationFailed] if the storage
    /// block cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if the slot size or the slot count has not been set.
    #[inline]
    pub fn build(self) -> Result<SlotPool> {
        let slot_size = self.slot_size.expect(
            "slot size must be set using .slot_size(), .layout() or .layout_of::<T>() before calling .build()",
        );
        let slot_count = self
            .slot_count
            .expect("slot count must be set using .slot_count() before calling .build()");
        let slot_align = self
            .slot_align
            .unwrap_or_else(|| default_slot_align(slot_size));

        SlotPool::new_inner(slot_size, slot_align, slot_count, self.drop_policy)
    }
}

/// The largest power of two dividing `slot_size`, capped at [`MAX_DEFAULT_SLOT_ALIGN`].
fn default_slot_align(slot_size: NonZero<usize>) -> usize {
    // Isolates the lowest set bit, which is non-zero because the size is non-zero.
    let lowest_bit = slot_size.get() & slot_size.get().wrapping_neg();

    lowest_bit.min(MAX_DEFAULT_SLOT_ALIGN)
}
