use std::alloc::{Layout, alloc, dealloc};
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use tracing::{debug, trace, warn};

use crate::{DropPolicy, Error, Result, SlotPoolBuilder};

/// A fixed-capacity pool of equally sized raw memory slots.
///
/// The pool owns one contiguous storage block, reserved once at construction and sliced
/// into `slot_count` slots of `slot_size` bytes each. Slots are handed out and taken back
/// in O(1) through a last-in-first-out stack of free slots: the most recently returned slot
/// is the next one to be allocated.
///
/// The pool deals in memory, not in values. It never constructs anything in a slot it hands
/// out and never finalizes anything in a slot it takes back. Writing a value into a slot and
/// dropping it before returning the slot is the caller's responsibility.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use slot_pool::SlotPool;
///
/// let mut pool = SlotPool::builder()
///     .layout_of::<String>()
///     .slot_count(nz!(2))
///     .build()
///     .unwrap();
///
/// let slot = pool.allocate().unwrap().cast::<String>();
///
/// // SAFETY: The slot is sized and aligned for a String and is not in use.
/// unsafe { slot.write("Hello".to_string()) };
///
/// // SAFETY: We initialized the value above and nothing else references it.
/// assert_eq!(unsafe { slot.as_ref() }, "Hello");
///
/// // SAFETY: The value is initialized and finalized exactly once, then the slot is
/// // returned to the pool that handed it out.
/// unsafe {
///     slot.drop_in_place();
///     pool.deallocate(slot.cast());
/// }
/// ```
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). All mutation
/// happens through `&mut self` and no internal synchronization is performed.
#[derive(Debug)]
pub struct SlotPool {
    /// Size in bytes of every slot, always a multiple of `slot_align`.
    slot_size: NonZero<usize>,

    /// Alignment of the storage block and therefore of every slot.
    slot_align: usize,

    slot_count: NonZero<usize>,

    /// Layout of the whole storage block, needed again when releasing it.
    storage_layout: Layout,

    /// Base address of the storage block. Slot `i` starts `i * slot_size` bytes past it.
    storage: NonNull<u8>,

    /// Stack of indices of the slots that are not allocated. The top of the stack is the
    /// end of the vector. Capacity is reserved up front for every slot, so returning a slot
    /// never allocates.
    free_slots: Vec<usize>,

    drop_policy: DropPolicy,
}

impl SlotPool {
    /// Creates a builder for configuring and constructing a [`SlotPool`].
    ///
    /// # Examples
    ///
    /// ```
    /// use new_zealand::nz;
    /// use slot_pool::SlotPool;
    ///
    /// let pool = SlotPool::builder()
    ///     .slot_size(nz!(32))
    ///     .slot_count(nz!(16))
    ///     .build()
    ///     .unwrap();
    /// ```
    #[inline]
    pub fn builder() -> SlotPoolBuilder {
        SlotPoolBuilder::new()
    }

    /// Reserves storage for `slot_count` slots of `slot_size` bytes each, with the
    /// default slot alignment and drop policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservationFailed`] if the storage block cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use new_zealand::nz;
    /// use slot_pool::SlotPool;
    ///
    /// let pool = SlotPool::new(nz!(8), nz!(3)).unwrap();
    ///
    /// assert_eq!(pool.slot_count(), 3);
    /// assert!(pool.is_empty());
    /// ```
    #[inline]
    pub fn new(slot_size: NonZero<usize>, slot_count: NonZero<usize>) -> Result<Self> {
        Self::builder()
            .slot_size(slot_size)
            .slot_count(slot_count)
            .build()
    }

    pub(crate) fn new_inner(
        slot_size: NonZero<usize>,
        slot_align: usize,
        slot_count: NonZero<usize>,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let reservation_failed = || Error::ReservationFailed {
            slot_size: slot_size.get(),
            slot_count: slot_count.get(),
        };

        // The builder guarantees a power of two, so the mask is all the low bits.
        if slot_size.get() & slot_align.wrapping_sub(1) != 0 {
            return Err(Error::InvalidLayout {
                slot_size: slot_size.get(),
                slot_align,
            });
        }

        let total_size = slot_size
            .get()
            .checked_mul(slot_count.get())
            .ok_or_else(reservation_failed)?;

        let storage_layout = Layout::from_size_align(total_size, slot_align)
            .map_err(|_layout_error| reservation_failed())?;

        // Reserve the free stack before the storage block so that a failure here
        // leaves nothing behind to release.
        let mut free_slots = Vec::new();
        free_slots
            .try_reserve_exact(slot_count.get())
            .map_err(|_reserve_error| reservation_failed())?;

        // Ascending order of offset, so the highest slot is on top of the stack.
        free_slots.extend(0..slot_count.get());

        // SAFETY: The layout has a non-zero size because both factors are non-zero.
        let storage = NonNull::new(unsafe { alloc(storage_layout) }).ok_or_else(|| {
            warn!(
                slot_size = slot_size.get(),
                slot_count = slot_count.get(),
                "slot pool storage reservation failed"
            );
            reservation_failed()
        })?;

        debug!(
            slot_size = slot_size.get(),
            slot_align,
            slot_count = slot_count.get(),
            "reserved slot pool storage"
        );

        Ok(Self {
            slot_size,
            slot_align,
            slot_count,
            storage_layout,
            storage,
            free_slots,
            drop_policy,
        })
    }

    /// Size in bytes of every slot in the pool.
    #[must_use]
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size.get()
    }

    /// Alignment in bytes guaranteed for every slot in the pool.
    #[must_use]
    #[inline]
    pub fn slot_align(&self) -> usize {
        self.slot_align
    }

    /// Total number of slots in the pool, allocated or not.
    #[must_use]
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count.get()
    }

    /// Number of slots currently allocated to callers.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        // Cannot underflow because the free stack never holds more than every slot.
        self.slot_count.get().wrapping_sub(self.free_slots.len())
    }

    /// Number of slots that can be allocated before the pool is exhausted.
    #[must_use]
    #[inline]
    pub fn available(&self) -> usize {
        self.free_slots.len()
    }

    /// Whether no slot is currently allocated.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free_slots.len() == self.slot_count.get()
    }

    /// Whether every slot is currently allocated, so the next allocation will fail.
    #[must_use]
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_slots.is_empty()
    }

    /// Whether `ptr` is the start of one of this pool's slots.
    ///
    /// This says nothing about whether the slot is currently allocated.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.slot_index_of(ptr).is_some()
    }

    /// Takes a slot from the top of the free stack and returns its address.
    ///
    /// The returned memory is uninitialized. It is `slot_size()` bytes long and aligned
    /// to `slot_align()`, and it stays valid until it is returned via
    /// [`deallocate()`](Self::deallocate) or the pool is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot is already allocated. The pool does not
    /// grow and remains usable.
    ///
    /// # Examples
    ///
    /// ```
    /// use new_zealand::nz;
    /// use slot_pool::{Error, SlotPool};
    ///
    /// let mut pool = SlotPool::new(nz!(8), nz!(1)).unwrap();
    ///
    /// let _slot = pool.allocate().unwrap();
    /// assert!(matches!(pool.allocate(), Err(Error::Exhausted { slot_count: 1 })));
    /// ```
    pub fn allocate(&mut self) -> Result<NonNull<u8>> {
        let Some(index) = self.free_slots.pop() else {
            warn!(
                slot_count = self.slot_count.get(),
                "slot pool exhausted"
            );

            return Err(Error::Exhausted {
                slot_count: self.slot_count.get(),
            });
        };

        trace!(index, available = self.free_slots.len(), "allocated slot");

        Ok(self.slot_ptr(index))
    }

    /// Returns a slot to the top of the free stack, making it the next one handed out.
    ///
    /// Whatever was constructed in the slot is not finalized. Drop it before calling this.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// 1. `slot` was returned by [`allocate()`](Self::allocate) on this pool.
    /// 2. `slot` has not been returned since it was last allocated.
    /// 3. No reference or pointer derived from `slot` is used after this call.
    ///
    /// In debug builds, foreign or misaligned addresses and double returns are detected
    /// and cause a panic.
    pub unsafe fn deallocate(&mut self, slot: NonNull<u8>) {
        let index = self.slot_index_of(slot);

        debug_assert!(
            index.is_some(),
            "deallocate({slot:?}) address is not a slot of this pool"
        );

        // Outside debug builds a foreign address goes undetected and yields a meaningless index.
        let index = index.unwrap_or_else(|| self.unchecked_slot_index_of(slot));

        #[cfg(debug_assertions)]
        {
            assert!(
                !self.free_slots.contains(&index),
                "deallocate({slot:?}) slot {index} was already free"
            );
        }

        self.free_slots.push(index);

        trace!(index, available = self.free_slots.len(), "deallocated slot");
    }

    fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.slot_count.get());

        // Cannot overflow because the whole storage block fits in an isize.
        let offset = index.wrapping_mul(self.slot_size.get());

        // SAFETY: The index is below slot_count, so the offset stays inside the storage block.
        unsafe { self.storage.add(offset) }
    }

    fn slot_index_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = ptr.addr().get().checked_sub(self.storage.addr().get())?;

        if offset >= self.storage_layout.size() {
            return None;
        }

        if offset % self.slot_size != 0 {
            return None;
        }

        Some(offset / self.slot_size)
    }

    #[cfg_attr(test, mutants::skip)] // Only reached on contract violations in release builds.
    fn unchecked_slot_index_of(&self, ptr: NonNull<u8>) -> usize {
        ptr.addr()
            .get()
            .wrapping_sub(self.storage.addr().get())
            / self.slot_size
    }
}

impl Drop for SlotPool {
    fn drop(&mut self) {
        let outstanding = self.len();

        if outstanding != 0 && matches!(self.drop_policy, DropPolicy::MayLeakSlots) {
            warn!(
                outstanding,
                slot_count = self.slot_count.get(),
                "dropping slot pool with allocated slots"
            );
        }

        // SAFETY: We allocated the storage with this exact layout in new_inner() and this is
        // the only place where it is released.
        unsafe {
            dealloc(self.storage.as_ptr(), self.storage_layout);
        }

        debug!(
            slot_size = self.slot_size.get(),
            slot_count = self.slot_count.get(),
            outstanding,
            "released slot pool storage"
        );

        // We do this check at the end so we release the memory first.
        //
        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if !thread::panicking() && matches!(self.drop_policy, DropPolicy::MustNotLeakSlots) {
            assert!(
                outstanding == 0,
                "dropped a SlotPool with {outstanding} allocated slots - this is forbidden by DropPolicy::MustNotLeakSlots"
            );
        }
    }
}

// SAFETY: SlotPool exclusively owns its storage block and only hands out raw pointers into it.
// It has no thread-affine state, and all mutation goes through &mut self, so moving it to
// another thread is sound. It is not Sync because NonNull<u8> is not.
unsafe impl Send for SlotPool {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::collections::HashSet;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SlotPool: Send, std::fmt::Debug);
    assert_not_impl_any!(SlotPool: Sync);

    #[test]
    fn new_pool_is_empty() {
        let pool = SlotPool::new(nz!(16), nz!(4)).unwrap();

        assert_eq!(pool.slot_size(), 16);
        assert_eq!(pool.slot_align(), 16);
        assert_eq!(pool.slot_count(), 4);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.available(), 4);
        assert!(pool.is_empty());
        assert!(!pool.is_full());
    }

    #[test]
    fn first_allocation_is_highest_slot() {
        let mut pool = SlotPool::new(nz!(8), nz!(3)).unwrap();

        let slot = pool.allocate().unwrap();

        assert_eq!(slot, pool.slot_ptr(2));
        unsafe { pool.deallocate(slot) };
    }

    #[test]
    fn allocations_walk_down_the_block() {
        let mut pool = SlotPool::new(nz!(8), nz!(3)).unwrap();

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let c = pool.allocate().unwrap();

        assert_eq!(a.addr().get() - b.addr().get(), 8);
        assert_eq!(b.addr().get() - c.addr().get(), 8);
        assert_eq!(c, pool.storage);
    }

    #[test]
    fn exhaustion_is_reported_and_recoverable() {
        let mut pool = SlotPool::new(nz!(4), nz!(2)).unwrap();

        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        assert!(pool.is_full());

        assert!(matches!(
            pool.allocate(),
            Err(Error::Exhausted { slot_count: 2 })
        ));

        unsafe { pool.deallocate(a) };

        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn slots_are_distinct_aligned_and_inside_storage() {
        let mut pool = SlotPool::builder()
            .layout_of::<u64>()
            .slot_count(nz!(16))
            .build()
            .unwrap();

        let base = pool.storage.addr().get();
        let end = base + pool.storage_layout.size();

        let mut seen = HashSet::new();

        for _ in 0..16 {
            let slot = pool.allocate().unwrap();
            let addr = slot.addr().get();

            assert!(addr >= base && addr < end);
            assert_eq!(addr % align_of::<u64>(), 0);
            assert_eq!((addr - base) % pool.slot_size(), 0);
            assert!(seen.insert(addr));
        }
    }

    #[test]
    fn contains_accepts_only_slot_starts() {
        let mut pool = SlotPool::new(nz!(8), nz!(2)).unwrap();

        let slot = pool.allocate().unwrap();
        assert!(pool.contains(slot));

        let inside = unsafe { slot.add(1) };
        assert!(!pool.contains(inside));

        let mut outside = 0_u64;
        assert!(!pool.contains(NonNull::from(&mut outside).cast()));

        unsafe { pool.deallocate(slot) };
        assert!(pool.contains(slot));
    }

    #[test]
    fn len_tracks_outstanding_slots() {
        let mut pool = SlotPool::new(nz!(8), nz!(3)).unwrap();

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.available(), 1);

        unsafe { pool.deallocate(a) };
        assert_eq!(pool.len(), 1);

        unsafe { pool.deallocate(b) };
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn values_survive_in_slots() {
        let mut pool = SlotPool::builder()
            .layout_of::<u32>()
            .slot_count(nz!(3))
            .build()
            .unwrap();

        let a = pool.allocate().unwrap().cast::<u32>();
        let b = pool.allocate().unwrap().cast::<u32>();

        unsafe {
            a.write(100);
            b.write(200);

            assert_eq!(a.read(), 100);
            assert_eq!(b.read(), 200);

            pool.deallocate(a.cast());
            pool.deallocate(b.cast());
        }
    }

    #[test]
    fn too_large_pool_fails_reservation() {
        let result = SlotPool::new(NonZero::new(usize::MAX / 2).unwrap(), nz!(4));

        assert!(matches!(
            result,
            Err(Error::ReservationFailed { slot_count: 4, .. })
        ));
    }

    #[test]
    fn may_leak_slots_drops_quietly() {
        let mut pool = SlotPool::new(nz!(8), nz!(2)).unwrap();

        _ = pool.allocate().unwrap();

        drop(pool);
    }

    #[test]
    #[should_panic]
    fn must_not_leak_slots_panics_with_outstanding_slot() {
        let mut pool = SlotPool::builder()
            .slot_size(nz!(8))
            .slot_count(nz!(2))
            .drop_policy(DropPolicy::MustNotLeakSlots)
            .build()
            .unwrap();

        _ = pool.allocate().unwrap();

        drop(pool);
    }

    #[test]
    fn must_not_leak_slots_is_fine_when_empty() {
        let mut pool = SlotPool::builder()
            .slot_size(nz!(8))
            .slot_count(nz!(2))
            .drop_policy(DropPolicy::MustNotLeakSlots)
            .build()
            .unwrap();

        let slot = pool.allocate().unwrap();
        unsafe { pool.deallocate(slot) };

        drop(pool);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn double_deallocate_panics_in_debug() {
        let mut pool = SlotPool::new(nz!(8), nz!(2)).unwrap();

        let slot = pool.allocate().unwrap();

        unsafe {
            pool.deallocate(slot);
            pool.deallocate(slot);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn foreign_deallocate_panics_in_debug() {
        let mut pool = SlotPool::new(nz!(8), nz!(2)).unwrap();

        let mut foreign = 0_u64;

        unsafe { pool.deallocate(NonNull::from(&mut foreign).cast()) };
    }
}
