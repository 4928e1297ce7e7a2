/// Determines what happens when a [`SlotPool`][crate::SlotPool] is dropped while some of
/// its slots are still allocated.
///
/// The pool never inspects or finalizes the contents of its slots. The policy only
/// decides whether outstanding slots at drop time are tolerated.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use slot_pool::{DropPolicy, SlotPool};
///
/// let pool = SlotPool::builder()
///     .layout_of::<u64>()
///     .slot_count(nz!(8))
///     .drop_policy(DropPolicy::MustNotLeakSlots)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its storage block when dropped, regardless of how many slots are
    /// still allocated. Whatever the caller constructed in those slots is never finalized.
    /// This is the default.
    #[default]
    MayLeakSlots,

    /// The pool will panic if any slot is still allocated when it is dropped.
    ///
    /// This may be valuable if values constructed in the slots own resources that must be
    /// finalized by the caller before the pool goes away.
    MustNotLeakSlots,
}
