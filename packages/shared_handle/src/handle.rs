use std::any::type_name;
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use tracing::{debug, trace};

use crate::RefCount;

/// A shared single-threaded reference-counting handle for a heap-allocated object.
///
/// A handle is either empty or owns a share of exactly one object. Every owning handle of
/// the same object points at the same separately allocated bookkeeping record, whose count
/// is the number of live owning handles. When the last owning handle releases its share,
/// the object is dropped and then the record is freed.
///
/// Cloning shares ownership and increments the count. Moving a handle transfers its share
/// without touching the count, and [`take()`](Self::take) does the same while leaving an
/// empty handle behind. [`assign()`](Self::assign), [`move_from()`](Self::move_from) and
/// [`reset()`](Self::reset) always release the current share before taking on a new one.
///
/// # Examples
///
/// ```
/// use shared_handle::SharedHandle;
///
/// let first = SharedHandle::new("shared".to_string());
/// assert_eq!(first.use_count(), 1);
///
/// let second = first.clone();
/// assert_eq!(first.use_count(), 2);
/// assert_eq!(*second, "shared");
///
/// drop(first);
/// assert_eq!(second.use_count(), 1);
/// ```
///
/// # Thread safety
///
/// This type is single-threaded. The count is not synchronized, so the handle is neither
/// [`Send`] nor [`Sync`].
pub struct SharedHandle<T> {
    // Raw pointers inside make the handle neither Send nor Sync.
    owner: Option<Owner<T>>,

    _owns: PhantomData<T>,
}

/// The two allocations a non-empty handle refers to. They always come and go together.
struct Owner<T> {
    object: NonNull<T>,
    record: NonNull<RefCount>,
}

impl<T> Clone for Owner<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Owner<T> {}

impl<T> Owner<T> {
    /// Takes ownership of a boxed object and pairs it with a new record counting one owner.
    fn adopt(object: Box<T>) -> Self {
        let record = Box::new(RefCount::new());

        trace!(
            object = type_name::<T>(),
            use_count = record.get(),
            "adopted object"
        );

        Self {
            object: NonNull::from(Box::leak(object)),
            record: NonNull::from(Box::leak(record)),
        }
    }

    fn record(&self) -> &RefCount {
        // SAFETY: The record stays allocated for as long as any handle holds an owner that
        // points at it, and we are only ever called through such a handle.
        unsafe { self.record.as_ref() }
    }
}

impl<T> SharedHandle<T> {
    /// Creates an empty handle that owns nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let handle = SharedHandle::<u32>::empty();
    ///
    /// assert!(handle.is_empty());
    /// assert_eq!(handle.use_count(), 0);
    /// ```
    #[must_use]
    #[inline]
    pub const fn empty() -> Self {
        Self {
            owner: None,
            _owns: PhantomData,
        }
    }

    /// Moves `value` to the heap and creates the first owning handle for it.
    #[must_use]
    #[inline]
    pub fn new(value: T) -> Self {
        Self::adopt(Some(Box::new(value)))
    }

    /// Takes ownership of an already boxed object, or creates an empty handle for `None`.
    ///
    /// A new bookkeeping record is allocated for the object, with a count of one.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let owning = SharedHandle::adopt(Some(Box::new(42)));
    /// assert_eq!(owning.use_count(), 1);
    ///
    /// let empty = SharedHandle::<i32>::adopt(None);
    /// assert_eq!(empty.use_count(), 0);
    /// ```
    #[must_use]
    pub fn adopt(object: Option<Box<T>>) -> Self {
        Self {
            owner: object.map(Owner::adopt),
            _owns: PhantomData,
        }
    }

    /// Takes ownership of an object from a raw pointer, or creates an empty handle for a
    /// null pointer.
    ///
    /// # Safety
    ///
    /// A non-null `object` must have been obtained from [`Box::into_raw()`] and must not be
    /// owned by anything else. The handle will free it as a `Box<T>`.
    #[must_use]
    pub unsafe fn from_raw(object: *mut T) -> Self {
        if object.is_null() {
            return Self::empty();
        }

        // SAFETY: Forwarding the guarantees of the caller.
        Self::adopt(Some(unsafe { Box::from_raw(object) }))
    }

    /// Number of handles currently owning the object, or 0 for an empty handle.
    #[must_use]
    #[inline]
    pub fn use_count(&self) -> usize {
        self.owner.as_ref().map_or(0, |owner| owner.record().get())
    }

    /// Whether this handle owns nothing.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owner.is_none()
    }

    /// Returns a reference to the object, or `None` for an empty handle.
    #[must_use]
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.owner.as_ref().map(|owner| {
            // SAFETY: This handle holds a share, so the object is alive for as long as the
            // handle is borrowed. Only shared references are created while shares are
            // held by more than one handle.
            unsafe { owner.object.as_ref() }
        })
    }

    /// Returns an exclusive reference to the object if this handle is its only owner.
    ///
    /// Returns `None` for an empty handle or when the object is shared.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let mut handle = SharedHandle::new(1);
    /// *handle.get_mut().unwrap() += 1;
    /// assert_eq!(*handle, 2);
    ///
    /// let other = handle.clone();
    /// assert!(handle.get_mut().is_none());
    /// # drop(other);
    /// ```
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let owner = self.owner.as_mut()?;

        if owner.record().get() != 1 {
            return None;
        }

        // SAFETY: We are the only owner and hold &mut self, so no other reference to the
        // object can exist for as long as the returned reference lives.
        Some(unsafe { owner.object.as_mut() })
    }

    /// Returns a pointer to the object, or a null pointer for an empty handle.
    #[must_use]
    #[inline]
    #[cfg_attr(test, mutants::skip)] // All mutations unviable - save some time.
    pub fn as_ptr(&self) -> *const T {
        self.owner
            .as_ref()
            .map_or(ptr::null(), |owner| owner.object.as_ptr().cast_const())
    }

    /// Whether both handles share the same bookkeeping record, or are both empty.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.owner, &other.owner) {
            (Some(a), Some(b)) => a.record == b.record,
            (None, None) => true,
            _ => false,
        }
    }

    /// Makes this handle share the object owned by `other`.
    ///
    /// If both handles already share the same record, this does nothing. Otherwise the
    /// current share is released first, which may drop the current object, and then the
    /// count of `other`'s object is incremented.
    ///
    /// [`Clone::clone_from()`] behaves the same way.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let source = SharedHandle::new("a");
    /// let mut target = SharedHandle::new("b");
    ///
    /// target.assign(&source);
    ///
    /// assert_eq!(*target, "a");
    /// assert_eq!(source.use_count(), 2);
    /// ```
    pub fn assign(&mut self, other: &Self) {
        if self.ptr_eq(other) {
            trace!(
                use_count = self.use_count(),
                "assignment from a handle sharing the same record"
            );
            return;
        }

        self.release();

        if let Some(owner) = other.owner {
            owner.record().inc_ref();

            trace!(use_count = owner.record().get(), "assigned shared handle");
        }

        self.owner = other.owner;
    }

    /// Takes this handle's share, leaving an empty handle behind.
    ///
    /// The count does not change.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let mut source = SharedHandle::new(7);
    /// let target = source.take();
    ///
    /// assert!(source.is_empty());
    /// assert_eq!(target.use_count(), 1);
    /// ```
    #[must_use]
    pub fn take(&mut self) -> Self {
        trace!(use_count = self.use_count(), "took shared handle");

        Self {
            owner: self.owner.take(),
            _owns: PhantomData,
        }
    }

    /// Releases this handle's share, then takes over `other`'s share, leaving `other` empty.
    ///
    /// The count of `other`'s object does not change.
    pub fn move_from(&mut self, other: &mut Self) {
        self.release();
        self.owner = other.owner.take();

        trace!(use_count = self.use_count(), "moved shared handle");
    }

    /// Releases this handle's share, then adopts `object` like [`adopt()`](Self::adopt).
    ///
    /// If this handle was the only owner of its object, the object is dropped before this
    /// method returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let mut handle = SharedHandle::new(1);
    /// handle.reset(Some(Box::new(2)));
    ///
    /// assert_eq!(*handle, 2);
    /// assert_eq!(handle.use_count(), 1);
    ///
    /// handle.reset(None);
    /// assert!(handle.is_empty());
    /// ```
    pub fn reset(&mut self, object: Option<Box<T>>) {
        self.release();
        self.owner = object.map(Owner::adopt);

        trace!(use_count = self.use_count(), "reset shared handle");
    }

    /// Releases this handle's share, then moves `value` to the heap and owns it.
    pub fn reset_with(&mut self, value: T) {
        self.reset(Some(Box::new(value)));
    }

    /// Releases this handle's share, leaving it empty.
    pub fn clear(&mut self) {
        self.reset(None);
    }

    /// Gives up this handle's share. The last owner drops the object, then frees the record.
    ///
    /// The handle is always empty afterwards. Releasing an empty handle does nothing.
    fn release(&mut self) {
        let Some(owner) = self.owner.take() else {
            return;
        };

        let is_last = owner.record().dec_ref();

        trace!(use_count = owner.record().get(), "released shared handle");

        if !is_last {
            return;
        }

        // Frees the record after the object, also when dropping the object panics.
        let record = RecordGuard(owner.record);

        // SAFETY: The object came from Box::leak() in Owner::adopt() and the count just
        // reached zero, so no other handle refers to it and it is freed exactly once here.
        drop(unsafe { Box::from_raw(owner.object.as_ptr()) });

        drop(record);

        debug!(object = type_name::<T>(), "destroyed shared object and its record");
    }
}

/// Owns a record whose count reached zero and frees it when dropped.
struct RecordGuard(NonNull<RefCount>);

impl Drop for RecordGuard {
    fn drop(&mut self) {
        // SAFETY: The record came from Box::leak() in Owner::adopt() and its count reached
        // zero, so no handle refers to it anymore. The guard is created once per record.
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

impl<T> Default for SharedHandle<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        if let Some(owner) = self.owner {
            owner.record().inc_ref();

            trace!(use_count = owner.record().get(), "copied shared handle");
        }

        Self {
            owner: self.owner,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Deref for SharedHandle<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty.
    #[inline]
    fn deref(&self) -> &Self::Target {
        let Some(object) = self.get() else {
            panic!("cannot dereference an empty SharedHandle<{}>", type_name::<T>());
        };

        object
    }
}

impl<T> Borrow<T> for SharedHandle<T> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn borrow(&self) -> &T {
        self
    }
}

impl<T> AsRef<T> for SharedHandle<T> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T> From<Box<T>> for SharedHandle<T> {
    #[inline]
    fn from(value: Box<T>) -> Self {
        Self::adopt(Some(value))
    }
}

impl<T> From<T> for SharedHandle<T> {
    #[inline]
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl<T: fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("use_count", &self.use_count())
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::live_records;

    assert_not_impl_any!(SharedHandle<u32>: Send, Sync);
    assert_not_impl_any!(SharedHandle<String>: Send, Sync);
    assert_impl_all!(SharedHandle<u32>: Clone, Default, fmt::Debug);

    /// Counts how many times it has been dropped.
    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl DropCounter {
        fn new() -> (Self, Rc<Cell<usize>>) {
            let drops = Rc::new(Cell::new(0));
            (
                Self {
                    drops: Rc::clone(&drops),
                },
                drops,
            )
        }
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn empty_handle_has_no_owner() {
        let handle = SharedHandle::<u32>::empty();

        assert!(handle.is_empty());
        assert_eq!(handle.use_count(), 0);
        assert!(handle.get().is_none());
        assert!(handle.as_ptr().is_null());
    }

    #[test]
    fn default_is_empty() {
        let handle = SharedHandle::<String>::default();
        assert!(handle.is_empty());
    }

    #[test]
    fn adopted_object_has_one_owner() {
        let handle = SharedHandle::new(5_u32);

        assert!(!handle.is_empty());
        assert_eq!(handle.use_count(), 1);
        assert_eq!(handle.get(), Some(&5));
        assert!(!handle.as_ptr().is_null());
    }

    #[test]
    fn from_raw_null_is_empty() {
        let handle = unsafe { SharedHandle::<u32>::from_raw(ptr::null_mut()) };
        assert!(handle.is_empty());
    }

    #[test]
    fn from_raw_takes_ownership() {
        let (counter, drops) = DropCounter::new();
        let raw = Box::into_raw(Box::new(counter));

        let handle = unsafe { SharedHandle::from_raw(raw) };
        assert_eq!(handle.as_ptr(), raw.cast_const());
        assert_eq!(handle.use_count(), 1);

        drop(handle);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn release_empties_the_handle_and_is_idempotent() {
        let (counter, drops) = DropCounter::new();
        let mut handle = SharedHandle::new(counter);

        handle.release();
        assert!(handle.is_empty());
        assert_eq!(drops.get(), 1);

        handle.release();
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn release_of_shared_object_keeps_it_alive() {
        let (counter, drops) = DropCounter::new();
        let mut first = SharedHandle::new(counter);
        let second = first.clone();

        first.release();

        assert!(first.is_empty());
        assert_eq!(second.use_count(), 1);
        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn clone_of_empty_is_empty() {
        let handle = SharedHandle::<u32>::empty();
        let copy = handle.clone();

        assert!(copy.is_empty());
        assert!(copy.ptr_eq(&handle));
    }

    #[test]
    fn ptr_eq_compares_records() {
        let a = SharedHandle::new(1);
        let b = a.clone();
        let c = SharedHandle::new(1);

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert!(!a.ptr_eq(&SharedHandle::empty()));
    }

    #[test]
    fn clone_from_same_record_is_noop() {
        let (counter, drops) = DropCounter::new();
        let first = SharedHandle::new(counter);
        let mut second = first.clone();

        second.clone_from(&first);

        assert_eq!(first.use_count(), 2);
        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn assign_releases_old_object_first() {
        let (old, old_drops) = DropCounter::new();
        let (new, new_drops) = DropCounter::new();

        let mut target = SharedHandle::new(old);
        let source = SharedHandle::new(new);

        target.assign(&source);

        assert_eq!(old_drops.get(), 1);
        assert_eq!(new_drops.get(), 0);
        assert!(target.ptr_eq(&source));
        assert_eq!(source.use_count(), 2);
    }

    #[test]
    fn assign_from_empty_empties_target() {
        let (counter, drops) = DropCounter::new();
        let mut target = SharedHandle::new(counter);

        target.assign(&SharedHandle::empty());

        assert!(target.is_empty());
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn move_from_transfers_share() {
        let (old, old_drops) = DropCounter::new();
        let (new, new_drops) = DropCounter::new();

        let mut target = SharedHandle::new(old);
        let mut source = SharedHandle::new(new);
        let witness = source.clone();

        target.move_from(&mut source);

        assert_eq!(old_drops.get(), 1);
        assert_eq!(new_drops.get(), 0);
        assert!(source.is_empty());
        assert_eq!(witness.use_count(), 2);
        assert!(target.ptr_eq(&witness));
    }

    #[test]
    fn get_mut_requires_sole_ownership() {
        let mut handle = SharedHandle::new(String::from("a"));

        handle.get_mut().unwrap().push('b');
        assert_eq!(*handle, "ab");

        let other = handle.clone();
        assert!(handle.get_mut().is_none());

        drop(other);
        assert!(handle.get_mut().is_some());

        handle.clear();
        assert!(handle.get_mut().is_none());
    }

    #[test]
    #[should_panic]
    fn deref_of_empty_panics() {
        let handle = SharedHandle::<u32>::empty();
        let value: u32 = *handle;
        assert_eq!(value, 0);
    }

    #[test]
    fn conversions_adopt() {
        let from_value = SharedHandle::<u8>::from(3_u8);
        let from_box = SharedHandle::<u8>::from(Box::new(4_u8));

        assert_eq!(*from_value, 3);
        assert_eq!(*from_box, 4);
        assert_eq!(from_value.use_count(), 1);
        assert_eq!(from_box.use_count(), 1);
    }

    #[test]
    fn last_release_frees_the_record() {
        let before = live_records();

        let first = SharedHandle::new(1_u32);
        let second = first.clone();
        assert_eq!(live_records(), before + 1);

        drop(first);
        assert_eq!(live_records(), before + 1);

        drop(second);
        assert_eq!(live_records(), before);
    }

    struct PanicOnDrop;

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("dropping the object failed");
        }
    }

    #[test]
    fn record_is_freed_when_object_drop_panics() {
        let before = live_records();

        let handle = SharedHandle::new(PanicOnDrop);
        assert_eq!(live_records(), before + 1);

        let result = panic::catch_unwind(AssertUnwindSafe(move || drop(handle)));

        assert!(result.is_err());
        assert_eq!(live_records(), before);
    }
}
