#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A single-threaded reference-counted handle with explicit ownership operations.
//!
//! [`SharedHandle<T>`] owns a share of one heap-allocated object. The object and a
//! separately allocated bookkeeping record holding the reference count are created together
//! when the first handle adopts the object, and are destroyed together, object first, when
//! the last owning handle releases its share. Destruction happens exactly once regardless
//! of how the shares were passed around.
//!
//! Besides the usual [`Clone`] and [`Drop`], the handle exposes the individual ownership
//! transitions as methods:
//!
//! | Operation | Method | Count |
//! |-----------|--------|-------|
//! | Create empty | [`SharedHandle::empty()`], [`Default`] | n/a |
//! | Adopt an object | [`SharedHandle::new()`], [`SharedHandle::adopt()`], [`SharedHandle::from_raw()`] | new record, 1 |
//! | Share | [`Clone::clone()`] | +1 |
//! | Share into existing handle | [`SharedHandle::assign()`], [`Clone::clone_from()`] | -1 old, +1 new |
//! | Transfer | [`SharedHandle::take()`] | unchanged |
//! | Transfer into existing handle | [`SharedHandle::move_from()`] | -1 old, new unchanged |
//! | Replace | [`SharedHandle::reset()`], [`SharedHandle::reset_with()`], [`SharedHandle::clear()`] | -1 old, new record |
//!
//! Every operation that overwrites a non-empty handle releases the old share before taking
//! on the new one, and sharing into a handle that already shares the same record is a no-op.
//!
//! # Example
//!
//! ```
//! use shared_handle::SharedHandle;
//!
//! let mut first = SharedHandle::new(100);
//! let second = first.clone();
//! assert_eq!(second.use_count(), 2);
//!
//! // Replacing the object in one handle does not affect the other.
//! first.reset_with(200);
//! assert_eq!(*first, 200);
//! assert_eq!(*second, 100);
//! assert_eq!(first.use_count(), 1);
//! assert_eq!(second.use_count(), 1);
//! ```
//!
//! # Empty handles
//!
//! Dereferencing an empty handle panics. Use [`SharedHandle::get()`] to access the object
//! without risking a panic.

mod handle;
mod ref_count;

pub use handle::SharedHandle;
pub(crate) use ref_count::*;
