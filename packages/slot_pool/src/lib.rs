#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-capacity pool of equally sized raw memory slots.
//!
//! [`SlotPool`] reserves one contiguous storage block up front and slices it into a fixed
//! number of fixed-size slots. Slots are handed out by [`SlotPool::allocate()`] and taken
//! back by [`SlotPool::deallocate()`] in O(1), reusing the most recently returned slot
//! first. The pool never grows and never falls back to another allocator.
//!
//! The pool is decoupled from object construction. It hands out uninitialized memory and
//! takes it back without looking at it, so the caller decides when a value is written into
//! a slot and when that value is dropped.
//!
//! # Example
//!
//! ```
//! use new_zealand::nz;
//! use slot_pool::SlotPool;
//!
//! struct Particle {
//!     x: f32,
//!     y: f32,
//! }
//!
//! let mut pool = SlotPool::builder()
//!     .layout_of::<Particle>()
//!     .slot_count(nz!(1024))
//!     .build()?;
//!
//! let slot = pool.allocate()?.cast::<Particle>();
//!
//! // SAFETY: The slot is sized and aligned for a Particle and not in use by anything else.
//! unsafe { slot.write(Particle { x: 1.0, y: 2.0 }) };
//!
//! // SAFETY: The value was initialized above.
//! let particle = unsafe { slot.as_ref() };
//! println!("particle at ({}, {})", particle.x, particle.y);
//!
//! // SAFETY: The slot came from this pool and is returned exactly once. Particle has no
//! // drop logic, so there is nothing to finalize first.
//! unsafe { pool.deallocate(slot.cast()) };
//!
//! assert!(pool.is_empty());
//! # Ok::<(), slot_pool::Error>(())
//! ```
//!
//! # Errors
//!
//! Reserving the storage block and allocating from an exhausted pool are the two fallible
//! operations. Both return [`Error`] to the immediate caller and neither is retried.

mod builder;
mod drop_policy;
mod error;
mod pool;

pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use pool::SlotPool;
