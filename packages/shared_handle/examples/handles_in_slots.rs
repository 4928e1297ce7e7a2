//! Combines `SharedHandle` with `slot_pool::SlotPool`:
//!
//! * A pool of slots sized for handles.
//! * Handles constructed directly into pool slots, sharing one object.
//! * Each handle finalized in place before its slot is returned.
//!
//! The shared object lives on the heap. The pool only provides the storage for the handles
//! themselves, so the object is destroyed when the last handle in a slot is finalized.

use new_zealand::nz;
use shared_handle::SharedHandle;
use slot_pool::SlotPool;

fn main() -> Result<(), slot_pool::Error> {
    let mut pool = SlotPool::builder()
        .layout_of::<SharedHandle<String>>()
        .slot_count(nz!(4))
        .build()?;

    let original = SharedHandle::new("pooled greeting".to_string());

    let mut slots = Vec::new();

    for _ in 0..pool.slot_count() {
        let slot = pool.allocate()?.cast::<SharedHandle<String>>();

        // SAFETY: The slot is sized and aligned for a SharedHandle<String> and not in use.
        unsafe { slot.write(original.clone()) };

        slots.push(slot);
    }

    println!(
        "{} handles share the object, {} of them in pool slots",
        original.use_count(),
        slots.len()
    );

    drop(original);

    for slot in slots {
        // SAFETY: Each slot holds an initialized handle that nothing else references.
        let handle = unsafe { slot.as_ref() };
        println!("slot handle sees {:?} with use_count {}", handle.get(), handle.use_count());

        // SAFETY: The handle is finalized exactly once, then its slot is returned exactly
        // once to the pool that handed it out.
        unsafe {
            slot.drop_in_place();
            pool.deallocate(slot.cast());
        }
    }

    println!("pool is empty again: {}", pool.is_empty());

    Ok(())
}
