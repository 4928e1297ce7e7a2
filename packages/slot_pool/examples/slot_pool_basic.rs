//! Basic usage of the `slot_pool` crate:
//!
//! * Creating a pool sized for a type.
//! * Constructing values in allocated slots.
//! * Finalizing the values and returning the slots.
//!
//! Run with `cargo run --example slot_pool_basic` to see the pool's trace output.

use new_zealand::nz;
use slot_pool::SlotPool;

struct Widget {
    value: i32,
}

impl Widget {
    fn new(value: i32) -> Self {
        println!("Widget constructed: {value}");
        Self { value }
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        println!("Widget dropped: {}", self.value);
    }
}

fn main() -> Result<(), slot_pool::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let mut pool = SlotPool::builder()
        .layout_of::<Widget>()
        .slot_count(nz!(3))
        .build()?;

    // The pool hands out raw memory. Constructing a value in it is up to us.
    let first = pool.allocate()?.cast::<Widget>();
    let second = pool.allocate()?.cast::<Widget>();

    // SAFETY: Both slots are sized and aligned for a Widget and not used by anything else.
    unsafe {
        first.write(Widget::new(100));
        second.write(Widget::new(200));
    }

    // SAFETY: Both values were initialized above.
    let (a, b) = unsafe { (first.as_ref(), second.as_ref()) };
    println!("first value: {}", a.value);
    println!("second value: {}", b.value);

    // Finalize each value ourselves, then give its memory back.
    // SAFETY: Each value is dropped exactly once and each slot is returned exactly once
    // to the pool it came from. Nothing references the values afterwards.
    unsafe {
        first.drop_in_place();
        second.drop_in_place();

        pool.deallocate(first.cast());
        pool.deallocate(second.cast());
    }

    println!(
        "Pool has {} of {} slots available",
        pool.available(),
        pool.slot_count()
    );

    Ok(())
}
