//! Walks a `SharedHandle` through every ownership transition:
//!
//! * Default (empty) construction.
//! * Adopting an object.
//! * Copying and copy-assigning.
//! * Resetting to a new object.
//! * Releasing everything at scope exit.
//!
//! Run with `cargo run --example shared_handle_lifecycle` to see the handle's trace output.

use shared_handle::SharedHandle;

struct Test {
    value: i32,
}

impl Test {
    fn new(value: i32) -> Self {
        println!("Test constructed: {value}");
        Self { value }
    }

    fn show(&self) {
        println!("Value: {}", self.value);
    }
}

impl Drop for Test {
    fn drop(&mut self) {
        println!("Test dropped: {}", self.value);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    {
        println!("Creating an empty handle...");
        let mut ptr1 = SharedHandle::<Test>::default();
        println!("ptr1 use_count: {}", ptr1.use_count());

        println!("\nCreating a handle owning an object...");
        let mut ptr2 = SharedHandle::new(Test::new(100));
        println!("ptr2 use_count: {}", ptr2.use_count());
        ptr2.show();

        println!("\nCopying ptr2 to ptr3...");
        let ptr3 = ptr2.clone();
        println!("ptr2 use_count: {}", ptr2.use_count());
        println!("ptr3 use_count: {}", ptr3.use_count());
        ptr3.show();

        println!("\nAssigning ptr3 to ptr1...");
        ptr1.assign(&ptr3);
        println!("ptr1 use_count: {}", ptr1.use_count());
        println!("ptr2 use_count: {}", ptr2.use_count());
        println!("ptr3 use_count: {}", ptr3.use_count());

        println!("\nResetting ptr2...");
        ptr2.reset_with(Test::new(200));
        println!("ptr2 use_count: {}", ptr2.use_count());
        ptr2.show();
        println!("ptr1 use_count: {}", ptr1.use_count());
        println!("ptr3 use_count: {}", ptr3.use_count());

        println!("\nExiting scope...");
    }

    println!("End of main.");
}
