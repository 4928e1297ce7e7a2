//! Integration tests for the `shared_handle` package.
//!
//! These verify the ownership guarantees of `SharedHandle<T>`: the count always equals the
//! number of owning handles and the object is destroyed exactly once, when the last owner
//! lets go.

use std::cell::RefCell;
use std::rc::Rc;

use shared_handle::SharedHandle;

/// Records its own drop in a shared log, tagged with its value.
struct Tracked {
    value: i32,
    log: Rc<RefCell<Vec<i32>>>,
}

impl Tracked {
    fn new(value: i32, log: &Rc<RefCell<Vec<i32>>>) -> Self {
        Self {
            value,
            log: Rc::clone(log),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.value);
    }
}

fn new_log() -> Rc<RefCell<Vec<i32>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn count_grows_and_shrinks_with_copies() {
    let log = new_log();
    let original = SharedHandle::new(Tracked::new(1, &log));
    assert_eq!(original.use_count(), 1);

    let mut copies = Vec::new();

    for k in 1..=5 {
        copies.push(original.clone());

        assert_eq!(original.use_count(), 1 + k);
        assert!(copies.iter().all(|copy| copy.use_count() == 1 + k));
    }

    while let Some(copy) = copies.pop() {
        let before = original.use_count();
        drop(copy);
        assert_eq!(original.use_count(), before - 1);
    }

    assert_eq!(original.use_count(), 1);
    assert!(log.borrow().is_empty());

    drop(original);
    assert_eq!(*log.borrow(), vec![1]);
}

#[test]
fn destroyed_once_after_last_of_three_in_any_order() {
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let log = new_log();

        let first = SharedHandle::new(Tracked::new(7, &log));
        let second = first.clone();
        let third = second.clone();

        let mut handles = vec![Some(first), Some(second), Some(third)];

        for (step, index) in order.into_iter().enumerate() {
            let handle = handles
                .get_mut(index)
                .and_then(Option::take)
                .expect("each handle is dropped once");
            drop(handle);

            let expected_drops = usize::from(step == 2);
            assert_eq!(log.borrow().len(), expected_drops, "order {order:?}, step {step}");
        }

        assert_eq!(*log.borrow(), vec![7]);
    }
}

#[test]
fn take_leaves_source_empty_and_count_unchanged() {
    let log = new_log();
    let mut source = SharedHandle::new(Tracked::new(3, &log));
    let witness = source.clone();

    let target = source.take();

    assert_eq!(source.use_count(), 0);
    assert!(source.is_empty());
    assert_eq!(target.use_count(), 2);
    assert!(target.ptr_eq(&witness));

    drop(source);
    assert!(log.borrow().is_empty());

    drop(target);
    drop(witness);
    assert_eq!(*log.borrow(), vec![3]);
}

#[test]
fn plain_move_keeps_count() {
    let first = SharedHandle::new(11);
    let moved = first;

    assert_eq!(moved.use_count(), 1);
    assert_eq!(*moved, 11);
}

#[test]
fn assigning_a_handle_sharing_the_same_record_is_noop() {
    let log = new_log();
    let first = SharedHandle::new(Tracked::new(5, &log));
    let mut second = first.clone();

    second.assign(&first);
    assert_eq!(first.use_count(), 2);

    second.clone_from(&first);
    assert_eq!(first.use_count(), 2);

    let snapshot = second.clone();
    second.assign(&snapshot);
    assert_eq!(first.use_count(), 3);
    drop(snapshot);

    assert!(log.borrow().is_empty());
    assert_eq!(second.value, 5);
}

#[test]
fn sole_owner_assignment_of_itself_keeps_object() {
    let log = new_log();
    let mut handle = SharedHandle::new(Tracked::new(9, &log));

    let alias = handle.clone();
    drop(alias);
    assert_eq!(handle.use_count(), 1);

    // A copy of the handle shares the record, so assigning it back must not release first.
    let copy = handle.clone();
    handle.assign(&copy);
    drop(copy);

    assert_eq!(handle.use_count(), 1);
    assert!(log.borrow().is_empty());
    assert_eq!(handle.value, 9);
}

#[test]
fn copy_assignment_releases_old_before_sharing_new() {
    let log = new_log();

    let mut target = SharedHandle::new(Tracked::new(1, &log));
    let source = SharedHandle::new(Tracked::new(2, &log));

    target.clone_from(&source);

    assert_eq!(*log.borrow(), vec![1]);
    assert_eq!(source.use_count(), 2);
    assert_eq!(target.value, 2);
}

#[test]
fn move_assignment_releases_old_and_empties_source() {
    let log = new_log();

    let mut target = SharedHandle::new(Tracked::new(1, &log));
    let mut source = SharedHandle::new(Tracked::new(2, &log));

    target.move_from(&mut source);

    assert_eq!(*log.borrow(), vec![1]);
    assert!(source.is_empty());
    assert_eq!(target.use_count(), 1);
    assert_eq!(target.value, 2);
}

#[test]
fn reset_destroys_sole_old_object_before_returning() {
    let log = new_log();
    let mut handle = SharedHandle::new(Tracked::new(100, &log));

    handle.reset(Some(Box::new(Tracked::new(200, &log))));

    assert_eq!(*log.borrow(), vec![100]);
    assert_eq!(handle.use_count(), 1);
    assert_eq!(handle.value, 200);

    drop(handle);
    assert_eq!(*log.borrow(), vec![100, 200]);
}

#[test]
fn reset_of_shared_object_leaves_other_owners_intact() {
    let log = new_log();
    let mut first = SharedHandle::new(Tracked::new(100, &log));
    let second = first.clone();

    first.reset_with(Tracked::new(200, &log));

    assert!(log.borrow().is_empty());
    assert_eq!(first.use_count(), 1);
    assert_eq!(second.use_count(), 1);
    assert_eq!(second.value, 100);
}

#[test]
fn reset_to_none_empties_handle() {
    let log = new_log();
    let mut handle = SharedHandle::new(Tracked::new(4, &log));

    handle.reset(None);

    assert!(handle.is_empty());
    assert_eq!(handle.use_count(), 0);
    assert_eq!(*log.borrow(), vec![4]);
}

#[test]
fn empty_handles_are_inert() {
    let mut empty = SharedHandle::<i32>::default();
    let copy = empty.clone();
    let taken = empty.take();
    empty.assign(&copy);
    empty.clear();

    assert!(empty.is_empty());
    assert!(copy.is_empty());
    assert!(taken.is_empty());
    assert!(empty.get().is_none());
    assert!(empty.as_ptr().is_null());
}
