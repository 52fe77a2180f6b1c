use tessera_core::core::interval::{DisjointIntervalSet, Interval};

#[test]
fn touching_endpoints_overlap() {
    let a = Interval::new(0, 10, ());
    let b = Interval::new(10, 20, ());
    let c = Interval::new(11, 20, ());
    assert!(a.overlaps(&b));
    assert!(b.overlaps(&a));
    assert!(!a.overlaps(&c));
    assert!(!c.overlaps(&a));
}

#[test]
fn contained_intervals_overlap() {
    let outer = Interval::new(0, 100, ());
    let inner = Interval::new(40, 60, ());
    assert!(outer.overlaps(&inner));
    assert!(inner.overlaps(&outer));
}

#[test]
fn single_cycle_intervals() {
    let a = Interval::new(5, 5, ());
    let b = Interval::new(5, 5, ());
    let c = Interval::new(6, 6, ());
    assert!(a.overlaps(&b));
    assert!(!a.overlaps(&c));
}

#[test]
#[should_panic(expected = "invalid interval")]
fn rejects_inverted_interval() {
    let _ = Interval::new(10, 9, ());
}

#[test]
fn front_is_earliest_start() {
    let mut set = DisjointIntervalSet::new();
    set.insert(Interval::new(50, 60, 'b'));
    set.insert(Interval::new(0, 10, 'a'));
    set.insert(Interval::new(20, 30, 'c'));
    assert_eq!(set.len(), 3);
    assert_eq!(set.front().unwrap().start(), 0);
    assert_eq!(*set.pop_front().unwrap().value(), 'a');
    assert_eq!(set.front().unwrap().start(), 20);
    assert_eq!(*set.pop_front().unwrap().value(), 'c');
    assert_eq!(*set.pop_front().unwrap().value(), 'b');
    assert!(set.is_empty());
}

#[test]
fn overlap_probe_before_insert() {
    let mut set = DisjointIntervalSet::new();
    set.insert(Interval::new(10, 20, ()));
    set.insert(Interval::new(40, 50, ()));

    assert!(set.has_overlap_range(0, 10)); // touches the first
    assert!(set.has_overlap_range(15, 45)); // spans both
    assert!(set.has_overlap_range(20, 25));
    assert!(!set.has_overlap_range(0, 9));
    assert!(!set.has_overlap_range(21, 39));
    assert!(!set.has_overlap_range(51, 100));

    set.insert(Interval::new(21, 39, ()));
    assert!(set.has_overlap_range(25, 30));
}

#[test]
#[should_panic(expected = "overlaps an existing reservation")]
fn rejects_overlapping_insert() {
    let mut set = DisjointIntervalSet::new();
    set.insert(Interval::new(0, 63, ()));
    set.insert(Interval::new(63, 100, ()));
}
