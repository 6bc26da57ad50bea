//! Provider and windowed sort.
//!
//! Wraps an index array (node or edge indexes) with a lazily-sorted view:
//! a window `[begin, end)` is served by running a partial quicksort
//! (Lomuto partition, median-of-three pivot) restricted to the unsorted
//! middle, then extending the known-sorted prefix/suffix to cover it.

use std::cmp::Ordering;

pub trait ItemComparator {
    fn compare(&self, a: u32, b: u32) -> Ordering;
}

pub struct ItemProvider<C: ItemComparator> {
    iteration_order: Vec<u32>,
    comparator: Option<C>,
    sorted_prefix_length: usize,
    sorted_suffix_length: usize,
}

impl<C: ItemComparator> ItemProvider<C> {
    pub fn new(items: Vec<u32>) -> Self {
        ItemProvider {
            iteration_order: items,
            comparator: None,
            sorted_prefix_length: 0,
            sorted_suffix_length: 0,
        }
    }

    pub fn set_comparator(&mut self, comparator: C) {
        self.comparator = Some(comparator);
        self.sorted_prefix_length = 0;
        self.sorted_suffix_length = 0;
    }

    pub fn len(&self) -> usize {
        self.iteration_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iteration_order.is_empty()
    }

    /// Serve `[begin, end)`, sorting only as much of the unsorted middle as
    /// the window overlaps.
    pub fn serialize_items_range(&mut self, begin: usize, end: usize) -> &[u32] {
        let len = self.iteration_order.len();
        let end = end.min(len);
        if let Some(comparator) = self.comparator.take() {
            let left_bound = self.sorted_prefix_length;
            let right_bound = len.saturating_sub(self.sorted_suffix_length + 1);
            if left_bound <= right_bound && begin < end {
                let window_left = begin.max(left_bound);
                let window_right = (end.saturating_sub(1)).min(right_bound);
                if window_left <= window_right {
                    partial_quicksort(
                        &mut self.iteration_order,
                        &comparator,
                        left_bound,
                        right_bound,
                        window_left,
                        window_right,
                    );
                    self.sorted_prefix_length = self.sorted_prefix_length.max(window_right + 1).min(len);
                    self.sorted_suffix_length =
                        self.sorted_suffix_length.max(len - window_left).min(len);
                }
            }
            self.comparator = Some(comparator);
        }
        &self.iteration_order[begin..end]
    }
}

/// Quicksort constrained to `[left_bound, right_bound]`, recursing only
/// into partitions that intersect `[window_left, window_right]`.
fn partial_quicksort<C: ItemComparator>(
    arr: &mut [u32],
    cmp: &C,
    left_bound: usize,
    right_bound: usize,
    window_left: usize,
    window_right: usize,
) {
    if left_bound >= right_bound {
        return;
    }
    let pivot_index = median_of_three(arr, cmp, left_bound, right_bound);
    arr.swap(pivot_index, right_bound);
    let pivot = arr[right_bound];

    let mut store = left_bound;
    for i in left_bound..right_bound {
        if cmp.compare(arr[i], pivot) == Ordering::Less {
            arr.swap(i, store);
            store += 1;
        }
    }
    arr.swap(store, right_bound);

    if store > 0 && window_left < store && left_bound < store {
        partial_quicksort(arr, cmp, left_bound, store - 1, window_left, window_right.min(store - 1));
    }
    if window_right > store && store + 1 <= right_bound {
        partial_quicksort(arr, cmp, store + 1, right_bound, window_left.max(store + 1), window_right);
    }
}

fn median_of_three<C: ItemComparator>(arr: &[u32], cmp: &C, lo: usize, hi: usize) -> usize {
    let mid = lo + (hi - lo) / 2;
    let (a, b, c) = (arr[lo], arr[mid], arr[hi]);
    if cmp.compare(a, b) == Ordering::Less {
        if cmp.compare(b, c) == Ordering::Less {
            mid
        } else if cmp.compare(a, c) == Ordering::Less {
            hi
        } else {
            lo
        }
    } else if cmp.compare(a, c) == Ordering::Less {
        lo
    } else if cmp.compare(b, c) == Ordering::Less {
        hi
    } else {
        mid
    }
}

/// Two-field comparator with a fixed tie-break on original index. Edge
/// field names start with `!edge`; all others are node fields. `!edgeName`
/// orders `__proto__` last, string-named edges before index-named edges,
/// then lexicographically.
pub struct TwoFieldComparator<F> {
    pub field1: String,
    pub ascending1: bool,
    pub field2: Option<String>,
    pub ascending2: bool,
    pub key_fn: F,
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum SortKey {
    Num(f64),
    Str(String),
}

impl<F> ItemComparator for TwoFieldComparator<F>
where
    F: Fn(&str, u32) -> SortKey,
{
    fn compare(&self, a: u32, b: u32) -> Ordering {
        let ord = compare_key(&self.field1, (self.key_fn)(&self.field1, a), (self.key_fn)(&self.field1, b));
        let ord = if self.ascending1 { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
        if let Some(field2) = &self.field2 {
            let ord2 = compare_key(field2, (self.key_fn)(field2, a), (self.key_fn)(field2, b));
            let ord2 = if self.ascending2 { ord2 } else { ord2.reverse() };
            if ord2 != Ordering::Equal {
                return ord2;
            }
        }
        a.cmp(&b)
    }
}

/// `!edgeName`'s proto-last/string-before-index ordering is scoped to that
/// one field; every other string field (node names, other edge fields)
/// compares plain lexicographically.
fn compare_key(field: &str, a: SortKey, b: SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Num(x), SortKey::Num(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (SortKey::Str(x), SortKey::Str(y)) => {
            if field == "!edgeName" {
                compare_edge_name_like(&x, &y)
            } else {
                x.cmp(&y)
            }
        }
        _ => Ordering::Equal,
    }
}

/// `!edgeName` ordering: `__proto__` sorts last; string-named edges sort
/// before index-named edges; otherwise lexicographic.
fn compare_edge_name_like(a: &str, b: &str) -> Ordering {
    if a == "__proto__" && b != "__proto__" {
        return Ordering::Greater;
    }
    if b == "__proto__" && a != "__proto__" {
        return Ordering::Less;
    }
    let a_is_index = a.chars().all(|c| c.is_ascii_digit()) && !a.is_empty();
    let b_is_index = b.chars().all(|c| c.is_ascii_digit()) && !b.is_empty();
    match (a_is_index, b_is_index) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NumericAscending;
    impl ItemComparator for NumericAscending {
        fn compare(&self, a: u32, b: u32) -> Ordering {
            a.cmp(&b)
        }
    }

    #[test]
    fn windowed_sort_orders_requested_range() {
        let mut provider = ItemProvider::new(vec![9, 3, 7, 1, 5, 2, 8, 4, 6, 0]);
        provider.set_comparator(NumericAscending);
        let window = provider.serialize_items_range(0, 3).to_vec();
        assert_eq!(window, vec![0, 1, 2]);
    }

    #[test]
    fn subsequent_windows_reuse_sorted_prefix() {
        let mut provider = ItemProvider::new(vec![5, 4, 3, 2, 1, 0]);
        provider.set_comparator(NumericAscending);
        let _ = provider.serialize_items_range(0, 2);
        let window = provider.serialize_items_range(0, 6).to_vec();
        assert_eq!(window, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn edge_name_ordering_puts_proto_last_and_strings_before_indexes() {
        assert_eq!(compare_edge_name_like("abc", "0"), Ordering::Less);
        assert_eq!(compare_edge_name_like("__proto__", "zzz"), Ordering::Greater);
        assert_eq!(compare_edge_name_like("0", "1"), Ordering::Less);
    }

    #[test]
    fn edge_name_special_ordering_is_scoped_to_edge_name_field() {
        // "!edgeName" gets the proto-last/string-before-index treatment...
        assert_eq!(
            compare_key("!edgeName", SortKey::Str("__proto__".into()), SortKey::Str("zzz".into())),
            Ordering::Greater
        );
        // ...but a plain node/edge string field (e.g. "name") compares
        // lexicographically, so "0" sorts before "__proto__" as plain text.
        assert_eq!(
            compare_key("name", SortKey::Str("__proto__".into()), SortKey::Str("zzz".into())),
            Ordering::Less
        );
        assert_eq!(
            compare_key("name", SortKey::Str("0".into()), SortKey::Str("abc".into())),
            Ordering::Less
        );
    }
}
