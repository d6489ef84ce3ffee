use std::collections::BTreeMap;

/// Indexed storage for results produced out of order.
///
/// Values are inserted as batches: contiguous runs starting at a given index.
/// Batches never overlap and indices are never reused. The store does no
/// synchronization of its own, the shared state locks around every call.
#[derive(Debug)]
pub struct ResultStore<T> {
    /* Batches keyed by their start index */
    batches: BTreeMap<usize, Vec<T>>,
    /* Number of stored values across all batches */
    count: usize,
    /* One past the highest stored index */
    next_index: usize,
}

impl<T> Default for ResultStore<T> {
    fn default() -> Self {
        Self {
            batches: BTreeMap::new(),
            count: 0,
            next_index: 0,
        }
    }
}

impl<T> ResultStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if `[start, start + values.len())` overlaps a stored batch or
    /// does not fit in `usize`.
    pub fn insert(&mut self, start: usize, values: Vec<T>) {
        if values.is_empty() {
            return;
        }
        let end = match start.checked_add(values.len()) {
            Some(end) => end,
            None => panic!(
                "result batch of {} values at {} overflows the index space",
                values.len(),
                start
            ),
        };
        if let Some((&prev_start, prev)) = self.batches.range(..end).next_back() {
            assert!(
                prev_start + prev.len() <= start,
                "result batch [{}, {}) overlaps stored batch [{}, {})",
                start,
                end,
                prev_start,
                prev_start + prev.len()
            );
        }
        self.count += values.len();
        self.next_index = self.next_index.max(end);
        self.batches.insert(start, values);
    }

    /// Insert a batch after the highest stored index, returning its start index
    pub fn append(&mut self, values: Vec<T>) -> usize {
        let start = self.next_index;
        self.insert(start, values);
        start
    }

    fn batch_containing(&self, index: usize) -> Option<(usize, &Vec<T>)> {
        let (start, values) = self.batches.range(..=index).next_back()?;
        if index < start + values.len() {
            Some((*start, values))
        } else {
            None
        }
    }

    /// Whether a value is stored at `index`
    pub fn contains(&self, index: usize) -> bool {
        self.batch_containing(index).is_some()
    }

    /// The value stored at `index`, if any
    pub fn get(&self, index: usize) -> Option<&T> {
        self.batch_containing(index)
            .map(|(start, values)| &values[index - start])
    }

    /// One past the end of the contiguous run of stored values starting at `from`.
    ///
    /// Returns `from` itself when nothing is stored there. Consumers reading in
    /// index order can deliver every index in `[from, contiguous_end(from))`
    /// even if later batches arrived first.
    pub fn contiguous_end(&self, from: usize) -> usize {
        let mut end = match self.batch_containing(from) {
            Some((start, values)) => start + values.len(),
            None => return from,
        };
        for (&start, values) in self.batches.range(end..) {
            if start != end {
                break;
            }
            end += values.len();
        }
        end
    }

    /// Whether the value at `from` is stored, so a streaming reader can advance
    pub fn has_next_contiguous(&self, from: usize) -> bool {
        self.contiguous_end(from) > from
    }

    /// Smallest stored index not below `from`
    pub fn next_stored(&self, from: usize) -> Option<usize> {
        if self.contains(from) {
            return Some(from);
        }
        self.batches.range(from..).next().map(|(start, _)| *start)
    }

    /// Number of stored values across all batches
    pub fn count(&self) -> usize {
        self.count
    }

    /// One past the highest stored index
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Stored batches as `(begin, end)` index ranges, in index order
    pub fn ranges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.batches
            .iter()
            .map(|(&start, values)| (start, start + values.len()))
    }

    /// Drop every stored value. Indices already handed out stay reserved.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_batches() {
        let mut store = ResultStore::new();
        store.insert(3, vec!['d', 'e']);
        assert!(!store.contains(0));
        assert!(store.contains(4));
        assert!(!store.contains(5));
        assert_eq!(store.contiguous_end(0), 0);

        store.insert(0, vec!['a', 'b', 'c']);
        assert_eq!(store.count(), 5);
        assert_eq!(store.contiguous_end(0), 5);
        assert_eq!(store.get(2), Some(&'c'));
        assert_eq!(store.get(3), Some(&'d'));
        assert_eq!(store.next_index(), 5);
    }

    #[test]
    fn contiguous_end_stops_at_gap() {
        let mut store = ResultStore::new();
        store.insert(0, vec![1]);
        store.insert(1, vec![2, 3]);
        store.insert(5, vec![6]);
        assert_eq!(store.contiguous_end(0), 3);
        assert_eq!(store.contiguous_end(2), 3);
        assert!(!store.has_next_contiguous(3));
        assert_eq!(store.contiguous_end(5), 6);
        assert_eq!(store.next_stored(3), Some(5));
        assert_eq!(store.next_stored(2), Some(2));
        assert_eq!(store.next_stored(6), None);
    }

    #[test]
    fn append_uses_next_free_index() {
        let mut store = ResultStore::new();
        store.insert(2, vec![0]);
        assert_eq!(store.append(vec![1, 2]), 3);
        assert_eq!(store.ranges().collect::<Vec<_>>(), vec![(2, 3), (3, 5)]);
    }

    #[test]
    fn clear_keeps_indices_reserved() {
        let mut store = ResultStore::new();
        store.append(vec![1, 2]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.append(vec![3]), 2);
    }

    #[test]
    #[should_panic(expected = "overlaps")]
    fn overlapping_batch_is_fatal() {
        let mut store = ResultStore::new();
        store.insert(0, vec![1, 2, 3]);
        store.insert(2, vec![4]);
    }

    #[test]
    #[should_panic(expected = "overflows the index space")]
    fn batch_past_the_last_index_is_fatal() {
        let mut store = ResultStore::new();
        store.insert(usize::MAX - 1, vec![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "overlaps")]
    fn batch_covering_existing_one_is_fatal() {
        let mut store = ResultStore::new();
        store.insert(4, vec![1]);
        store.insert(2, vec![1, 2, 3, 4]);
    }
}
