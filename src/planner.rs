use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

/// A contiguous slice of the remote resource, stored half-open as `[start, end)`.
///
/// A range with `start >= end` is empty; the planner produces those when the
/// resource has fewer bytes than there are workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// First byte offset of the range (inclusive), `None` when empty.
    pub fn first(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.start)
    }

    /// Last byte offset of the range (inclusive), `None` when empty.
    pub fn last(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.end - 1)
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }

    /// Value for the `Range` request header, e.g. `bytes=0-332`.
    pub fn header_value(&self) -> Option<String> {
        self.last().map(|last| format!("bytes={}-{}", self.start, last))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            Some(last) => write!(f, "bytes {}-{}", self.start, last),
            None => write!(f, "empty range at {}", self.start),
        }
    }
}

/// Serialized with inclusive `first`/`last` offsets, both `null` when empty.
impl Serialize for ByteRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ByteRange", 2)?;
        state.serialize_field("first", &self.first())?;
        state.serialize_field("last", &self.last())?;
        state.end()
    }
}

/// Splits `[0, total_size)` into exactly `worker_count` ranges.
///
/// Every range gets `total_size / worker_count` bytes and the last one absorbs
/// the remainder. Returns an empty vec only when `worker_count` is 0.
pub fn plan(total_size: u64, worker_count: usize) -> Vec<ByteRange> {
    if worker_count == 0 {
        return Vec::new();
    }

    let count = worker_count as u64;
    let block = total_size / count;

    (0..count)
        .map(|i| {
            let start = i * block;
            let end = if i == count - 1 { total_size } else { (i + 1) * block };
            ByteRange::new(start, end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inclusive(range: &ByteRange) -> Option<(u64, u64)> {
        Some((range.first()?, range.last()?))
    }

    #[test]
    fn serializes_inclusive_bounds() {
        let json = serde_json::to_value(ByteRange::new(333, 666)).unwrap();
        assert_eq!(json, serde_json::json!({ "first": 333, "last": 665 }));

        let empty = serde_json::to_value(ByteRange::new(0, 0)).unwrap();
        assert_eq!(empty, serde_json::json!({ "first": null, "last": null }));
    }

    #[test]
    fn plan_thousand_bytes_three_workers() {
        let ranges = plan(1000, 3);
        assert_eq!(ranges.len(), 3);
        assert_eq!(inclusive(&ranges[0]), Some((0, 332)));
        assert_eq!(inclusive(&ranges[1]), Some((333, 665)));
        assert_eq!(inclusive(&ranges[2]), Some((666, 999)));
    }

    #[test]
    fn plan_single_worker_spans_file() {
        let ranges = plan(4096, 1);
        assert_eq!(ranges, vec![ByteRange::new(0, 4096)]);
        assert_eq!(inclusive(&ranges[0]), Some((0, 4095)));
    }

    #[test]
    fn plan_zero_size_yields_empty_ranges() {
        let ranges = plan(0, 4);
        assert_eq!(ranges.len(), 4);
        assert!(ranges.iter().all(ByteRange::is_empty));
        assert!(ranges.iter().all(|r| r.header_value().is_none()));
    }

    #[test]
    fn plan_fewer_bytes_than_workers() {
        let ranges = plan(2, 3);
        assert_eq!(ranges.len(), 3);
        assert!(ranges[0].is_empty());
        assert!(ranges[1].is_empty());
        assert_eq!(inclusive(&ranges[2]), Some((0, 1)));
    }

    #[test]
    fn plan_zero_workers() {
        assert!(plan(100, 0).is_empty());
    }

    #[test]
    fn header_value_is_inclusive() {
        assert_eq!(ByteRange::new(42, 43).header_value().as_deref(), Some("bytes=42-42"));
        assert_eq!(ByteRange::new(0, 100).header_value().as_deref(), Some("bytes=0-99"));
    }

    #[test]
    fn overlap_ignores_empty_ranges() {
        let a = ByteRange::new(0, 10);
        assert!(a.overlaps(&ByteRange::new(9, 20)));
        assert!(!a.overlaps(&ByteRange::new(10, 20)));
        assert!(!a.overlaps(&ByteRange::new(5, 5)));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ranges_partition_the_resource(total in 0u64..10_000_000, workers in 1usize..64) {
                let ranges = plan(total, workers);
                prop_assert_eq!(ranges.len(), workers);

                let mut cursor = 0u64;
                for range in ranges.iter().filter(|r| !r.is_empty()) {
                    prop_assert_eq!(range.start, cursor, "gap or overlap before {}", range);
                    cursor = range.end;
                }
                prop_assert_eq!(cursor, total);
                prop_assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), total);
            }

            #[test]
            fn windows_never_intersect(total in 0u64..1_000_000, workers in 1usize..32) {
                let ranges = plan(total, workers);
                for (i, a) in ranges.iter().enumerate() {
                    for b in ranges.iter().skip(i + 1) {
                        prop_assert!(!a.overlaps(b), "{} overlaps {}", a, b);
                    }
                }
            }
        }
    }
}
