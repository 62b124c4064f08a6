// Range planning module
// Tag identifier windows are anchored at either end of a file. Planning
// merges the windows on each side into one covering range so detection
// issues at most one load per side, whatever the number of tag formats.

use std::fmt;

/// A window into a file. Negative offsets count back from the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: i64,
    pub length: u64,
}

impl ByteRange {
    pub const fn new(offset: i64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Whether the window lies entirely inside a file of `file_size` bytes.
    ///
    /// A positive window may end exactly at end-of-file. A negative window may
    /// reach back at most to start-of-file and must not run past end-of-file.
    pub fn is_valid(&self, file_size: u64) -> bool {
        let offset = i128::from(self.offset);
        let length = i128::from(self.length);
        let size = i128::from(file_size);
        if offset >= 0 {
            offset + length <= size
        } else {
            -offset <= size && offset + length <= 0
        }
    }

    /// Absolute position of a valid window.
    pub fn resolve(&self, file_size: u64) -> Option<ResolvedRange> {
        if !self.is_valid(file_size) {
            return None;
        }
        let start = if self.offset >= 0 {
            self.offset.unsigned_abs()
        } else {
            file_size - self.offset.unsigned_abs()
        };
        Some(ResolvedRange::new(start, self.length))
    }

    /// Which half of the file the window belongs to.
    ///
    /// Negative windows are classified by the magnitude of their offset: one
    /// reaching back past the middle of the file counts as start-side.
    pub fn side(&self, file_size: u64) -> Side {
        let offset = i128::from(self.offset);
        let size = i128::from(file_size);
        let at_start = if offset >= 0 {
            offset * 2 < size
        } else {
            -offset * 2 > size
        };
        if at_start {
            Side::Start
        } else {
            Side::End
        }
    }
}

/// An absolute, half-open range `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedRange {
    pub offset: u64,
    pub length: u64,
}

impl ResolvedRange {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn contains(&self, other: &ResolvedRange) -> bool {
        self.offset <= other.offset && other.end() <= self.end()
    }

    /// Smallest range covering both.
    pub fn cover(&self, other: &ResolvedRange) -> ResolvedRange {
        let start = self.offset.min(other.offset);
        let end = self.end().max(other.end());
        ResolvedRange::new(start, end - start)
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Start,
    End,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Start => Side::End,
            Side::End => Side::Start,
        }
    }
}

/// The loads detection needs: at most one covering range per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SidePlan {
    pub start: Option<ResolvedRange>,
    pub end: Option<ResolvedRange>,
}

impl SidePlan {
    pub fn get(&self, side: Side) -> Option<ResolvedRange> {
        match side {
            Side::Start => self.start,
            Side::End => self.end,
        }
    }

    /// Number of loads the plan issues.
    pub fn load_count(&self) -> usize {
        usize::from(self.start.is_some()) + usize::from(self.end.is_some())
    }

    fn extend(&mut self, side: Side, range: ResolvedRange) {
        let slot = match side {
            Side::Start => &mut self.start,
            Side::End => &mut self.end,
        };
        *slot = Some(match slot {
            Some(existing) => existing.cover(&range),
            None => range,
        });
    }
}

/// Merge candidate windows into one minimal covering range per file side.
/// Windows that are not valid for `file_size` are dropped.
pub fn plan(candidates: &[ByteRange], file_size: u64) -> SidePlan {
    let mut plan = SidePlan::default();
    for candidate in candidates {
        if let Some(range) = candidate.resolve(file_size) {
            plan.extend(candidate.side(file_size), range);
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_positive_validity_boundaries() {
        assert!(ByteRange::new(0, 10).is_valid(10));
        assert!(ByteRange::new(90, 10).is_valid(100));
        assert!(!ByteRange::new(91, 10).is_valid(100));
        assert!(!ByteRange::new(0, 10).is_valid(9));
        assert!(ByteRange::new(0, 0).is_valid(0));
    }

    #[test]
    fn test_negative_validity_boundaries() {
        assert!(ByteRange::new(-128, 3).is_valid(128));
        assert!(ByteRange::new(-128, 128).is_valid(1000));
        assert!(!ByteRange::new(-128, 3).is_valid(127));
        assert!(!ByteRange::new(-10, 11).is_valid(100));
        assert!(ByteRange::new(-10, 10).is_valid(100));
    }

    #[test]
    fn test_resolve_negative_offset() {
        let range = ByteRange::new(-128, 3).resolve(1000).unwrap();
        assert_eq!(range, ResolvedRange::new(872, 3));
        assert!(ByteRange::new(-128, 3).resolve(100).is_none());
    }

    #[test]
    fn test_side_classification() {
        assert_eq!(ByteRange::new(0, 10).side(1000), Side::Start);
        assert_eq!(ByteRange::new(499, 1).side(1000), Side::Start);
        assert_eq!(ByteRange::new(500, 1).side(1000), Side::End);
        assert_eq!(ByteRange::new(-128, 3).side(1000), Side::End);
        assert_eq!(ByteRange::new(-900, 3).side(1000), Side::Start);
        // Tiny file: the ID3v1 window reaches back past the middle.
        assert_eq!(ByteRange::new(-128, 3).side(200), Side::Start);
    }

    #[test]
    fn test_plan_merges_same_side() {
        let plan = plan(&[ByteRange::new(0, 10), ByteRange::new(5, 15)], 1000);
        assert_eq!(plan.start, Some(ResolvedRange::new(0, 20)));
        assert_eq!(plan.end, None);
        assert_eq!(plan.load_count(), 1);
    }

    #[test]
    fn test_plan_never_merges_across_sides() {
        let plan = plan(&[ByteRange::new(0, 10), ByteRange::new(-128, 3)], 10_000);
        assert_eq!(plan.start, Some(ResolvedRange::new(0, 10)));
        assert_eq!(plan.end, Some(ResolvedRange::new(9872, 3)));
        assert_eq!(plan.load_count(), 2);
    }

    #[test]
    fn test_plan_drops_invalid_candidates() {
        let plan = plan(&[ByteRange::new(0, 10), ByteRange::new(-128, 3)], 8);
        assert_eq!(plan, SidePlan::default());
        assert_eq!(plan.load_count(), 0);
    }

    #[test]
    fn test_plan_end_side_cover() {
        let plan = plan(&[ByteRange::new(-128, 3), ByteRange::new(-10, 10), ByteRange::new(0, 4)], 4096);
        assert_eq!(plan.end, Some(ResolvedRange::new(3968, 128)));
        assert_eq!(plan.start, Some(ResolvedRange::new(0, 4)));
    }

    proptest! {
        #[test]
        fn fuzz_validity_matches_resolved_bounds(offset in -5000i64..5000, length in 0u64..5000, size in 0u64..5000) {
            let range = ByteRange::new(offset, length);
            let absolute_start = if offset >= 0 { offset as i128 } else { size as i128 + offset as i128 };
            let expected = absolute_start >= 0 && absolute_start + length as i128 <= size as i128;
            prop_assert_eq!(range.is_valid(size), expected);
            if let Some(resolved) = range.resolve(size) {
                prop_assert!(resolved.end() <= size);
            }
        }

        #[test]
        fn fuzz_plan_covers_every_valid_candidate(
            windows in proptest::collection::vec((-3000i64..3000, 0u64..200), 0..8),
            size in 1u64..4000,
        ) {
            let candidates: Vec<ByteRange> = windows.iter().map(|&(o, l)| ByteRange::new(o, l)).collect();
            let plan = plan(&candidates, size);
            for candidate in &candidates {
                if let Some(resolved) = candidate.resolve(size) {
                    let covering = plan.get(candidate.side(size)).unwrap();
                    prop_assert!(covering.contains(&resolved));
                }
            }
        }
    }
}
