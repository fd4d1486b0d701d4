use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::model::{Snapshot, Timestamp};

/// Which snapshot to pick when none falls inside the tolerance window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMatch {
    #[default]
    Nearest,
    /// Last snapshot captured strictly before the target
    Before,
    /// First snapshot captured strictly after the target
    After,
}

/// Capture-ordered snapshots of one logical stream.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSeries {
    name: String,
    snapshots: Vec<Snapshot>,
}

impl SnapshotSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snapshots: Vec::new(),
        }
    }

    pub fn from_snapshots(name: impl Into<String>, mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by_key(|s| s.captured_at);
        Self {
            name: name.into(),
            snapshots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert keeping capture order; equal timestamps keep arrival order.
    pub fn push(&mut self, snapshot: Snapshot) {
        let idx = self
            .snapshots
            .partition_point(|s| s.captured_at <= snapshot.captured_at);
        self.snapshots.insert(idx, snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Locate a snapshot by capture time.
    ///
    /// Snapshots within `target ± tolerance` win, closest first. Otherwise
    /// `position` decides; a `Nearest` tie goes to the later snapshot.
    pub fn find_by_time(
        &self,
        target: Timestamp,
        position: TimeMatch,
        tolerance: TimeDelta,
    ) -> Option<usize> {
        if self.snapshots.is_empty() {
            return None;
        }

        if tolerance > TimeDelta::zero() {
            let lo = match target.checked_sub_signed(tolerance) {
                Some(earliest) => self.snapshots.partition_point(|s| s.captured_at < earliest),
                None => 0,
            };
            let hi = match target.checked_add_signed(tolerance) {
                Some(latest) => self.snapshots.partition_point(|s| s.captured_at <= latest),
                None => self.snapshots.len(),
            };
            if lo < hi {
                return (lo..hi).min_by_key(|&i| (self.snapshots[i].captured_at - target).abs());
            }
        }

        match position {
            TimeMatch::Nearest => {
                let idx = self.snapshots.partition_point(|s| s.captured_at < target);
                if idx == 0 {
                    return Some(0);
                }
                if idx == self.snapshots.len() {
                    return Some(idx - 1);
                }
                let before = target - self.snapshots[idx - 1].captured_at;
                let after = self.snapshots[idx].captured_at - target;
                Some(if before < after { idx - 1 } else { idx })
            }
            TimeMatch::After => {
                let idx = self.snapshots.partition_point(|s| s.captured_at <= target);
                (idx < self.snapshots.len()).then_some(idx)
            }
            TimeMatch::Before => {
                let idx = self.snapshots.partition_point(|s| s.captured_at < target);
                idx.checked_sub(1)
            }
        }
    }

    /// Snapshots captured from `from` through `until`, both inclusive.
    /// A missing bound leaves that side of the series open.
    pub fn window(&self, from: Option<Timestamp>, until: Option<Timestamp>) -> &[Snapshot] {
        let start = from
            .and_then(|from| self.find_by_time(from, TimeMatch::Before, TimeDelta::zero()))
            .map_or(0, |last_before| last_before + 1);
        let end = until
            .and_then(|until| self.find_by_time(until, TimeMatch::After, TimeDelta::zero()))
            .unwrap_or(self.snapshots.len());
        &self.snapshots[start..end.max(start)]
    }
}

impl<'a> IntoIterator for &'a SnapshotSeries {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

impl IntoIterator for SnapshotSeries {
    type Item = Snapshot;
    type IntoIter = std::vec::IntoIter<Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[fixture]
    fn series() -> SnapshotSeries {
        // captured at 0, 10, 20, 30 (pushed out of order)
        let mut series = SnapshotSeries::new("source");
        for secs in [20, 0, 30, 10] {
            series.push(Snapshot::new(t(secs), Vec::new()));
        }
        series
    }

    #[rstest]
    fn push_keeps_capture_order(series: SnapshotSeries) {
        let order: Vec<_> = series.iter().map(|s| s.captured_at).collect();
        assert_eq!(order, vec![t(0), t(10), t(20), t(30)]);
    }

    #[rstest]
    #[case::exact_in_window(t(10), TimeMatch::After, 1, Some(1))]
    #[case::closest_in_window(t(12), TimeMatch::Before, 5, Some(1))]
    #[case::window_miss_falls_back(t(15), TimeMatch::Before, 1, Some(1))]
    #[case::nearest_tie_goes_later(t(15), TimeMatch::Nearest, 0, Some(2))]
    #[case::nearest_before_all(t(-5), TimeMatch::Nearest, 0, Some(0))]
    #[case::nearest_after_all(t(99), TimeMatch::Nearest, 0, Some(3))]
    #[case::after_on_exact_is_next(t(20), TimeMatch::After, 0, Some(3))]
    #[case::after_last_is_none(t(30), TimeMatch::After, 0, None)]
    #[case::before_on_exact_is_previous(t(20), TimeMatch::Before, 0, Some(1))]
    #[case::before_first_is_none(t(0), TimeMatch::Before, 0, None)]
    fn find_by_time_cases(
        series: SnapshotSeries,
        #[case] target: Timestamp,
        #[case] position: TimeMatch,
        #[case] tolerance_secs: i64,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(
            series.find_by_time(target, position, TimeDelta::seconds(tolerance_secs)),
            expected
        );
    }

    #[rstest]
    #[case::open(None, None, vec![0, 10, 20, 30])]
    #[case::bounds_on_captures(Some(10), Some(20), vec![10, 20])]
    #[case::bounds_between_captures(Some(5), Some(25), vec![10, 20])]
    #[case::from_only(Some(21), None, vec![30])]
    #[case::until_before_everything(None, Some(-1), vec![])]
    #[case::inverted(Some(25), Some(5), vec![])]
    fn window_bounds_are_inclusive(
        series: SnapshotSeries,
        #[case] from: Option<i64>,
        #[case] until: Option<i64>,
        #[case] expected: Vec<i64>,
    ) {
        let captured: Vec<_> = series
            .window(from.map(t), until.map(t))
            .iter()
            .map(|s| s.captured_at)
            .collect();
        assert_eq!(captured, expected.into_iter().map(t).collect::<Vec<_>>());
    }

    #[rstest]
    fn huge_tolerance_does_not_overflow(series: SnapshotSeries) {
        assert_eq!(
            series.find_by_time(t(12), TimeMatch::Nearest, TimeDelta::MAX),
            Some(1)
        );
    }

    #[test]
    fn empty_series_finds_nothing() {
        let series = SnapshotSeries::new("empty");
        assert_eq!(
            series.find_by_time(t(0), TimeMatch::Nearest, TimeDelta::zero()),
            None
        );
    }
}
