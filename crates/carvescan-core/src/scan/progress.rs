/// Progress normalization across nested scan phases.
///
/// Lightweight, stateless math shared by the coordinators: N files, each
/// with M data blocks, each with K codec streams, collapse to one 0–100
/// value for whatever renders a progress bar.

/// Map nested progress (position in an outer phase plus an inner 0–100
/// percentage) to one 0–100 value.
///
/// Precondition (debug-asserted, not a runtime error contract): the
/// outer phase is non-empty and `outer_index < outer_count`. Callers
/// must not report progress for an empty collection.
#[inline]
pub fn normalize_nested(outer_index: usize, outer_count: usize, inner_percent: u8) -> u8 {
    debug_assert!(outer_count > 0, "progress over an empty outer phase");
    debug_assert!(outer_index < outer_count, "outer index out of range");
    debug_assert!(inner_percent <= 100, "inner percentage above 100");
    let percent = (outer_index * 100 + inner_percent.min(100) as usize) / outer_count;
    percent.min(100) as u8
}

/// Maps byte positions within one file onto the whole batch.
///
/// A batch of N files is one byte range `[0, total)`; each file owns the
/// window `[start, start + length)` of it, so per-file byte progress from
/// a detector lands directly on the batch-wide percentage.
#[derive(Clone, Copy, Debug)]
pub struct ByteWindow {
    start: u64,
    length: u64,
    total: u64,
}

impl ByteWindow {
    /// Precondition (debug-asserted): `total > 0`.
    ///
    /// The window itself is clamped into the batch range rather than
    /// asserted: an input file can grow between the batch-total snapshot
    /// and its own scan, and such a file reports into a truncated
    /// window instead of derailing the batch.
    pub fn new(start: u64, length: u64, total: u64) -> Self {
        debug_assert!(total > 0, "byte window over an empty batch");
        let total = total.max(1);
        let start = start.min(total);
        let length = length.min(total - start);
        Self {
            start,
            length,
            total,
        }
    }

    /// Batch-wide percentage once `bytes_into_window` bytes of this
    /// file have been swept. Out-of-range reports clamp to the window.
    pub fn percent(&self, bytes_into_window: u64) -> u8 {
        let done = self.start + bytes_into_window.min(self.length);
        let percent = (u128::from(done) * 100) / u128::from(self.total);
        percent.min(100) as u8
    }
}

/// Clamps an emitted progress sequence to be non-decreasing.
///
/// Unit scans restart at 0 for every stream within a block; observers
/// rely on monotonic overall progress, so coordinators pass every tick
/// through one of these before emitting it.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicPercent {
    last: u8,
}

impl MonotonicPercent {
    pub fn clamp(&mut self, percent: u8) -> u8 {
        if percent > self.last {
            self.last = percent.min(100);
        }
        self.last
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoints() {
        assert_eq!(normalize_nested(0, 7, 0), 0);
        assert_eq!(normalize_nested(6, 7, 100), 100);
        assert_eq!(normalize_nested(0, 1, 42), 42);
    }

    #[test]
    fn normalize_stays_within_bounds_over_the_whole_grid() {
        for count in 1..=9usize {
            for index in 0..count {
                for percent in (0..=100u8).step_by(10) {
                    let value = normalize_nested(index, count, percent);
                    assert!(value <= 100, "({index}, {count}, {percent}) -> {value}");
                }
            }
        }
    }

    #[test]
    fn normalize_is_monotonic_in_scan_order() {
        let mut last = 0;
        for index in 0..5usize {
            for percent in [0u8, 25, 50, 75, 100] {
                let value = normalize_nested(index, 5, percent);
                assert!(value >= last, "regressed at ({index}, {percent})");
                last = value;
            }
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn byte_window_maps_per_file_bytes_onto_the_batch() {
        // Three files: 100, 200, 300 bytes.
        let second = ByteWindow::new(100, 200, 600);
        assert_eq!(second.percent(0), 16);
        assert_eq!(second.percent(200), 50);
        // Over-reporting clamps to the window end, not the batch end.
        assert_eq!(second.percent(10_000), 50);

        let last = ByteWindow::new(300, 300, 600);
        assert_eq!(last.percent(300), 100);
    }

    #[test]
    fn byte_window_clamps_a_file_grown_past_the_batch_total() {
        // The batch snapshot said 600 bytes, but the file at offset 500
        // grew to 400 by the time it was scanned.
        let grown = ByteWindow::new(500, 400, 600);
        assert_eq!(grown.percent(0), 83);
        assert_eq!(grown.percent(400), 100);

        // A window starting past the batch end collapses to zero width.
        let beyond = ByteWindow::new(700, 100, 600);
        assert_eq!(beyond.percent(0), 100);
        assert_eq!(beyond.percent(100), 100);
    }

    #[test]
    fn monotonic_percent_never_regresses() {
        let mut monotonic = MonotonicPercent::default();
        assert_eq!(monotonic.clamp(10), 10);
        assert_eq!(monotonic.clamp(5), 10);
        assert_eq!(monotonic.clamp(60), 60);
        assert_eq!(monotonic.clamp(59), 60);
        assert_eq!(monotonic.last(), 60);
    }
}
