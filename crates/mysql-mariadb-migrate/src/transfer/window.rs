//! Accumulation window for one batch, including single-row replay state.

use crate::core::BoundRow;

/// Replay of a failed batch one row at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryState {
    /// Batch size to restore once the replay completes.
    saved_size: u64,
    /// Rows of the failed batch.
    replay_rows: u64,
    /// Rows of the failed batch concluded so far.
    replayed: u64,
}

/// Rows accumulated since the last commit.
///
/// The size is always at least 1; while a replay is active it is exactly 1.
#[derive(Debug, Clone)]
pub struct BatchWindow {
    size: u64,
    rows: Vec<BoundRow>,
    retry: Option<RetryState>,
}

impl BatchWindow {
    pub fn new(size: u64) -> Self {
        let size = size.max(1);
        Self {
            size,
            rows: Vec::with_capacity(size.min(65_536) as usize),
            retry: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Change the target size outside of a replay.
    pub fn set_size(&mut self, size: u64) {
        match &mut self.retry {
            Some(retry) => retry.saved_size = size.max(1),
            None => self.size = size.max(1),
        }
    }

    pub fn push(&mut self, row: BoundRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.size
    }

    /// Hand the accumulated rows to the writer.
    pub fn take(&mut self) -> Vec<BoundRow> {
        std::mem::take(&mut self.rows)
    }

    pub fn in_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// Switch to single-row mode to replay `failed_rows` rows.
    pub fn begin_retry(&mut self, failed_rows: u64) {
        self.retry = Some(RetryState {
            saved_size: self.size,
            replay_rows: failed_rows.max(1),
            replayed: 0,
        });
        self.size = 1;
    }

    /// Count `rows` replayed rows as concluded.
    ///
    /// Returns `true` when this completed the replay; the saved size is then restored.
    pub fn record_replayed(&mut self, rows: u64) -> bool {
        let Some(retry) = &mut self.retry else {
            return false;
        };
        retry.replayed += rows;
        if retry.replayed < retry.replay_rows {
            return false;
        }
        self.size = retry.saved_size;
        self.retry = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    #[test]
    fn test_size_floor() {
        assert_eq!(BatchWindow::new(0).size(), 1);
        let mut w = BatchWindow::new(5);
        w.set_size(0);
        assert_eq!(w.size(), 1);
    }

    #[test]
    fn test_fill_and_take() {
        let mut w = BatchWindow::new(2);
        w.push(vec![SqlValue::I64(1)]);
        assert!(!w.is_full());
        w.push(vec![SqlValue::I64(2)]);
        assert!(w.is_full());
        assert_eq!(w.take().len(), 2);
        assert!(w.is_empty());
    }

    #[test]
    fn test_replay_restores_size() {
        let mut w = BatchWindow::new(10);
        w.begin_retry(10);
        assert_eq!(w.size(), 1);
        assert!(w.in_retry());

        for _ in 0..9 {
            assert!(!w.record_replayed(1));
            assert_eq!(w.size(), 1);
        }
        assert!(w.record_replayed(1));
        assert_eq!(w.size(), 10);
        assert!(!w.in_retry());
    }

    #[test]
    fn test_resize_during_replay_applies_after() {
        let mut w = BatchWindow::new(10);
        w.begin_retry(3);
        w.set_size(4);
        assert_eq!(w.size(), 1);
        w.record_replayed(3);
        assert_eq!(w.size(), 4);
    }

    #[test]
    fn test_record_outside_retry_is_noop() {
        let mut w = BatchWindow::new(3);
        assert!(!w.record_replayed(1));
        assert_eq!(w.size(), 3);
    }
}
