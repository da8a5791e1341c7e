//! Rewindable cursor over a source select.
//!
//! Rows are fetched in pages of `LIMIT page_size OFFSET n`. Rewinding drops the
//! buffered page and re-queries from the earlier offset, so the select must be
//! deterministically ordered.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::{RawRow, SourceReader};
use crate::error::Result;

pub struct SourceCursor<'a> {
    reader: &'a mut Box<dyn SourceReader>,
    query: String,
    page_size: u64,
    /// Offset the cursor was opened at. Rewinds never go before it.
    start: u64,
    /// Absolute offset of the next row returned.
    offset: u64,
    buffer: VecDeque<RawRow>,
    exhausted: bool,
}

impl<'a> SourceCursor<'a> {
    pub fn new(
        reader: &'a mut Box<dyn SourceReader>,
        query: impl Into<String>,
        page_size: u64,
        start: u64,
    ) -> Self {
        Self {
            reader,
            query: query.into(),
            page_size: page_size.max(1),
            start,
            offset: start,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next row in select order, `None` once the select is exhausted.
    pub async fn next(&mut self) -> Result<Option<RawRow>> {
        if self.buffer.is_empty() && !self.exhausted {
            let rows = self
                .reader
                .fetch_rows(&self.query, self.offset, self.page_size)
                .await?;
            if (rows.len() as u64) < self.page_size {
                self.exhausted = true;
            }
            self.buffer.extend(rows);
        }

        let row = self.buffer.pop_front();
        if row.is_some() {
            self.offset += 1;
        }
        Ok(row)
    }

    /// Step back `rows` rows. The next call to [`SourceCursor::next`] re-queries.
    pub fn rewind(&mut self, rows: u64) {
        let target = self.offset.saturating_sub(rows).max(self.start);
        debug!(
            "Rewinding cursor from offset {} to {}",
            self.offset, target
        );
        self.offset = target;
        self.buffer.clear();
        self.exhausted = false;
    }

    /// Absolute offset of the next row.
    pub fn position(&self) -> u64 {
        self.offset
    }
}
