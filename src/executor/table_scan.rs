use std::{collections::VecDeque, sync::Arc};

use crate::{
    config::ReaderOptions,
    executor::{row_decoder::RowDecoder, scan::Scanner},
    storage::{page_store::PageStore, schema::TableDefinition},
    types::{
        anomaly::{Anomaly, AnomalyKind},
        error::DatabaseError,
        row::Row,
    },
};

/// Streams the rows of one table, decoding a data page at a time.
///
/// A data page that cannot be read is skipped and reported as an anomaly;
/// the scan carries on with the next page.
pub struct TableScanner {
    store: PageStore,
    table: Arc<TableDefinition>,
    options: ReaderOptions,
    next_page_index: usize,
    buffered_rows: VecDeque<Row>,
    anomalies: Vec<Anomaly>,
    is_exhausted: bool,
}

impl TableScanner {
    pub fn new(store: PageStore, table: Arc<TableDefinition>, options: ReaderOptions) -> Self {
        Self {
            store,
            table,
            options,
            next_page_index: 0,
            buffered_rows: VecDeque::new(),
            anomalies: Vec::new(),
            is_exhausted: false,
        }
    }

    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    /// Anomalies met so far.
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn take_anomalies(&mut self) -> Vec<Anomaly> {
        std::mem::take(&mut self.anomalies)
    }

    /// Decode data pages until some rows are buffered or the pages run out.
    fn fill_buffer(&mut self) {
        let decoder = RowDecoder::new(&self.store, &self.options);
        while self.buffered_rows.is_empty() {
            let Some(&page_id) = self.table.data_pages.get(self.next_page_index) else {
                self.is_exhausted = true;
                return;
            };
            self.next_page_index += 1;

            match decoder.decode_page_at(page_id, &self.table) {
                Ok(page_rows) => {
                    self.buffered_rows.extend(page_rows.rows);
                    self.anomalies.extend(page_rows.anomalies);
                }
                Err(err) => {
                    self.anomalies.push(
                        Anomaly::new(AnomalyKind::PageUnreadable, page_id, err.to_string()).logged(),
                    );
                }
            }
        }
    }
}

impl Scanner for TableScanner {
    fn scan(&mut self) -> Result<Option<Row>, DatabaseError> {
        if self.buffered_rows.is_empty() && !self.is_exhausted {
            self.fill_buffer();
        }
        Ok(self.buffered_rows.pop_front())
    }

    fn scan_batch(&mut self, batch_size: usize) -> Result<Vec<Row>, DatabaseError> {
        let mut rows = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            match self.scan()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn reset(&mut self) -> Result<(), DatabaseError> {
        self.next_page_index = 0;
        self.buffered_rows.clear();
        self.anomalies.clear();
        self.is_exhausted = false;
        Ok(())
    }
}
