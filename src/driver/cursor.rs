use super::{Cursor, DriverError, DriverResult};

/// A [`Cursor`] over rows already fetched into memory.
///
/// Both shipped drivers materialize catalog results before handing them out,
/// so they share this type.
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Option<String>>>,
    current: Option<Vec<Option<String>>>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            current: None,
            closed: false,
        }
    }

    /// Build from string column names.
    pub fn with_columns(columns: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::Other("cursor is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize) -> DriverResult<usize> {
        if index == 0 || index > self.columns.len() {
            return Err(DriverError::ColumnOutOfRange {
                index,
                count: self.columns.len(),
            });
        }
        Ok(index - 1)
    }
}

impl Cursor for BufferedCursor {
    fn column_count(&self) -> DriverResult<usize> {
        self.check_open()?;
        Ok(self.columns.len())
    }

    fn column_name(&self, index: usize) -> DriverResult<String> {
        self.check_open()?;
        let idx = self.check_index(index)?;
        Ok(self.columns[idx].clone())
    }

    fn next(&mut self) -> DriverResult<bool> {
        self.check_open()?;
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get_string(&self, index: usize) -> DriverResult<Option<String>> {
        self.check_open()?;
        let idx = self.check_index(index)?;
        let row = self.current.as_ref().ok_or(DriverError::NoCurrentRow)?;
        // Short rows read as NULL.
        Ok(row.get(idx).cloned().flatten())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}
