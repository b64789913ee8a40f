//! Cursor to record normalization.
//!
//! Every catalog call returns a driver cursor with its own column names.
//! [`normalize`] turns any of them into [`Record`]s keyed by the camelCase
//! form of each column name, so `TABLE_CAT` becomes `tableCat` whatever the
//! driver.

use inflector::Inflector;

use super::Record;
use crate::driver::{Cursor, DriverResult};

/// Canonical record field name for a source column name.
///
/// Underscores, other separators and case boundaries split words; the words
/// are joined in camelCase. Applying it to its own output is a no-op.
pub fn field_name(column: &str) -> String {
    column.to_camel_case()
}

/// Read every row of `cursor` into records, then release it.
///
/// The cursor is closed exactly once, whether or not reading succeeds. A read
/// error wins over a close error, and no partial result is ever returned.
pub fn normalize(mut cursor: Box<dyn Cursor>) -> DriverResult<Vec<Record>> {
    let read = read_records(cursor.as_mut());
    let closed = cursor.close();

    let records = read?;
    closed?;
    Ok(records)
}

fn read_records(cursor: &mut dyn Cursor) -> DriverResult<Vec<Record>> {
    let count = cursor.column_count()?;
    let fields = (1..=count)
        .map(|i| cursor.column_name(i).map(|name| field_name(&name)))
        .collect::<DriverResult<Vec<_>>>()?;

    let mut records = Vec::new();
    while cursor.next()? {
        let mut record = Record::new();
        for (i, field) in fields.iter().enumerate() {
            record.insert(field.clone(), cursor.get_string(i + 1)?);
        }
        records.push(record);
    }

    Ok(records)
}
