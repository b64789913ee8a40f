use serde::{Deserialize, Serialize};

/// Per-call filters for catalog queries.
///
/// Every unset field means "no constraint". `types` is read by
/// [`tables`](crate::MetadataFacade::tables) only; an empty list allows every
/// table type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub types: Vec<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn catalog_ref(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub(crate) fn schema_ref(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub(crate) fn table_ref(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub(crate) fn column_ref(&self) -> Option<&str> {
        self.column.as_deref()
    }
}
