use std::sync::Arc;

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::types::{
    anomaly::Anomaly,
    error::{DatabaseError, Result},
    value::Value,
};

/// One decoded record: an ordered mapping from column name to value.
///
/// Column names are shared between all rows of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Pairs `values` with `columns`; both must be in declared column order.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(DatabaseError::decode(format!(
                "row has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|index| &self.values[index])
    }

    pub fn get_value(&self, column_index: usize) -> Option<&Value> {
        self.values.get(column_index)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Column-major view of a table: every column name with its values in row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl ColumnView {
    pub fn get(&self, column: &str) -> Option<&[Value]> {
        self.names
            .iter()
            .position(|name| name == column)
            .map(|index| self.columns[index].as_slice())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// A fully decoded table.
///
/// `rows()` and `columns_view()` expose the same data; `Table::from_columns`
/// rebuilds the row view from a column view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    name: String,
    columns: Arc<[String]>,
    rows: Vec<Row>,
    anomalies: Vec<Anomaly>,
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        columns: Arc<[String]>,
        rows: Vec<Row>,
        anomalies: Vec<Anomaly>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
            anomalies,
        }
    }

    pub fn from_columns(name: impl Into<String>, view: ColumnView) -> Result<Self> {
        let row_count = view.row_count();
        if let Some((name, _)) = view.iter().find(|(_, values)| values.len() != row_count) {
            return Err(DatabaseError::decode(format!(
                "column '{}' does not have {} values",
                name, row_count
            )));
        }
        let columns: Arc<[String]> = view.names.into();
        let mut value_iters: Vec<_> = view.columns.into_iter().map(Vec::into_iter).collect();
        let mut rows = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let values = value_iters
                .iter_mut()
                .map(|iter| iter.next().unwrap_or(Value::Null))
                .collect();
            rows.push(Row::new(Arc::clone(&columns), values)?);
        }
        Ok(Self::new(name, columns, rows, Vec::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn columns_view(&self) -> ColumnView {
        let mut columns: Vec<Vec<Value>> = (0..self.columns.len())
            .map(|_| Vec::with_capacity(self.rows.len()))
            .collect();
        for row in &self.rows {
            for (column, value) in columns.iter_mut().zip(row.values()) {
                column.push(value.clone());
            }
        }
        ColumnView {
            names: self.columns.to_vec(),
            columns,
        }
    }
}
