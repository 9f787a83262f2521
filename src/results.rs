use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

mod row;

pub use row::CustomDbRow;

/// Rows returned by a read statement.
///
/// Column names are stored once and shared by every row.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create an empty result set with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            column_names: None,
            column_index: Arc::default(),
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Arc::new(row::index_columns(&column_names));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row. Rows added before column names are set get an empty header.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        let column_names = self
            .column_names
            .get_or_insert_with(|| Arc::new(Vec::new()))
            .clone();
        self.results.push(CustomDbRow::with_index(
            column_names,
            self.column_index.clone(),
            row_values,
        ));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CustomDbRow> {
        self.results.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a CustomDbRow;
    type IntoIter = std::slice::Iter<'a, CustomDbRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_lookup() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["id".to_string(), "name".to_string()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);

        assert_eq!(rs.len(), 2);
        assert_eq!(
            rs.results[1].get("name").and_then(RowValues::as_text),
            Some("b")
        );
        assert_eq!(rs.results[0].get_by_index(0), Some(&RowValues::Int(1)));
        assert!(rs.results[0].get("missing").is_none());
    }

    #[test]
    fn duplicate_column_names_resolve_to_first() {
        let row = CustomDbRow::new(
            Arc::new(vec!["id".to_string(), "id".to_string()]),
            vec![RowValues::Int(1), RowValues::Int(2)],
        );
        assert_eq!(row.get("id"), Some(&RowValues::Int(1)));
    }
}
