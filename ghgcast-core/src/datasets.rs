//! External statistical tables and the process-lifetime cache in front of
//! them.
//!
//! Datasets are immutable inputs supplied by an external catalog. The core
//! only consumes the read contract ([`DatasetStore`]): a table is fetched by
//! key once, cached for the process lifetime, and never mutated in place;
//! consuming functions filter into fresh tables before transforming.

use crate::errors::{ScenarioError, ScenarioResult};
use crate::series::Year;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A typed dataset column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Str(Vec<String>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Str(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_rows(&self, rows: &[usize]) -> Column {
        match self {
            Column::Str(v) => Column::Str(rows.iter().map(|&i| v[i].clone()).collect()),
            Column::Int(v) => Column::Int(rows.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(rows.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// An immutable tabular dataset: named typed columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    columns: IndexMap<String, Column>,
    n_rows: usize,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, consuming and returning the table for chaining.
    ///
    /// Panics if the column length does not match earlier columns.
    pub fn with_column(mut self, name: &str, column: Column) -> Self {
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else {
            assert_eq!(
                column.len(),
                self.n_rows,
                "column '{}' has {} rows, table has {}",
                name,
                column.len(),
                self.n_rows
            );
        }
        let previous = self.columns.insert(name.to_string(), column);
        assert!(previous.is_none(), "column '{}' already exists", name);
        self
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn column(&self, name: &str) -> &Column {
        self.columns
            .get(name)
            .unwrap_or_else(|| panic!("dataset has no column '{}'", name))
    }

    /// String column accessor. Panics when the column is missing or not a
    /// string column, which is a violated data precondition, not a recoverable state.
    pub fn strs(&self, name: &str) -> &[String] {
        match self.column(name) {
            Column::Str(v) => v,
            other => panic!("column '{}' is not a string column: {:?}", name, other),
        }
    }

    pub fn ints(&self, name: &str) -> &[i64] {
        match self.column(name) {
            Column::Int(v) => v,
            other => panic!("column '{}' is not an integer column: {:?}", name, other),
        }
    }

    pub fn floats(&self, name: &str) -> &[f64] {
        match self.column(name) {
            Column::Float(v) => v,
            other => panic!("column '{}' is not a float column: {:?}", name, other),
        }
    }

    pub fn bools(&self, name: &str) -> &[bool] {
        match self.column(name) {
            Column::Bool(v) => v,
            other => panic!("column '{}' is not a bool column: {:?}", name, other),
        }
    }

    /// Copy the rows for which `keep` returns true into a fresh table.
    pub fn filter(&self, keep: impl Fn(usize) -> bool) -> DataTable {
        let rows: Vec<usize> = (0..self.n_rows).filter(|&i| keep(i)).collect();
        let mut out = DataTable {
            columns: IndexMap::new(),
            n_rows: rows.len(),
        };
        for (name, column) in &self.columns {
            out.columns.insert(name.clone(), column.take_rows(&rows));
        }
        out
    }

    pub fn filter_str_eq(&self, name: &str, value: &str) -> DataTable {
        let column = self.strs(name);
        self.filter(|i| column[i] == value)
    }

    pub fn filter_int_eq(&self, name: &str, value: i64) -> DataTable {
        let column = self.ints(name);
        self.filter(|i| column[i] == value)
    }

    /// Distinct values of a string column, in first-seen order.
    pub fn unique_strs(&self, name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for value in self.strs(name) {
            if !seen.contains(value) {
                seen.push(value.clone());
            }
        }
        seen
    }

    /// Sum `value_col` per year.
    pub fn year_value_map(&self, year_col: &str, value_col: &str) -> BTreeMap<Year, f64> {
        let years = self.ints(year_col);
        let values = self.floats(value_col);
        let mut out: BTreeMap<Year, f64> = BTreeMap::new();
        for i in 0..self.n_rows {
            *out.entry(years[i] as Year).or_insert(0.0) += values[i];
        }
        out
    }

    /// Sum `value_col` per (category, year) cell.
    pub fn pivot_sum(
        &self,
        year_col: &str,
        cat_col: &str,
        value_col: &str,
    ) -> IndexMap<String, BTreeMap<Year, f64>> {
        let years = self.ints(year_col);
        let cats = self.strs(cat_col);
        let values = self.floats(value_col);
        let mut out: IndexMap<String, BTreeMap<Year, f64>> = IndexMap::new();
        for i in 0..self.n_rows {
            *out.entry(cats[i].clone())
                .or_default()
                .entry(years[i] as Year)
                .or_insert(0.0) += values[i];
        }
        out
    }
}

/// Read contract of the external dataset catalog.
///
/// Datasets are slow to fetch, externally versioned and safe to cache for
/// the process lifetime. A key the store cannot resolve is fatal: datasets
/// are a precondition for running, not a transient resource.
pub trait DatasetStore {
    fn load(&self, key: &str) -> ScenarioResult<Arc<DataTable>>;
}

/// In-memory dataset store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    tables: HashMap<String, Arc<DataTable>>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, table: DataTable) {
        self.tables.insert(key.to_string(), Arc::new(table));
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn load(&self, key: &str) -> ScenarioResult<Arc<DataTable>> {
        self.tables
            .get(key)
            .cloned()
            .ok_or_else(|| ScenarioError::DatasetMissing(key.to_string()))
    }
}

/// Caches loaded datasets by key.
///
/// The only blocking I/O in a forecast pass is the first, cold fetch of each
/// dataset; afterwards every consumer shares the same immutable table.
pub struct DatasetCache {
    store: Arc<dyn DatasetStore>,
    cache: RefCell<HashMap<String, Arc<DataTable>>>,
}

impl DatasetCache {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self {
            store,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn load(&self, key: &str) -> ScenarioResult<Arc<DataTable>> {
        if let Some(table) = self.cache.borrow().get(key) {
            return Ok(table.clone());
        }
        debug!("cold dataset fetch: {}", key);
        let table = self.store.load(key)?;
        self.cache
            .borrow_mut()
            .insert(key.to_string(), table.clone());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> DataTable {
        DataTable::new()
            .with_column(
                "municipality",
                Column::Str(vec![
                    "Helsinki".into(),
                    "Helsinki".into(),
                    "Espoo".into(),
                ]),
            )
            .with_column("year", Column::Int(vec![2017, 2018, 2018]))
            .with_column("value", Column::Float(vec![1.0, 2.0, 4.0]))
    }

    #[test]
    fn filtering_copies_rows() {
        let table = sample_table();
        let filtered = table.filter_str_eq("municipality", "Helsinki");
        assert_eq!(filtered.n_rows(), 2);
        assert_eq!(filtered.floats("value"), &[1.0, 2.0]);
        // The source table is untouched
        assert_eq!(table.n_rows(), 3);
    }

    #[test]
    fn year_value_map_sums_duplicates() {
        let table = sample_table();
        let map = table.year_value_map("year", "value");
        assert_eq!(map[&2017], 1.0);
        assert_eq!(map[&2018], 6.0);
    }

    #[test]
    #[should_panic(expected = "has no column")]
    fn missing_column_panics() {
        sample_table().floats("nope");
    }

    #[test]
    fn memory_store_and_cache() {
        let mut store = MemoryDatasetStore::new();
        store.insert("sample", sample_table());
        let cache = DatasetCache::new(Arc::new(store));

        let a = cache.load("sample").unwrap();
        let b = cache.load("sample").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let err = cache.load("missing").unwrap_err();
        assert!(matches!(err, ScenarioError::DatasetMissing(_)));
    }
}
