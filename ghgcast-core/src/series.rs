//! Year-indexed forecast tables.
//!
//! Every forecast in the engine is a [`YearSeries`]: a table indexed by a
//! contiguous run of integer years, holding one or more named numeric
//! columns plus a per-row forecast flag. Historical rows carry
//! `forecast = false`; the last historical year is the seam where
//! extrapolation begins.

use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calendar year. All series indices are integer years.
pub type Year = i32;

/// A table of named f64 columns over a contiguous year index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSeries {
    start_year: Year,
    forecast: Vec<bool>,
    columns: IndexMap<String, Array1<f64>>,
}

impl YearSeries {
    /// Create an empty series covering `n_years` starting at `start_year`.
    ///
    /// All rows start as historical (`forecast = false`).
    pub fn new(start_year: Year, n_years: usize) -> Self {
        assert!(n_years > 0, "a series must cover at least one year");
        Self {
            start_year,
            forecast: vec![false; n_years],
            columns: IndexMap::new(),
        }
    }

    /// Create a single-column series from a year-keyed map.
    ///
    /// The index covers the full range between the smallest and largest key;
    /// years missing from the map become NaN.
    pub fn from_year_map(name: &str, values: &BTreeMap<Year, f64>) -> Self {
        assert!(!values.is_empty(), "cannot build a series from no values");
        let start = *values.keys().next().unwrap();
        let end = *values.keys().last().unwrap();
        let n = (end - start + 1) as usize;
        let mut series = Self::new(start, n);
        let mut column = vec![f64::NAN; n];
        for (&year, &value) in values {
            column[(year - start) as usize] = value;
        }
        series.add_column(name, column);
        series
    }

    pub fn start_year(&self) -> Year {
        self.start_year
    }

    pub fn end_year(&self) -> Year {
        self.start_year + self.forecast.len() as Year - 1
    }

    pub fn n_years(&self) -> usize {
        self.forecast.len()
    }

    /// Iterate over the year index in order.
    pub fn years(&self) -> impl Iterator<Item = Year> {
        self.start_year..=self.end_year()
    }

    pub fn contains_year(&self, year: Year) -> bool {
        year >= self.start_year && year <= self.end_year()
    }

    fn index_of(&self, year: Year) -> usize {
        assert!(
            self.contains_year(year),
            "year {} outside series range {}..={}",
            year,
            self.start_year,
            self.end_year()
        );
        (year - self.start_year) as usize
    }

    /// Add a new column.
    ///
    /// Panics if a column with the same name already exists or the length
    /// does not match the year index.
    pub fn add_column(&mut self, name: &str, values: Vec<f64>) {
        assert_eq!(
            values.len(),
            self.n_years(),
            "column '{}' has {} values for {} years",
            name,
            values.len(),
            self.n_years()
        );
        let previous = self.columns.insert(name.to_string(), Array1::from(values));
        assert!(previous.is_none(), "column '{}' already exists", name);
    }

    /// Add a column filled with NaN.
    pub fn add_nan_column(&mut self, name: &str) {
        self.add_column(name, vec![f64::NAN; self.n_years()]);
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn try_column(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns.get(name)
    }

    /// Get a column, panicking if it does not exist.
    pub fn column(&self, name: &str) -> &Array1<f64> {
        self.columns
            .get(name)
            .unwrap_or_else(|| panic!("series has no column '{}'", name))
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Array1<f64>> {
        self.columns.shift_remove(name)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        let values = self
            .columns
            .shift_remove(from)
            .unwrap_or_else(|| panic!("series has no column '{}'", from));
        let previous = self.columns.insert(to.to_string(), values);
        assert!(previous.is_none(), "column '{}' already exists", to);
    }

    /// Value of `name` at `year`. Panics if the column or year is missing;
    /// the stored value may still be NaN.
    pub fn value(&self, name: &str, year: Year) -> f64 {
        let idx = self.index_of(year);
        self.column(name)[idx]
    }

    /// Value of `name` at `year`, or `None` when the year is outside the
    /// series range.
    pub fn get(&self, name: &str, year: Year) -> Option<f64> {
        if self.contains_year(year) {
            Some(self.column(name)[(year - self.start_year) as usize])
        } else {
            None
        }
    }

    pub fn set(&mut self, name: &str, year: Year, value: f64) {
        let idx = self.index_of(year);
        let column = self
            .columns
            .get_mut(name)
            .unwrap_or_else(|| panic!("series has no column '{}'", name));
        column[idx] = value;
    }

    pub fn is_forecast(&self, year: Year) -> bool {
        self.forecast[self.index_of(year)]
    }

    pub fn set_forecast(&mut self, year: Year, flag: bool) {
        let idx = self.index_of(year);
        self.forecast[idx] = flag;
    }

    /// Mark every row from `first_forecast_year` onwards as forecast and all
    /// earlier rows as historical.
    pub fn set_forecast_from(&mut self, first_forecast_year: Year) {
        for (i, flag) in self.forecast.iter_mut().enumerate() {
            *flag = self.start_year + i as Year >= first_forecast_year;
        }
    }

    pub fn forecast_flags(&self) -> &[bool] {
        &self.forecast
    }

    /// The last year flagged as historical, i.e. the forecast seam.
    pub fn last_historical_year(&self) -> Option<Year> {
        self.forecast
            .iter()
            .rposition(|f| !f)
            .map(|i| self.start_year + i as Year)
    }

    pub fn first_forecast_year(&self) -> Option<Year> {
        self.forecast
            .iter()
            .position(|f| *f)
            .map(|i| self.start_year + i as Year)
    }

    /// Drop all rows after `year`.
    pub fn truncate_after(&mut self, year: Year) {
        assert!(
            self.contains_year(year),
            "cannot truncate to year {} outside range {}..={}",
            year,
            self.start_year,
            self.end_year()
        );
        let keep = (year - self.start_year + 1) as usize;
        self.forecast.truncate(keep);
        for values in self.columns.values_mut() {
            *values = values.slice(ndarray::s![..keep]).to_owned();
        }
    }

    /// Extend the index forward to `end_year`.
    ///
    /// Appended rows hold NaN in every column and are flagged as forecast.
    pub fn extend_to(&mut self, end_year: Year) {
        if end_year <= self.end_year() {
            return;
        }
        let extra = (end_year - self.end_year()) as usize;
        self.forecast.extend(std::iter::repeat(true).take(extra));
        for values in self.columns.values_mut() {
            let mut extended = values.to_vec();
            extended.extend(std::iter::repeat(f64::NAN).take(extra));
            *values = Array1::from(extended);
        }
    }

    /// Fill NaN gaps in a column by linear interpolation.
    ///
    /// Interior gaps are interpolated between the surrounding known values.
    /// Values before the first known value stay NaN; values after the last
    /// known value hold it constant.
    pub fn interpolate(&mut self, name: &str) {
        let column = self
            .columns
            .get_mut(name)
            .unwrap_or_else(|| panic!("series has no column '{}'", name));
        interpolate_slice(column.as_slice_mut().expect("column is contiguous"));
    }

    /// Replace NaN entries of a column with `value`.
    pub fn fill_nan(&mut self, name: &str, value: f64) {
        let column = self
            .columns
            .get_mut(name)
            .unwrap_or_else(|| panic!("series has no column '{}'", name));
        column.mapv_inplace(|v| if v.is_nan() { value } else { v });
    }

    /// Year-over-year difference of a column. The first entry is NaN.
    pub fn diff(&self, name: &str) -> Array1<f64> {
        let values = self.column(name);
        let mut out = Array1::from_elem(values.len(), f64::NAN);
        for i in 1..values.len() {
            out[i] = values[i] - values[i - 1];
        }
        out
    }

    /// Running sum of a column. NaN entries contribute zero.
    pub fn cumsum(&self, name: &str) -> Array1<f64> {
        let values = self.column(name);
        let mut acc = 0.0;
        values.mapv(|v| {
            if !v.is_nan() {
                acc += v;
            }
            acc
        })
    }

    /// Sum the given columns row-wise at `year`, treating NaN as zero.
    pub fn row_sum(&self, names: &[&str], year: Year) -> f64 {
        names
            .iter()
            .map(|name| {
                let v = self.value(name, year);
                if v.is_nan() {
                    0.0
                } else {
                    v
                }
            })
            .sum()
    }
}

fn interpolate_slice(values: &mut [f64]) {
    let mut last_known: Option<usize> = None;
    for i in 0..values.len() {
        if !values[i].is_nan() {
            if let Some(prev) = last_known {
                let gap = i - prev;
                if gap > 1 {
                    let step = (values[i] - values[prev]) / gap as f64;
                    for k in 1..gap {
                        values[prev + k] = values[prev] + step * k as f64;
                    }
                }
            }
            last_known = Some(i);
        }
    }
    // Hold the last known value for any trailing NaNs
    if let Some(prev) = last_known {
        for i in prev + 1..values.len() {
            values[i] = values[prev];
        }
    }
}

/// Find the start of the last consecutive run of years.
///
/// Some statistical series begin later than others; before any "first
/// historical year" logic the caller must skip ahead to where the index
/// becomes gap-free.
pub fn find_consecutive_start(years: &[Year]) -> Year {
    assert!(!years.is_empty(), "empty year index");
    let mut start = years[0];
    for window in years.windows(2) {
        if window[1] - window[0] != 1 {
            start = window[1];
        }
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series_with(name: &str, start: Year, values: Vec<f64>) -> YearSeries {
        let mut s = YearSeries::new(start, values.len());
        s.add_column(name, values);
        s
    }

    #[test]
    fn year_indexing() {
        let s = series_with("v", 2015, vec![1.0, 2.0, 3.0]);
        assert_eq!(s.start_year(), 2015);
        assert_eq!(s.end_year(), 2017);
        assert_eq!(s.value("v", 2016), 2.0);
        assert_eq!(s.get("v", 2018), None);
        assert_eq!(s.years().collect::<Vec<_>>(), vec![2015, 2016, 2017]);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn duplicate_column_panics() {
        let mut s = series_with("v", 2015, vec![1.0]);
        s.add_column("v", vec![2.0]);
    }

    #[test]
    #[should_panic(expected = "outside series range")]
    fn out_of_range_value_panics() {
        let s = series_with("v", 2015, vec![1.0]);
        s.value("v", 2020);
    }

    #[test]
    fn forecast_seam() {
        let mut s = series_with("v", 2010, vec![1.0; 6]);
        s.set_forecast_from(2013);
        assert_eq!(s.last_historical_year(), Some(2012));
        assert_eq!(s.first_forecast_year(), Some(2013));
        assert!(!s.is_forecast(2012));
        assert!(s.is_forecast(2013));
    }

    #[test]
    fn extend_appends_forecast_nans() {
        let mut s = series_with("v", 2016, vec![1.0, 2.0]);
        s.extend_to(2019);
        assert_eq!(s.end_year(), 2019);
        assert!(s.value("v", 2019).is_nan());
        assert!(s.is_forecast(2019));
        assert!(!s.is_forecast(2017));
    }

    #[test]
    fn truncate_keeps_prefix() {
        let mut s = series_with("v", 2016, vec![1.0, 2.0, 3.0, 4.0]);
        s.truncate_after(2017);
        assert_eq!(s.end_year(), 2017);
        assert_eq!(s.value("v", 2017), 2.0);
    }

    #[test]
    fn interpolate_interior_and_trailing() {
        let mut s = series_with(
            "v",
            2010,
            vec![f64::NAN, 1.0, f64::NAN, f64::NAN, 4.0, f64::NAN],
        );
        s.interpolate("v");
        // Leading NaN untouched
        assert!(s.value("v", 2010).is_nan());
        // Interior gap linearly filled
        assert_relative_eq!(s.value("v", 2012), 2.0);
        assert_relative_eq!(s.value("v", 2013), 3.0);
        // Trailing NaN holds the last known value
        assert_relative_eq!(s.value("v", 2015), 4.0);
    }

    #[test]
    fn diff_and_cumsum() {
        let s = series_with("v", 2010, vec![1.0, 3.0, 6.0]);
        let d = s.diff("v");
        assert!(d[0].is_nan());
        assert_eq!(d[1], 2.0);
        assert_eq!(d[2], 3.0);

        let c = s.cumsum("v");
        assert_eq!(c.to_vec(), vec![1.0, 4.0, 10.0]);
    }

    #[test]
    fn from_year_map_fills_gaps_with_nan() {
        let mut map = BTreeMap::new();
        map.insert(2010, 1.0);
        map.insert(2013, 4.0);
        let s = YearSeries::from_year_map("v", &map);
        assert_eq!(s.start_year(), 2010);
        assert_eq!(s.end_year(), 2013);
        assert!(s.value("v", 2011).is_nan());
        assert_eq!(s.value("v", 2013), 4.0);
    }

    #[test]
    fn consecutive_start_detection() {
        assert_eq!(find_consecutive_start(&[2000, 2001, 2002]), 2000);
        assert_eq!(find_consecutive_start(&[1990, 1995, 1996, 1997]), 1995);
        assert_eq!(find_consecutive_start(&[1990, 1992, 1994]), 1994);
    }
}
