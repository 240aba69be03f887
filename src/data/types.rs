use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::data::calendar;
use crate::pipeline::PipelineError;

/// A single cell value. Missing cells are `None` at the column level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) => Some(*v),
            Scalar::Text(_) => None,
        }
    }

    /// Total order: numbers before text, numbers by IEEE total order,
    /// text lexicographically.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.total_cmp(b),
            (Scalar::Number(_), Scalar::Text(_)) => Ordering::Less,
            (Scalar::Text(_), Scalar::Number(_)) => Ordering::Greater,
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered key wrapper so scalars can index a `BTreeMap`.
#[derive(Debug, Clone)]
pub struct ScalarKey(pub Scalar);

impl PartialEq for ScalarKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for ScalarKey {}

impl PartialOrd for ScalarKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<Scalar>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<Scalar>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    #[cfg(test)]
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, values.into_iter().map(|v| v.map(Scalar::Number)).collect())
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn as_f64(&self, row: usize) -> Option<f64> {
        self.values.get(row).and_then(|v| v.as_ref()).and_then(Scalar::as_f64)
    }

    /// Most frequent non-null value and its share of the non-null cells.
    /// Ties go to the smallest value under `Scalar::total_cmp`.
    pub fn mode(&self) -> Option<(Scalar, f64)> {
        let mut counts: BTreeMap<ScalarKey, usize> = BTreeMap::new();
        let mut non_null = 0usize;
        for value in self.values.iter().flatten() {
            *counts.entry(ScalarKey(value.clone())).or_insert(0) += 1;
            non_null += 1;
        }

        let mut best: Option<(&ScalarKey, usize)> = None;
        for (key, &count) in &counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((key, count)),
            }
        }

        best.map(|(key, count)| (key.0.clone(), count as f64 / non_null as f64))
    }
}

/// Inclusive date range requested from a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Column-major daily frame indexed by strictly increasing dates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeriesFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl TimeSeriesFrame {
    pub fn new(dates: Vec<NaiveDate>) -> Result<Self, PipelineError> {
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PipelineError::InputData(format!(
                "dates must be strictly increasing ({} followed by {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self {
            dates,
            columns: Vec::new(),
        })
    }

    pub fn with_columns(dates: Vec<NaiveDate>, columns: Vec<Column>) -> Result<Self, PipelineError> {
        let mut frame = Self::new(dates)?;
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), PipelineError> {
        if column.values.len() != self.dates.len() {
            return Err(PipelineError::InputData(format!(
                "column '{}' has {} values for {} dates",
                column.name,
                column.values.len(),
                self.dates.len()
            )));
        }
        if self.has_column(&column.name) {
            return Err(PipelineError::InputData(format!(
                "duplicate column '{}'",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let names: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.columns.retain(|c| !names.contains(c.name.as_str()));
    }

    pub fn rename_columns(&mut self, mapping: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(new_name) = mapping.get(&column.name) {
                column.name = new_name.clone();
            }
        }
    }

    /// Keeps the rows whose mask entry is `true`.
    pub fn filter_rows(&self, mask: &[bool]) -> Self {
        let pick = |i: &usize| mask.get(*i).copied().unwrap_or(false);
        let dates = (0..self.dates.len())
            .filter(pick)
            .map(|i| self.dates[i])
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: (0..c.values.len()).filter(pick).map(|i| c.values[i].clone()).collect(),
            })
            .collect();
        Self { dates, columns }
    }

    pub fn restrict_to(&self, range: DateRange) -> Self {
        let mask: Vec<bool> = self.dates.iter().map(|d| range.contains(*d)).collect();
        self.filter_rows(&mask)
    }

    /// Rounds every numeric cell to `decimals` places.
    pub fn round_numbers(&mut self, decimals: i32) {
        let factor = 10f64.powi(decimals);
        for column in &mut self.columns {
            for value in column.values.iter_mut().flatten() {
                if let Scalar::Number(v) = value {
                    *v = (*v * factor).round() / factor;
                }
            }
        }
    }

    /// Reindexes onto every business day between the first and last
    /// business date. Weekend rows are dropped, missing business days
    /// become all-missing rows.
    pub fn to_business_days(&self) -> Self {
        let business: Vec<NaiveDate> = self
            .dates
            .iter()
            .copied()
            .filter(|d| calendar::is_business_day(*d))
            .collect();
        let (Some(&first), Some(&last)) = (business.first(), business.last()) else {
            return Self {
                dates: Vec::new(),
                columns: self
                    .columns
                    .iter()
                    .map(|c| Column::new(c.name.clone(), Vec::new()))
                    .collect(),
            };
        };

        let index: HashMap<NaiveDate, usize> =
            self.dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let dates = calendar::business_days(first, last);
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: dates
                    .iter()
                    .map(|d| index.get(d).and_then(|&i| c.values[i].clone()))
                    .collect(),
            })
            .collect();

        Self { dates, columns }
    }

    /// Outer join on date. Overlapping column names are rejected.
    pub fn outer_join(&self, other: &Self) -> Result<Self, PipelineError> {
        let overlap: Vec<String> = other
            .columns
            .iter()
            .filter(|c| self.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect();
        if !overlap.is_empty() {
            return Err(PipelineError::InputData(format!(
                "sources share columns: {}",
                overlap.join(", ")
            )));
        }

        let mut dates: Vec<NaiveDate> = self.dates.iter().chain(other.dates.iter()).copied().collect();
        dates.sort();
        dates.dedup();

        let mut joined = Self::new(dates)?;
        for side in [self, other] {
            let index: HashMap<NaiveDate, usize> =
                side.dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
            for column in &side.columns {
                let values = joined
                    .dates
                    .iter()
                    .map(|d| index.get(d).and_then(|&i| column.values[i].clone()))
                    .collect();
                joined.push_column(Column::new(column.name.clone(), values))?;
            }
        }
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rejects_unordered_dates() {
        let result = TimeSeriesFrame::new(vec![date(2024, 1, 3), date(2024, 1, 2)]);
        assert!(matches!(result, Err(PipelineError::InputData(_))));

        let result = TimeSeriesFrame::new(vec![date(2024, 1, 2), date(2024, 1, 2)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mode_breaks_ties_by_smallest_value() {
        let column = Column::numeric("num_x", vec![Some(3.0), Some(1.0), Some(3.0), Some(1.0), None]);
        let (value, share) = column.mode().unwrap();
        assert_eq!(value, Scalar::Number(1.0));
        assert!((share - 0.5).abs() < 1e-12);

        let mixed = Column::new(
            "cat_x",
            vec![
                Some(Scalar::Text("b".into())),
                Some(Scalar::Text("a".into())),
            ],
        );
        assert_eq!(mixed.mode().unwrap().0, Scalar::Text("a".into()));
    }

    #[test]
    fn test_mode_of_all_missing_column() {
        let column = Column::numeric("num_x", vec![None, None]);
        assert!(column.mode().is_none());
    }

    #[test]
    fn test_business_day_resample() {
        // Fri, Sat, Tue: Saturday dropped, Monday inserted empty.
        let frame = TimeSeriesFrame::with_columns(
            vec![date(2024, 1, 5), date(2024, 1, 6), date(2024, 1, 9)],
            vec![Column::numeric("num_x", vec![Some(1.0), Some(2.0), Some(3.0)])],
        )
        .unwrap();

        let resampled = frame.to_business_days();
        assert_eq!(
            resampled.dates(),
            &[date(2024, 1, 5), date(2024, 1, 8), date(2024, 1, 9)]
        );
        assert_eq!(
            resampled.column("num_x").unwrap().values,
            vec![Some(Scalar::Number(1.0)), None, Some(Scalar::Number(3.0))]
        );
    }

    #[test]
    fn test_outer_join() {
        let left = TimeSeriesFrame::with_columns(
            vec![date(2024, 1, 2), date(2024, 1, 3)],
            vec![Column::numeric("a", vec![Some(1.0), Some(2.0)])],
        )
        .unwrap();
        let right = TimeSeriesFrame::with_columns(
            vec![date(2024, 1, 3), date(2024, 1, 4)],
            vec![Column::numeric("b", vec![Some(5.0), Some(6.0)])],
        )
        .unwrap();

        let joined = left.outer_join(&right).unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.column("a").unwrap().as_f64(2), None);
        assert_eq!(joined.column("b").unwrap().as_f64(0), None);
        assert_eq!(joined.column("b").unwrap().as_f64(1), Some(5.0));

        assert!(left.outer_join(&left).is_err());
    }

    #[test]
    fn test_round_numbers() {
        let mut frame = TimeSeriesFrame::with_columns(
            vec![date(2024, 1, 2)],
            vec![Column::numeric("a", vec![Some(540.26)])],
        )
        .unwrap();
        frame.round_numbers(1);
        assert_eq!(frame.column("a").unwrap().as_f64(0), Some(540.3));
    }
}
