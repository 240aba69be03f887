use tracing::info;

use crate::data::types::{Column, TimeSeriesFrame};

/// A column removed for low completeness.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedColumn {
    pub name: String,
    pub completeness: f64,
}

/// Percentage of non-null cells, 100.0 for an empty column.
pub fn completeness(column: &Column) -> f64 {
    if column.values.is_empty() {
        return 100.0;
    }
    100.0 * (1.0 - column.null_count() as f64 / column.values.len() as f64)
}

/// Drops every column whose completeness is below `threshold_percent`.
pub fn filter(mut frame: TimeSeriesFrame, threshold_percent: f64) -> (TimeSeriesFrame, Vec<DroppedColumn>) {
    let dropped: Vec<DroppedColumn> = frame
        .columns()
        .iter()
        .map(|c| DroppedColumn {
            name: c.name.clone(),
            completeness: completeness(c),
        })
        .filter(|d| d.completeness < threshold_percent)
        .collect();

    let names: Vec<&str> = dropped.iter().map(|d| d.name.as_str()).collect();
    frame.drop_columns(&names);

    info!(
        "✅ Completeness filter applied with threshold {}%. {} columns dropped.",
        threshold_percent,
        dropped.len()
    );
    for d in &dropped {
        info!("   - {}: {:.2}% complete", d.name, d.completeness);
    }

    (frame, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn frame_with(columns: Vec<Column>, rows: usize) -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..rows as i64).map(|i| start + chrono::Duration::days(i)).collect();
        TimeSeriesFrame::with_columns(dates, columns).unwrap()
    }

    #[test]
    fn test_threshold_boundary() {
        // 10 rows: 8 present = exactly 80%, 7 present = 70%.
        let eighty = (0..10).map(|i| if i < 8 { Some(1.0) } else { None }).collect();
        let seventy = (0..10).map(|i| if i < 7 { Some(1.0) } else { None }).collect();
        let frame = frame_with(
            vec![
                Column::numeric("num_eighty", eighty),
                Column::numeric("num_seventy", seventy),
                Column::numeric("num_full", vec![Some(2.0); 10]),
            ],
            10,
        );

        let (kept, dropped) = filter(frame, 80.0);
        assert_eq!(kept.column_names(), vec!["num_eighty", "num_full"]);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].name, "num_seventy");
        assert!((dropped[0].completeness - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_keeps_below_or_drops_above() {
        let rows = 12;
        let columns: Vec<Column> = (0..=rows)
            .map(|present| {
                Column::numeric(
                    format!("num_{}", present),
                    (0..rows).map(|i| if i < present { Some(1.0) } else { None }).collect(),
                )
            })
            .collect();
        let frame = frame_with(columns, rows);

        for threshold in [0.0, 25.0, 50.0, 75.0, 90.0, 100.0] {
            let (kept, dropped) = filter(frame.clone(), threshold);
            for column in kept.columns() {
                assert!(completeness(column) >= threshold);
            }
            for d in &dropped {
                assert!(d.completeness < threshold);
            }
            assert_eq!(kept.width() + dropped.len(), frame.width());
        }
    }

    #[test]
    fn test_empty_frame_drops_nothing() {
        let frame = frame_with(vec![Column::numeric("num_x", vec![])], 0);
        let (kept, dropped) = filter(frame, 80.0);
        assert_eq!(kept.width(), 1);
        assert!(dropped.is_empty());
    }
}
