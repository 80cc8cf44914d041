use polars::prelude::*;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{info, instrument};

use crate::domain::CCError;
use crate::matcher::MatchSet;

/// Hits of the match set within one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnHits {
    pub column: String,
    pub count: usize,
    pub percentage: String,
}

/// Columns with at least one hit, in table order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub total_rows: usize,
    pub pattern: String,
    pub columns: Vec<ColumnHits>,
}

impl ScanResult {
    pub fn get(&self, column: &str) -> Option<&ColumnHits> {
        self.columns.iter().find(|hits| hits.column == column)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

pub fn format_percentage(count: usize, total_rows: usize) -> String {
    format!("{:.2}%", count as f64 / total_rows as f64 * 100.0)
}

// Cells are coerced to text, nulls never match.
fn count_matches(column: &Column, set: &MatchSet) -> Result<usize, PolarsError> {
    let column = column.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .filter(|value| set.is_match_opt(*value))
        .count())
}

/// Counts matching cells for every column. Each column is scanned in its own
/// rayon task. An empty match set or an empty table gives an empty result.
#[instrument(skip_all, fields(pattern = set.pattern()))]
pub fn scan_columns(df: &DataFrame, set: &MatchSet) -> Result<ScanResult, CCError> {
    let total_rows = df.height();
    let mut result = ScanResult {
        total_rows,
        pattern: set.pattern().to_string(),
        columns: Vec::new(),
    };
    if set.is_empty() || total_rows == 0 {
        return Ok(result);
    }

    let start_time = Instant::now();
    let hits = df
        .get_columns()
        .par_iter()
        .map(|column| {
            count_matches(column, set).map(|count| {
                (count > 0).then(|| ColumnHits {
                    column: column.name().to_string(),
                    count,
                    percentage: format_percentage(count, total_rows),
                })
            })
        })
        .collect::<Result<Vec<_>, PolarsError>>()?;
    result.columns = hits.into_iter().flatten().collect();

    info!(
        "Scanned {} columns in {}ms, {} with matches",
        df.width(),
        start_time.elapsed().as_millis(),
        result.len()
    );
    Ok(result)
}

/// The first `rows` rows, in table order, whose value in `column` matches.
pub fn preview_rows(
    df: &DataFrame,
    set: &MatchSet,
    column: &str,
    rows: usize,
) -> Result<DataFrame, CCError> {
    let values = df
        .column(column)
        .map_err(|_| CCError::UnknownColumn(column.to_string()))?
        .cast(&DataType::String)?;
    let mask = values
        .str()?
        .into_iter()
        .map(|value| set.is_match_opt(value))
        .collect::<Vec<bool>>();
    let mask = BooleanChunked::from_slice(PlSmallStr::from_static("mask"), &mask);
    Ok(df.filter(&mask)?.head(Some(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::text_rows;

    fn sample() -> DataFrame {
        df!(
            "A" => &[Some("x,y"), Some("z")],
            "B" => &[Some("1"), Some("2,3")]
        )
        .unwrap()
    }

    #[test]
    fn comma_in_both_columns() {
        let set = MatchSet::compile(",").unwrap();
        let result = scan_columns(&sample(), &set).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("A").unwrap().count, 1);
        assert_eq!(result.get("A").unwrap().percentage, "50.00%");
        assert_eq!(result.get("B").unwrap().count, 1);
        assert_eq!(result.get("B").unwrap().percentage, "50.00%");
    }

    #[test]
    fn columns_without_matches_are_absent() {
        let set = MatchSet::compile("y").unwrap();
        let result = scan_columns(&sample(), &set).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.get("B").is_none());
    }

    #[test]
    fn empty_check_input_gives_empty_result() {
        let set = MatchSet::compile("").unwrap();
        let result = scan_columns(&sample(), &set).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_rows, 2);
    }

    #[test]
    fn nulls_do_not_match_and_numbers_are_text() {
        let df = df!(
            "S" => &[None, Some("a|b"), Some("c"), None],
            "N" => &[1i64, 22, 3, 12]
        )
        .unwrap();
        let set = MatchSet::compile("| 2").unwrap();
        let result = scan_columns(&df, &set).unwrap();
        assert_eq!(result.get("S").unwrap().count, 1);
        assert_eq!(result.get("S").unwrap().percentage, "25.00%");
        assert_eq!(result.get("N").unwrap().count, 2);
        assert_eq!(result.get("N").unwrap().percentage, "50.00%");
    }

    #[test]
    fn percentage_is_rounded_to_two_decimals() {
        assert_eq!(format_percentage(1, 3), "33.33%");
        assert_eq!(format_percentage(2, 3), "66.67%");
        assert_eq!(format_percentage(3, 3), "100.00%");
    }

    #[test]
    fn rescanning_is_idempotent() {
        let set = MatchSet::compile(", 1").unwrap();
        let df = sample();
        let first = scan_columns(&df, &set).unwrap();
        let second = scan_columns(&df, &set).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn result_keeps_table_order() {
        let df = df!(
            "c" => &["x"],
            "a" => &["x"],
            "b" => &["x"]
        )
        .unwrap();
        let set = MatchSet::compile("x").unwrap();
        let names = scan_columns(&df, &set)
            .unwrap()
            .columns
            .into_iter()
            .map(|hits| hits.column)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn preview_is_prefix_of_matching_rows() {
        let values = (0..30)
            .map(|i| if i % 3 == 0 { format!("{i};") } else { i.to_string() })
            .collect::<Vec<_>>();
        let df = df!("V" => values, "I" => (0..30).map(|i| i.to_string()).collect::<Vec<_>>())
            .unwrap();
        let set = MatchSet::compile(";").unwrap();

        let preview = preview_rows(&df, &set, "V", 4).unwrap();
        let rows = text_rows(&preview).unwrap();
        assert_eq!(rows.len(), 4);
        let ids = rows
            .iter()
            .map(|r| r[1].clone().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["0", "3", "6", "9"]);
        for row in rows {
            assert!(set.is_match(row[0].as_deref().unwrap()));
        }

        let all = preview_rows(&df, &set, "V", 100).unwrap();
        assert_eq!(all.height(), 10);
    }

    #[test]
    fn preview_of_unknown_column_fails() {
        let set = MatchSet::compile(",").unwrap();
        assert!(matches!(
            preview_rows(&sample(), &set, "missing", 10),
            Err(CCError::UnknownColumn(c)) if c == "missing"
        ));
    }
}
