//! The in-memory tabular value and the operations the sandbox sanctions on it.
//!
//! A [`Table`] is ordered rows of named columns; a [`Cell`] is one value. All
//! operations are functional: they return a new `Table` and leave the receiver
//! untouched, which is what makes copy-on-bind isolation cheap to reason
//! about. Aggregations skip non-numeric and null cells rather than failing,
//! matching how uploaded spreadsheet data behaves in practice.

use crate::errors::{Result, SandboxError};
use serde::ser::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// One tabular value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view, if the cell holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Parse a delimited-text field back into a typed cell. Empty fields are
    /// null; integers and floats are recognized before falling back to text.
    pub fn parse(field: &str) -> Cell {
        if field.is_empty() {
            return Cell::Null;
        }
        match field {
            "true" => return Cell::Bool(true),
            "false" => return Cell::Bool(false),
            _ => {}
        }
        if let Ok(i) = field.parse::<i64>() {
            return Cell::Int(i);
        }
        if let Ok(f) = field.parse::<f64>() {
            return Cell::Float(f);
        }
        Cell::Str(field.to_string())
    }

    fn type_rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 2,
            Cell::Str(_) => 3,
        }
    }

    /// Total order used by sorting: nulls first, then bools, numbers, text.
    /// Ints and floats compare numerically across the two representations.
    pub fn cmp(&self, other: &Cell) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => return a.total_cmp(&b),
            _ => {}
        }
        match (self, other) {
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Str(a), Cell::Str(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality with numeric cross-type comparison (`2 == 2.0`). Nulls are
    /// never equal to anything, including other nulls.
    pub fn loose_eq(&self, other: &Cell) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Canonical grouping/join key. Numeric cells collapse to one key so an
    /// int column joins against a float column the way a spreadsheet user
    /// expects.
    fn key(&self) -> String {
        match self {
            Cell::Null => "\u{0}null".to_string(),
            Cell::Bool(b) => format!("b:{b}"),
            Cell::Int(i) => format!("n:{:?}", *i as f64),
            Cell::Float(f) => format!("n:{f:?}"),
            Cell::Str(s) => format!("s:{s}"),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(i) => write!(f, "{i}"),
            // Integral floats keep their decimal point so the delimited
            // round trip preserves the cell type.
            Cell::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                write!(f, "{v:.1}")
            }
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Str(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            // Strict JSON has no NaN/Infinity.
            Cell::Float(_) => serializer.serialize_none(),
            Cell::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// A named column detached from its table, as produced by `t["name"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn numeric(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().filter_map(Cell::as_f64)
    }

    /// Mean over numeric cells; null when the column has none.
    pub fn mean(&self) -> Cell {
        let (mut sum, mut n) = (0.0, 0usize);
        for v in self.numeric() {
            sum += v;
            n += 1;
        }
        if n == 0 {
            Cell::Null
        } else {
            Cell::Float(sum / n as f64)
        }
    }

    /// Sum over numeric cells; stays integral when every cell is an int.
    pub fn sum(&self) -> Cell {
        let mut int_sum: i64 = 0;
        let mut all_int = true;
        let mut float_sum = 0.0;
        for cell in &self.cells {
            match cell {
                Cell::Int(i) => {
                    int_sum = int_sum.wrapping_add(*i);
                    float_sum += *i as f64;
                }
                Cell::Float(f) => {
                    all_int = false;
                    float_sum += f;
                }
                _ => {}
            }
        }
        if all_int {
            Cell::Int(int_sum)
        } else {
            Cell::Float(float_sum)
        }
    }

    pub fn min(&self) -> Cell {
        self.cells
            .iter()
            .filter(|c| !c.is_null())
            .min_by(|a, b| a.cmp(b))
            .cloned()
            .unwrap_or(Cell::Null)
    }

    pub fn max(&self) -> Cell {
        self.cells
            .iter()
            .filter(|c| !c.is_null())
            .max_by(|a, b| a.cmp(b))
            .cloned()
            .unwrap_or(Cell::Null)
    }

    /// Count of non-null cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_null()).count()
    }

    pub fn median(&self) -> Cell {
        let mut values: Vec<f64> = self.numeric().collect();
        if values.is_empty() {
            return Cell::Null;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 1 {
            Cell::Float(values[mid])
        } else {
            Cell::Float((values[mid - 1] + values[mid]) / 2.0)
        }
    }

    /// Distinct cells in first-seen order.
    pub fn unique(&self) -> Column {
        let mut seen = std::collections::HashSet::new();
        let cells = self
            .cells
            .iter()
            .filter(|c| seen.insert(c.key()))
            .cloned()
            .collect();
        Column {
            name: self.name.clone(),
            cells,
        }
    }

    /// Round numeric cells to `ndigits` decimal places; others pass through.
    pub fn round(&self, ndigits: i32) -> Column {
        let factor = 10f64.powi(ndigits);
        let cells = self
            .cells
            .iter()
            .map(|c| match c.as_f64() {
                Some(v) => {
                    let rounded = (v * factor).round() / factor;
                    if ndigits <= 0 && rounded.abs() < i64::MAX as f64 {
                        Cell::Int(rounded as i64)
                    } else {
                        Cell::Float(rounded)
                    }
                }
                None => c.clone(),
            })
            .collect();
        Column {
            name: self.name.clone(),
            cells,
        }
    }
}

/// Comparison operators accepted by `filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

impl FilterOp {
    pub fn parse(op: &str) -> Result<FilterOp> {
        Ok(match op {
            "==" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "contains" => FilterOp::Contains,
            other => {
                return Err(SandboxError::exec(format!(
                    "unknown filter operator '{other}' (expected ==, !=, <, <=, >, >=, contains)"
                )))
            }
        })
    }

    fn matches(&self, cell: &Cell, needle: &Cell) -> bool {
        // Null cells never match, mirroring NaN comparison semantics in the
        // spreadsheet world.
        if cell.is_null() || needle.is_null() {
            return false;
        }
        match self {
            FilterOp::Eq => cell.loose_eq(needle),
            FilterOp::Ne => !cell.loose_eq(needle),
            FilterOp::Lt => cell.cmp(needle) == Ordering::Less,
            FilterOp::Le => cell.cmp(needle) != Ordering::Greater,
            FilterOp::Gt => cell.cmp(needle) == Ordering::Greater,
            FilterOp::Ge => cell.cmp(needle) != Ordering::Less,
            FilterOp::Contains => match (cell, needle) {
                (Cell::Str(haystack), Cell::Str(sub)) => haystack.contains(sub.as_str()),
                _ => false,
            },
        }
    }
}

/// How unmatched rows are treated by `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinHow {
    Inner,
    Left,
}

impl JoinHow {
    pub fn parse(how: &str) -> Result<JoinHow> {
        Ok(match how {
            "inner" => JoinHow::Inner,
            "left" => JoinHow::Left,
            other => {
                return Err(SandboxError::exec(format!(
                    "unknown join kind '{other}' (expected inner or left)"
                )))
            }
        })
    }
}

/// Aggregations accepted by `group_agg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Mean,
    Sum,
    Min,
    Max,
    Count,
    Median,
}

impl Agg {
    pub fn parse(agg: &str) -> Result<Agg> {
        Ok(match agg {
            "mean" => Agg::Mean,
            "sum" => Agg::Sum,
            "min" => Agg::Min,
            "max" => Agg::Max,
            "count" => Agg::Count,
            "median" => Agg::Median,
            other => {
                return Err(SandboxError::exec(format!(
                    "unknown aggregation '{other}' (expected mean, sum, min, max, count, median)"
                )))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Agg::Mean => "mean",
            Agg::Sum => "sum",
            Agg::Min => "min",
            Agg::Max => "max",
            Agg::Count => "count",
            Agg::Median => "median",
        }
    }

    fn apply(&self, column: &Column) -> Cell {
        match self {
            Agg::Mean => column.mean(),
            Agg::Sum => column.sum(),
            Agg::Min => column.min(),
            Agg::Max => column.max(),
            Agg::Count => Cell::Int(column.count() as i64),
            Agg::Median => column.median(),
        }
    }
}

/// Ordered rows under named columns. The unit the registry stores and the
/// sandbox binds.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table, validating that every row matches the header width and
    /// that column names are distinct.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Table> {
        let mut seen = std::collections::HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(SandboxError::InvalidDataset(format!(
                    "duplicate column name '{name}'"
                )));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SandboxError::InvalidDataset(format!(
                    "row {i} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Table { columns, rows })
    }

    /// Internal constructor for operations whose shape is correct by
    /// construction.
    fn build(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Table {
        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns.iter().position(|c| c == name).ok_or_else(|| {
            SandboxError::exec(format!(
                "unknown column '{name}' (available: {})",
                self.columns.join(", ")
            ))
        })
    }

    /// Detach one column.
    pub fn column(&self, name: &str) -> Result<Column> {
        let idx = self.column_index(name)?;
        Ok(Column {
            name: name.to_string(),
            cells: self.rows.iter().map(|r| r[idx].clone()).collect(),
        })
    }

    /// Keep rows where `column <op> value` holds.
    pub fn filter(&self, column: &str, op: FilterOp, value: &Cell) -> Result<Table> {
        let idx = self.column_index(column)?;
        let rows = self
            .rows
            .iter()
            .filter(|row| op.matches(&row[idx], value))
            .cloned()
            .collect();
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Project onto the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let mut seen = std::collections::HashSet::new();
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(SandboxError::exec(format!(
                    "column '{name}' selected more than once"
                )));
            }
        }
        let indices: Vec<usize> = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<_>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table::build(names.to_vec(), rows))
    }

    /// Stable sort by one column.
    pub fn sort_by(&self, column: &str, descending: bool) -> Result<Table> {
        let idx = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            let ord = a[idx].cmp(&b[idx]);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Top `n` rows by `column`, largest first.
    pub fn nlargest(&self, n: usize, column: &str) -> Result<Table> {
        Ok(self.sort_by(column, true)?.head(n))
    }

    /// Bottom `n` rows by `column`, smallest first.
    pub fn nsmallest(&self, n: usize, column: &str) -> Result<Table> {
        Ok(self.sort_by(column, false)?.head(n))
    }

    /// Add a column, or overwrite one that already exists.
    pub fn with_column(&self, name: &str, cells: Vec<Cell>) -> Result<Table> {
        if cells.len() != self.rows.len() {
            return Err(SandboxError::exec(format!(
                "column '{name}' has {} values, table has {} rows",
                cells.len(),
                self.rows.len()
            )));
        }
        let mut columns = self.columns.clone();
        let mut rows = self.rows.clone();
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, cell) in rows.iter_mut().zip(cells) {
                    row[idx] = cell;
                }
            }
            None => {
                columns.push(name.to_string());
                for (row, cell) in rows.iter_mut().zip(cells) {
                    row.push(cell);
                }
            }
        }
        Ok(Table { columns, rows })
    }

    /// Hash join on one key column. The right table's key column is dropped
    /// from the output; other name clashes get a `_right` suffix. Null keys
    /// never match.
    pub fn join(&self, other: &Table, on: &str, how: JoinHow) -> Result<Table> {
        let left_key = self.column_index(on)?;
        let right_key = other.column_index(on)?;

        let mut columns = self.columns.clone();
        let right_cols: Vec<(usize, String)> = other
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != right_key)
            .map(|(i, name)| {
                let mut out = name.clone();
                while self.columns.contains(&out) {
                    out.push_str("_right");
                }
                (i, out)
            })
            .collect();
        columns.extend(right_cols.iter().map(|(_, name)| name.clone()));

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in other.rows.iter().enumerate() {
            if !row[right_key].is_null() {
                index.entry(row[right_key].key()).or_default().push(i);
            }
        }

        let mut rows = Vec::new();
        for row in &self.rows {
            let matches = if row[left_key].is_null() {
                None
            } else {
                index.get(&row[left_key].key())
            };
            match matches {
                Some(indices) => {
                    for &ri in indices {
                        let mut out = row.clone();
                        out.extend(right_cols.iter().map(|(i, _)| other.rows[ri][*i].clone()));
                        rows.push(out);
                    }
                }
                None => {
                    if how == JoinHow::Left {
                        let mut out = row.clone();
                        out.extend(std::iter::repeat(Cell::Null).take(right_cols.len()));
                        rows.push(out);
                    }
                }
            }
        }
        Ok(Table::build(columns, rows))
    }

    /// Group by one column and aggregate another. Groups keep first-seen
    /// order; the aggregate column is named `<value>_<agg>`.
    pub fn group_agg(&self, by: &str, value: &str, agg: Agg) -> Result<Table> {
        let by_idx = self.column_index(by)?;
        let value_idx = self.column_index(value)?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (Cell, Vec<Cell>)> = HashMap::new();
        for row in &self.rows {
            let key = row[by_idx].key();
            let entry = groups
                .entry(key.clone())
                .or_insert_with(|| (row[by_idx].clone(), Vec::new()));
            if entry.1.is_empty() && !order.contains(&key) {
                order.push(key.clone());
            }
            entry.1.push(row[value_idx].clone());
        }

        let out_value = format!("{value}_{}", agg.name());
        let rows = order
            .iter()
            .map(|key| {
                let (label, cells) = &groups[key];
                let column = Column {
                    name: value.to_string(),
                    cells: cells.clone(),
                };
                vec![label.clone(), agg.apply(&column)]
            })
            .collect();
        Ok(Table::build(vec![by.to_string(), out_value], rows))
    }

    /// Serialize as comma-delimited text with a header row.
    pub fn to_delimited(&self) -> String {
        encode_delimited(&self.columns, &self.rows)
    }

    /// Parse comma-delimited text with a header row.
    pub fn from_delimited(text: &str) -> Result<Table> {
        let (columns, rows) = parse_delimited(text)?;
        Table::from_rows(columns, rows)
    }
}

fn encode_field(out: &mut String, field: &str) {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        out.push('"');
        for ch in field.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// Comma-delimited encoding shared by `Table` and the classifier's tabular
/// payload. Fields containing delimiters are quoted, quotes doubled.
pub(crate) fn encode_delimited(columns: &[String], rows: &[Vec<Cell>]) -> String {
    let mut out = String::new();
    for (i, name) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        encode_field(&mut out, name);
    }
    out.push('\n');
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            encode_field(&mut out, &cell.to_string());
        }
        out.push('\n');
    }
    out
}

fn parse_delimited(text: &str) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err(SandboxError::InvalidDataset(
            "unterminated quoted field in delimited text".to_string(),
        ));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    let mut iter = records.into_iter();
    let columns = iter
        .next()
        .ok_or_else(|| SandboxError::InvalidDataset("delimited text has no header row".into()))?;
    let rows = iter
        .map(|record| record.iter().map(|f| Cell::parse(f)).collect())
        .collect();
    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees() -> Table {
        Table::from_rows(
            vec!["Name".into(), "Department".into(), "Salary".into()],
            vec![
                vec![
                    Cell::Str("Ada".into()),
                    Cell::Str("Engineering".into()),
                    Cell::Int(120_000),
                ],
                vec![
                    Cell::Str("Grace".into()),
                    Cell::Str("Engineering".into()),
                    Cell::Int(135_000),
                ],
                vec![
                    Cell::Str("Lin".into()),
                    Cell::Str("HR".into()),
                    Cell::Int(90_000),
                ],
                vec![Cell::Str("Noor".into()), Cell::Str("HR".into()), Cell::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn filter_by_equality_and_threshold() {
        let t = employees();
        let eng = t
            .filter("Department", FilterOp::Eq, &Cell::Str("Engineering".into()))
            .unwrap();
        assert_eq!(eng.row_count(), 2);

        let high = t
            .filter("Salary", FilterOp::Gt, &Cell::Int(100_000))
            .unwrap();
        assert_eq!(high.row_count(), 2);
    }

    #[test]
    fn null_cells_never_match_filters() {
        let t = employees();
        let ne = t
            .filter("Salary", FilterOp::Ne, &Cell::Int(90_000))
            .unwrap();
        // Noor's null salary is excluded even under !=.
        assert_eq!(ne.row_count(), 2);
    }

    #[test]
    fn aggregates_skip_nulls() {
        let salary = employees().column("Salary").unwrap();
        assert_eq!(salary.count(), 3);
        assert_eq!(salary.mean(), Cell::Float(115_000.0));
        assert_eq!(salary.sum(), Cell::Int(345_000));
        assert_eq!(salary.min(), Cell::Int(90_000));
    }

    #[test]
    fn group_agg_keeps_first_seen_order() {
        let g = employees().group_agg("Department", "Salary", Agg::Mean).unwrap();
        assert_eq!(g.columns(), &["Department".to_string(), "Salary_mean".to_string()]);
        assert_eq!(g.rows()[0][0], Cell::Str("Engineering".into()));
        assert_eq!(g.rows()[0][1], Cell::Float(127_500.0));
        assert_eq!(g.rows()[1][0], Cell::Str("HR".into()));
        assert_eq!(g.rows()[1][1], Cell::Float(90_000.0));
    }

    #[test]
    fn group_count_ignores_null_values() {
        let g = employees().group_agg("Department", "Salary", Agg::Count).unwrap();
        assert_eq!(g.rows()[1][1], Cell::Int(1));
    }

    #[test]
    fn nlargest_sorts_descending() {
        let top = employees().nlargest(1, "Salary").unwrap();
        assert_eq!(top.rows()[0][0], Cell::Str("Grace".into()));
    }

    #[test]
    fn join_inner_and_left() {
        let projects = Table::from_rows(
            vec!["Name".into(), "Project".into()],
            vec![
                vec![Cell::Str("Ada".into()), Cell::Str("Apollo".into())],
                vec![Cell::Str("Ada".into()), Cell::Str("Borealis".into())],
                vec![Cell::Str("Lin".into()), Cell::Str("Onboarding".into())],
            ],
        )
        .unwrap();

        let inner = employees().join(&projects, "Name", JoinHow::Inner).unwrap();
        assert_eq!(inner.row_count(), 3);
        assert_eq!(
            inner.columns(),
            &[
                "Name".to_string(),
                "Department".to_string(),
                "Salary".to_string(),
                "Project".to_string()
            ]
        );

        let left = employees().join(&projects, "Name", JoinHow::Left).unwrap();
        assert_eq!(left.row_count(), 5);
        let grace = &left.rows()[2];
        assert_eq!(grace[0], Cell::Str("Grace".into()));
        assert_eq!(grace[3], Cell::Null);
    }

    #[test]
    fn with_column_overwrites_in_place() {
        let t = employees();
        let bonus = vec![
            Cell::Int(1),
            Cell::Int(2),
            Cell::Int(3),
            Cell::Int(4),
        ];
        let t2 = t.with_column("Salary", bonus).unwrap();
        assert_eq!(t2.columns().len(), 3);
        assert_eq!(t2.rows()[0][2], Cell::Int(1));
        // Source table untouched.
        assert_eq!(t.rows()[0][2], Cell::Int(120_000));
    }

    #[test]
    fn unknown_column_error_names_candidates() {
        let err = employees().column("salary").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown column 'salary'"));
        assert!(msg.contains("Salary"));
    }

    #[test]
    fn delimited_round_trip() {
        let t = Table::from_rows(
            vec!["label".into(), "value".into()],
            vec![
                vec![Cell::Str("plain".into()), Cell::Int(1)],
                vec![Cell::Str("with, comma".into()), Cell::Float(2.5)],
                vec![Cell::Str("with \"quotes\"".into()), Cell::Float(3.0)],
                vec![Cell::Null, Cell::Bool(true)],
            ],
        )
        .unwrap();
        let text = t.to_delimited();
        let back = Table::from_delimited(&text).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn delimited_rejects_missing_header() {
        assert!(Table::from_delimited("").is_err());
    }
}
