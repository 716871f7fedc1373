//! Reads single-sheet spreadsheets from a bundle folder.

use crate::error::{IngestError, Result};
use calamine::{open_workbook_auto, DataType, Reader};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A cell value, detached from the spreadsheet library.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Display form of the value; `None` for empty or blank cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Int(i) => Some(i.to_string()),
            Cell::Number(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", *f as i64))
            }
            Cell::Number(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Integer identifier stored in the cell, whatever its cell type.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Number(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Cell::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }
}

impl From<&DataType> for Cell {
    fn from(value: &DataType) -> Self {
        match value {
            DataType::Empty | DataType::Error(_) => Cell::Empty,
            DataType::String(s) => Cell::Text(s.clone()),
            DataType::Int(i) => Cell::Int(*i),
            DataType::Float(f) => Cell::Number(*f),
            DataType::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// First worksheet of a file: a header row plus data rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub file: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(file: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            file: file.into(),
            headers,
            rows,
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name.trim())
    }

    /// Non-empty values of column `idx`, in row order.
    pub fn values(&self, idx: usize) -> impl Iterator<Item = String> + '_ {
        self.rows
            .iter()
            .filter_map(move |row| row.get(idx).and_then(Cell::as_text))
    }
}

/// Glob filter deciding which files in a folder count as spreadsheets.
#[derive(Debug, Clone)]
pub struct TabularFilter {
    set: GlobSet,
}

impl TabularFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            let glob = GlobBuilder::new(pat)
                .case_insensitive(true)
                .build()
                .map_err(|e| IngestError::Config(format!("bad tabular pattern `{pat}`: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(Self { set })
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.set.is_match(Path::new(name)))
            .unwrap_or(false)
    }
}

/// Spreadsheet files directly inside `folder`, sorted by file name.
///
/// Hidden files and office lock files (`~$name.xlsx`) are skipped.
pub fn tabular_files(folder: &Path, filter: &TabularFilter) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(IngestError::Structure(folder.display().to_string()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| IngestError::Io(e.into()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || is_hidden(path) || !filter.matches(path) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.') || s.starts_with("~$"))
        .unwrap_or(false)
}

pub fn load_table(path: &Path) -> Result<Table> {
    let file = display_name(path);
    let parse_err = |reason: String| IngestError::Parse {
        file: file.clone(),
        reason,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| parse_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_err("workbook has no worksheets".to_string()))?
        .map_err(|e| parse_err(e.to_string()))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| {
            row.iter()
                .map(|c| Cell::from(c).as_text().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    let rows: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(Cell::from).collect())
        .collect();
    debug!(file = %file, rows = rows.len(), "spreadsheet loaded");
    Ok(Table::new(file, headers, rows))
}

/// Distinct non-empty values of `column` across every spreadsheet in `folder`.
pub fn distinct_values(folder: &Path, column: &str, filter: &TabularFilter) -> Result<BTreeSet<String>> {
    let mut values = BTreeSet::new();
    for path in tabular_files(folder, filter)? {
        let table = load_table(&path)?;
        let idx = table.column(column).ok_or_else(|| IngestError::MissingColumn {
            file: table.file.clone(),
            column: column.to_string(),
        })?;
        values.extend(table.values(idx));
    }
    Ok(values)
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
