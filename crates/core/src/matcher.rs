//! Finds the spreadsheet row describing a predicted client.
//!
//! Files are searched in file-name order and rows in stored order; the
//! first row whose identifier column equals the target wins.

use crate::config::ColumnConfig;
use crate::error::Result;
use crate::sheets::{self, Table, TabularFilter};
use providers::Prediction;
use serde::Serialize;
use std::path::Path;
use storage::models::Client;

/// Fields projected out of a matching row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub id: i64,
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(Client),
    Unmatched(i64),
}

/// A spreadsheet that could not be read and was left out of matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub reason: String,
}

/// Every spreadsheet of a folder, parsed once.
#[derive(Debug, Default)]
pub struct TableSet {
    tables: Vec<Table>,
    failures: Vec<FileFailure>,
}

impl TableSet {
    /// Loads the folder; unreadable files are recorded, not fatal.
    pub fn load(folder: &Path, filter: &TabularFilter) -> Result<Self> {
        let mut set = TableSet::default();
        for path in sheets::tabular_files(folder, filter)? {
            match sheets::load_table(&path) {
                Ok(table) => set.tables.push(table),
                Err(e) => set.failures.push(FileFailure {
                    file: sheets::display_name(&path),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(set)
    }

    pub fn from_tables(tables: Vec<Table>) -> Self {
        Self {
            tables,
            failures: Vec::new(),
        }
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn find(&self, id: i64, columns: &ColumnConfig) -> Option<ClientInfo> {
        self.tables.iter().find_map(|table| find_in_table(table, id, columns))
    }

    /// Pairs a prediction with its spreadsheet row.
    pub fn match_prediction(&self, prediction: &Prediction, columns: &ColumnConfig) -> MatchOutcome {
        match self.find(prediction.id, columns) {
            Some(info) => MatchOutcome::Matched(Client::new(
                info.id,
                info.category_name,
                prediction.score,
            )),
            None => MatchOutcome::Unmatched(prediction.id),
        }
    }
}

fn find_in_table(table: &Table, id: i64, columns: &ColumnConfig) -> Option<ClientInfo> {
    // Files without both columns cannot describe a client.
    let id_col = table.column(&columns.id)?;
    let category_col = table.column(&columns.category)?;
    table
        .rows
        .iter()
        .find(|row| row.get(id_col).and_then(|c| c.as_id()) == Some(id))
        .map(|row| ClientInfo {
            id,
            category_name: row
                .get(category_col)
                .and_then(|c| c.as_text())
                .unwrap_or_default(),
        })
}

/// Searches `folder` for `id` without keeping the parsed tables around.
pub fn find_client_info(
    id: i64,
    folder: &Path,
    filter: &TabularFilter,
    columns: &ColumnConfig,
) -> Result<Option<ClientInfo>> {
    Ok(TableSet::load(folder, filter)?.find(id, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Cell;
    use crate::testing::write_xlsx;

    fn columns() -> ColumnConfig {
        ColumnConfig {
            id: "ID".into(),
            category: "Category".into(),
            city: "City".into(),
        }
    }

    fn table(file: &str, rows: Vec<(Cell, &str)>) -> Table {
        Table::new(
            file,
            vec!["ID".into(), "Category".into()],
            rows.into_iter()
                .map(|(id, cat)| vec![id, Cell::Text(cat.into())])
                .collect(),
        )
    }

    #[test]
    fn first_file_then_first_row_wins() {
        let set = TableSet::from_tables(vec![
            table("a.xlsx", vec![(Cell::Int(5), "Other")]),
            table(
                "b.xlsx",
                vec![(Cell::Number(1.0), "Logistics"), (Cell::Int(1), "Duplicate")],
            ),
            table("c.xlsx", vec![(Cell::Int(1), "Later file")]),
        ]);

        let info = set.find(1, &columns()).unwrap();
        assert_eq!(info.category_name, "Logistics");
        assert!(set.find(42, &columns()).is_none());
    }

    #[test]
    fn tables_without_columns_are_skipped() {
        let odd = Table::new(
            "odd.xlsx",
            vec!["Client".into()],
            vec![vec![Cell::Int(1)]],
        );
        let set = TableSet::from_tables(vec![odd, table("b.xlsx", vec![(Cell::Int(1), "Retail")])]);
        assert_eq!(set.find(1, &columns()).unwrap().category_name, "Retail");
    }

    #[test]
    fn predictions_become_outcomes() {
        let set = TableSet::from_tables(vec![table("a.xlsx", vec![(Cell::Int(1), "Logistics")])]);

        assert_eq!(
            set.match_prediction(&Prediction::new(1, 0.85), &columns()),
            MatchOutcome::Matched(Client::new(1, "Logistics", 0.85))
        );
        assert_eq!(
            set.match_prediction(&Prediction::new(2, 0.6), &columns()),
            MatchOutcome::Unmatched(2)
        );
    }

    #[test]
    fn folder_search_records_unreadable_files() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("0-broken.xlsx"), b"nope").unwrap();
        write_xlsx(
            &temp.path().join("1-list.xlsx"),
            &[&["ID", "Category"], &["7", "Mining"]],
        );
        let filter = TabularFilter::new(&["*.xlsx".to_string()]).unwrap();

        let set = TableSet::load(temp.path(), &filter).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.failures().len(), 1);
        assert_eq!(set.failures()[0].file, "0-broken.xlsx");

        let info = find_client_info(7, temp.path(), &filter, &columns()).unwrap();
        assert_eq!(
            info,
            Some(ClientInfo {
                id: 7,
                category_name: "Mining".into()
            })
        );
        assert_eq!(find_client_info(8, temp.path(), &filter, &columns()).unwrap(), None);
    }
}
