use anyhow::{Context, Result};
use institute_core::snapshot::{Cell, CollectionSnapshot};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::warn;

/// Longest text a spreadsheet cell accepts.
const MAX_CELL_CHARS: usize = 32_767;

/// One sheet: a header row followed by data rows aligned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Sheets in collection order, ready to serialize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookPlan {
    pub sheets: Vec<SheetPlan>,
}

impl WorkbookPlan {
    /// One sheet per snapshot. Headers are the record keys in order of first
    /// appearance; a record lacking a key gets an empty cell there.
    pub fn from_snapshots(snapshots: &[CollectionSnapshot]) -> Self {
        let sheets = snapshots
            .iter()
            .map(|snap| {
                let mut headers: Vec<String> = Vec::new();
                for record in &snap.records {
                    for key in record.keys() {
                        if !headers.iter().any(|h| h == key) {
                            headers.push(key.to_string());
                        }
                    }
                }
                let rows = snap
                    .records
                    .iter()
                    .map(|record| {
                        headers
                            .iter()
                            .map(|h| record.get(h).cloned().unwrap_or(Cell::Empty))
                            .collect()
                    })
                    .collect();
                SheetPlan {
                    name: snap.name.clone(),
                    headers,
                    rows,
                }
            })
            .collect();
        Self { sheets }
    }

    /// Encodes the plan as an `.xlsx` file.
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        for sheet in &self.sheets {
            let ws = workbook.add_worksheet();
            ws.set_name(&sheet.name)
                .with_context(|| format!("naming sheet {}", sheet.name))?;
            write_sheet(ws, sheet).with_context(|| format!("writing sheet {}", sheet.name))?;
        }
        workbook.save_to_buffer().context("encoding workbook")
    }
}

fn write_sheet(ws: &mut Worksheet, sheet: &SheetPlan) -> Result<()> {
    for (col, header) in sheet.headers.iter().enumerate() {
        ws.write_string(0, column(col)?, header.as_str())?;
    }
    for (idx, row) in sheet.rows.iter().enumerate() {
        let r = u32::try_from(idx + 1).context("too many rows")?;
        for (col, cell) in row.iter().enumerate() {
            let c = column(col)?;
            match cell {
                Cell::Text(s) => {
                    ws.write_string(r, c, clip(s, &sheet.name, &sheet.headers[col]))?;
                }
                Cell::Number(n) => {
                    ws.write_number(r, c, *n)?;
                }
                Cell::Bool(b) => {
                    ws.write_boolean(r, c, *b)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(())
}

fn column(idx: usize) -> Result<u16> {
    u16::try_from(idx).context("too many columns")
}

fn clip<'a>(value: &'a str, sheet: &str, header: &str) -> &'a str {
    match value.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => {
            warn!(sheet, column = header, "cell text truncated to spreadsheet limit");
            &value[..end]
        }
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use institute_core::snapshot::Document;
    use std::io::Cursor;

    fn snapshot(name: &str, docs: &[Document]) -> CollectionSnapshot {
        CollectionSnapshot::from_documents(name, docs)
    }

    #[test]
    fn headers_follow_first_appearance() {
        let docs = [
            Document::new().with("a", 1.0).with("b", "x"),
            Document::new().with("c", true).with("a", 2.0),
        ];
        let plan = WorkbookPlan::from_snapshots(&[snapshot("student", &docs), snapshot("fees", &[])]);

        let sheet = &plan.sheets[0];
        assert_eq!(sheet.headers, ["a", "b", "c"]);
        assert_eq!(
            sheet.rows[1],
            vec![Cell::Number(2.0), Cell::Empty, Cell::Bool(true)]
        );

        let empty = &plan.sheets[1];
        assert_eq!(empty.name, "fees");
        assert!(empty.headers.is_empty());
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn xlsx_has_one_worksheet_per_collection() {
        let docs = [Document::new().with("_id", "01H").with("name", "Riya")];
        let plan = WorkbookPlan::from_snapshots(&[snapshot("student", &docs), snapshot("fees", &[])]);
        let bytes = plan.to_xlsx().unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert!(names.contains(&"xl/worksheets/sheet1.xml"));
        assert!(names.contains(&"xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let long = "é".repeat(MAX_CELL_CHARS + 5);
        assert_eq!(clip(&long, "s", "h").chars().count(), MAX_CELL_CHARS);
        assert_eq!(clip("short", "s", "h"), "short");
    }
}
