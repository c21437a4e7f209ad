//! XLSX workbooks.
//!
//! Reading goes through `calamine`, writing through `rust_xlsxwriter`. The
//! written workbook always starts with the `INDEX` sheet, whose last column
//! links to the first cell of each collection sheet.

use crate::codec::{envelope, format_timestamp};
use crate::io::projector::{INDEX_COLUMNS, INDEX_SHEET, Workbook};
use crate::io::tabular::{Sheet, cell_text};
use crate::{Error, Result};
use calamine::{Data, Reader, Xlsx, open_workbook};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_xlsxwriter::{Format as CellFormat, Url, Workbook as XlsxWorkbook, Worksheet, XlsxError};
use serde_json::Value;
use std::path::Path;

/// Header of the hyperlink column on the index sheet.
pub const LINK_COLUMN: &str = "Link";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Reads every sheet of a workbook, in workbook order.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a sheet cannot be read.
pub fn read_file(path: &Path) -> Result<Vec<Sheet>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("file {}", path.display())));
    }
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e| Error::operation("open_workbook", e))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| Error::operation("read_worksheet", format!("{name}: {e}")))?;
        let mut rows = range.rows();
        let header = rows
            .next()
            .map(|cells| cells.iter().map(|c| cell_text(&cell_value(c))).collect())
            .unwrap_or_default();
        let records: Vec<Vec<Value>> = rows
            .map(|cells| cells.iter().map(cell_value).collect())
            .collect();
        sheets.push(Sheet::from_records(name, header, records));
    }
    Ok(sheets)
}

/// Converts a spreadsheet cell to a JSON scalar. Empty and error cells
/// become null and are dropped by [`Sheet::from_records`].
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        #[allow(clippy::cast_possible_truncation)]
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
            Value::from(*f as i64)
        },
        Data::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::DateTime(dt) if dt.is_datetime() => excel_serial_to_utc(dt.as_f64())
            .map_or(Value::Null, |t| {
                Value::String(envelope::wrap(
                    "timestamp",
                    Some(&Value::String(format_timestamp(&t))),
                ))
            }),
        Data::DateTime(dt) => serde_json::Number::from_f64(dt.as_f64()).map_or(Value::Null, Value::Number),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Converts a 1900-system serial date to UTC.
#[allow(clippy::cast_possible_truncation)]
fn excel_serial_to_utc(serial: f64) -> Option<DateTime<Utc>> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    Some((epoch + TimeDelta::try_milliseconds(millis)?).and_utc())
}

/// Writes a workbook: the index sheet first, then every collection sheet
/// in index order.
///
/// # Errors
///
/// Returns an error if a sheet cannot be built or the file cannot be saved.
pub fn write_file(path: &Path, workbook: &Workbook) -> Result<()> {
    let bold = CellFormat::new().set_bold();
    let mut book = XlsxWorkbook::new();

    let index = workbook.index_sheet();
    {
        let worksheet = book.add_worksheet();
        write_sheet(worksheet, &index, &bold).map_err(xlsx_error)?;
        let link_col = column(INDEX_COLUMNS.len())?;
        worksheet
            .write_string_with_format(0, link_col, LINK_COLUMN, &bold)
            .map_err(xlsx_error)?;
        for (i, entry) in workbook.index.iter().enumerate() {
            let url = Url::new(format!("internal:'{}'!A1", entry.sheet_name))
                .set_text(&entry.sheet_name);
            worksheet
                .write_url(row(i + 1)?, link_col, url)
                .map_err(xlsx_error)?;
        }
    }

    for entry in &workbook.index {
        let sheet = workbook.sheet(&entry.sheet_name).ok_or_else(|| {
            Error::NotFound(format!("sheet '{}' listed in the index", entry.sheet_name))
        })?;
        let worksheet = book.add_worksheet();
        write_sheet(worksheet, sheet, &bold).map_err(xlsx_error)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_output_dir", e))?;
    }
    book.save(path).map_err(xlsx_error)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    sheet: &Sheet,
    header_format: &CellFormat,
) -> std::result::Result<(), XlsxError> {
    let name = if sheet.name.is_empty() {
        INDEX_SHEET
    } else {
        sheet.name.as_str()
    };
    worksheet.set_name(name)?;

    for (c, title) in sheet.columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col_index(c), title, header_format)?;
    }
    for (r, record) in sheet.records().enumerate() {
        let r = row_index(r + 1);
        for (c, cell) in record.into_iter().enumerate() {
            let c = col_index(c);
            match cell {
                None | Some(Value::Null) => {},
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(r, c, *b)?;
                },
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(r, c, f)?;
                    },
                    None => {
                        worksheet.write_string(r, c, n.to_string())?;
                    },
                },
                Some(other) => {
                    worksheet.write_string(r, c, cell_text(other))?;
                },
            }
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
const fn col_index(c: usize) -> u16 {
    if c > u16::MAX as usize { u16::MAX } else { c as u16 }
}

#[allow(clippy::cast_possible_truncation)]
const fn row_index(r: usize) -> u32 {
    if r > u32::MAX as usize { u32::MAX } else { r as u32 }
}

fn column(c: usize) -> Result<u16> {
    u16::try_from(c).map_err(|e| Error::operation("write_workbook", e))
}

fn row(r: usize) -> Result<u32> {
    u32::try_from(r).map_err(|e| Error::operation("write_workbook", e))
}

fn xlsx_error(e: XlsxError) -> Error {
    Error::operation("write_workbook", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::projector::Projector;
    use crate::models::CollectionPrefix;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_workbook() -> Workbook {
        let tree = json!({
            "collection:users": {
                "u1": {
                    "name": "Ada",
                    "collection:posts": {"p1": {"title": "Hello"}}
                },
                "u2": {"name": "Bob"}
            }
        });
        let Value::Object(tree) = tree else {
            unreachable!()
        };
        Projector::new(CollectionPrefix::default(), "doc_id")
            .project_tree(&tree)
            .unwrap()
    }

    #[test]
    fn test_write_then_read_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.xlsx");
        let workbook = sample_workbook();
        write_file(&path, &workbook).unwrap();

        let sheets = read_file(&path).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["INDEX", "users_1", "posts_2"]);

        let index = &sheets[0];
        assert_eq!(
            index.columns(),
            ["Sheet Name", "Collection", "Depth", "Documents", "Link"]
        );
        assert_eq!(index.rows()[1]["Collection"], json!("users/u1/posts"));
        assert_eq!(index.rows()[1]["Depth"], json!(3));

        let users = &sheets[1];
        assert_eq!(users.columns()[0], "doc_id");
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(matches!(
            read_file(Path::new("/no/such/book.xlsx")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(cell_value(&Data::Float(3.0)), json!(3));
        assert_eq!(cell_value(&Data::Float(2.5)), json!(2.5));
        assert_eq!(cell_value(&Data::Bool(true)), json!(true));
        assert_eq!(cell_value(&Data::Empty), Value::Null);
    }

    #[test]
    fn test_excel_serial_dates() {
        let t = excel_serial_to_utc(45_292.5).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }
}
