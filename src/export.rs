use crate::api_client::Record;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Display text of a cell; missing and null cells are blank
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(v) => v.to_string(),
    }
}

/// Write `records` as CSV with one column per entry of `columns`.
/// Returns the number of rows written.
pub fn write_records_csv(path: &Path, columns: &[String], records: &[Record]) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create {}", path.display()))?;

    wtr.write_record(columns)?;
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| cell_text(record.data.get(column)))
            .collect();
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_quotes_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selected.csv");
        let columns = vec!["name".to_string(), "note".to_string(), "qty".to_string()];
        let records = vec![
            Record {
                id: "1".to_string(),
                data: json!({"name": "acme, inc", "note": "say \"hi\"", "qty": 3})
                    .as_object()
                    .unwrap()
                    .clone(),
            },
            Record {
                id: "2".to_string(),
                data: json!({"name": "globex", "note": null})
                    .as_object()
                    .unwrap()
                    .clone(),
            },
        ];

        assert_eq!(write_records_csv(&path, &columns, &records).unwrap(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "name,note,qty\n\"acme, inc\",\"say \"\"hi\"\"\",3\nglobex,,\n"
        );
    }
}
