//! CSV parsing shared by the CSV-file and CSV-URL sources.

use csv::ReaderBuilder;

use crate::error::SourceError;
use crate::models::TermSet;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parses CSV bytes into a [`TermSet`].
///
/// With `columns_first_row` the first record supplies the column names and
/// every data row is padded or truncated to the header width. Blank records
/// are skipped.
pub fn read_csv(bytes: &[u8], delimiter: &str, columns_first_row: bool) -> Result<TermSet, SourceError> {
    let delimiter = if delimiter.is_empty() { "," } else { delimiter };
    let delimiter_byte = match delimiter.as_bytes() {
        [b] => *b,
        _ => {
            return Err(SourceError::validation(
                "delimiter_invalid",
                format!(
                    "CSV delimiter must be a single character, got '{}'.",
                    delimiter
                ),
            ))
        }
    };

    let input = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(columns_first_row)
        .flexible(true)
        .from_reader(input);

    let header = if columns_first_row {
        let headers = reader
            .headers()
            .map_err(|e| SourceError::fetch("csv_parse", format!("Failed to read CSV header: {}", e)))?;
        let names: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let name = h.replace(',', "").trim().to_string();
                if name.is_empty() {
                    format!("column_{}", i + 1)
                } else {
                    name
                }
            })
            .collect();
        if names.is_empty() {
            return Err(SourceError::fetch("csv_parse", "The CSV file has no header row."));
        }
        Some(names)
    } else {
        None
    };

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            SourceError::fetch("csv_parse", format!("Failed to read CSV record {}: {}", i + 1, e))
        })?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        if let Some(names) = &header {
            row.resize(names.len(), String::new());
        }
        rows.push(row);
    }

    Ok(TermSet::from_table(header, rows, delimiter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_row_becomes_columns() {
        let csv = b"city,zip\nSpringfield,11111\nShelbyville,22222\n";
        let set = read_csv(csv, ",", true).unwrap();
        assert_eq!(set.columns, "city,zip");
        assert_eq!(set.len(), 2);
        assert!(set.validate_shape().is_ok());
        assert_eq!(set.rows()[0], vec!["Springfield", "11111"]);
    }

    #[test]
    fn test_comma_only_header_gets_placeholder_name() {
        let set = read_csv(b"a,\",\",c\n1,2,3\n", ",", true).unwrap();
        assert_eq!(set.columns, "a,column_2,c");
        assert!(set.validate_shape().is_ok());
    }

    #[test]
    fn test_custom_delimiter_and_quoted_values() {
        let csv = b"name;note\n\"Capital City\";\"a;b\"\n";
        let set = read_csv(csv, ";", true).unwrap();
        assert_eq!(set.delimiter, ";");
        assert_eq!(set.rows()[0], vec!["Capital City", "a;b"]);
    }

    #[test]
    fn test_ragged_rows_fit_header() {
        let csv = b"a,b,c\n1,2\n1,2,3,4\n";
        let set = read_csv(csv, ",", true).unwrap();
        assert!(set.validate_shape().is_ok());
        assert_eq!(set.rows()[0], vec!["1", "2", ""]);
    }

    #[test]
    fn test_embedded_newline_stays_on_one_line() {
        let csv = b"title,body\nHello,\"line one\nline two\"\n";
        let set = read_csv(csv, ",", true).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.rows()[0][1], "line one<br />line two");
    }

    #[test]
    fn test_headerless_single_column() {
        let csv = b"\xEF\xBB\xBFSpringfield\n\nShelbyville\n";
        let set = read_csv(csv, ",", false).unwrap();
        assert_eq!(set.delimiter, "");
        assert_eq!(set.data, "Springfield\nShelbyville");
    }

    #[test]
    fn test_multibyte_delimiter_rejected() {
        let err = read_csv(b"a||b", "||", false).unwrap_err();
        assert_eq!(err.code, "delimiter_invalid");
    }
}
