//! Core data models used throughout Keyword Harness.
//!
//! A [`Keyword`] is a named placeholder whose terms were produced by one
//! [`SourceKind`]. Sources hand back a [`TermSet`], the normalized
//! `(delimiter, columns, data)` triple stored on the keyword row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::SourceError;
use crate::terms::{encode_row, normalize_lines, sanitize_cell, split_term};

/// Maximum keyword name length (matches the unique index width).
pub const MAX_KEYWORD_LEN: usize = 191;

/// The set of keyword sources, one variant per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    CsvFile,
    CsvUrl,
    DatabaseTable,
    RssFeed,
    Spreadsheet,
    Ai,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::Local,
        SourceKind::CsvFile,
        SourceKind::CsvUrl,
        SourceKind::DatabaseTable,
        SourceKind::RssFeed,
        SourceKind::Spreadsheet,
        SourceKind::Ai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::CsvFile => "csv_file",
            SourceKind::CsvUrl => "csv_url",
            SourceKind::DatabaseTable => "database_table",
            SourceKind::RssFeed => "rss_feed",
            SourceKind::Spreadsheet => "spreadsheet",
            SourceKind::Ai => "ai",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SourceKind::ALL.iter().map(|k| k.as_str()).collect();
                SourceError::validation(
                    "unknown_source",
                    format!("Unknown source '{}'. Available: {}", s, known.join(", ")),
                )
            })
    }
}

/// A keyword and its materialized terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(default)]
    pub id: Option<i64>,
    pub keyword: String,
    pub source: SourceKind,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub delimiter: String,
    #[serde(default)]
    pub columns: String,
    #[serde(default)]
    pub data: String,
}

impl Keyword {
    /// A keyword that has not been through any source yet.
    pub fn draft(keyword: impl Into<String>, source: SourceKind, options: Map<String, Value>) -> Self {
        Self {
            id: None,
            keyword: keyword.into(),
            source,
            options,
            delimiter: String::new(),
            columns: String::new(),
            data: String::new(),
        }
    }

    /// The currently stored terms.
    pub fn terms(&self) -> TermSet {
        TermSet {
            delimiter: self.delimiter.clone(),
            columns: self.columns.clone(),
            data: self.data.clone(),
        }
    }

    /// Replaces the stored terms.
    pub fn with_terms(mut self, terms: TermSet) -> Self {
        self.delimiter = terms.delimiter;
        self.columns = terms.columns;
        self.data = terms.data;
        self
    }

    /// Checks the keyword name is usable as a placeholder.
    pub fn validate_name(name: &str) -> Result<(), SourceError> {
        if name.trim().is_empty() {
            return Err(SourceError::validation(
                "keyword_missing",
                "Please enter a keyword name.",
            ));
        }
        if name.len() > MAX_KEYWORD_LEN {
            return Err(SourceError::validation(
                "keyword_too_long",
                format!("Keyword names must be at most {} characters.", MAX_KEYWORD_LEN),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SourceError::validation(
                "keyword_invalid",
                format!(
                    "Keyword '{}' may only contain letters, numbers, underscores and hyphens.",
                    name
                ),
            ));
        }
        Ok(())
    }
}

/// The normalized `(delimiter, columns, data)` triple produced by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSet {
    pub delimiter: String,
    /// Comma-joined column names, or empty.
    pub columns: String,
    /// Newline-joined terms.
    pub data: String,
}

impl TermSet {
    /// Builds a term set for tabular data.
    ///
    /// Rows are cell-sanitized and encoded with [`encode_row`]. Headerless
    /// single-column data is kept unquoted with an empty delimiter, so plain
    /// lists stay readable.
    pub fn from_table(header: Option<Vec<String>>, rows: Vec<Vec<String>>, delimiter: &str) -> Self {
        let single_column = header.is_none() && rows.iter().all(|r| r.len() <= 1);

        if single_column {
            let data = rows
                .iter()
                .filter_map(|r| r.first())
                .map(|v| sanitize_cell(v.trim()))
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            return Self {
                delimiter: String::new(),
                columns: String::new(),
                data,
            };
        }

        let columns = header.map(|h| h.join(",")).unwrap_or_default();
        let data = rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|c| sanitize_cell(c)).collect();
                encode_row(&cells, delimiter)
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            delimiter: delimiter.to_string(),
            columns,
            data,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn terms(&self) -> Vec<String> {
        normalize_lines(&self.data)
    }

    /// Every term split into fields.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.terms()
            .iter()
            .map(|t| split_term(t, &self.delimiter))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.terms().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks every row splits into exactly one field per declared column.
    ///
    /// Returns the 1-based line number and field count of the first bad row.
    pub fn validate_shape(&self) -> Result<(), (usize, usize)> {
        let expected = self.column_names().len();
        if expected == 0 {
            return Ok(());
        }
        for (i, row) in self.rows().iter().enumerate() {
            if row.len() != expected {
                return Err((i + 1, row.len()));
            }
        }
        Ok(())
    }
}

/// A file in the media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: i64,
    pub file_name: String,
    pub mime_type: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_tags() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        let err = "sitemap".parse::<SourceKind>().unwrap_err();
        assert_eq!(err.code, "unknown_source");
        assert_eq!(
            serde_json::to_string(&SourceKind::DatabaseTable).unwrap(),
            "\"database_table\""
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(Keyword::validate_name("city").is_ok());
        assert!(Keyword::validate_name("service-area_2").is_ok());
        assert_eq!(Keyword::validate_name("").unwrap_err().code, "keyword_missing");
        assert_eq!(
            Keyword::validate_name("two words").unwrap_err().code,
            "keyword_invalid"
        );
    }

    #[test]
    fn test_from_table_with_header() {
        let set = TermSet::from_table(
            Some(vec!["city".into(), "zip".into()]),
            vec![
                vec!["Springfield".into(), "11111".into()],
                vec!["Shelbyville".into(), "22222".into()],
            ],
            ",",
        );
        assert_eq!(set.columns, "city,zip");
        assert_eq!(set.delimiter, ",");
        assert_eq!(set.data, "\"Springfield\",\"11111\"\n\"Shelbyville\",\"22222\"");
        assert!(set.validate_shape().is_ok());
        assert_eq!(set.rows()[1], vec!["Shelbyville", "22222"]);
    }

    #[test]
    fn test_from_table_single_column_is_plain() {
        let set = TermSet::from_table(
            None,
            vec![vec!["Springfield".into()], vec!["".into()], vec!["Ogdenville".into()]],
            ",",
        );
        assert_eq!(set.delimiter, "");
        assert_eq!(set.data, "Springfield\nOgdenville");
    }

    #[test]
    fn test_validate_shape_reports_bad_row() {
        let set = TermSet {
            delimiter: ",".into(),
            columns: "city,zip".into(),
            data: "Springfield,11111\nShelbyville".into(),
        };
        assert_eq!(set.validate_shape(), Err((2, 1)));
    }
}
