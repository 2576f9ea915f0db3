//! Spreadsheet keyword source: the first worksheet of an XLSX file in the
//! media library.
//!
//! Behaves like the CSV file source: the attachment is re-resolved on every
//! refresh, and a file removed from the media library is reported with the
//! keyword's name rather than falling back to stale data.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SourceError;
use crate::media;
use crate::models::{Keyword, SourceKind, TermSet};
use crate::spreadsheet::read_xlsx;
use crate::traits::{
    lenient_bool, lenient_i64, parse_options, KeywordSource, OptionDescriptor, OptionKind,
    SourceContext, SourceDescriptor,
};

#[derive(Debug, Deserialize)]
struct SpreadsheetOptions {
    #[serde(default, deserialize_with = "lenient_i64")]
    attachment_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    columns_first_row: bool,
}

pub struct SpreadsheetSource;

impl SpreadsheetSource {
    async fn fetch(&self, ctx: &SourceContext, keyword: &Keyword) -> Result<TermSet, SourceError> {
        let opts: SpreadsheetOptions = parse_options(keyword, self.label())?;
        let id = opts.attachment_id.ok_or_else(|| {
            SourceError::validation(
                "attachment_required",
                format!("Please choose a spreadsheet for keyword '{}'.", keyword.keyword),
            )
        })?;

        let path = media::resolve_for_keyword(ctx, keyword, id, "spreadsheet").await?;
        let bytes = std::fs::read(&path).map_err(|e| {
            SourceError::fetch(
                "file_unreadable",
                format!("Could not read {}: {}", path.display(), e),
            )
        })?;

        let mut rows = read_xlsx(&bytes)?;
        Ok(table_terms(&mut rows, opts.columns_first_row))
    }
}

/// Splits off the header row when requested and builds the term set.
fn table_terms(rows: &mut Vec<Vec<String>>, columns_first_row: bool) -> TermSet {
    let header = if columns_first_row && !rows.is_empty() {
        let raw = rows.remove(0);
        Some(
            raw.iter()
                .enumerate()
                .map(|(i, name)| {
                    let name = name.replace(',', "").trim().to_string();
                    if name.is_empty() {
                        format!("column_{}", i + 1)
                    } else {
                        name
                    }
                })
                .collect(),
        )
    } else {
        None
    };
    TermSet::from_table(header, std::mem::take(rows), ",")
}

#[async_trait]
impl KeywordSource for SpreadsheetSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Spreadsheet
    }

    fn label(&self) -> &str {
        "Spreadsheet"
    }

    async fn register(&self, _ctx: &SourceContext, mut sources: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        sources.push(SourceDescriptor {
            name: self.name().to_string(),
            label: self.label().to_string(),
            options: vec![
                OptionDescriptor::new(
                    "attachment_id",
                    OptionKind::Attachment,
                    "Spreadsheet",
                    "An XLSX file from the media library. Only the first sheet is read.",
                ),
                OptionDescriptor::new(
                    "columns_first_row",
                    OptionKind::Toggle,
                    "First row is columns",
                    "Use the values in the first row as column names.",
                ),
            ],
        });
        sources
    }

    async fn save(&self, ctx: &SourceContext, keyword: Keyword) -> Result<Keyword, SourceError> {
        let terms = self.fetch(ctx, &keyword).await?;
        Ok(keyword.with_terms(terms))
    }

    async fn refresh_terms(
        &self,
        ctx: &SourceContext,
        _existing: TermSet,
        keyword: &Keyword,
    ) -> Result<TermSet, SourceError> {
        self.fetch(ctx, keyword).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::tests::minimal_xlsx;

    #[test]
    fn test_header_row_becomes_columns() {
        let xlsx = minimal_xlsx(
            &["city", "zip", "Springfield"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
               <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>11111</v></c><c r="C2"><v>7</v></c></row>"#,
        );
        let mut rows = read_xlsx(&xlsx).unwrap();
        let terms = table_terms(&mut rows, true);
        assert_eq!(terms.columns, "city,zip,column_3");
        assert_eq!(terms.delimiter, ",");
        assert_eq!(terms.data, "\"Springfield\",\"11111\",\"7\"");
        assert!(terms.validate_shape().is_ok());
    }

    #[test]
    fn test_single_column_without_header_is_plain() {
        let xlsx = minimal_xlsx(
            &["Springfield", "Shelbyville"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="2"><c r="A2" t="s"><v>1</v></c></row>"#,
        );
        let mut rows = read_xlsx(&xlsx).unwrap();
        let terms = table_terms(&mut rows, false);
        assert_eq!(terms.delimiter, "");
        assert_eq!(terms.data, "Springfield\nShelbyville");
    }
}
