//! Term escaping and splitting.
//!
//! Keyword data is stored as one term per line. Multi-column terms are
//! encoded as quoted, slash-escaped fields joined by the keyword's delimiter,
//! so a delimiter or quote inside a value never breaks the row apart and a
//! newline inside a value never breaks the one-term-per-line layout.
//!
//! ```text
//! ["Springfield", "O'Hare \"North\""]  ──encode_row(",")──▶  "Springfield","O\'Hare \"North\""
//! ```
//!
//! [`split_term`] is the inverse and also accepts plain unquoted rows such as
//! `Springfield,11111`, which is how hand-written local terms look.

/// Line-break token substituted for embedded newlines in tabular cells.
pub const LINE_BREAK: &str = "<br />";

/// Backslash-escapes `'`, `"`, `\` and NUL.
pub fn addslashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\'' | '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses [`addslashes`].
pub fn stripslashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('0') => out.push('\0'),
                Some(next) => out.push(next),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Replaces newlines with [`LINE_BREAK`] and removes tabs.
///
/// Used for database, CSV and spreadsheet cells, where a line break inside a
/// value is meaningful and should survive as markup.
pub fn sanitize_cell(value: &str) -> String {
    value
        .replace("\r\n", LINE_BREAK)
        .replace(['\r', '\n'], LINE_BREAK)
        .replace('\t', "")
}

/// Removes carriage returns, newlines and tabs entirely.
///
/// Used for feed fields, whose HTML bodies are full of formatting whitespace.
pub fn strip_breaks(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n' | '\t')).collect()
}

/// Encodes one row: each field quoted and slash-escaped, joined by `delimiter`.
pub fn encode_row<S: AsRef<str>>(fields: &[S], delimiter: &str) -> String {
    fields
        .iter()
        .map(|f| format!("\"{}\"", addslashes(f.as_ref())))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Splits a stored term into its fields.
///
/// Quoted fields may contain the delimiter, backslash escapes and doubled
/// quotes. Unquoted fields are split on the delimiter verbatim. An empty
/// delimiter means the term is a single field.
pub fn split_term(term: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![term.to_string()];
    }

    let mut fields = Vec::new();
    let mut rest = term;
    loop {
        let (field, remainder) = match rest.strip_prefix('"') {
            Some(quoted) => take_quoted(quoted, delimiter),
            None => match rest.find(delimiter) {
                Some(pos) => (
                    rest[..pos].to_string(),
                    Some(&rest[pos + delimiter.len()..]),
                ),
                None => (rest.to_string(), None),
            },
        };
        fields.push(field);
        match remainder {
            Some(r) => rest = r,
            None => break,
        }
    }
    fields
}

fn take_quoted<'a>(s: &'a str, delimiter: &str) -> (String, Option<&'a str>) {
    let mut out = String::new();
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '0')) => out.push('\0'),
                Some((_, next)) => out.push(next),
                None => {}
            },
            '"' => {
                if let Some(&(_, '"')) = chars.peek() {
                    chars.next();
                    out.push('"');
                    continue;
                }
                // Anything between the closing quote and the next delimiter is dropped.
                let after = &s[i + 1..];
                return match after.find(delimiter) {
                    Some(pos) => (out, Some(&after[pos + delimiter.len()..])),
                    None => (out, None),
                };
            }
            _ => out.push(c),
        }
    }
    (out, None)
}

/// Normalizes line endings, trims each line and drops blank lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalizes a comma-separated column list: trims names and drops blanks.
pub fn normalize_columns(columns: &str) -> String {
    columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addslashes_escapes_quotes_and_backslashes() {
        assert_eq!(addslashes(r#"O'Hare "North" \"#), r#"O\'Hare \"North\" \\"#);
        assert_eq!(stripslashes(&addslashes("a'b\"c\\d\0e")), "a'b\"c\\d\0e");
    }

    #[test]
    fn test_sanitize_cell() {
        assert_eq!(sanitize_cell("line one\r\nline two\nthree\tfour"), "line one<br />line two<br />threefour");
    }

    #[test]
    fn test_strip_breaks() {
        assert_eq!(strip_breaks("Breaking\nNews\t\r!"), "BreakingNews!");
    }

    #[test]
    fn test_encode_then_split_with_delimiter_inside_value() {
        let row = encode_row(&["Springfield, IL", "He said \"hi\""], ",");
        assert_eq!(row, r#""Springfield, IL","He said \"hi\"""#);
        assert_eq!(split_term(&row, ","), vec!["Springfield, IL", "He said \"hi\""]);
    }

    #[test]
    fn test_split_unquoted() {
        assert_eq!(split_term("Springfield,11111", ","), vec!["Springfield", "11111"]);
        assert_eq!(split_term("Springfield 11111", ","), vec!["Springfield 11111"]);
        assert_eq!(split_term("a|b|", "|"), vec!["a", "b", ""]);
    }

    #[test]
    fn test_split_multichar_delimiter_and_empty_fields() {
        assert_eq!(split_term(r#""x"::"""::"z""#, "::"), vec!["x", "", "z"]);
    }

    #[test]
    fn test_split_doubled_quotes() {
        assert_eq!(split_term(r#""say ""cheese""",b"#, ","), vec!["say \"cheese\"", "b"]);
    }

    #[test]
    fn test_split_empty_delimiter_is_single_field() {
        assert_eq!(split_term("a,b", ""), vec!["a,b"]);
    }

    #[test]
    fn test_normalize_lines() {
        assert_eq!(normalize_lines("  one\r\n\r\ntwo \rthree\n"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_normalize_columns() {
        assert_eq!(normalize_columns(" city , zip,, "), "city,zip");
    }
}
