//! Delimited-text legacy formats
//!
//! Tables are parsed eagerly into strings; numeric interpretation is left to
//! consumers via [`DelimitedTable::numeric_column`].

use crate::error::{FeedError, Result};
use crate::types::{LegacyFormat, MessageKind};

/// A parsed delimited table
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedTable {
    pub format: LegacyFormat,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DelimitedTable {
    /// Parse text in the given format.
    ///
    /// The header must carry the format's prefix and every row must have as
    /// many fields as the header.
    pub fn parse(format: LegacyFormat, text: &str) -> Result<Self> {
        let kind = MessageKind::DelimitedLegacyFormat(format);
        let delimiter = format.delimiter();

        let mut lines = text
            .trim_start_matches('\u{feff}')
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| FeedError::schema(kind, "empty table"))?;
        if !header_line.starts_with(format.header_prefix()) {
            return Err(FeedError::schema(kind, "header does not match format"));
        }
        let headers = split_fields(header_line, delimiter);

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let fields = split_fields(line, delimiter);
            if fields.len() != headers.len() {
                return Err(FeedError::schema(
                    kind,
                    format!(
                        "line {} has {} fields, expected {}",
                        line_no + 1,
                        fields.len(),
                        headers.len()
                    ),
                ));
            }
            rows.push(fields);
        }

        Ok(Self {
            format,
            headers,
            rows,
        })
    }

    /// Index of a named column
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Values of a column parsed as numbers; unparsable cells are `None`
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row[idx].trim().parse::<f64>().ok())
                .collect(),
        )
    }

    /// Render back to delimited text
    pub fn to_text(&self) -> String {
        let delimiter = self.format.delimiter();
        let separator = delimiter.to_string();
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            let fields: Vec<String> = line.iter().map(|f| quote_field(f, delimiter)).collect();
            out.push_str(&fields.join(separator.as_str()));
            out.push('\n');
        }
        out
    }
}

/// Split one line, honouring double-quoted fields and `""` escapes
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
