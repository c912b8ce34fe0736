//! Series name tokenizer
//!
//! The server echoes each part's alias back as the series name, e.g.
//! `'0'.'v'.'mac-1'`. Quotes may be `'` or `"`; a backslash escapes the next
//! character anywhere; `.` outside quotes separates sections.

use crate::query::{QueryError, QueryResult};

/// Split an encoded series name into its unquoted sections
pub fn split_sections(name: &str) -> QueryResult<Vec<String>> {
    let invalid = || QueryError::InvalidSeriesName(name.to_string());

    let mut sections = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = name.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(chars.next().ok_or_else(invalid)?),
            '\'' | '"' if quote.is_none() => quote = Some(c),
            c if Some(c) == quote => quote = None,
            '.' if quote.is_none() => sections.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(invalid());
    }
    sections.push(current);
    Ok(sections)
}
