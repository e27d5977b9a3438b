//! Parsing of the M source line that feeds a partition.
//!
//! Only the shape of a catalog-access call is understood here: the name of
//! the called function and the top-level arguments of its first parenthesis
//! group. Everything inside the arguments is treated as opaque text.

use indexmap::IndexMap;

use crate::error::ExtractError;
use crate::scanner::{Scanner, TokenType};

/// The only catalog-access call lineage is extracted from.
pub const SQL_DATABASE_SOURCE: &str = "Sql.Database";

const LINE_FEED_ESCAPE: &str = "#(lf)";
const TAB_ESCAPE: &str = "#(tab)";

/// Classification of a partition's call line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCall {
    /// Name of the called function, e.g. `Sql.Database`.
    pub source_type: String,
    /// Number of top-level argument separators in the first call group,
    /// i.e. the number of argument slots minus one.
    pub argument_count: usize,
    /// Only host and database were given: the table is referenced by the
    /// navigation literal on the following line instead of by a query.
    pub is_direct_import: bool,
    /// The right-hand side of the call line.
    pub call_text: String,
    /// Byte ranges of the top-level arguments within `call_text`.
    arguments: Vec<(usize, usize)>,
}

impl ParsedCall {
    pub fn argument(&self, idx: usize) -> Option<&str> {
        self.arguments
            .get(idx)
            .map(|&(start, end)| &self.call_text[start..end])
    }

    /// The call text after the separator following argument `idx`, verbatim
    /// up to the end of the line.
    pub fn text_after_argument(&self, idx: usize) -> Option<&str> {
        self.arguments
            .get(idx + 1)
            .map(|&(start, _)| &self.call_text[start..])
    }
}

/// Classifies the call on line 1 of a partition expression.
pub fn classify(expression: &[String]) -> Result<ParsedCall, ExtractError> {
    let line = expression
        .get(1)
        .ok_or_else(|| ExtractError::Unparsable("expression has no call line".to_owned()))?;
    let (_, call_text) = line
        .split_once('=')
        .ok_or_else(|| ExtractError::Unparsable(format!("no assignment in `{}`", line.trim())))?;

    let (source_type, _) = call_text
        .split_once('(')
        .ok_or_else(|| ExtractError::Unparsable(format!("no call in `{}`", call_text.trim())))?;
    let source_type = source_type.trim();
    if source_type != SQL_DATABASE_SOURCE {
        return Err(ExtractError::UnrecognizedSourceType(source_type.to_owned()));
    }

    let arguments = call_arguments(call_text)?;
    let argument_count = arguments.len().saturating_sub(1);
    Ok(ParsedCall {
        source_type: source_type.to_owned(),
        argument_count,
        is_direct_import: argument_count == 1,
        call_text: call_text.to_owned(),
        arguments,
    })
}

/// Splits the first parenthesis group of `call_text` on its top-level commas.
/// Commas inside string literals or nested brackets do not separate
/// arguments. An unclosed group runs to the end of the text.
///
/// Text the scanner rejects (an unterminated string or comment) is split
/// with `split_call_arguments` instead.
fn call_arguments(call_text: &str) -> Result<Vec<(usize, usize)>, ExtractError> {
    let mut scanner = Scanner::new(call_text);
    if let Err(err) = scanner.scan() {
        log::debug!("Splitting call arguments on plain commas: {}", err);
        return Ok(split_call_arguments(call_text));
    }

    let mut tokens = scanner
        .tokens()
        .iter()
        .skip_while(|tok| tok.kind != TokenType::LeftParen);
    let open = tokens
        .next()
        .ok_or_else(|| ExtractError::Unparsable(format!("no call in `{}`", call_text.trim())))?;

    let mut arguments = vec![];
    let mut arg_start = open.end;
    let mut depth = 1;
    for tok in tokens {
        match tok.kind {
            TokenType::LeftParen | TokenType::LeftSquare | TokenType::LeftBrace => depth += 1,
            TokenType::RightParen | TokenType::RightSquare | TokenType::RightBrace => {
                depth -= 1;
                if depth == 0 {
                    arguments.push((arg_start, tok.start));
                    return Ok(arguments);
                }
            }
            TokenType::Comma if depth == 1 => {
                arguments.push((arg_start, tok.start));
                arg_start = tok.end;
            }
            TokenType::Eof => break,
            _ => {}
        }
    }
    arguments.push((arg_start, call_text.len()));
    Ok(arguments)
}

/// Splits the text between the first `(` and the next `)` on every comma,
/// ignoring quoting and nesting.
fn split_call_arguments(call_text: &str) -> Vec<(usize, usize)> {
    let start = call_text.find('(').map_or(0, |open| open + 1);
    let end = call_text[start..]
        .find(')')
        .map_or(call_text.len(), |close| start + close);

    let mut arguments = vec![];
    let mut arg_start = start;
    for (idx, _) in call_text[start..end].match_indices(',') {
        arguments.push((arg_start, start + idx));
        arg_start = start + idx + 1;
    }
    arguments.push((arg_start, end));
    arguments
}

/// Text strictly between the first and the last `"` of `text`, or an empty
/// string when there are fewer than two quotes.
pub fn quoted_span(text: &str) -> &str {
    match (text.find('"'), text.rfind('"')) {
        (Some(first), Some(last)) if first < last => &text[first + 1..last],
        _ => "",
    }
}

/// Replaces M escape tokens inside extracted SQL and collapses doubled
/// quotes. The substitutions run in a fixed order.
pub fn normalize_query(sql: &str) -> String {
    let sql = sql.replace(LINE_FEED_ESCAPE, " ");
    let sql = collapse_quote_runs(&sql);
    sql.replace(TAB_ESCAPE, " ")
}

fn collapse_quote_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_quote = false;
    for c in text.chars() {
        if c == '"' && prev_quote {
            continue;
        }
        prev_quote = c == '"';
        out.push(c);
    }
    out
}

/// Strips one layer of surrounding double quotes.
pub fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}

/// Parses the first `{[Key="value", ...]}` literal of `text` into a map of
/// lower-cased keys to unquoted values. Single level only: nested braces or
/// commas inside values are not supported.
pub fn extract_braced(text: &str) -> Option<IndexMap<String, String>> {
    let open = text.find('{')?;
    let close = open + text[open..].find('}')?;
    let fields = text[open + 1..close]
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| {
            let key = key.trim().trim_start_matches('[').trim().to_lowercase();
            let value = value.replace('"', "");
            let value = value.trim_end();
            let value = value.strip_suffix(']').unwrap_or(value).trim().to_owned();
            (key, value)
        })
        .collect();
    Some(fields)
}
