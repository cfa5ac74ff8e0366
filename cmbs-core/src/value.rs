//! Typed option values and the string coercion rules used by option files.
//!
//! Raw option strings are converted with a fixed precedence, the first
//! successful step wins:
//!
//! 1. floating point number
//! 2. `true` / `false` (case-insensitive)
//! 3. `#expression#`, evaluated through an [`ExpressionContext`]
//! 4. `[a,b,c]`, each element converted to a number or left as text
//! 5. anything else is kept as trimmed text
//!
//! An empty (or whitespace only) string has no value at all.
//!
//! ```
//! use cmbs_core::expression::StandardContext;
//! use cmbs_core::value::{coerce, ListItem, OptionValue};
//!
//! let ctx = StandardContext::new("/pool/SEP/", "/tmp/cmbs/");
//! let value = coerce("[a,1,b]", &ctx).unwrap();
//! assert_eq!(
//!     value,
//!     Some(OptionValue::List(vec![
//!         ListItem::Text("a".to_string()),
//!         ListItem::Number(1.0),
//!         ListItem::Text("b".to_string()),
//!     ]))
//! );
//! ```

use crate::errors::CmbsResult;
use crate::expression::{evaluate, ExpressionContext};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Element of a list option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListItem {
    Number(f64),
    Text(String),
}

impl ListItem {
    fn parse(token: &str) -> Self {
        let token = token.trim();
        match parse_number(token) {
            Some(x) => ListItem::Number(x),
            None => ListItem::Text(token.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ListItem::Number(x) => Some(*x),
            ListItem::Text(_) => None,
        }
    }
}

impl fmt::Display for ListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListItem::Number(x) => write!(f, "{x}"),
            ListItem::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A coerced option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    List(Vec<ListItem>),
    Text(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            OptionValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ListItem]> {
        match self {
            OptionValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Number(x) => write!(f, "{x}"),
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            OptionValue::List(items) => {
                let items = items.iter().map(|i| i.to_string()).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(","))
            }
            OptionValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Options of one section; a key may be present without a value.
pub type OptionMap = BTreeMap<String, Option<OptionValue>>;

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Convert a raw option string into a typed value.
///
/// Returns `Ok(None)` for an empty string. Expression failures are fatal.
pub fn coerce(raw: &str, ctx: &dyn ExpressionContext) -> CmbsResult<Option<OptionValue>> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }

    if let Some(x) = parse_number(s) {
        return Ok(Some(OptionValue::Number(x)));
    }

    if s.eq_ignore_ascii_case("true") {
        return Ok(Some(OptionValue::Bool(true)));
    }
    if s.eq_ignore_ascii_case("false") {
        return Ok(Some(OptionValue::Bool(false)));
    }

    if s.len() >= 2 && s.starts_with('#') && s.ends_with('#') {
        let result = evaluate(&s[1..s.len() - 1], ctx)?;
        return Ok(Some(OptionValue::Text(result)));
    }

    if s.starts_with('[') && s.ends_with(']') {
        return Ok(Some(OptionValue::List(parse_list(&s[1..s.len() - 1]))));
    }

    Ok(Some(OptionValue::Text(s.to_string())))
}

fn parse_list(inner: &str) -> Vec<ListItem> {
    // "[]" is an empty list rather than a list holding one empty string
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner.split(',').map(ListItem::parse).collect()
}
