//! Render helpers
//!
//! A fixed registry of helpers evaluated while rendering a response. Every
//! helper is pure apart from `formatDate`, which defers to chrono. Arguments
//! arrive as JSON values; a missing argument behaves like an absent value.

use crate::settings::SettingsDocument;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::error::AppError;

const DEFAULT_ROW_CLASS: &str = "col-md-6 col-xl-6 col m6 xl6 product-item";
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";
const INVALID_DATE: &str = "Invalid date";

static ABSENT: Value = Value::Null;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown helper '{0}'")]
pub struct UnknownHelper(pub String);

/// Every helper a template may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    PerRowClass,
    MenuMatch,
    GetTheme,
    FormatAmount,
    AmountNoDecimal,
    GetStatusColor,
    CheckProductOptions,
    CurrencySymbol,
    ObjectLength,
    CheckedState,
    SelectState,
    IsNull,
    ToLower,
    FormatDate,
    IfCond,
    IsAnAdmin,
}

impl Helper {
    pub const ALL: [Helper; 16] = [
        Helper::PerRowClass,
        Helper::MenuMatch,
        Helper::GetTheme,
        Helper::FormatAmount,
        Helper::AmountNoDecimal,
        Helper::GetStatusColor,
        Helper::CheckProductOptions,
        Helper::CurrencySymbol,
        Helper::ObjectLength,
        Helper::CheckedState,
        Helper::SelectState,
        Helper::IsNull,
        Helper::ToLower,
        Helper::FormatDate,
        Helper::IfCond,
        Helper::IsAnAdmin,
    ];

    /// The name templates call the helper by
    pub fn name(&self) -> &'static str {
        match self {
            Helper::PerRowClass => "perRowClass",
            Helper::MenuMatch => "menuMatch",
            Helper::GetTheme => "getTheme",
            Helper::FormatAmount => "formatAmount",
            Helper::AmountNoDecimal => "amountNoDecimal",
            Helper::GetStatusColor => "getStatusColor",
            Helper::CheckProductOptions => "checkProductOptions",
            Helper::CurrencySymbol => "currencySymbol",
            Helper::ObjectLength => "objectLength",
            Helper::CheckedState => "checkedState",
            Helper::SelectState => "selectState",
            Helper::IsNull => "isNull",
            Helper::ToLower => "toLower",
            Helper::FormatDate => "formatDate",
            Helper::IfCond => "ifCond",
            Helper::IsAnAdmin => "isAnAdmin",
        }
    }
}

impl FromStr for Helper {
    type Err = UnknownHelper;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Helper::ALL
            .iter()
            .copied()
            .find(|helper| helper.name() == s)
            .ok_or_else(|| UnknownHelper(s.to_string()))
    }
}

/// Operators accepted by `ifCond`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    StrictEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl CompareOp {
    /// `None` for anything outside the operator set
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::NotEq),
            "===" => Some(CompareOp::StrictEq),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "&&" => Some(CompareOp::And),
            "||" => Some(CompareOp::Or),
            _ => None,
        }
    }

    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::Eq | CompareOp::StrictEq => strict_eq(left, right),
            CompareOp::NotEq => !strict_eq(left, right),
            CompareOp::Lt => compare(left, right) == Some(Ordering::Less),
            CompareOp::Le => matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => compare(left, right) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::And => truthy(left) && truthy(right),
            CompareOp::Or => truthy(left) || truthy(right),
        }
    }
}

/// Which block a block helper renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Then,
    Else,
}

impl From<bool> for Branch {
    fn from(condition: bool) -> Self {
        if condition {
            Branch::Then
        } else {
            Branch::Else
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HelperOutput {
    Text(String),
    Number(u64),
    Null,
    Branch(Branch),
}

impl HelperOutput {
    fn text(s: impl Into<String>) -> Self {
        HelperOutput::Text(s.into())
    }

    /// JSON form, with branches rendered as booleans
    pub fn to_value(&self) -> Value {
        match self {
            HelperOutput::Text(s) => Value::String(s.clone()),
            HelperOutput::Number(n) => Value::from(*n),
            HelperOutput::Null => Value::Null,
            HelperOutput::Branch(branch) => Value::Bool(*branch == Branch::Then),
        }
    }
}

/// Helpers bound to the settings snapshot of one request
#[derive(Debug, Clone)]
pub struct Helpers {
    settings: Arc<SettingsDocument>,
}

impl Helpers {
    pub fn new(settings: Arc<SettingsDocument>) -> Self {
        Self { settings }
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Helper::ALL.iter().map(Helper::name)
    }

    #[cfg(test)]
    pub fn call_named(&self, name: &str, args: &[Value]) -> Result<HelperOutput, UnknownHelper> {
        Ok(self.call(name.parse()?, args))
    }

    pub fn call(&self, helper: Helper, args: &[Value]) -> HelperOutput {
        let arg = |i: usize| args.get(i).unwrap_or(&ABSENT);

        match helper {
            Helper::PerRowClass => HelperOutput::text(per_row_class(arg(0))),
            Helper::MenuMatch => HelperOutput::text(menu_match(arg(0), arg(1))),
            Helper::GetTheme => HelperOutput::Text(format!(
                "themes/{}/{}",
                self.settings.theme,
                display(arg(0))
            )),
            Helper::FormatAmount => HelperOutput::Text(format_amount(arg(0))),
            Helper::AmountNoDecimal => HelperOutput::Text(amount_no_decimal(arg(0))),
            Helper::GetStatusColor => HelperOutput::text(status_color(arg(0))),
            Helper::CheckProductOptions => HelperOutput::text(truthy(arg(0)).to_string()),
            Helper::CurrencySymbol => match arg(0) {
                Value::Null => HelperOutput::text("$"),
                Value::String(s) if s.is_empty() => HelperOutput::text("$"),
                other => HelperOutput::Text(display(other)),
            },
            Helper::ObjectLength => HelperOutput::Number(object_length(arg(0))),
            Helper::CheckedState => {
                if is_true(arg(0)) {
                    HelperOutput::text("checked")
                } else {
                    HelperOutput::text("")
                }
            }
            Helper::SelectState => {
                if strict_eq(arg(0), arg(1)) {
                    HelperOutput::text("selected")
                } else {
                    HelperOutput::text("")
                }
            }
            Helper::IsNull => {
                let absent = match arg(0) {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                };
                HelperOutput::Branch(absent.into())
            }
            Helper::ToLower => {
                if truthy(arg(0)) {
                    HelperOutput::Text(display(arg(0)).to_lowercase())
                } else {
                    HelperOutput::Null
                }
            }
            Helper::FormatDate => HelperOutput::Text(format_date(arg(0), arg(1))),
            Helper::IfCond => {
                let branch = match arg(1).as_str().and_then(CompareOp::parse) {
                    Some(op) => op.apply(arg(0), arg(2)).into(),
                    None => Branch::Else,
                };
                HelperOutput::Branch(branch)
            }
            Helper::IsAnAdmin => HelperOutput::Branch(is_true(arg(0)).into()),
        }
    }
}

impl<S> FromRequestParts<S> for Helpers
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Helpers>()
            .cloned()
            .ok_or_else(|| AppError::Internal("render helpers are not attached".to_string()))
    }
}

/// Truthiness of a template value: null, false, 0, NaN and "" are false
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `true` or the string `"true"`
pub fn is_true(value: &Value) -> bool {
    matches!(value, Value::Bool(true)) || value.as_str() == Some("true")
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Relational order with loose coercion: two strings order lexicographically,
/// any other pair orders as numbers. A side with no numeric value never orders.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Some(a.cmp(b));
    }
    let numeric = |value: &Value| match value {
        Value::Null => Some(0.0),
        other => to_number(other),
    };
    numeric(left)?.partial_cmp(&numeric(right)?)
}

/// Text form of a value as it would be interpolated
fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Leading-integer parse: `"3px"` is 3, `"px3"` is nothing
fn leading_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn per_row_class(count: &Value) -> &'static str {
    match leading_int(count) {
        Some(1) => "col-md-12 col-xl-12 col m12 xl12 product-item",
        Some(2) => DEFAULT_ROW_CLASS,
        Some(3) => "col-md-4 col-xl-4 col m4 xl4 product-item",
        Some(4) => "col-md-3 col-xl-3 col m3 xl3 product-item",
        _ => DEFAULT_ROW_CLASS,
    }
}

fn menu_match(title: &Value, search: &Value) -> &'static str {
    match (title.as_str(), search.as_str()) {
        (Some(title), Some(search)) if !title.is_empty() && !search.is_empty() => {
            if title.to_lowercase().starts_with(&search.to_lowercase()) {
                "class=\"navActive\""
            } else {
                ""
            }
        }
        _ => "",
    }
}

pub fn format_amount(amount: &Value) -> String {
    if !truthy(amount) {
        return "0.00".to_string();
    }
    let n = to_number(amount).filter(|n| n.is_finite()).unwrap_or(0.0);
    format!("{:.2}", n)
}

pub fn amount_no_decimal(amount: &Value) -> String {
    let formatted = format_amount(amount);
    if truthy(amount) {
        formatted.replacen('.', "", 1)
    } else {
        formatted
    }
}

/// Unknown statuses are failures
pub fn status_color(status: &Value) -> &'static str {
    match status.as_str() {
        Some("Paid" | "Approved" | "Approved - Processing" | "Completed" | "Shipped") => {
            "success"
        }
        Some("Pending") => "warning",
        _ => "danger",
    }
}

fn object_length(value: &Value) -> u64 {
    match value {
        Value::Object(map) => map.len() as u64,
        Value::Array(items) => items.len() as u64,
        Value::String(s) => s.chars().count() as u64,
        _ => 0,
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Null => Some(Utc::now()),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
            }),
        _ => None,
    }
}

/// Format `date` with a strftime-style `format`; an absent date means now
pub fn format_date(date: &Value, format: &Value) -> String {
    let Some(date) = parse_date(date) else {
        return INVALID_DATE.to_string();
    };
    let format = format.as_str().unwrap_or(DEFAULT_DATE_FORMAT);

    let mut out = String::new();
    match write!(out, "{}", date.format(format)) {
        Ok(()) => out,
        Err(_) => INVALID_DATE.to_string(),
    }
}
