//! Structured selector queries over JSON world state values.
//!
//! A query document looks like
//! `{"selector": {...}, "limit": n, "skip": n, "fields": [..]}`.
//! Selectors use field paths (dotted for nested members) mapped to either a
//! literal (implicit `$eq`), a nested selector, or an object of operators.

use certledger_core::{LedgerError, LedgerResult};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// A parsed query document
#[derive(Debug, Clone)]
pub struct Query {
    selector: Selector,
    limit: Option<usize>,
    skip: usize,
    fields: Option<Vec<String>>,
}

impl Query {
    /// Parse a query document from its JSON text
    ///
    /// # Errors
    ///
    /// Returns `Query` if the text is not a valid query document
    pub fn parse(text: &str) -> LedgerResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| LedgerError::query(format!("query is not JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse a query document
    ///
    /// # Errors
    ///
    /// Returns `Query` if the value is not a valid query document
    pub fn from_value(value: &Value) -> LedgerResult<Self> {
        let doc = value
            .as_object()
            .ok_or_else(|| LedgerError::query("query must be a JSON object"))?;

        let mut query = Self {
            selector: Selector::All(Vec::new()),
            limit: None,
            skip: 0,
            fields: None,
        };
        let mut saw_selector = false;

        for (name, member) in doc {
            match name.as_str() {
                "selector" => {
                    let obj = member
                        .as_object()
                        .ok_or_else(|| LedgerError::query("selector must be an object"))?;
                    query.selector = Selector::parse(obj, &[])?;
                    saw_selector = true;
                }
                "limit" => query.limit = Some(as_count(member, "limit")?),
                "skip" => query.skip = as_count(member, "skip")?,
                "fields" => {
                    let list = member
                        .as_array()
                        .ok_or_else(|| LedgerError::query("fields must be an array"))?;
                    let fields = list
                        .iter()
                        .map(|f| {
                            f.as_str()
                                .map(str::to_string)
                                .ok_or_else(|| LedgerError::query("fields entries must be strings"))
                        })
                        .collect::<LedgerResult<Vec<_>>>()?;
                    query.fields = Some(fields);
                }
                other => {
                    return Err(LedgerError::query(format!(
                        "unsupported query member {other:?}"
                    )));
                }
            }
        }

        if !saw_selector {
            return Err(LedgerError::query("query has no selector"));
        }
        Ok(query)
    }

    /// Check a document against the selector
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        self.selector.matches(doc)
    }

    /// Apply the `fields` projection
    #[must_use]
    pub fn project(&self, doc: Value) -> Value {
        let Some(fields) = &self.fields else {
            return doc;
        };
        let mut out = Map::new();
        for field in fields {
            let path: Vec<&str> = field.split('.').collect();
            if let Some(v) = resolve(&doc, &path) {
                insert_path(&mut out, &path, v.clone());
            }
        }
        Value::Object(out)
    }

    /// Maximum results, if the query sets one
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Results to skip before the first returned one
    #[must_use]
    pub const fn skip(&self) -> usize {
        self.skip
    }

    /// Check if the query carries a `fields` projection
    #[must_use]
    pub const fn has_projection(&self) -> bool {
        self.fields.is_some()
    }
}

fn as_count(value: &Value, name: &str) -> LedgerResult<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| LedgerError::query(format!("{name} must be a non-negative integer")))
}

/// Predicate over a whole document
#[derive(Debug, Clone)]
enum Selector {
    All(Vec<Selector>),
    Any(Vec<Selector>),
    NoneOf(Vec<Selector>),
    Not(Box<Selector>),
    Field(Vec<String>, Condition),
}

impl Selector {
    fn parse(obj: &Map<String, Value>, prefix: &[String]) -> LedgerResult<Self> {
        let mut clauses = Vec::with_capacity(obj.len());
        for (name, operand) in obj {
            let clause = match name.as_str() {
                "$and" => Self::All(Self::parse_list(name, operand, prefix)?),
                "$or" => Self::Any(Self::parse_list(name, operand, prefix)?),
                "$nor" => Self::NoneOf(Self::parse_list(name, operand, prefix)?),
                "$not" => {
                    let inner = operand
                        .as_object()
                        .ok_or_else(|| LedgerError::query("$not expects a selector object"))?;
                    Self::Not(Box::new(Self::parse(inner, prefix)?))
                }
                op if op.starts_with('$') => {
                    return Err(LedgerError::query(format!("unknown combinator {op}")));
                }
                field => {
                    let mut path = prefix.to_vec();
                    path.extend(field.split('.').map(str::to_string));
                    Self::parse_field(path, operand)?
                }
            };
            clauses.push(clause);
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::All(clauses)
        })
    }

    fn parse_list(name: &str, operand: &Value, prefix: &[String]) -> LedgerResult<Vec<Self>> {
        let list = operand
            .as_array()
            .ok_or_else(|| LedgerError::query(format!("{name} expects an array of selectors")))?;
        list.iter()
            .map(|item| {
                let obj = item
                    .as_object()
                    .ok_or_else(|| LedgerError::query(format!("{name} entries must be objects")))?;
                Self::parse(obj, prefix)
            })
            .collect()
    }

    fn parse_field(path: Vec<String>, operand: &Value) -> LedgerResult<Self> {
        let Some(obj) = operand.as_object() else {
            return Ok(Self::Field(path, Condition::Eq(operand.clone())));
        };
        if obj.is_empty() {
            return Ok(Self::Field(path, Condition::Eq(operand.clone())));
        }
        let operators = obj.keys().filter(|k| k.starts_with('$')).count();
        if operators == obj.len() {
            Ok(Self::Field(path, Condition::parse(obj)?))
        } else if operators == 0 {
            Self::parse(obj, &path)
        } else {
            Err(LedgerError::query(format!(
                "field {} mixes operators and nested fields",
                path.join(".")
            )))
        }
    }

    fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::All(list) => list.iter().all(|s| s.matches(doc)),
            Self::Any(list) => list.iter().any(|s| s.matches(doc)),
            Self::NoneOf(list) => !list.iter().any(|s| s.matches(doc)),
            Self::Not(inner) => !inner.matches(doc),
            Self::Field(path, cond) => {
                let path: Vec<&str> = path.iter().map(String::as_str).collect();
                cond.eval(resolve(doc, &path))
            }
        }
    }
}

/// Predicate over one field value
#[derive(Debug, Clone)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    AllOf(Vec<Value>),
    ElemMatch(Box<Selector>),
    Not(Box<Condition>),
    Both(Vec<Condition>),
}

impl Condition {
    fn parse(obj: &Map<String, Value>) -> LedgerResult<Self> {
        let mut conditions = Vec::with_capacity(obj.len());
        for (op, operand) in obj {
            let cond = match op.as_str() {
                "$eq" => Self::Eq(operand.clone()),
                "$ne" => Self::Ne(operand.clone()),
                "$gt" => Self::Gt(operand.clone()),
                "$gte" => Self::Gte(operand.clone()),
                "$lt" => Self::Lt(operand.clone()),
                "$lte" => Self::Lte(operand.clone()),
                "$in" => Self::In(array_operand(op, operand)?),
                "$nin" => Self::Nin(array_operand(op, operand)?),
                "$all" => Self::AllOf(array_operand(op, operand)?),
                "$exists" => Self::Exists(
                    operand
                        .as_bool()
                        .ok_or_else(|| LedgerError::query("$exists expects a boolean"))?,
                ),
                "$regex" => {
                    let pattern = operand
                        .as_str()
                        .ok_or_else(|| LedgerError::query("$regex expects a string"))?;
                    Self::Regex(Regex::new(pattern).map_err(|e| {
                        LedgerError::query(format!("invalid $regex {pattern:?}: {e}"))
                    })?)
                }
                "$size" => Self::Size(as_count(operand, "$size")?),
                "$elemMatch" => {
                    let inner = operand
                        .as_object()
                        .ok_or_else(|| LedgerError::query("$elemMatch expects an object"))?;
                    let all_ops = !inner.is_empty() && inner.keys().all(|k| k.starts_with('$'));
                    let elem = if all_ops && !inner.keys().any(|k| is_combinator(k)) {
                        Selector::Field(Vec::new(), Self::parse(inner)?)
                    } else {
                        Selector::parse(inner, &[])?
                    };
                    Self::ElemMatch(Box::new(elem))
                }
                "$not" => {
                    let inner = operand
                        .as_object()
                        .ok_or_else(|| LedgerError::query("$not expects an operator object"))?;
                    Self::Not(Box::new(Self::parse(inner)?))
                }
                other => return Err(LedgerError::query(format!("unknown operator {other}"))),
            };
            conditions.push(cond);
        }
        Ok(if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Self::Both(conditions)
        })
    }

    fn eval(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Exists(expected) => value.is_some() == *expected,
            Self::Not(inner) => !inner.eval(value),
            Self::Both(list) => list.iter().all(|c| c.eval(value)),
            _ => value.is_some_and(|v| self.eval_present(v)),
        }
    }

    fn eval_present(&self, v: &Value) -> bool {
        match self {
            Self::Eq(x) => json_eq(v, x),
            Self::Ne(x) => !json_eq(v, x),
            Self::Gt(x) => json_cmp(v, x) == Some(Ordering::Greater),
            Self::Gte(x) => matches!(json_cmp(v, x), Some(Ordering::Greater | Ordering::Equal)),
            Self::Lt(x) => json_cmp(v, x) == Some(Ordering::Less),
            Self::Lte(x) => matches!(json_cmp(v, x), Some(Ordering::Less | Ordering::Equal)),
            Self::In(xs) => xs.iter().any(|x| json_eq(v, x)),
            Self::Nin(xs) => !xs.iter().any(|x| json_eq(v, x)),
            Self::Regex(re) => v.as_str().is_some_and(|s| re.is_match(s)),
            Self::Size(n) => v.as_array().is_some_and(|a| a.len() == *n),
            Self::AllOf(xs) => v
                .as_array()
                .is_some_and(|a| xs.iter().all(|x| a.iter().any(|e| json_eq(e, x)))),
            Self::ElemMatch(sel) => v.as_array().is_some_and(|a| a.iter().any(|e| sel.matches(e))),
            Self::Exists(_) | Self::Not(_) | Self::Both(_) => self.eval(Some(v)),
        }
    }
}

fn is_combinator(name: &str) -> bool {
    matches!(name, "$and" | "$or" | "$nor")
}

fn array_operand(op: &str, operand: &Value) -> LedgerResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| LedgerError::query(format!("{op} expects an array")))
}

/// Follow a field path; the empty path is the value itself
fn resolve<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |current, segment| current.as_object()?.get(*segment))
}

fn insert_path(out: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            out.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = out
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

/// Equality with numbers compared by value
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Ordering between two values of the same JSON type
fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// Integers compare exactly; f64 only when a float is involved.
fn number_cmp(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return Some(x.cmp(&y));
    }
    // A negative i64 against a u64 beyond i64::MAX
    match (x.as_i64(), y.as_u64(), x.as_u64(), y.as_i64()) {
        (Some(_), Some(_), None, None) => Some(Ordering::Less),
        (None, None, Some(_), Some(_)) => Some(Ordering::Greater),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}
