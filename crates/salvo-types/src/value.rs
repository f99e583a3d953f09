//! Display, coercion and equality helpers over `serde_json::Value`.
//!
//! Script values are loosely typed; these helpers pin down the few places where
//! the engine has to turn one kind of value into another.

use serde_json::{Map, Number, Value};

/// Render a value the way it appears inside substituted text.
///
/// Strings are written verbatim; everything else uses its compact JSON form.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a value to a number, returning `None` when it has no numeric reading.
///
/// Null, `false` and blank strings read as zero; `true` reads as one; strings
/// are trimmed and parsed. Sequences and mappings never coerce.
pub fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Build a JSON number, keeping integral values integral.
///
/// Returns null for NaN and infinities, which JSON cannot represent.
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Strict equality: same kind and same value, with numbers compared numerically
/// so that `1` and `1.0` are equal.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Add two values: string concatenation when either side is a string,
/// numeric addition otherwise (null counts as zero).
pub fn add(left: &Value, right: &Value) -> Value {
    if left.is_string() || right.is_string() {
        let mut s = match left {
            Value::Null => String::new(),
            other => display_string(other),
        };
        s.push_str(&display_string(right));
        return Value::String(s);
    }
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                if let Some(sum) = a.checked_add(b) {
                    return Value::Number(Number::from(sum));
                }
            }
        }
        (Value::Null, Value::Number(b)) => return Value::Number(b.clone()),
        _ => {}
    }
    match (loose_number(left), loose_number(right)) {
        (Some(a), Some(b)) => number_value(a + b),
        _ => Value::Null,
    }
}

/// One step of an object path such as `a.b[0].c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn from_text(text: &str) -> Self {
        match text.parse::<usize>() {
            Ok(i) if !text.starts_with('+') => PathSegment::Index(i),
            _ => PathSegment::Key(text.to_string()),
        }
    }

    fn as_key(&self) -> String {
        match self {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        }
    }
}

/// Split a lodash-style path (`a.b[0].c`, `a["odd.key"]`) into segments.
///
/// Purely numeric segments become indices; they still address mapping keys
/// of the same text when applied to a mapping.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::from_text(&current));
                    current.clear();
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::from_text(&current));
                    current.clear();
                }
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut inner = String::new();
                while let Some(c) = chars.next() {
                    if Some(c) == quote && chars.peek() == Some(&']') {
                        chars.next();
                        break;
                    }
                    if quote.is_none() && c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                if quote.is_some() {
                    segments.push(PathSegment::Key(inner));
                } else {
                    segments.push(PathSegment::from_text(inner.trim()));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        segments.push(PathSegment::from_text(&current));
    }
    segments
}

/// Follow `segments` into `value`; `None` when any step is missing.
pub fn get_path<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => match segment {
            PathSegment::Index(i) => items.get(*i),
            PathSegment::Key(_) => None,
        },
        _ => None,
    })
}

/// How many null slots a single indexed write may pad a sequence with.
pub const MAX_INDEX_GAP: usize = 10_000;

/// Write `new_value` at `segments`, creating intermediate containers the way
/// lodash `_.set` does: an index segment creates a sequence, a key a mapping.
/// A scalar standing in the way is replaced. An index more than
/// [`MAX_INDEX_GAP`] past the end of its sequence is rejected.
pub fn set_path(value: &mut Value, segments: &[PathSegment], new_value: Value) -> Result<(), String> {
    let Some((first, rest)) = segments.split_first() else {
        *value = new_value;
        return Ok(());
    };
    let wants_array = matches!(first, PathSegment::Index(_));
    let fits = match value {
        Value::Object(_) => true,
        Value::Array(_) => wants_array,
        _ => false,
    };
    if !fits {
        *value = if wants_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    let slot = match value {
        Value::Array(items) => {
            let PathSegment::Index(i) = first else {
                return Ok(());
            };
            if *i > items.len().saturating_add(MAX_INDEX_GAP) {
                return Err(format!(
                    "index {} is too far past the end of a sequence of {}",
                    i,
                    items.len()
                ));
            }
            if items.len() <= *i {
                items.resize(*i + 1, Value::Null);
            }
            &mut items[*i]
        }
        Value::Object(map) => map.entry(first.as_key()).or_insert(Value::Null),
        _ => return Ok(()),
    };
    set_path(slot, rest, new_value)
}
