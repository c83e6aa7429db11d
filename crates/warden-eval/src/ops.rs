//! Operators and value accessors shared by the evaluator.

use std::cmp::Ordering;
use std::time::Duration;

use warden_types::ast::{BinaryOp, Number, QuantityUnit};

use crate::error::{mismatch, EvalError, EvalResult};
use crate::value::{IntRange, Value};

pub(crate) fn quantity(value: Number, unit: QuantityUnit) -> EvalResult<Value> {
    match unit {
        QuantityUnit::Seconds | QuantityUnit::Milliseconds => {
            let secs = match unit {
                QuantityUnit::Seconds => value.as_f64(),
                _ => value.as_f64() / 1000.0,
            };
            Duration::try_from_secs_f64(secs)
                .map(Value::Duration)
                .map_err(|e| EvalError::Runtime(format!("invalid duration: {e}")))
        }
        QuantityUnit::Percent => Ok(Value::Percent(value.as_f64())),
        QuantityUnit::Lines => match value {
            Number::Int(n) => Ok(Value::LineCount(n)),
            Number::Float(_) => Err(EvalError::Runtime("a line count must be whole".into())),
        },
        _ => byte_amount(value, unit).map(Value::ByteCount),
    }
}

pub(crate) fn byte_amount(value: Number, unit: QuantityUnit) -> EvalResult<i64> {
    let multiplier = unit
        .byte_multiplier()
        .ok_or_else(|| EvalError::Runtime(format!("'{}' is not a byte unit", unit.as_str())))?;
    match value {
        Number::Int(n) => n.checked_mul(multiplier).ok_or(EvalError::Overflow),
        Number::Float(f) => {
            let bytes = f * multiplier as f64;
            if bytes.fract() != 0.0 || !bytes.is_finite() {
                return Err(EvalError::Runtime(format!(
                    "{f}{} is not a whole number of bytes",
                    unit.as_str()
                )));
            }
            Ok(bytes as i64)
        }
    }
}

pub(crate) fn member(value: Value, name: &str) -> EvalResult<Value> {
    match value {
        Value::Object(mut object) => object.remove(name).ok_or_else(|| EvalError::MissingProperty {
            name: name.to_string(),
            on: "object",
        }),
        Value::Record(mut record) => {
            record.fields.remove(name).ok_or_else(|| EvalError::MissingProperty {
                name: name.to_string(),
                on: "record",
            })
        }
        other => Err(EvalError::TypeMismatch(format!(
            "cannot access property '{name}' of {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn index_value(value: Value, index: Value) -> EvalResult<Value> {
    let Value::Int(i) = index else {
        return Err(mismatch("an int index", &index));
    };
    if i < 0 {
        return Err(EvalError::NegativeIndex(i));
    }
    let i = i as usize;
    match value {
        Value::List(mut items) => {
            if i >= items.len() {
                return Err(EvalError::IndexOutOfRange {
                    index: i,
                    len: items.len(),
                });
            }
            Ok(items.swap_remove(i))
        }
        Value::KeyList(mut keys) => {
            if i >= keys.len() {
                return Err(EvalError::IndexOutOfRange {
                    index: i,
                    len: keys.len(),
                });
            }
            Ok(Value::Str(keys.swap_remove(i)))
        }
        Value::Str(s) => s
            .chars()
            .nth(i)
            .map(|c| Value::Str(c.to_string()))
            .ok_or_else(|| EvalError::IndexOutOfRange {
                index: i,
                len: s.chars().count(),
            }),
        other => Err(mismatch("a list or a string", &other)),
    }
}

/// `value[start:end]`: bounds are clamped to the length.
pub(crate) fn slice_value(value: Value, start: Option<i64>, end: Option<i64>) -> EvalResult<Value> {
    let bounds = |len: usize| -> EvalResult<(usize, usize)> {
        let clamp = |bound: i64| -> EvalResult<usize> {
            if bound < 0 {
                Err(EvalError::NegativeIndex(bound))
            } else {
                Ok((bound as usize).min(len))
            }
        };
        let end = end.map(clamp).transpose()?.unwrap_or(len);
        let start = start.map(clamp).transpose()?.unwrap_or(0).min(end);
        Ok((start, end))
    };
    match value {
        Value::List(items) => {
            let (start, end) = bounds(items.len())?;
            Ok(Value::List(items[start..end].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = bounds(chars.len())?;
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        other => Err(mismatch("a list or a string", &other)),
    }
}

pub(crate) enum AssignRoot {
    Local(String),
    Global(String),
}

pub(crate) enum Accessor {
    Key(String),
    Index(i64),
}

/// Store `value` at `path` below `slot`. Object keys are created on demand;
/// record fields and list elements must already exist.
pub(crate) fn set_path(slot: &mut Value, path: &[Accessor], value: Value) -> EvalResult<()> {
    let Some((first, rest)) = path.split_first() else {
        *slot = value;
        return Ok(());
    };
    let next = match (slot, first) {
        (Value::Object(object), Accessor::Key(key)) => {
            if rest.is_empty() {
                object.insert(key.clone(), value);
                return Ok(());
            }
            object.get_mut(key).ok_or_else(|| EvalError::MissingProperty {
                name: key.clone(),
                on: "object",
            })?
        }
        (Value::Record(record), Accessor::Key(key)) => {
            record.fields.get_mut(key).ok_or_else(|| EvalError::MissingProperty {
                name: key.clone(),
                on: "record",
            })?
        }
        (Value::List(items), Accessor::Index(i)) => {
            if *i < 0 {
                return Err(EvalError::NegativeIndex(*i));
            }
            let len = items.len();
            items
                .get_mut(*i as usize)
                .ok_or(EvalError::IndexOutOfRange {
                    index: *i as usize,
                    len,
                })?
        }
        (other, _) => {
            return Err(EvalError::TypeMismatch(format!(
                "cannot assign into {}",
                other.type_name()
            )))
        }
    };
    set_path(next, rest, value)
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    use BinaryOp as B;
    match op {
        B::Add | B::Sub | B::Mul | B::Div => int_arithmetic(op, left, right),
        B::AddF | B::SubF | B::MulF | B::DivF => float_arithmetic(op, left, right),
        B::Less | B::LessEq | B::Greater | B::GreaterEq => {
            let ordering = int_ordering(&left, &right).ok_or_else(|| operand_error(op, &left, &right))?;
            Ok(Value::Bool(compare(op, ordering)))
        }
        B::LessF | B::LessEqF | B::GreaterF | B::GreaterEqF => match (&left, &right) {
            (Value::Float(a), Value::Float(b)) | (Value::Percent(a), Value::Percent(b)) => {
                Ok(Value::Bool(a.partial_cmp(b).is_some_and(|o| compare(op, o))))
            }
            _ => Err(operand_error(op, &left, &right)),
        },
        B::Eq => Ok(Value::Bool(left == right)),
        B::NotEq => Ok(Value::Bool(left != right)),
        B::And | B::Or => match (&left, &right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == B::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(operand_error(op, &left, &right)),
        },
        B::In => contains(&right, &left).map(Value::Bool),
        B::NotIn => contains(&right, &left).map(|found| Value::Bool(!found)),
        B::Keyof => match (&left, &right) {
            (Value::Str(key), Value::Object(object)) => Ok(Value::Bool(object.contains_key(key))),
            (Value::Str(key), Value::Record(record)) => {
                Ok(Value::Bool(record.fields.contains_key(key)))
            }
            _ => Err(operand_error(op, &left, &right)),
        },
        B::Range | B::ExclusiveRange => match (&left, &right) {
            (Value::Int(start), Value::Int(end)) => Ok(Value::IntRange(IntRange::new(
                *start,
                *end,
                op == B::ExclusiveRange,
            ))),
            _ => Err(operand_error(op, &left, &right)),
        },
        B::Match => Ok(Value::Bool(test_matcher(&right, &left))),
        B::NotMatch => Ok(Value::Bool(!test_matcher(&right, &left))),
    }
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch(format!(
        "'{}' cannot be applied to {} and {}",
        op.as_str(),
        left.type_name(),
        right.type_name()
    ))
}

fn int_arithmetic(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                _ => {
                    if *b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_div(*b)
                }
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        (Value::Duration(a), Value::Duration(b)) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
            let result = if op == BinaryOp::Add {
                a.checked_add(*b)
            } else {
                a.checked_sub(*b)
            };
            result.map(Value::Duration).ok_or(EvalError::Overflow)
        }
        _ => Err(operand_error(op, &left, &right)),
    }
}

fn float_arithmetic(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    let (Value::Float(a), Value::Float(b)) = (&left, &right) else {
        return Err(operand_error(op, &left, &right));
    };
    Ok(Value::Float(match op {
        BinaryOp::AddF => a + b,
        BinaryOp::SubF => a - b,
        BinaryOp::MulF => a * b,
        _ => a / b,
    }))
}

/// Ordering of two ints or two quantities of the same kind.
fn int_ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b))
        | (Value::LineCount(a), Value::LineCount(b))
        | (Value::ByteCount(a), Value::ByteCount(b))
        | (Value::ByteRate(a), Value::ByteRate(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare(op: BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Less | BinaryOp::LessF => ordering == Ordering::Less,
        BinaryOp::LessEq | BinaryOp::LessEqF => ordering != Ordering::Greater,
        BinaryOp::Greater | BinaryOp::GreaterF => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.contains(item)),
        (Value::Object(object), _) => Ok(object.values().any(|v| v == item)),
        (Value::KeyList(keys), Value::Str(key)) => Ok(keys.contains(key)),
        (Value::IntRange(range), Value::Int(i)) => Ok(range.contains(*i)),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        _ => Err(EvalError::TypeMismatch(format!(
            "cannot look for {} in {}",
            item.type_name(),
            container.type_name()
        ))),
    }
}

/// Patterns test the value; any other pattern falls back to equality.
pub(crate) fn test_matcher(pattern: &Value, value: &Value) -> bool {
    match (pattern, value) {
        (Value::PathPattern(p), Value::Path(path)) => p.test(path),
        (Value::UrlPattern(p), Value::Url(url)) => p.test(url),
        (Value::HostPattern(p), Value::Host(host)) => p.test(host),
        (Value::HostPattern(p), Value::Url(url)) => p.test_url(url),
        (Value::IntRange(range), Value::Int(i)) => range.contains(*i),
        _ => pattern == value,
    }
}
