// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Value type for Quarry - runtime values with type information
//!
//! Numeric values compare equal across subtypes: `Integer(5)`, `Float(5.0)`
//! and `Decimal(5.00)` are the same value for grouping, DISTINCT tracking and
//! hashing. NULL equals NULL here; SQL three-valued comparison lives in
//! [`Value::compare`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::types::DataType;

/// A runtime value with type information
///
/// Text uses `Arc<str>` so rows clone cheaply during scans.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// NULL
    #[default]
    Null,

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Float(f64),

    /// Exact decimal
    Decimal(Decimal),

    /// UTF-8 text string (Arc for cheap cloning)
    Text(Arc<str>),

    /// Boolean value
    Boolean(bool),
}

impl Value {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a NULL value
    pub fn null() -> Self {
        Value::Null
    }

    /// Create an integer value
    pub fn integer(value: i64) -> Self {
        Value::Integer(value)
    }

    /// Create a float value
    pub fn float(value: f64) -> Self {
        Value::Float(value)
    }

    /// Create a decimal value
    pub fn decimal(value: Decimal) -> Self {
        Value::Decimal(value)
    }

    /// Create a text value
    pub fn text(value: impl AsRef<str>) -> Self {
        Value::Text(Arc::from(value.as_ref()))
    }

    /// Create a boolean value
    pub fn boolean(value: bool) -> Self {
        Value::Boolean(value)
    }

    // =========================================================================
    // Type accessors
    // =========================================================================

    /// Returns the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Decimal(_) => DataType::Decimal,
            Value::Text(_) => DataType::Text,
            Value::Boolean(_) => DataType::Boolean,
        }
    }

    /// Returns true if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for Integer, Float and Decimal
    pub fn is_numeric(&self) -> bool {
        self.data_type().is_numeric()
    }

    // =========================================================================
    // Value extractors
    // =========================================================================

    /// Extract as i64 without lossy text parsing
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Extract as f64
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Extract as an exact decimal; floats convert when finite
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(v) => Some(Decimal::from(*v)),
            Value::Float(v) => Decimal::from_f64(*v),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Extract as boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Extract as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// SQL comparison: `None` when either side is NULL or the types are
    /// not comparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(compare_numeric(a, b)),
            _ => None,
        }
    }

    /// Canonical image of a numeric value for hashing
    ///
    /// Integral values hash by their exact integer (or exact decimal when
    /// outside the i64 range); other values hash by their f64 image. Any two
    /// values `compare_numeric` calls equal produce the same key.
    fn numeric_hash_key(&self) -> NumericKey {
        match self {
            Value::Integer(v) => NumericKey::Int(*v),
            Value::Float(f) => {
                if let Some(i) = float_as_i64(*f) {
                    NumericKey::Int(i)
                } else if let Some(d) = integral_float_as_decimal(*f) {
                    NumericKey::Dec(d.normalize())
                } else {
                    NumericKey::Bits(float_bits(*f))
                }
            }
            Value::Decimal(d) => {
                if d.fract().is_zero() {
                    match d.to_i64() {
                        Some(i) => NumericKey::Int(i),
                        None => NumericKey::Dec(d.normalize()),
                    }
                } else {
                    NumericKey::Bits(float_bits(d.to_f64().unwrap_or(f64::NAN)))
                }
            }
            _ => NumericKey::Bits(0),
        }
    }
}

#[derive(Hash)]
enum NumericKey {
    Int(i64),
    Dec(Decimal),
    Bits(u64),
}

/// Bits of a float with -0.0 and every NaN folded together
fn float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

/// 2^63 as f64; every integral float below it in magnitude fits an i64
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// The float as an i64 when it is integral and in range
fn float_as_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// An integral float outside the i64 range as an exact decimal
fn integral_float_as_decimal(f: f64) -> Option<Decimal> {
    if f.is_finite() && f.fract() == 0.0 {
        Decimal::from_f64_retain(f)
    } else {
        None
    }
}

/// Compare two numeric values
///
/// Integers and decimals compare exactly with each other and with integral
/// floats. Fractional floats compare with decimals through the decimal's f64
/// image.
fn compare_numeric(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Decimal(x), Value::Decimal(y)) => x.cmp(y),
        (Value::Integer(x), Value::Decimal(y)) => Decimal::from(*x).cmp(y),
        (Value::Decimal(x), Value::Integer(y)) => x.cmp(&Decimal::from(*y)),
        (Value::Float(x), Value::Float(y)) => compare_floats(*x, *y),
        (Value::Integer(x), Value::Float(y)) => compare_int_float(*x, *y),
        (Value::Float(x), Value::Integer(y)) => compare_int_float(*y, *x).reverse(),
        (Value::Decimal(x), Value::Float(y)) => compare_decimal_float(x, *y),
        (Value::Float(x), Value::Decimal(y)) => compare_decimal_float(y, *x).reverse(),
        _ => {
            let x = a.as_float64().unwrap_or(f64::NAN);
            let y = b.as_float64().unwrap_or(f64::NAN);
            compare_floats(x, y)
        }
    }
}

/// Exact comparison of an integer with a float; NaN is greater than all
fn compare_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() || f >= I64_BOUND {
        return Ordering::Less;
    }
    if f < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    // In range, so the conversion is exact
    match (i as i128).cmp(&(whole as i128)) {
        Ordering::Equal => 0.0.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        other => other,
    }
}

/// Comparison of a decimal with a float, exact when the float is integral
fn compare_decimal_float(d: &Decimal, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Less;
    }
    if f.is_infinite() {
        return if f > 0.0 { Ordering::Less } else { Ordering::Greater };
    }
    if f.fract() == 0.0 {
        return match Decimal::from_f64_retain(f) {
            Some(exact) => d.cmp(&exact),
            // Beyond every decimal
            None if f > 0.0 => Ordering::Less,
            None => Ordering::Greater,
        };
    }
    compare_floats(d.to_f64().unwrap_or(f64::NAN), f)
}

/// Compare two floats with NaN ordered last
fn compare_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Format a float value consistently
fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        let s = format!("{:?}", v);
        if s.contains('.') && !s.contains('e') && !s.contains('E') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        }
    }
}

// =========================================================================
// Trait implementations
// =========================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Decimal(d) => write!(f, "{}", d.normalize()),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                compare_numeric(a, b) == Ordering::Equal
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal values must hash the same across numeric subtypes
        match self {
            Value::Null => 0u8.hash(state),
            Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => {
                1u8.hash(state);
                self.numeric_hash_key().hash(state);
            }
            Value::Text(s) => {
                2u8.hash(state);
                s.hash(state);
            }
            Value::Boolean(b) => {
                3u8.hash(state);
                b.hash(state);
            }
        }
    }
}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

/// Total ordering: NULLs first, then booleans, numerics, text
///
/// Consistent with `PartialEq`, so rows can be sorted for comparison.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Boolean(_) => 1,
                Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => 2,
                Value::Text(_) => 3,
            }
        }

        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => compare_numeric(a, b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

// =========================================================================
// From implementations for convenient construction
// =========================================================================

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(Arc::from(v.as_str()))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
