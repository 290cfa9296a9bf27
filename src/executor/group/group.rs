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

//! Per-group aggregation state
//!
//! A group owns a hit counter and a map from binding name to accumulator.
//! Every operation resolves its binding with one probe of that map: the
//! lookup either finds the accumulator or inserts its initial value, and the
//! update happens in place on the returned slot.
//!
//! The map sits behind a per-group mutex. Rows of different groups never
//! contend; rows of the same group serialize only for the duration of one
//! update.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::hash_map::RawEntryMut;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::common::{FxBuildHasher, ValueSet};
use crate::core::{Error, Result, Value};

/// Index of a group in its hierarchy's arena
pub type GroupId = usize;

type BindingMap = hashbrown::HashMap<Box<str>, GroupValue, FxBuildHasher>;

/// Accumulator stored under one binding
///
/// Decimal, integer and value accumulators have dedicated variants so the
/// hot aggregate paths never box. Anything else goes through `Any`.
pub enum GroupValue {
    Decimal(Decimal),
    Int(i64),
    Value(Value),
    Distinct(ValueSet),
    Any(Box<dyn Any + Send>),
    /// Raw value plus the converter applied on every read
    Converted {
        raw: Box<dyn Any + Send>,
        converter: Box<dyn Any + Send>,
    },
}

impl GroupValue {
    /// Wrap an arbitrary value, picking the dedicated variant when one exists
    pub fn from_any<T: Send + 'static>(value: T) -> Self {
        let boxed: Box<dyn Any + Send> = Box::new(value);
        let boxed = match boxed.downcast::<Decimal>() {
            Ok(d) => return GroupValue::Decimal(*d),
            Err(b) => b,
        };
        let boxed = match boxed.downcast::<i64>() {
            Ok(i) => return GroupValue::Int(*i),
            Err(b) => b,
        };
        let boxed = match boxed.downcast::<Value>() {
            Ok(v) => return GroupValue::Value(*v),
            Err(b) => b,
        };
        match boxed.downcast::<ValueSet>() {
            Ok(s) => GroupValue::Distinct(*s),
            Err(b) => GroupValue::Any(b),
        }
    }

    /// Read the accumulator as `T`
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        let any: &dyn Any = match self {
            GroupValue::Decimal(d) => d,
            GroupValue::Int(i) => i,
            GroupValue::Value(v) => v,
            GroupValue::Distinct(s) => s,
            GroupValue::Any(b) => return b.downcast_ref::<T>().cloned(),
            GroupValue::Converted { .. } => return None,
        };
        any.downcast_ref::<T>().cloned()
    }

    fn kind(&self) -> &'static str {
        match self {
            GroupValue::Decimal(_) => "decimal",
            GroupValue::Int(_) => "integer",
            GroupValue::Value(_) => "value",
            GroupValue::Distinct(_) => "distinct set",
            GroupValue::Any(_) => "opaque",
            GroupValue::Converted { .. } => "converted",
        }
    }
}

impl fmt::Debug for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Decimal(d) => f.debug_tuple("Decimal").field(d).finish(),
            GroupValue::Int(i) => f.debug_tuple("Int").field(i).finish(),
            GroupValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            GroupValue::Distinct(s) => f.debug_tuple("Distinct").field(&s.len()).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

fn mismatch(name: &str, found: &GroupValue, expected: &str) -> Error {
    Error::internal(format!(
        "binding '{}' holds a {} accumulator, not {}",
        name,
        found.kind(),
        expected
    ))
}

/// One aggregation bucket
pub struct Group {
    parent: Option<GroupId>,
    /// GROUP BY column names of the whole hierarchy; this group uses a prefix
    field_names: Arc<[String]>,
    /// Key values of the row that created the group
    field_values: Box<[Value]>,
    hits: AtomicU64,
    state: Mutex<BindingMap>,
}

impl Group {
    /// Create a group snapshotting the creating row's key values
    pub fn new(
        parent: Option<GroupId>,
        field_names: Arc<[String]>,
        field_values: impl Into<Box<[Value]>>,
    ) -> Self {
        Self {
            parent,
            field_names,
            field_values: field_values.into(),
            hits: AtomicU64::new(0),
            state: Mutex::new(BindingMap::default()),
        }
    }

    /// Parent group; `None` for the root
    #[inline]
    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    /// Names of the grouping columns this group is keyed on
    pub fn field_names(&self) -> &[String] {
        let n = self.field_values.len().min(self.field_names.len());
        &self.field_names[..n]
    }

    /// Grouping values this group is keyed on
    #[inline]
    pub fn field_values(&self) -> &[Value] {
        &self.field_values
    }

    /// Count one row
    #[inline]
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Rows counted so far
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Run `f` on the binding's slot, inserting `init()` first if absent
    ///
    /// This is the single probe every other operation goes through.
    #[inline]
    fn with_slot<R>(
        &self,
        name: &str,
        init: impl FnOnce() -> GroupValue,
        f: impl FnOnce(&mut GroupValue) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        let slot = match state.raw_entry_mut().from_key(name) {
            RawEntryMut::Occupied(o) => o.into_mut(),
            RawEntryMut::Vacant(v) => v.insert(Box::from(name), init()).1,
        };
        f(slot)
    }

    /// Read the binding, creating it from `factory` if absent
    pub fn get_or_create_value<T, F>(&self, name: &str, factory: F) -> Result<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        self.with_slot(
            name,
            || GroupValue::from_any(factory()),
            |slot| {
                slot.get::<T>()
                    .ok_or_else(|| mismatch(name, slot, std::any::type_name::<T>()))
            },
        )
    }

    /// Overwrite the binding unconditionally
    pub fn set_value<T: Send + 'static>(&self, name: &str, value: T) {
        let mut state = self.state.lock();
        let value = GroupValue::from_any(value);
        match state.raw_entry_mut().from_key(name) {
            RawEntryMut::Occupied(mut o) => {
                o.insert(value);
            }
            RawEntryMut::Vacant(v) => {
                v.insert(Box::from(name), value);
            }
        }
    }

    /// Add to a decimal accumulator starting at zero; returns the new total
    pub fn add_decimal_value(&self, name: &str, delta: Decimal) -> Result<Decimal> {
        self.with_slot(
            name,
            || GroupValue::Decimal(Decimal::ZERO),
            |slot| match slot {
                GroupValue::Decimal(total) => {
                    *total = total.checked_add(delta).ok_or_else(|| {
                        Error::NumericOverflow(format!("decimal sum in '{}'", name))
                    })?;
                    Ok(*total)
                }
                other => Err(mismatch(name, other, "decimal")),
            },
        )
    }

    /// Add one to an integer accumulator starting at zero; returns the count
    pub fn increment_int_value(&self, name: &str) -> Result<i64> {
        self.with_slot(
            name,
            || GroupValue::Int(0),
            |slot| match slot {
                GroupValue::Int(n) => {
                    *n = n.checked_add(1).ok_or_else(|| {
                        Error::NumericOverflow(format!("counter '{}'", name))
                    })?;
                    Ok(*n)
                }
                other => Err(mismatch(name, other, "integer")),
            },
        )
    }

    /// Keep the larger decimal; the accumulator starts at `Decimal::MIN`
    ///
    /// Returns true if `candidate` replaced the stored value.
    pub fn update_decimal_if_greater(&self, name: &str, candidate: Decimal) -> Result<bool> {
        self.with_slot(
            name,
            || GroupValue::Decimal(Decimal::MIN),
            |slot| match slot {
                GroupValue::Decimal(current) => {
                    let replace = candidate > *current;
                    if replace {
                        *current = candidate;
                    }
                    Ok(replace)
                }
                other => Err(mismatch(name, other, "decimal")),
            },
        )
    }

    /// Keep the smaller decimal; the accumulator starts at `Decimal::MAX`
    ///
    /// Returns true if `candidate` replaced the stored value.
    pub fn update_decimal_if_less(&self, name: &str, candidate: Decimal) -> Result<bool> {
        self.with_slot(
            name,
            || GroupValue::Decimal(Decimal::MAX),
            |slot| match slot {
                GroupValue::Decimal(current) => {
                    let replace = candidate < *current;
                    if replace {
                        *current = candidate;
                    }
                    Ok(replace)
                }
                other => Err(mismatch(name, other, "decimal")),
            },
        )
    }

    /// Record `value` in the binding's seen-set
    ///
    /// Returns true the first time a value is seen. NULL is never recorded.
    pub fn insert_distinct(&self, name: &str, value: &Value) -> Result<bool> {
        if value.is_null() {
            return Ok(false);
        }
        self.with_slot(
            name,
            || GroupValue::Distinct(ValueSet::default()),
            |slot| match slot {
                GroupValue::Distinct(seen) => {
                    if seen.contains(value) {
                        Ok(false)
                    } else {
                        Ok(seen.insert(value.clone()))
                    }
                }
                other => Err(mismatch(name, other, "distinct set")),
            },
        )
    }

    /// Store `initial()` once together with `converter`, and return the
    /// converted value
    ///
    /// The converter given on the first call is retained; later calls reuse
    /// it and ignore their own, so readers never re-resolve the transform.
    pub fn get_or_create_value_with_converter<S, R>(
        &self,
        name: &str,
        initial: impl FnOnce() -> S,
        converter: fn(&S) -> R,
    ) -> Result<R>
    where
        S: Send + 'static,
        R: 'static,
    {
        self.with_slot(
            name,
            || GroupValue::Converted {
                raw: Box::new(initial()),
                converter: Box::new(converter),
            },
            |slot| match slot {
                GroupValue::Converted { raw, converter } => {
                    match (raw.downcast_ref::<S>(), converter.downcast_ref::<fn(&S) -> R>()) {
                        (Some(raw), Some(convert)) => Ok(convert(raw)),
                        _ => Err(Error::internal(format!(
                            "binding '{}' was created with a different converter type",
                            name
                        ))),
                    }
                }
                other => Err(mismatch(name, other, "converted value")),
            },
        )
    }

    /// Current value of a decimal accumulator
    pub fn decimal_value(&self, name: &str) -> Result<Option<Decimal>> {
        self.read(name, |slot| match slot {
            GroupValue::Decimal(d) => Ok(*d),
            other => Err(mismatch(name, other, "decimal")),
        })
    }

    /// Current value of an integer accumulator
    pub fn int_value(&self, name: &str) -> Result<Option<i64>> {
        self.read(name, |slot| match slot {
            GroupValue::Int(n) => Ok(*n),
            other => Err(mismatch(name, other, "integer")),
        })
    }

    /// Current value of any binding, read as `T`
    pub fn value<T: Clone + 'static>(&self, name: &str) -> Result<Option<T>> {
        self.read(name, |slot| {
            slot.get::<T>()
                .ok_or_else(|| mismatch(name, slot, std::any::type_name::<T>()))
        })
    }

    /// Number of distinct values recorded under a binding
    pub fn distinct_count(&self, name: &str) -> Result<usize> {
        Ok(self
            .read(name, |slot| match slot {
                GroupValue::Distinct(seen) => Ok(seen.len()),
                other => Err(mismatch(name, other, "distinct set")),
            })?
            .unwrap_or(0))
    }

    /// True if the binding has been created
    pub fn has_binding(&self, name: &str) -> bool {
        self.state.lock().contains_key(name)
    }

    fn read<R>(&self, name: &str, f: impl FnOnce(&GroupValue) -> Result<R>) -> Result<Option<R>> {
        let state = self.state.lock();
        state.get(name).map(f).transpose()
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("parent", &self.parent)
            .field("key", &self.field_values)
            .field("hits", &self.hits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn group() -> Group {
        Group::new(None, Arc::from(vec!["k".to_string()]), vec![Value::from("a")])
    }

    #[test]
    fn test_hits() {
        let g = group();
        assert_eq!(g.hits(), 0);
        g.hit();
        g.hit();
        assert_eq!(g.hits(), 2);
        assert_eq!(g.field_names(), &["k".to_string()]);
    }

    #[test]
    fn test_get_or_create_runs_factory_once() {
        let g = group();
        let mut calls = 0;
        let v: Vec<i32> = g
            .get_or_create_value("list", || {
                calls += 1;
                vec![1, 2]
            })
            .unwrap();
        assert_eq!(v, vec![1, 2]);
        let v: Vec<i32> = g.get_or_create_value("list", || vec![9]).unwrap();
        assert_eq!(v, vec![1, 2]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_set_value_overwrites() {
        let g = group();
        g.set_value("x", Value::from(1));
        g.set_value("x", Value::from("two"));
        assert_eq!(g.value::<Value>("x").unwrap(), Some(Value::from("two")));

        // Decimals set generically feed the typed accumulator
        g.set_value("d", Decimal::new(15, 1));
        assert_eq!(g.add_decimal_value("d", Decimal::ONE).unwrap(), Decimal::new(25, 1));
    }

    #[test]
    fn test_typed_accumulators() {
        let g = group();
        g.add_decimal_value("sum", Decimal::from(3)).unwrap();
        g.add_decimal_value("sum", Decimal::new(5, 1)).unwrap();
        assert_eq!(g.decimal_value("sum").unwrap(), Some(Decimal::new(35, 1)));

        assert_eq!(g.increment_int_value("n").unwrap(), 1);
        assert_eq!(g.increment_int_value("n").unwrap(), 2);
        assert_eq!(g.int_value("n").unwrap(), Some(2));

        assert!(g.update_decimal_if_greater("max", Decimal::from(-7)).unwrap());
        assert!(!g.update_decimal_if_greater("max", Decimal::from(-9)).unwrap());
        assert_eq!(g.decimal_value("max").unwrap(), Some(Decimal::from(-7)));

        assert!(g.update_decimal_if_less("min", Decimal::from(4)).unwrap());
        assert!(g.update_decimal_if_less("min", Decimal::from(2)).unwrap());
        assert_eq!(g.decimal_value("min").unwrap(), Some(Decimal::from(2)));

        assert_eq!(g.decimal_value("missing").unwrap(), None);
    }

    #[test]
    fn test_sentinels() {
        let g = group();
        let max: Decimal = g.get_or_create_value("max", || Decimal::MIN).unwrap();
        assert_eq!(max, Decimal::MIN);
        assert!(!g.update_decimal_if_greater("max", Decimal::MIN).unwrap());
        assert_eq!(g.decimal_value("max").unwrap(), Some(Decimal::MIN));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let g = group();
        g.increment_int_value("n").unwrap();
        assert!(g.add_decimal_value("n", Decimal::ONE).is_err());
        assert!(g.get_or_create_value::<String, _>("n", String::new).is_err());
    }

    #[test]
    fn test_distinct() {
        let g = group();
        assert!(g.insert_distinct("seen", &Value::from(1)).unwrap());
        assert!(!g.insert_distinct("seen", &Value::from(1.0)).unwrap());
        assert!(!g.insert_distinct("seen", &Value::Null).unwrap());
        assert!(g.insert_distinct("seen", &Value::from("1")).unwrap());
        assert_eq!(g.distinct_count("seen").unwrap(), 2);
        assert_eq!(g.distinct_count("other").unwrap(), 0);
    }

    #[test]
    fn test_converter_is_retained() {
        fn double(v: &i64) -> i64 {
            v * 2
        }
        fn triple(v: &i64) -> i64 {
            v * 3
        }
        let g = group();
        assert_eq!(g.get_or_create_value_with_converter("c", || 21i64, double).unwrap(), 42);
        // The stored raw value and the first converter win
        assert_eq!(g.get_or_create_value_with_converter("c", || 1i64, triple).unwrap(), 42);
        assert!(g.has_binding("c"));
    }

    #[test]
    fn test_concurrent_updates() {
        let g = Arc::new(group());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let g = Arc::clone(&g);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        g.hit();
                        g.add_decimal_value("sum", Decimal::ONE).unwrap();
                        g.increment_int_value("n").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(g.hits(), 8000);
        assert_eq!(g.decimal_value("sum").unwrap(), Some(Decimal::from(8000)));
        assert_eq!(g.int_value("n").unwrap(), Some(8000));
    }
}
