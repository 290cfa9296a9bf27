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

//! Conversion of numeric inputs into the decimal accumulator type
//!
//! SUM, AVG, MIN and MAX all accumulate in [`Decimal`]. Rather than one
//! entry point per numeric width, every accumulator takes `impl ToDecimal`.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::value::Value;

/// Capability of being folded into a decimal accumulator
pub trait ToDecimal {
    /// The decimal image of this value
    ///
    /// `None` means the value does not contribute: NULL, a non-numeric
    /// value, or a float that has no decimal representation (NaN, infinity,
    /// out of range).
    fn to_decimal(&self) -> Option<Decimal>;
}

macro_rules! impl_to_decimal_lossless {
    ($($t:ty),*) => {
        $(
            impl ToDecimal for $t {
                #[inline]
                fn to_decimal(&self) -> Option<Decimal> {
                    Some(Decimal::from(*self))
                }
            }
        )*
    };
}

impl_to_decimal_lossless!(i8, i16, i32, i64, u8, u16, u32, u64);

impl ToDecimal for f32 {
    #[inline]
    fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from_f32(*self)
    }
}

impl ToDecimal for f64 {
    #[inline]
    fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from_f64(*self)
    }
}

impl ToDecimal for Decimal {
    #[inline]
    fn to_decimal(&self) -> Option<Decimal> {
        Some(*self)
    }
}

impl ToDecimal for Value {
    #[inline]
    fn to_decimal(&self) -> Option<Decimal> {
        self.as_decimal()
    }
}

impl<T: ToDecimal> ToDecimal for Option<T> {
    #[inline]
    fn to_decimal(&self) -> Option<Decimal> {
        self.as_ref().and_then(ToDecimal::to_decimal)
    }
}

impl<T: ToDecimal + ?Sized> ToDecimal for &T {
    #[inline]
    fn to_decimal(&self) -> Option<Decimal> {
        (**self).to_decimal()
    }
}
