/* Copyright 2024 The ModelarDB Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Implementation of [`TimeUnit`] and the overflow-checked conversion of time values between time
//! units. Time keys are always stored as nanoseconds since the Unix epoch, so values only have to
//! be converted when they are read from or written to a column in another time unit.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use arrow::datatypes::{DataType, TimeUnit as ArrowTimeUnit};

use crate::error::{Result, TimeorderTypesError};
use crate::types::TimeKey;

/// The time units a time value can be represented in. The variants are declared from the finest to
/// the coarsest granularity, so the derived [`Ord`] orders them by granularity, e.g.,
/// `TimeUnit::Second > TimeUnit::Millisecond`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TimeUnit {
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
}

impl TimeUnit {
    /// All time units from the finest to the coarsest granularity.
    pub const ALL: [TimeUnit; 4] = [
        TimeUnit::Nanosecond,
        TimeUnit::Microsecond,
        TimeUnit::Millisecond,
        TimeUnit::Second,
    ];

    /// Return the number of nanoseconds in one tick of the time unit.
    pub fn nanoseconds_per_unit(&self) -> i64 {
        match self {
            TimeUnit::Nanosecond => 1,
            TimeUnit::Microsecond => 1_000,
            TimeUnit::Millisecond => 1_000_000,
            TimeUnit::Second => 1_000_000_000,
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let name = match self {
            TimeUnit::Nanosecond => "nanoseconds",
            TimeUnit::Microsecond => "microseconds",
            TimeUnit::Millisecond => "milliseconds",
            TimeUnit::Second => "seconds",
        };

        write!(f, "{name}")
    }
}

impl FromStr for TimeUnit {
    type Err = TimeorderTypesError;

    /// Parse a [`TimeUnit`] from its abbreviation or its singular or plural name. Returns
    /// [`TimeorderTypesError`] if `value` is not the name of a time unit.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "ns" | "nanosecond" | "nanoseconds" => Ok(TimeUnit::Nanosecond),
            "us" | "µs" | "microsecond" | "microseconds" => Ok(TimeUnit::Microsecond),
            "ms" | "millisecond" | "milliseconds" => Ok(TimeUnit::Millisecond),
            "s" | "second" | "seconds" => Ok(TimeUnit::Second),
            _ => Err(TimeorderTypesError::InvalidArgument(format!(
                "'{value}' is not a valid time unit."
            ))),
        }
    }
}

impl From<ArrowTimeUnit> for TimeUnit {
    fn from(arrow_time_unit: ArrowTimeUnit) -> Self {
        match arrow_time_unit {
            ArrowTimeUnit::Nanosecond => TimeUnit::Nanosecond,
            ArrowTimeUnit::Microsecond => TimeUnit::Microsecond,
            ArrowTimeUnit::Millisecond => TimeUnit::Millisecond,
            ArrowTimeUnit::Second => TimeUnit::Second,
        }
    }
}

impl From<TimeUnit> for ArrowTimeUnit {
    fn from(time_unit: TimeUnit) -> Self {
        match time_unit {
            TimeUnit::Nanosecond => ArrowTimeUnit::Nanosecond,
            TimeUnit::Microsecond => ArrowTimeUnit::Microsecond,
            TimeUnit::Millisecond => ArrowTimeUnit::Millisecond,
            TimeUnit::Second => ArrowTimeUnit::Second,
        }
    }
}

/// Convert `value` from `from` to `to`. Converting to a finer time unit multiplies by the ratio
/// between the time units and returns [`TimeorderTypesError::Overflow`] if the result does not fit
/// in a [`TimeKey`]. Converting to a coarser time unit divides by the ratio and truncates toward
/// zero.
pub fn convert(value: TimeKey, from: TimeUnit, to: TimeUnit) -> Result<TimeKey> {
    let from_nanoseconds = from.nanoseconds_per_unit();
    let to_nanoseconds = to.nanoseconds_per_unit();

    if from_nanoseconds >= to_nanoseconds {
        value
            .checked_mul(from_nanoseconds / to_nanoseconds)
            .ok_or(TimeorderTypesError::Overflow {
                value: value as i128,
                from,
                to,
            })
    } else {
        Ok(value / (to_nanoseconds / from_nanoseconds))
    }
}

/// Convert `value` from `from` to nanoseconds which is the time unit of time keys.
pub fn to_time_key(value: TimeKey, from: TimeUnit) -> Result<TimeKey> {
    convert(value, from, TimeUnit::Nanosecond)
}

/// Return `true` if a column of type `data_type` can be converted to time keys, i.e., if it is an
/// integer or a timestamp column.
pub fn is_time_key_compatible(data_type: &DataType) -> bool {
    data_type.is_integer() || matches!(data_type, DataType::Timestamp(_, _))
}

/// Return the time unit the values in a column of type `data_type` are in. The native time unit is
/// always used for timestamp columns. For integer columns `declared_time_unit` is used and if it is
/// [`None`], the values are assumed to be nanoseconds. [`None`] is returned if `data_type` cannot
/// be converted to time keys.
pub fn resolve_source_time_unit(
    declared_time_unit: Option<TimeUnit>,
    data_type: &DataType,
) -> Option<TimeUnit> {
    match data_type {
        DataType::Timestamp(native_time_unit, _) => Some((*native_time_unit).into()),
        data_type if data_type.is_integer() => {
            Some(declared_time_unit.unwrap_or(TimeUnit::Nanosecond))
        }
        _ => None,
    }
}
