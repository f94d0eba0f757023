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

//! The error types used throughout `timeorder_types`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::result::Result as StdResult;

use crate::time_unit::TimeUnit;

/// Result type used throughout `timeorder_types`.
pub type Result<T> = StdResult<T, TimeorderTypesError>;

/// Error type used throughout `timeorder_types`. It is [`Clone`] so it can be recovered from the
/// external errors Apache DataFusion wraps it in when it is raised during query execution.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeorderTypesError {
    /// Error returned when the range of an empty partition cannot be represented.
    EmptyKeyRange(String),
    /// Error returned when an invalid argument was passed.
    InvalidArgument(String),
    /// Error returned when partition ranges are not ordered or not contiguous.
    InvalidPartInfo(String),
    /// Error returned when a time value is null.
    NullTimeValue(String),
    /// Error returned when converting `value` from `from` to `to` exceeds the range of a time key.
    Overflow {
        value: i128,
        from: TimeUnit,
        to: TimeUnit,
    },
}

impl Error for TimeorderTypesError {}

impl Display for TimeorderTypesError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::EmptyKeyRange(reason) => write!(f, "Empty Key Range Error: {reason}"),
            Self::InvalidArgument(reason) => write!(f, "Invalid Argument Error: {reason}"),
            Self::InvalidPartInfo(reason) => write!(f, "Invalid PartInfo Error: {reason}"),
            Self::NullTimeValue(column) => {
                write!(f, "Null Time Value Error: '{column}' contains a null value.")
            }
            Self::Overflow { value, from, to } => write!(
                f,
                "Overflow Error: {value} cannot be converted from {from} to {to} without \
                 exceeding the range of a 64-bit signed integer."
            ),
        }
    }
}
