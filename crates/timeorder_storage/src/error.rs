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

//! The [`Error`] and [`Result`] types used throughout `timeorder_storage`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::result::Result as StdResult;

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use timeorder_types::error::TimeorderTypesError;
use timeorder_types::time_unit::TimeUnit;

/// Result type used throughout `timeorder_storage`.
pub type Result<T> = StdResult<T, TimeorderStorageError>;

/// Error type used throughout `timeorder_storage`.
#[derive(Debug)]
pub enum TimeorderStorageError {
    /// Error returned by Apache Arrow.
    Arrow(ArrowError),
    /// Error returned by Apache DataFusion.
    DataFusion(DataFusionError),
    /// Error returned when the range of an empty partition cannot be represented.
    EmptyKeyRange(String),
    /// Error returned when the caller declared that a dataset is sorted by `column` but its
    /// physical plan does not guarantee it.
    InconsistentSortHint { column: String, plan: String },
    /// Error returned when an invalid argument was passed.
    InvalidArgument(String),
    /// Error returned when the ranges of the partitions are not ordered.
    InvalidPartInfo(String),
    /// Error returned when `column` has a type that cannot be converted to time keys.
    InvalidTimeColumn { column: String, data_type: DataType },
    /// Error returned when `column` does not exist in a dataset with the columns in `available`.
    MissingColumn {
        column: String,
        available: Vec<String>,
    },
    /// Error returned when a time value in `column` is null.
    NullTimeValue(String),
    /// Error returned when converting `value` from `from` to `to` exceeds the range of a time key.
    Overflow {
        value: i128,
        from: TimeUnit,
        to: TimeUnit,
    },
    /// Error returned when `column` is not the time column but uses the name reserved for it.
    ReservedColumnName(String),
}

impl Display for TimeorderStorageError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Arrow(reason) => write!(f, "Arrow Error: {reason}"),
            Self::DataFusion(reason) => write!(f, "DataFusion Error: {reason}"),
            Self::EmptyKeyRange(reason) => write!(f, "Empty Key Range Error: {reason}"),
            Self::InconsistentSortHint { column, plan } => write!(
                f,
                "Inconsistent Sort Hint Error: the data is declared sorted by '{column}' but the \
                 plan does not guarantee it:\n{plan}"
            ),
            Self::InvalidArgument(reason) => write!(f, "Invalid Argument Error: {reason}"),
            Self::InvalidPartInfo(reason) => write!(f, "Invalid PartInfo Error: {reason}"),
            Self::InvalidTimeColumn { column, data_type } => write!(
                f,
                "Invalid Time Column Error: '{column}' is {data_type} but must be an integer or a \
                 timestamp."
            ),
            Self::MissingColumn { column, available } => write!(
                f,
                "Missing Column Error: '{column}' is not one of the columns [{}].",
                available.join(", ")
            ),
            Self::NullTimeValue(column) => {
                write!(f, "Null Time Value Error: '{column}' contains a null value.")
            }
            Self::Overflow { value, from, to } => write!(
                f,
                "Overflow Error: {value} cannot be converted from {from} to {to} without \
                 exceeding the range of a 64-bit signed integer."
            ),
            Self::ReservedColumnName(column) => write!(
                f,
                "Reserved Column Name Error: '{column}' is reserved for the time column."
            ),
        }
    }
}

impl Error for TimeorderStorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        // Return the error that caused self to occur if one exists.
        match self {
            Self::Arrow(reason) => Some(reason),
            Self::DataFusion(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<ArrowError> for TimeorderStorageError {
    fn from(error: ArrowError) -> Self {
        Self::Arrow(error)
    }
}

impl From<DataFusionError> for TimeorderStorageError {
    /// Errors raised while converting time values during query execution are wrapped by Apache
    /// DataFusion, so they are unwrapped to their original variant if possible.
    fn from(error: DataFusionError) -> Self {
        match find_types_error(&error) {
            Some(types_error) => types_error.into(),
            None => Self::DataFusion(error),
        }
    }
}

impl From<TimeorderTypesError> for TimeorderStorageError {
    fn from(error: TimeorderTypesError) -> Self {
        match error {
            TimeorderTypesError::EmptyKeyRange(reason) => Self::EmptyKeyRange(reason),
            TimeorderTypesError::InvalidArgument(reason) => Self::InvalidArgument(reason),
            TimeorderTypesError::InvalidPartInfo(reason) => Self::InvalidPartInfo(reason),
            TimeorderTypesError::NullTimeValue(column) => Self::NullTimeValue(column),
            TimeorderTypesError::Overflow { value, from, to } => Self::Overflow { value, from, to },
        }
    }
}

/// Return a copy of the first [`TimeorderTypesError`] in the chain of sources of `error`.
fn find_types_error(error: &DataFusionError) -> Option<TimeorderTypesError> {
    let mut maybe_error: Option<&(dyn Error + 'static)> = Some(error);

    while let Some(error) = maybe_error {
        if let Some(types_error) = error.downcast_ref::<TimeorderTypesError>() {
            return Some(types_error.clone());
        }
        maybe_error = error.source();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn test_external_types_error_is_unwrapped() {
        let types_error = TimeorderTypesError::Overflow {
            value: i64::MAX as i128,
            from: TimeUnit::Second,
            to: TimeUnit::Nanosecond,
        };
        let error: TimeorderStorageError = DataFusionError::External(Box::new(types_error)).into();

        assert!(matches!(
            error,
            TimeorderStorageError::Overflow {
                from: TimeUnit::Second,
                to: TimeUnit::Nanosecond,
                ..
            }
        ));
    }

    #[test]
    fn test_shared_and_contextual_types_error_is_unwrapped() {
        let types_error = TimeorderTypesError::NullTimeValue("time".to_owned());
        let external = DataFusionError::External(Box::new(types_error));
        let shared = DataFusionError::Shared(Arc::new(external));
        let error: TimeorderStorageError = shared.context("while sorting").into();

        assert!(matches!(error, TimeorderStorageError::NullTimeValue(column) if column == "time"));
    }

    #[test]
    fn test_other_datafusion_error_is_kept() {
        let error: TimeorderStorageError = DataFusionError::Plan("bad plan".to_owned()).into();
        assert!(matches!(error, TimeorderStorageError::DataFusion(_)));
    }
}
