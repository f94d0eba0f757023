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

//! Implementation of the scalar function `canonize_time` that converts the values of a time
//! column to time keys, i.e., 64-bit signed integers with nanoseconds since the Unix epoch. Values
//! in timestamp columns are converted from the native time unit of the column while values in
//! integer columns are converted from the time unit declared for the column.

use std::any::Any;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int64Array};
use arrow::compute;
use arrow::datatypes::{DataType, UInt64Type};
use datafusion::error::{DataFusionError, Result as DataFusionResult};
use datafusion::logical_expr::sort_properties::{ExprProperties, SortProperties};
use datafusion::logical_expr::{
    ColumnarValue, ScalarFunctionArgs, ScalarUDF, ScalarUDFImpl, Signature, Volatility,
};
use timeorder_types::error::TimeorderTypesError;
use timeorder_types::time_unit::{self, TimeUnit};
use timeorder_types::types::{ArrowTimeKey, TimeKey, TimeKeyArray};

/// Name of the scalar function that converts a time column to time keys.
pub const CANONIZE_TIME_UDF_NAME: &str = "canonize_time";

/// Return a [`ScalarUDF`] that converts the values in `time_column` to time keys. Integer values
/// are in `integer_time_unit`.
pub fn canonize_time_udf(time_column: &str, integer_time_unit: TimeUnit) -> ScalarUDF {
    ScalarUDF::new_from_impl(CanonizeTimeUdf::new(time_column, integer_time_unit))
}

/// A scalar function that converts an integer or timestamp column to time keys. The conversion is
/// strictly increasing, so rows keep their order and distinct values stay distinct. Values that
/// cannot be represented as time keys and null values fail the query with an error that can be
/// converted back to [`TimeorderTypesError`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CanonizeTimeUdf {
    /// Name of the column the values are read from, only used in errors.
    time_column: String,
    /// Time unit of the values if the column is an integer column.
    integer_time_unit: TimeUnit,
    signature: Signature,
}

impl CanonizeTimeUdf {
    pub fn new(time_column: &str, integer_time_unit: TimeUnit) -> Self {
        Self {
            time_column: time_column.to_owned(),
            integer_time_unit,
            signature: Signature::any(1, Volatility::Immutable),
        }
    }

    /// Convert `array` to time keys. If `array` contains a null value, a value that cannot be
    /// converted without overflow, or is not an integer or timestamp array, return
    /// [`TimeorderTypesError`].
    fn canonize_array(&self, array: &ArrayRef) -> Result<TimeKeyArray, TimeorderTypesError> {
        if array.null_count() > 0 {
            return Err(TimeorderTypesError::NullTimeValue(self.time_column.clone()));
        }

        let source_time_unit =
            time_unit::resolve_source_time_unit(Some(self.integer_time_unit), array.data_type())
                .ok_or_else(|| {
                    TimeorderTypesError::InvalidArgument(format!(
                        "'{}' is {} but must be an integer or a timestamp.",
                        self.time_column,
                        array.data_type()
                    ))
                })?;

        let values = self.values_as_time_keys(array, source_time_unit)?;

        if source_time_unit == TimeUnit::Nanosecond {
            return Ok(values);
        }

        values
            .values()
            .iter()
            .map(|value| time_unit::to_time_key(*value, source_time_unit))
            .collect::<Result<Vec<TimeKey>, TimeorderTypesError>>()
            .map(Int64Array::from)
    }

    /// Return the values in `array` as 64-bit signed integers without changing their time unit.
    fn values_as_time_keys(
        &self,
        array: &ArrayRef,
        source_time_unit: TimeUnit,
    ) -> Result<TimeKeyArray, TimeorderTypesError> {
        if let Some(unsigned_values) = array.as_primitive_opt::<UInt64Type>() {
            return unsigned_values
                .values()
                .iter()
                .map(|value| {
                    TimeKey::try_from(*value).map_err(|_| TimeorderTypesError::Overflow {
                        value: *value as i128,
                        from: source_time_unit,
                        to: TimeUnit::Nanosecond,
                    })
                })
                .collect::<Result<Vec<TimeKey>, TimeorderTypesError>>()
                .map(Int64Array::from);
        }

        // Casting the other integer and timestamp types to Int64 is lossless.
        let values = compute::cast(array, &DataType::Int64)
            .map_err(|error| TimeorderTypesError::InvalidArgument(error.to_string()))?;

        values
            .as_primitive_opt::<ArrowTimeKey>()
            .cloned()
            .ok_or_else(|| {
                TimeorderTypesError::InvalidArgument(format!(
                    "'{}' could not be cast to time keys.",
                    self.time_column
                ))
            })
    }
}

impl ScalarUDFImpl for CanonizeTimeUdf {
    /// Return `self` as [`Any`] so it can be downcast.
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        CANONIZE_TIME_UDF_NAME
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn return_type(&self, _arg_types: &[DataType]) -> DataFusionResult<DataType> {
        Ok(DataType::Int64)
    }

    /// Convert the values in the only argument to time keys. Errors are returned as
    /// [`DataFusionError::External`] so the original [`TimeorderTypesError`] can be recovered.
    fn invoke_with_args(&self, args: ScalarFunctionArgs) -> DataFusionResult<ColumnarValue> {
        let arrays = ColumnarValue::values_to_arrays(&args.args)?;

        let [array] = arrays.as_slice() else {
            return Err(DataFusionError::Plan(format!(
                "{CANONIZE_TIME_UDF_NAME} expects one argument but got {}.",
                arrays.len()
            )));
        };

        let time_keys = self
            .canonize_array(array)
            .map_err(|error| DataFusionError::External(Box::new(error)))?;

        Ok(ColumnarValue::Array(Arc::new(time_keys)))
    }

    /// Specify that the output is ordered like the input as the conversion is strictly
    /// increasing.
    fn output_ordering(&self, inputs: &[ExprProperties]) -> DataFusionResult<SortProperties> {
        Ok(inputs
            .first()
            .map_or(SortProperties::Unordered, |input| input.sort_properties))
    }

    /// Two instances are only equal if they convert the same column from the same time unit.
    fn equals(&self, other: &dyn ScalarUDFImpl) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
