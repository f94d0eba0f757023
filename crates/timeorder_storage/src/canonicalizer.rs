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

//! Canonicalization of the time column of a [`DataFrame`]. A canonical [`DataFrame`] has the time
//! keys in its first column named [`TIME_COLUMN`] followed by the other columns in their original
//! order. Canonicalization only adds a projection to the logical plan, so no data is read until
//! the plan is executed.

use datafusion::common::Column;
use datafusion::dataframe::DataFrame;
use datafusion::logical_expr::Expr;
use timeorder_types::schemas::TIME_COLUMN;
use timeorder_types::time_unit::{self, TimeUnit};
use tracing::{debug, warn};

use crate::error::{Result, TimeorderStorageError};
use crate::query::canonize_time_udf;

/// A [`DataFrame`] in canonical form and the caller's claim about its order.
#[derive(Debug, Clone)]
pub struct CanonicalDataFrame {
    /// The [`DataFrame`] with the time keys in the first column.
    data_frame: DataFrame,
    /// Name of the column the time keys are computed from.
    source_time_column: String,
    /// Time unit the values in the source column are in.
    source_time_unit: TimeUnit,
    /// `true` if the caller declared that the data is sorted by the time column.
    is_sorted_hint: bool,
}

impl CanonicalDataFrame {
    pub fn data_frame(&self) -> &DataFrame {
        &self.data_frame
    }

    pub fn into_data_frame(self) -> DataFrame {
        self.data_frame
    }

    pub fn source_time_column(&self) -> &str {
        &self.source_time_column
    }

    pub fn source_time_unit(&self) -> TimeUnit {
        self.source_time_unit
    }

    pub fn is_sorted_hint(&self) -> bool {
        self.is_sorted_hint
    }
}

/// Return `data_frame` in canonical form with the time keys computed from `time_column` in the
/// first column named [`TIME_COLUMN`]. Values in integer columns are in `time_unit` or
/// nanoseconds if it is [`None`], while values in timestamp columns are always in the native time
/// unit of the column. If `time_column` does not exist, is not an integer or timestamp column, or
/// another column is named [`TIME_COLUMN`], [`TimeorderStorageError`] is returned. Values that
/// cannot be converted to time keys are reported when the plan is executed.
pub fn canonize(
    data_frame: DataFrame,
    time_column: &str,
    time_unit: Option<TimeUnit>,
    is_sorted_hint: bool,
) -> Result<CanonicalDataFrame> {
    let (time_column_index, source_time_unit) =
        resolve_time_column(&data_frame, time_column, time_unit)?;

    if time_column != TIME_COLUMN
        && data_frame
            .schema()
            .fields()
            .iter()
            .any(|field| field.name() == TIME_COLUMN)
    {
        return Err(TimeorderStorageError::ReservedColumnName(
            TIME_COLUMN.to_owned(),
        ));
    }

    let mut columns = Vec::with_capacity(data_frame.schema().fields().len());
    columns.push(canonize_time_expr(
        &data_frame,
        time_column_index,
        source_time_unit,
        TIME_COLUMN,
    ));

    for index in 0..data_frame.schema().fields().len() {
        if index != time_column_index {
            columns.push(column_expr(&data_frame, index));
        }
    }

    debug!(
        time_column,
        %source_time_unit,
        is_sorted_hint,
        "Canonicalized time column."
    );

    Ok(CanonicalDataFrame {
        data_frame: data_frame.select(columns)?,
        source_time_column: time_column.to_owned(),
        source_time_unit,
        is_sorted_hint,
    })
}

/// Return `data_frame` with the values in `time_column` replaced by time keys. The column keeps
/// its name and position. Values in integer columns are in `time_unit` or nanoseconds if it is
/// [`None`], while values in timestamp columns are always in the native time unit of the column.
/// If `time_column` does not exist or is not an integer or timestamp column,
/// [`TimeorderStorageError`] is returned.
pub fn canonize_time(
    data_frame: DataFrame,
    time_column: &str,
    time_unit: Option<TimeUnit>,
) -> Result<DataFrame> {
    let (time_column_index, source_time_unit) =
        resolve_time_column(&data_frame, time_column, time_unit)?;

    let columns: Vec<Expr> = (0..data_frame.schema().fields().len())
        .map(|index| {
            if index == time_column_index {
                canonize_time_expr(&data_frame, index, source_time_unit, time_column)
            } else {
                column_expr(&data_frame, index)
            }
        })
        .collect();

    Ok(data_frame.select(columns)?)
}

/// Return the index of `time_column` in `data_frame` and the time unit of its values. If
/// `time_column` does not exist or is not an integer or timestamp column,
/// [`TimeorderStorageError`] is returned.
fn resolve_time_column(
    data_frame: &DataFrame,
    time_column: &str,
    time_unit: Option<TimeUnit>,
) -> Result<(usize, TimeUnit)> {
    let schema = data_frame.schema().as_arrow();

    let index = schema
        .fields()
        .iter()
        .position(|field| field.name() == time_column)
        .ok_or_else(|| TimeorderStorageError::MissingColumn {
            column: time_column.to_owned(),
            available: schema
                .fields()
                .iter()
                .map(|field| field.name().clone())
                .collect(),
        })?;

    let data_type = schema.field(index).data_type();

    let source_time_unit = time_unit::resolve_source_time_unit(time_unit, data_type)
        .ok_or_else(|| TimeorderStorageError::InvalidTimeColumn {
            column: time_column.to_owned(),
            data_type: data_type.clone(),
        })?;

    if let Some(time_unit) = time_unit {
        if !data_type.is_integer() {
            warn!(
                time_column,
                declared = %time_unit,
                native = %source_time_unit,
                "Ignoring the declared time unit as the time column is a timestamp column."
            );
        }
    }

    Ok((index, source_time_unit))
}

/// Return an expression that converts the column at `index` in `data_frame` to time keys and
/// names the result `name`.
fn canonize_time_expr(
    data_frame: &DataFrame,
    index: usize,
    source_time_unit: TimeUnit,
    name: &str,
) -> Expr {
    let column = column_expr(data_frame, index);
    let source_time_column = data_frame.schema().field(index).name();

    canonize_time_udf::canonize_time_udf(source_time_column, source_time_unit)
        .call(vec![column])
        .alias(name)
}

/// Return an expression that references the column at `index` in `data_frame` including its
/// qualifier so columns with the same name in different relations are not confused.
fn column_expr(data_frame: &DataFrame, index: usize) -> Expr {
    Expr::Column(Column::from(data_frame.schema().qualified_field(index)))
}
