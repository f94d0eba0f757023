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

//! Implementation of functions that generate [`RecordBatches`](RecordBatch) with time keys with a
//! specific structure and split them into partitions.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, PrimitiveArray, RecordBatch, StringArray};
use arrow::datatypes::{
    DataType, Field, Schema, SchemaRef, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use timeorder_types::schemas::TIME_COLUMN;
use timeorder_types::time_unit::TimeUnit;

use crate::{TAG_COLUMN, VALUE_COLUMN};

/// Return the [`Schema`] of the batches created by [`time_value_batch()`] with the time column
/// named `time_column` and typed `time_data_type`.
pub fn time_value_schema(time_column: &str, time_data_type: DataType) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(VALUE_COLUMN, DataType::Float64, false),
        Field::new(time_column, time_data_type, false),
        Field::new(TAG_COLUMN, DataType::Utf8, false),
    ]))
}

/// Return a [`RecordBatch`] with the columns `value`, `time`, and `tag`. The time column is not
/// the first column so the tests can check that it is moved to the front. Each value is half of
/// its time key and the tag alternates between `even` and `odd`.
pub fn time_value_batch(time_keys: &[i64]) -> RecordBatch {
    named_time_value_batch(TIME_COLUMN, time_keys)
}

/// Return a [`RecordBatch`] like [`time_value_batch()`] with the time column named `time_column`.
pub fn named_time_value_batch(time_column: &str, time_keys: &[i64]) -> RecordBatch {
    let time_keys: ArrayRef = Arc::new(Int64Array::from(time_keys.to_vec()));
    time_value_batch_with_time_array(time_column, time_keys)
}

/// Return a [`RecordBatch`] like [`time_value_batch()`] with a timestamp column in `time_unit`.
pub fn timestamp_value_batch(time_values: &[i64], time_unit: TimeUnit) -> RecordBatch {
    let time_values = time_values.to_vec();
    let time_array: ArrayRef = match time_unit {
        TimeUnit::Second => Arc::new(PrimitiveArray::<TimestampSecondType>::from(time_values)),
        TimeUnit::Millisecond => {
            Arc::new(PrimitiveArray::<TimestampMillisecondType>::from(time_values))
        }
        TimeUnit::Microsecond => {
            Arc::new(PrimitiveArray::<TimestampMicrosecondType>::from(time_values))
        }
        TimeUnit::Nanosecond => {
            Arc::new(PrimitiveArray::<TimestampNanosecondType>::from(time_values))
        }
    };

    time_value_batch_with_time_array(TIME_COLUMN, time_array)
}

/// Return a [`RecordBatch`] like [`time_value_batch()`] where the time column is `Utf8`, so it
/// cannot be used as a time column.
pub fn string_time_batch(length: usize) -> RecordBatch {
    let time_array: ArrayRef = Arc::new(StringArray::from_iter_values(
        (0..length).map(|index| format!("2024-01-01T00:00:{index:02}")),
    ));

    time_value_batch_with_time_array(TIME_COLUMN, time_array)
}

fn time_value_batch_with_time_array(time_column: &str, time_array: ArrayRef) -> RecordBatch {
    let length = time_array.len();
    let schema = time_value_schema(time_column, time_array.data_type().clone());

    // The values are derived from the row index so they can be checked after reordering.
    let values: Vec<f64> = (0..length).map(|index| index as f64 / 2.0).collect();
    let tags: Vec<&str> = (0..length)
        .map(|index| if index % 2 == 0 { "even" } else { "odd" })
        .collect();

    // unwrap() is safe as the columns match the schema.
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Float64Array::from(values)),
            time_array,
            Arc::new(StringArray::from(tags)),
        ],
    )
    .unwrap()
}

/// Return `length` ascending time keys starting at zero.
pub fn ascending_time_keys(length: usize) -> Vec<i64> {
    (0..length as i64).collect()
}

/// Return `length` distinct time keys in a random but reproducible order.
pub fn shuffled_time_keys(length: usize, seed: u64) -> Vec<i64> {
    let mut time_keys = ascending_time_keys(length);
    let mut randomizer = StdRng::seed_from_u64(seed);
    time_keys.shuffle(&mut randomizer);
    time_keys
}

/// Return `length` irregular ascending time keys where each time key is 10 to 19 nanoseconds after
/// the previous time key and where every fifth time key is repeated.
pub fn irregular_time_keys_with_duplicates(length: usize, seed: u64) -> Vec<i64> {
    let mut randomizer = StdRng::seed_from_u64(seed);
    let mut time_keys = Vec::with_capacity(length);
    let mut previous_time_key: i64 = 0;

    for index in 0..length {
        if index % 5 != 4 {
            previous_time_key += randomizer.random_range(10..20);
        }
        time_keys.push(previous_time_key);
    }

    time_keys
}

/// Split `batch` into `partition_count` partitions of almost the same number of rows. Partitions
/// are empty if `batch` has fewer rows than `partition_count`.
pub fn split_into_partitions(batch: &RecordBatch, partition_count: usize) -> Vec<Vec<RecordBatch>> {
    let rows_per_partition = batch.num_rows().div_ceil(partition_count.max(1));

    (0..partition_count)
        .map(|partition| {
            let offset = (partition * rows_per_partition).min(batch.num_rows());
            let length = rows_per_partition.min(batch.num_rows() - offset);
            vec![batch.slice(offset, length)]
        })
        .collect()
}

/// Return the time keys in `partitions` in partition order and then row order. The time column
/// must be an `Int64` column named `time`.
pub fn time_keys_of_partitions(partitions: &[Vec<RecordBatch>]) -> Vec<i64> {
    partitions
        .iter()
        .flatten()
        .flat_map(|batch| {
            // unwrap() is safe as the time column is always an Int64 column in the tests.
            let time_column = batch.column_by_name(TIME_COLUMN).unwrap();
            let time_keys = time_column.as_any().downcast_ref::<Int64Array>().unwrap();
            time_keys.values().to_vec()
        })
        .collect()
}
