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

//! Implementation of functions that register test data with Apache DataFusion as in-memory tables
//! so the tests can create [`DataFrames`](DataFrame) with a known partitioning and ordering.

use std::sync::Arc;

use arrow::array::RecordBatch;
use datafusion::dataframe::DataFrame;
use datafusion::datasource::MemTable;
use datafusion::logical_expr::col;
use datafusion::prelude::SessionContext;
use timeorder_types::schemas::TIME_COLUMN;

use crate::data_generation;

/// Return a [`DataFrame`] that scans `partitions` with one output partition per element. If
/// `sort_column` is [`Some`], the scan declares that each partition is sorted ascending by it.
pub fn memory_data_frame(
    session_context: &SessionContext,
    partitions: Vec<Vec<RecordBatch>>,
    sort_column: Option<&str>,
) -> DataFrame {
    // unwrap() is safe as the tests always pass at least one partition with at least one batch.
    let schema = partitions[0][0].schema();
    let mut mem_table = MemTable::try_new(schema, partitions).unwrap();

    if let Some(sort_column) = sort_column {
        mem_table = mem_table.with_sort_order(vec![vec![col(sort_column).sort(true, false)]]);
    }

    session_context.read_table(Arc::new(mem_table)).unwrap()
}

/// Return a [`DataFrame`] with the rows of [`time_value_batch()`](data_generation::time_value_batch)
/// for `time_keys` split into `partition_count` partitions. If `is_sorted` is `true`, the scan
/// declares that each partition is sorted by the time column.
pub fn time_value_data_frame(
    session_context: &SessionContext,
    time_keys: &[i64],
    partition_count: usize,
    is_sorted: bool,
) -> DataFrame {
    let batch = data_generation::time_value_batch(time_keys);
    let partitions = data_generation::split_into_partitions(&batch, partition_count);
    let sort_column = is_sorted.then_some(TIME_COLUMN);

    memory_data_frame(session_context, partitions, sort_column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_value_data_frame_keeps_partitions() {
        let session_context = SessionContext::new();
        let data_frame = time_value_data_frame(&session_context, &[0, 1, 2, 3, 4], 2, false);

        let partitions = data_frame.collect_partitioned().await.unwrap();
        let time_keys = data_generation::time_keys_of_partitions(&partitions);

        assert_eq!(partitions.len(), 2);
        assert_eq!(time_keys, vec![0, 1, 2, 3, 4]);
    }
}
