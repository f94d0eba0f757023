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

//! Ensures that the rows of a canonical [`DataFrame`](datafusion::dataframe::DataFrame) are range
//! partitioned by time key with each partition sorted by time key. If the physical plan already
//! guarantees this, its partitions are reused as they are, otherwise the rows are sorted and split
//! into contiguous partitions of near equal size.

use std::sync::Arc;

use arrow::array::{AsArray, RecordBatch};
use arrow::compute;
use datafusion::execution::context::TaskContext;
use datafusion::physical_plan::sorts::sort::SortExec;
use datafusion::physical_plan::sorts::sort_preserving_merge::SortPreservingMergeExec;
use datafusion::physical_plan::{self, ExecutionPlan, ExecutionPlanProperties, displayable};
use timeorder_types::schemas::TIME_COLUMN;
use timeorder_types::types::{ArrowTimeKey, TimeKeyArray};
use tracing::{debug, info};

use crate::canonicalizer::CanonicalDataFrame;
use crate::error::{Result, TimeorderStorageError};
use crate::plan;
use crate::query;

/// The batches of each partition, in partition order.
pub type OrderedPartitions = Vec<Vec<RecordBatch>>;

/// Return the rows of `canonical` range partitioned by time key with each partition sorted by time
/// key, and `true` if the partitions of its physical plan were reused. If the caller declared that
/// `canonical` is sorted but its physical plan does not guarantee it,
/// [`TimeorderStorageError::InconsistentSortHint`] is returned. Empty partitions are dropped.
pub async fn ensure_ordered(canonical: &CanonicalDataFrame) -> Result<(OrderedPartitions, bool)> {
    let data_frame = canonical.data_frame().clone();
    let task_context = Arc::new(data_frame.task_ctx());
    let plan = data_frame.create_physical_plan().await?;

    let is_sorted = plan::is_sorted(&plan, TIME_COLUMN);

    match (canonical.is_sorted_hint(), is_sorted) {
        (true, false) => Err(TimeorderStorageError::InconsistentSortHint {
            column: canonical.source_time_column().to_owned(),
            plan: displayable(plan.as_ref()).indent(true).to_string(),
        }),
        (_, true) => {
            let partitions = physical_plan::collect_partitioned(plan, task_context).await?;
            let partitions = drop_empty(partitions);

            info!(
                partitions = partitions.len(),
                "Reusing partitions already sorted by time."
            );

            Ok((partitions, true))
        }
        (false, false) => {
            let partitions = sort_and_split(plan, task_context).await?;
            Ok((partitions, false))
        }
    }
}

/// Sort the rows produced by `plan` by time key and split them into at most as many partitions as
/// the target partitions of `task_context`.
async fn sort_and_split(
    plan: Arc<dyn ExecutionPlan>,
    task_context: Arc<TaskContext>,
) -> Result<OrderedPartitions> {
    let schema = plan.schema();
    let input_partitions = plan.output_partitioning().partition_count();

    // The time column is always the first column of a canonical data frame.
    let ordering = query::time_ordering(0);
    let sort_exec = Arc::new(SortExec::new(ordering.clone(), plan).with_preserve_partitioning(true));
    let merge_exec = Arc::new(SortPreservingMergeExec::new(ordering, sort_exec));

    let batches = physical_plan::collect(merge_exec, task_context.clone()).await?;
    let sorted_batch = compute::concat_batches(&schema, &batches)?;

    let session_config = task_context.session_config();
    let partitions = split_sorted_batch(
        &sorted_batch,
        session_config.target_partitions(),
        session_config.batch_size(),
    )?;

    info!(
        rows = sorted_batch.num_rows(),
        input_partitions,
        output_partitions = partitions.len(),
        "Sorted rows by time and split them into range partitions."
    );

    Ok(partitions)
}

/// Split `sorted_batch` which is sorted by the time column into at most `target_partitions`
/// contiguous partitions of near equal size. Rows with the same time key are always put in the
/// same partition, so fewer partitions are returned if there are many duplicate time keys. Each
/// partition consists of batches with at most `batch_size` rows.
pub(crate) fn split_sorted_batch(
    sorted_batch: &RecordBatch,
    target_partitions: usize,
    batch_size: usize,
) -> Result<OrderedPartitions> {
    let num_rows = sorted_batch.num_rows();
    if num_rows == 0 {
        return Ok(vec![]);
    }

    if target_partitions == 0 || batch_size == 0 {
        return Err(TimeorderStorageError::InvalidArgument(
            "The target number of partitions and the batch size must be positive.".to_owned(),
        ));
    }

    let time_keys = time_keys(sorted_batch)?;
    let rows_per_partition = num_rows.div_ceil(target_partitions.min(num_rows));

    let mut partitions = Vec::with_capacity(target_partitions);
    let mut begin = 0;

    while begin < num_rows {
        let mut end = (begin + rows_per_partition).min(num_rows);

        // Move the boundary past rows with the same time key as the last row.
        while end < num_rows && time_keys.value(end) == time_keys.value(end - 1) {
            end += 1;
        }

        let partition = (begin..end)
            .step_by(batch_size)
            .map(|offset| sorted_batch.slice(offset, batch_size.min(end - offset)))
            .collect();

        partitions.push(partition);
        begin = end;
    }

    debug!(
        rows = num_rows,
        target_partitions,
        partitions = partitions.len(),
        "Split sorted rows into partitions."
    );

    Ok(partitions)
}

/// Return the time keys in the first column of `batch`. If the first column is not the time column
/// with time keys, [`TimeorderStorageError`] is returned.
pub(crate) fn time_keys(batch: &RecordBatch) -> Result<&TimeKeyArray> {
    let schema = batch.schema_ref();

    if schema.fields().is_empty() || schema.field(0).name() != TIME_COLUMN {
        return Err(TimeorderStorageError::InvalidArgument(format!(
            "The first column must be '{TIME_COLUMN}'."
        )));
    }

    batch
        .column(0)
        .as_primitive_opt::<ArrowTimeKey>()
        .ok_or_else(|| TimeorderStorageError::InvalidTimeColumn {
            column: TIME_COLUMN.to_owned(),
            data_type: batch.column(0).data_type().clone(),
        })
}

/// Remove empty batches and then empty partitions from `partitions`.
pub(crate) fn drop_empty(partitions: Vec<Vec<RecordBatch>>) -> OrderedPartitions {
    partitions
        .into_iter()
        .map(|batches| {
            batches
                .into_iter()
                .filter(|batch| batch.num_rows() > 0)
                .collect::<Vec<RecordBatch>>()
        })
        .filter(|batches| !batches.is_empty())
        .collect()
}
