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

//! Builds the [`PartInfo`] of a physical plan whose partitions are range partitioned by time key
//! and sorted by time key. Only the first time key of each partition is needed, so each partition
//! is only read until its first non-empty batch. The partitions are read concurrently and the
//! [`PartInfo`] is only built when all of them have been read.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use datafusion::execution::context::TaskContext;
use datafusion::physical_plan::{ExecutionPlan, ExecutionPlanProperties};
use futures::StreamExt;
use futures::future;
use timeorder_types::part_info::PartInfo;
use timeorder_types::types::TimeKey;
use tracing::debug;

use crate::error::{Result, TimeorderStorageError};
use crate::partitioner;

/// Return the [`PartInfo`] of `plan` computed from the first time key in each of its partitions.
/// The time column must be the first column of `plan`. Empty partitions followed by a non-empty
/// partition begin where it begins, while empty partitions after the last non-empty partition begin
/// right after its last time key. If the first time keys are not strictly increasing, the range of
/// a trailing empty partition cannot be represented, or `plan` cannot be executed,
/// [`TimeorderStorageError`] is returned.
pub async fn build_part_info(
    plan: Arc<dyn ExecutionPlan>,
    task_context: Arc<TaskContext>,
) -> Result<PartInfo> {
    let partition_count = plan.output_partitioning().partition_count();

    let first_time_keys = future::try_join_all(
        (0..partition_count)
            .map(|partition| first_time_key(plan.clone(), partition, task_context.clone())),
    )
    .await?;

    let trailing_begin = match first_time_keys.iter().rposition(Option::is_some) {
        Some(last_non_empty) if last_non_empty + 1 < partition_count => {
            let last_time_key = last_time_key(plan.clone(), last_non_empty, task_context).await?;
            Some(trailing_begin(last_non_empty, last_time_key)?)
        }
        _ => None,
    };

    let part_info = PartInfo::try_from_first_keys(&first_time_keys, trailing_begin)?;

    debug!(
        partitions = partition_count,
        empty_partitions = first_time_keys.iter().filter(|key| key.is_none()).count(),
        "Built PartInfo."
    );

    Ok(part_info)
}

/// Return the [`PartInfo`] of `partitions` which must be range partitioned by time key with each
/// partition sorted by time key and the time column first. If the first time keys are not strictly
/// increasing or the range of a trailing empty partition cannot be represented,
/// [`TimeorderStorageError`] is returned.
pub fn part_info_of_partitions(partitions: &[Vec<RecordBatch>]) -> Result<PartInfo> {
    let first_time_keys = partitions
        .iter()
        .map(|batches| {
            batches
                .iter()
                .find(|batch| batch.num_rows() > 0)
                .map(|batch| partitioner::time_keys(batch).map(|time_keys| time_keys.value(0)))
                .transpose()
        })
        .collect::<Result<Vec<Option<TimeKey>>>>()?;

    let trailing_begin = match first_time_keys.iter().rposition(Option::is_some) {
        Some(last_non_empty) if last_non_empty + 1 < partitions.len() => {
            let last_time_key = last_time_key_of_batches(&partitions[last_non_empty])?;
            Some(trailing_begin(last_non_empty, last_time_key)?)
        }
        _ => None,
    };

    Ok(PartInfo::try_from_first_keys(
        &first_time_keys,
        trailing_begin,
    )?)
}

/// Return the first time key in `partition` of `plan` or [`None`] if the partition is empty.
async fn first_time_key(
    plan: Arc<dyn ExecutionPlan>,
    partition: usize,
    task_context: Arc<TaskContext>,
) -> Result<Option<TimeKey>> {
    let mut stream = plan.execute(partition, task_context)?;

    while let Some(batch) = stream.next().await {
        let batch = batch?;
        if batch.num_rows() > 0 {
            return Ok(Some(partitioner::time_keys(&batch)?.value(0)));
        }
    }

    Ok(None)
}

/// Return the last time key in `partition` of `plan` or [`None`] if the partition is empty.
async fn last_time_key(
    plan: Arc<dyn ExecutionPlan>,
    partition: usize,
    task_context: Arc<TaskContext>,
) -> Result<Option<TimeKey>> {
    let mut stream = plan.execute(partition, task_context)?;
    let mut last_time_key = None;

    while let Some(batch) = stream.next().await {
        let batch = batch?;
        if batch.num_rows() > 0 {
            let time_keys = partitioner::time_keys(&batch)?;
            last_time_key = Some(time_keys.value(time_keys.len() - 1));
        }
    }

    Ok(last_time_key)
}

/// Return the last time key in `batches` or [`None`] if all of them are empty.
fn last_time_key_of_batches(batches: &[RecordBatch]) -> Result<Option<TimeKey>> {
    match batches.iter().rfind(|batch| batch.num_rows() > 0) {
        Some(batch) => {
            let time_keys = partitioner::time_keys(batch)?;
            Ok(Some(time_keys.value(time_keys.len() - 1)))
        }
        None => Ok(None),
    }
}

/// Return the begin of the empty partitions after partition `last_non_empty` which has
/// `last_time_key` as its last time key.
fn trailing_begin(last_non_empty: usize, last_time_key: Option<TimeKey>) -> Result<TimeKey> {
    last_time_key
        .and_then(|last_time_key| last_time_key.checked_add(1))
        .ok_or_else(|| {
            TimeorderStorageError::EmptyKeyRange(format!(
                "The partitions after partition {last_non_empty} are empty but partition \
                 {last_non_empty} ends at the largest time key."
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use timeorder_test::data_generation;
    use timeorder_types::part_info::PartitionRange;
    use timeorder_types::schemas::TIME_COLUMN;

    use crate::canonicalizer;
    use crate::query::ordered_partitions_exec::OrderedPartitionsExec;
    use crate::test;

    fn canonical_partitions(partitions: &[&[i64]]) -> Vec<Vec<RecordBatch>> {
        partitions
            .iter()
            .map(|time_keys| {
                if time_keys.is_empty() {
                    vec![]
                } else {
                    let batch = data_generation::time_value_batch(time_keys);
                    vec![batch.project(&[1, 0, 2]).unwrap()]
                }
            })
            .collect()
    }

    async fn part_info_of_exec(partitions: &[&[i64]]) -> Result<PartInfo> {
        let partitions = canonical_partitions(partitions);
        let schema = data_generation::time_value_batch(&[])
            .project(&[1, 0, 2])
            .unwrap()
            .schema();

        let exec = OrderedPartitionsExec::try_new(schema, Arc::new(partitions), None).unwrap();
        build_part_info(exec, Arc::new(TaskContext::default())).await
    }

    fn begins(part_info: &PartInfo) -> Vec<TimeKey> {
        part_info.ranges().iter().map(|range| range.begin).collect()
    }

    // Tests for build_part_info().
    #[tokio::test]
    async fn test_build_part_info_from_first_time_keys() {
        let part_info = part_info_of_exec(&[&[0, 1], &[2, 3], &[4, 5]]).await.unwrap();

        assert_eq!(
            part_info.ranges(),
            &[
                PartitionRange::new(0, 0),
                PartitionRange::new(1, 2),
                PartitionRange::new(2, 4)
            ]
        );
    }

    #[tokio::test]
    async fn test_build_part_info_with_empty_interior_partition() {
        let part_info = part_info_of_exec(&[&[0, 1], &[], &[4, 5]]).await.unwrap();
        assert_eq!(begins(&part_info), vec![0, 4, 4]);
    }

    #[tokio::test]
    async fn test_build_part_info_with_empty_trailing_partitions() {
        let part_info = part_info_of_exec(&[&[0, 1], &[2, 3], &[], &[]]).await.unwrap();
        assert_eq!(begins(&part_info), vec![0, 2, 4, 4]);
    }

    #[tokio::test]
    async fn test_build_part_info_with_empty_trailing_partition_after_max_time_key() {
        let result = part_info_of_exec(&[&[0, i64::MAX], &[]]).await;
        assert!(matches!(result, Err(TimeorderStorageError::EmptyKeyRange(_))));
    }

    #[tokio::test]
    async fn test_build_part_info_without_rows() {
        let part_info = part_info_of_exec(&[&[], &[]]).await.unwrap();
        assert!(part_info.is_empty());
    }

    #[tokio::test]
    async fn test_build_part_info_with_unordered_partitions() {
        let result = part_info_of_exec(&[&[5, 6], &[1, 2]]).await;
        assert!(matches!(result, Err(TimeorderStorageError::InvalidPartInfo(_))));
    }

    #[tokio::test]
    async fn test_build_part_info_only_reads_first_time_keys() {
        // The last time key of the first partition is not read so it is not compared.
        let part_info = part_info_of_exec(&[&[1, 2], &[2, 3]]).await.unwrap();
        assert_eq!(begins(&part_info), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_build_part_info_with_equal_first_time_keys() {
        let result = part_info_of_exec(&[&[2, 3], &[2, 4]]).await;
        assert!(matches!(result, Err(TimeorderStorageError::InvalidPartInfo(_))));
    }

    #[tokio::test]
    async fn test_build_part_info_of_canonical_plan() {
        let session_context = test::session_context(1);
        let data_frame = test::time_value_data_frame(&session_context, &[7, 8, 9], 1, true);
        let canonical = canonicalizer::canonize(data_frame, TIME_COLUMN, None, true).unwrap();

        let data_frame = canonical.into_data_frame();
        let task_context = Arc::new(data_frame.task_ctx());
        let plan = data_frame.create_physical_plan().await.unwrap();

        let part_info = build_part_info(plan, task_context).await.unwrap();
        assert_eq!(begins(&part_info), vec![7]);
    }

    // Tests for part_info_of_partitions().
    #[test]
    fn test_part_info_of_partitions_matches_build_part_info() {
        let partitions = canonical_partitions(&[&[0, 1], &[], &[4, 5], &[]]);
        let part_info = part_info_of_partitions(&partitions).unwrap();

        assert_eq!(begins(&part_info), vec![0, 4, 4, 6]);
    }

    #[test]
    fn test_part_info_of_partitions_without_partitions() {
        assert!(part_info_of_partitions(&[]).unwrap().is_empty());
    }
}
