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

//! Implementation of [`OrderedContainer`], an immutable dataset that is range partitioned by time
//! key with each partition sorted by time key, and of the conversions between it and Apache
//! DataFusion [`DataFrames`](DataFrame). The partitions are shared through an [`Arc`], so cloning a
//! container or converting it to a [`DataFrame`] does not copy any rows.

use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use datafusion::dataframe::DataFrame;
use datafusion::execution::context::TaskContext;
use datafusion::prelude::SessionContext;
use timeorder_types::part_info::PartInfo;
use timeorder_types::schemas::{TIME_COLUMN, TIME_FIELD};
use timeorder_types::time_unit::TimeUnit;
use timeorder_types::types::TimeKey;
use tracing::info;

use crate::canonicalizer;
use crate::error::{Result, TimeorderStorageError};
use crate::partitioner::{self, OrderedPartitions};
use crate::query::ordered_partitions_exec::OrderedPartitionsExec;
use crate::query::ordered_table::OrderedTable;
use crate::range_index;

/// A dataset that is range partitioned by time key with each partition sorted by time key. The
/// time keys are in the first column named [`TIME_COLUMN`]. Empty partitions are never stored and
/// [`PartInfo`] describes the range of time keys in each partition.
#[derive(Clone, Debug)]
pub struct OrderedContainer {
    /// Schema of the container with the time column first.
    schema: SchemaRef,
    /// The range of time keys in each partition.
    part_info: PartInfo,
    /// The non-empty partitions in the order of their ranges.
    partitions: Arc<Vec<Vec<RecordBatch>>>,
}

impl OrderedContainer {
    /// Convert `data_frame` to an [`OrderedContainer`] with the time keys computed from
    /// `time_column`. Values in integer columns are in `time_unit` or nanoseconds if it is
    /// [`None`]. If `is_sorted` is `true` the caller declares that the physical plan of
    /// `data_frame` is already sorted by `time_column`, and if so the partitions are reused,
    /// otherwise [`TimeorderStorageError::InconsistentSortHint`] is returned. If `is_sorted` is
    /// `false` the partitions are reused if the plan is sorted and sorted otherwise. Returns
    /// [`TimeorderStorageError`] if `time_column` cannot be converted to time keys or the plan
    /// cannot be executed.
    pub async fn from_tabular(
        data_frame: DataFrame,
        is_sorted: bool,
        time_unit: Option<TimeUnit>,
        time_column: &str,
    ) -> Result<Self> {
        let task_context = Arc::new(data_frame.task_ctx());
        let canonical = canonicalizer::canonize(data_frame, time_column, time_unit, is_sorted)?;
        let logical_schema = Arc::new(canonical.data_frame().schema().as_arrow().clone());

        let (partitions, reused) = partitioner::ensure_ordered(&canonical).await?;

        // The schema of the batches is used if possible as it is the schema of the physical plan.
        let schema = partitions
            .first()
            .and_then(|batches| batches.first())
            .map_or(logical_schema, RecordBatch::schema);

        let container = Self::try_new(schema, partitions, task_context).await?;

        info!(
            time_column,
            reused,
            partitions = container.num_partitions(),
            rows = container.num_rows(),
            "Created ordered container."
        );

        Ok(container)
    }

    /// Create an [`OrderedContainer`] from `partitions` with `schema` and build its [`PartInfo`]. If
    /// the first column of `schema` is not the time column or the partitions are not ordered by
    /// their ranges, [`TimeorderStorageError`] is returned.
    async fn try_new(
        schema: SchemaRef,
        partitions: OrderedPartitions,
        task_context: Arc<TaskContext>,
    ) -> Result<Self> {
        validate_schema(&schema)?;

        let partitions = Arc::new(partitioner::drop_empty(partitions));
        let ordered_partitions_exec =
            OrderedPartitionsExec::try_new(schema.clone(), partitions.clone(), None)?;
        let part_info = range_index::build_part_info(ordered_partitions_exec, task_context).await?;

        Ok(Self {
            schema,
            part_info,
            partitions,
        })
    }

    /// Create an [`OrderedContainer`] from `partitions` that are ordered by construction, e.g.,
    /// because they are a subset of the rows of another container.
    fn try_from_ordered_partitions(schema: SchemaRef, partitions: OrderedPartitions) -> Result<Self> {
        let partitions = partitioner::drop_empty(partitions);
        let part_info = range_index::part_info_of_partitions(&partitions)?;

        Ok(Self {
            schema,
            part_info,
            partitions: Arc::new(partitions),
        })
    }

    /// Return a [`DataFrame`] that scans the partitions of the container in `session_context`. The
    /// plan of the [`DataFrame`] has one partition per container partition and is recognized as
    /// sorted by [`TIME_COLUMN`].
    pub fn to_tabular(&self, session_context: &SessionContext) -> Result<DataFrame> {
        let ordered_table = OrderedTable::new(self.schema.clone(), self.partitions.clone());
        Ok(session_context.read_table(Arc::new(ordered_table))?)
    }

    /// Return a new container with the time column and `columns` in the order they are given. The
    /// rows and thus the [`PartInfo`] are unchanged. If a column does not exist,
    /// [`TimeorderStorageError::MissingColumn`] is returned.
    pub fn select_columns(&self, columns: &[&str]) -> Result<Self> {
        let mut indices = vec![0];

        for column in columns {
            let index = self.schema.index_of(column).map_err(|_| {
                TimeorderStorageError::MissingColumn {
                    column: (*column).to_owned(),
                    available: self.column_names(),
                }
            })?;

            if !indices.contains(&index) {
                indices.push(index);
            }
        }

        let schema = Arc::new(self.schema.project(&indices)?);
        let partitions = self
            .partitions
            .iter()
            .map(|batches| {
                batches
                    .iter()
                    .map(|batch| batch.project(&indices))
                    .collect::<std::result::Result<Vec<RecordBatch>, _>>()
            })
            .collect::<std::result::Result<Vec<Vec<RecordBatch>>, _>>()?;

        Ok(Self {
            schema,
            part_info: self.part_info.clone(),
            partitions: Arc::new(partitions),
        })
    }

    /// Return a new container with the rows whose time keys are in the half-open range from `begin`
    /// to `end`. Only the partitions whose ranges overlap the range are read. If `begin` is after
    /// `end`, [`TimeorderStorageError::InvalidArgument`] is returned.
    pub fn filter_time_range(&self, begin: TimeKey, end: TimeKey) -> Result<Self> {
        if begin > end {
            return Err(TimeorderStorageError::InvalidArgument(format!(
                "The begin {begin} of the time range is after its end {end}."
            )));
        }

        let mut partitions = Vec::new();
        for index in self.part_info.overlapping(begin, end) {
            let batches = self.partitions[index]
                .iter()
                .map(|batch| slice_time_range(batch, begin, end))
                .collect::<Result<Vec<RecordBatch>>>()?;

            partitions.push(batches);
        }

        Self::try_from_ordered_partitions(self.schema.clone(), partitions)
    }

    /// Return the time keys of all rows in partition order and then row order.
    pub fn time_keys(&self) -> Result<Vec<TimeKey>> {
        let mut time_keys = Vec::with_capacity(self.num_rows());

        for batch in self.partitions.iter().flatten() {
            time_keys.extend_from_slice(partitioner::time_keys(batch)?.values());
        }

        Ok(time_keys)
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn part_info(&self) -> &PartInfo {
        &self.part_info
    }

    pub fn partitions(&self) -> &[Vec<RecordBatch>] {
        &self.partitions
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Return the number of rows in all partitions.
    pub fn num_rows(&self) -> usize {
        self.partitions
            .iter()
            .flatten()
            .map(RecordBatch::num_rows)
            .sum()
    }

    fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }
}

/// Return `batch` with only the rows whose time keys are in the half-open range from `begin` to
/// `end`. `batch` must be sorted by time key.
fn slice_time_range(batch: &RecordBatch, begin: TimeKey, end: TimeKey) -> Result<RecordBatch> {
    let time_keys = partitioner::time_keys(batch)?.values();

    let offset = time_keys.partition_point(|time_key| *time_key < begin);
    let stop = time_keys.partition_point(|time_key| *time_key < end);

    Ok(batch.slice(offset, stop.saturating_sub(offset)))
}

/// Return [`TimeorderStorageError`] if the first field in `schema` is not the time column.
fn validate_schema(schema: &Schema) -> Result<()> {
    match schema.fields().first() {
        Some(field)
            if field.name() == TIME_FIELD.name() && field.data_type() == TIME_FIELD.data_type() =>
        {
            Ok(())
        }
        Some(field) => Err(TimeorderStorageError::InvalidTimeColumn {
            column: field.name().clone(),
            data_type: field.data_type().clone(),
        }),
        None => Err(TimeorderStorageError::MissingColumn {
            column: TIME_COLUMN.to_owned(),
            available: vec![],
        }),
    }
}
