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

//! Implementation of the execution plan [`OrderedPartitionsExec`] which produces the partitions of
//! an ordered container unchanged, one output partition per container partition. Each partition is
//! sorted by the time column and the partitions are ordered by their ranges of time keys, which
//! the [`inspector`](crate::plan::inspector) recognizes so the partitions can be reused without
//! sorting them again.

use std::any::Any;
use std::fmt::{Formatter, Result as FmtResult};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::error::{DataFusionError, Result as DataFusionResult};
use datafusion::execution::context::TaskContext;
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::metrics::{BaselineMetrics, ExecutionPlanMetricsSet, MetricsSet};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
    SendableRecordBatchStream, Statistics,
};
use futures::stream;
use timeorder_types::schemas::TIME_COLUMN;

use crate::query;

/// An execution plan that produces the partitions of an ordered container. It is `pub(crate)` so
/// the [`inspector`](crate::plan::inspector) can pattern match on it.
#[derive(Debug)]
pub(crate) struct OrderedPartitionsExec {
    /// Schema of the execution plan after the projection is applied.
    schema: SchemaRef,
    /// Partitions of the ordered container with all of its columns.
    partitions: Arc<Vec<Vec<RecordBatch>>>,
    /// Indices of the columns to produce or [`None`] if all columns are produced.
    projection: Option<Vec<usize>>,
    /// Index of the time column in `schema` or [`None`] if it is not produced.
    time_column_index: Option<usize>,
    /// Properties about the plan used in query optimization.
    plan_properties: PlanProperties,
    /// Metrics collected during execution for use by EXPLAIN ANALYZE.
    metrics: ExecutionPlanMetricsSet,
}

impl OrderedPartitionsExec {
    /// Create an [`OrderedPartitionsExec`] that produces the columns in `projection` of
    /// `partitions` with `schema`. The time column must be the first column in `schema`. If
    /// `projection` contains an index that is not in `schema`, [`DataFusionError`] is returned.
    pub(crate) fn try_new(
        schema: SchemaRef,
        partitions: Arc<Vec<Vec<RecordBatch>>>,
        projection: Option<&Vec<usize>>,
    ) -> DataFusionResult<Arc<Self>> {
        let (projected_schema, time_column_index) = match projection {
            Some(projection) => (
                Arc::new(schema.project(projection)?),
                projection.iter().position(|index| *index == 0),
            ),
            None => (schema.clone(), Some(0)),
        };

        // Each partition is sorted by the time column, but Apache DataFusion cannot represent that
        // the partitions are ordered by their ranges, so only the order within partitions is set.
        let equivalence_properties = match time_column_index {
            Some(time_column_index) => EquivalenceProperties::new_with_orderings(
                projected_schema.clone(),
                &[query::time_ordering(time_column_index)],
            ),
            None => EquivalenceProperties::new(projected_schema.clone()),
        };

        // Apache DataFusion requires at least one output partition.
        let plan_properties = PlanProperties::new(
            equivalence_properties,
            Partitioning::UnknownPartitioning(partitions.len().max(1)),
            EmissionType::Incremental,
            Boundedness::Bounded,
        );

        Ok(Arc::new(OrderedPartitionsExec {
            schema: projected_schema,
            partitions,
            projection: projection.cloned(),
            time_column_index,
            plan_properties,
            metrics: ExecutionPlanMetricsSet::new(),
        }))
    }

    /// Return the number of partitions produced by the execution plan.
    pub(crate) fn num_partitions(&self) -> usize {
        self.partitions.len().max(1)
    }

    /// Return the name of the time column if it is produced by the execution plan.
    pub(crate) fn time_column(&self) -> Option<&str> {
        self.time_column_index.map(|_| TIME_COLUMN)
    }
}

impl ExecutionPlan for OrderedPartitionsExec {
    /// Return the name of the [`ExecutionPlan`].
    fn name(&self) -> &str {
        Self::static_name()
    }

    /// Return `self` as [`Any`] so it can be downcast.
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Return the schema of the plan.
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Return properties of the output of the plan.
    fn properties(&self) -> &PlanProperties {
        &self.plan_properties
    }

    /// Return an empty vector as [`OrderedPartitionsExec`] is a leaf.
    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    /// Return `self` as [`OrderedPartitionsExec`] has no children. [`DataFusionError::Plan`] is
    /// returned if `children` is not empty.
    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> DataFusionResult<Arc<dyn ExecutionPlan>> {
        if children.is_empty() {
            Ok(self)
        } else {
            Err(DataFusionError::Plan(format!(
                "{} cannot have children but got {}.",
                self.name(),
                children.len()
            )))
        }
    }

    /// Create a stream that produces the batches in `partition`. [`DataFusionError::Internal`] is
    /// returned if `partition` does not exist.
    fn execute(
        &self,
        partition: usize,
        _task_context: Arc<TaskContext>,
    ) -> DataFusionResult<SendableRecordBatchStream> {
        if partition >= self.num_partitions() {
            return Err(DataFusionError::Internal(format!(
                "{} has {} partitions but partition {partition} was requested.",
                self.name(),
                self.num_partitions()
            )));
        }

        let batches = self
            .partitions
            .get(partition)
            .map(|batches| {
                batches
                    .iter()
                    .map(|batch| match &self.projection {
                        Some(projection) => Ok(batch.project(projection)?),
                        None => Ok(batch.clone()),
                    })
                    .collect::<DataFusionResult<Vec<RecordBatch>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let baseline_metrics = BaselineMetrics::new(&self.metrics, partition);
        baseline_metrics.record_output(batches.iter().map(RecordBatch::num_rows).sum());
        baseline_metrics.done();

        Ok(Box::pin(RecordBatchStreamAdapter::new(
            self.schema.clone(),
            stream::iter(batches.into_iter().map(Ok)),
        )))
    }

    /// Specify that [`OrderedPartitionsExec`] knows nothing about the data it will output.
    fn statistics(&self) -> DataFusionResult<Statistics> {
        Ok(Statistics::new_unknown(&self.schema))
    }

    /// Return a snapshot of the set of metrics being collected by the execution plan.
    fn metrics(&self) -> Option<MetricsSet> {
        Some(self.metrics.clone_inner())
    }
}

impl DisplayAs for OrderedPartitionsExec {
    /// Write a string-based representation of the operator to `f`. Returns `Err` if
    /// `std::write` cannot format the string and write it to `f`.
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}: partitions={}, time_column={}",
            self.name(),
            self.partitions.len(),
            self.time_column().unwrap_or("none")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use datafusion::physical_plan::common::collect;
    use timeorder_test::data_generation;

    fn canonical_partitions() -> (SchemaRef, Arc<Vec<Vec<RecordBatch>>>) {
        // Move the time column first so the partitions are in canonical form.
        let batch = data_generation::time_value_batch(&[0, 1, 2, 3, 4, 5]);
        let batch = batch.project(&[1, 0, 2]).unwrap();
        let partitions = data_generation::split_into_partitions(&batch, 3);

        (batch.schema(), Arc::new(partitions))
    }

    #[test]
    fn test_declares_time_ordering_and_partitions() {
        let (schema, partitions) = canonical_partitions();
        let exec = OrderedPartitionsExec::try_new(schema, partitions, None).unwrap();

        assert_eq!(exec.properties().output_partitioning().partition_count(), 3);
        assert_eq!(exec.time_column(), Some(TIME_COLUMN));

        let ordering = exec.properties().output_ordering().unwrap();
        assert_eq!(ordering.len(), 1);
        assert!(!ordering[0].options.descending);
    }

    #[test]
    fn test_projection_without_time_column() {
        let (schema, partitions) = canonical_partitions();
        let exec = OrderedPartitionsExec::try_new(schema, partitions, Some(&vec![1, 2])).unwrap();

        assert_eq!(exec.schema().fields().len(), 2);
        assert_eq!(exec.time_column(), None);
        assert!(exec.properties().output_ordering().is_none());
    }

    #[test]
    fn test_empty_container_has_one_partition() {
        let (schema, _partitions) = canonical_partitions();
        let exec = OrderedPartitionsExec::try_new(schema, Arc::new(vec![]), None).unwrap();

        assert_eq!(exec.properties().output_partitioning().partition_count(), 1);
    }

    #[tokio::test]
    async fn test_execute_produces_projected_partition() {
        let (schema, partitions) = canonical_partitions();
        let exec =
            OrderedPartitionsExec::try_new(schema, partitions, Some(&vec![2, 0])).unwrap();
        let task_context = Arc::new(TaskContext::default());

        let batches = collect(exec.execute(1, task_context).unwrap()).await.unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_columns(), 2);
        assert_eq!(batches[0].schema().field(1).name(), TIME_COLUMN);
        assert_eq!(data_generation::time_keys_of_partitions(&[batches]), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_execute_missing_partition() {
        let (schema, partitions) = canonical_partitions();
        let exec = OrderedPartitionsExec::try_new(schema, partitions, None).unwrap();
        let task_context = Arc::new(TaskContext::default());

        assert!(exec.execute(3, task_context).is_err());
    }
}
