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

//! Implementation of [`OrderedTable`] which allows the partitions of an ordered container to be
//! queried through Apache DataFusion. Scans are executed by [`OrderedPartitionsExec`] so the
//! partitions are produced exactly as they are stored in the container.

use std::{any::Any, sync::Arc};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::catalog::Session;
use datafusion::datasource::{TableProvider, TableType};
use datafusion::error::Result as DataFusionResult;
use datafusion::logical_expr::Expr;
use datafusion::physical_plan::ExecutionPlan;

use crate::query::ordered_partitions_exec::OrderedPartitionsExec;

/// A queryable representation of the partitions of an ordered container. The partitions are
/// shared with the container, so creating an [`OrderedTable`] does not copy any rows.
#[derive(Debug)]
pub(crate) struct OrderedTable {
    /// Schema of the ordered container with the time column first.
    schema: SchemaRef,
    /// Partitions of the ordered container.
    partitions: Arc<Vec<Vec<RecordBatch>>>,
}

impl OrderedTable {
    pub(crate) fn new(schema: SchemaRef, partitions: Arc<Vec<Vec<RecordBatch>>>) -> Self {
        Self { schema, partitions }
    }
}

#[async_trait]
impl TableProvider for OrderedTable {
    /// Return `self` as [`Any`] so it can be downcast.
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Return the schema of the ordered container.
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Specify that ordered tables are temporary tables as they only exist in memory.
    fn table_type(&self) -> TableType {
        TableType::Temporary
    }

    /// Create an [`OrderedPartitionsExec`] that will scan the columns in `projection` of the
    /// partitions. `filters` and `limit` are applied by the operators Apache DataFusion adds above
    /// the scan as no filters are pushed down.
    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        _filters: &[Expr],
        _limit: Option<usize>,
    ) -> DataFusionResult<Arc<dyn ExecutionPlan>> {
        let ordered_partitions_exec =
            OrderedPartitionsExec::try_new(self.schema.clone(), self.partitions.clone(), projection)?;

        Ok(ordered_partitions_exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use datafusion::logical_expr::{col, lit};
    use timeorder_test::data_generation;
    use timeorder_types::schemas::TIME_COLUMN;

    use crate::plan::{PlanNode, is_sorted};
    use crate::test;

    fn ordered_table() -> OrderedTable {
        let batch = data_generation::time_value_batch(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let batch = batch.project(&[1, 0, 2]).unwrap();
        let partitions = data_generation::split_into_partitions(&batch, 4);

        OrderedTable::new(batch.schema(), Arc::new(partitions))
    }

    #[tokio::test]
    async fn test_scan_is_range_partitioned() {
        let session_context = test::session_context(2);
        let data_frame = session_context.read_table(Arc::new(ordered_table())).unwrap();
        let plan = data_frame.create_physical_plan().await.unwrap();

        assert_eq!(
            PlanNode::from_execution_plan(&plan),
            PlanNode::RangePartitionedScan {
                key: TIME_COLUMN.to_owned(),
                partitions: 4,
            }
        );
        assert!(is_sorted(&plan, TIME_COLUMN));
    }

    #[tokio::test]
    async fn test_filtered_scan_stays_sorted() {
        let session_context = test::session_context(2);
        let data_frame = session_context
            .read_table(Arc::new(ordered_table()))
            .unwrap()
            .filter(col(TIME_COLUMN).gt_eq(lit(3_i64)))
            .unwrap();
        let plan = data_frame.clone().create_physical_plan().await.unwrap();

        assert!(is_sorted(&plan, TIME_COLUMN));

        let partitions = data_frame.collect_partitioned().await.unwrap();
        assert_eq!(
            data_generation::time_keys_of_partitions(&partitions),
            vec![3, 4, 5, 6, 7]
        );
    }
}
