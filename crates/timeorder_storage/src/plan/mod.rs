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

//! A closed model of the operators in an Apache DataFusion physical plan. Only the metadata that
//! decides how rows are distributed across and ordered within partitions is kept, so the
//! [`inspector`] can decide if a plan is clustered or sorted by a key without executing it.

pub mod inspector;

use std::sync::Arc;

use datafusion::physical_expr::expressions::Column;
use datafusion::physical_expr::{LexOrdering, PhysicalExpr, ScalarFunctionExpr};
use datafusion::physical_plan::coalesce_batches::CoalesceBatchesExec;
use datafusion::physical_plan::coalesce_partitions::CoalescePartitionsExec;
use datafusion::physical_plan::filter::FilterExec;
use datafusion::physical_plan::limit::{GlobalLimitExec, LocalLimitExec};
use datafusion::physical_plan::projection::ProjectionExec;
use datafusion::physical_plan::repartition::RepartitionExec;
use datafusion::physical_plan::sorts::sort::SortExec;
use datafusion::physical_plan::sorts::sort_preserving_merge::SortPreservingMergeExec;
use datafusion::physical_plan::union::UnionExec;
use datafusion::physical_plan::{ExecutionPlan, ExecutionPlanProperties, Partitioning};

use crate::query::canonize_time_udf::CanonizeTimeUdf;
use crate::query::ordered_partitions_exec::OrderedPartitionsExec;

pub use inspector::{Layout, is_clustered, is_sorted};

/// A key an operator sorts by. `column` is [`None`] if the key is computed by an expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: Option<String>,
    pub ascending: bool,
}

impl SortKey {
    pub fn new(column: &str, ascending: bool) -> Self {
        Self {
            column: Some(column.to_owned()),
            ascending,
        }
    }

    /// Return `true` if the key is the column named `key`.
    pub fn is_column(&self, key: &str) -> bool {
        self.column.as_deref() == Some(key)
    }
}

/// How a projection computes one of its output columns from its input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectedColumn {
    /// The input column is forwarded unchanged.
    Column(String),
    /// The input column is converted by a strictly increasing function, so its order and the
    /// equality of its values are kept.
    OrderPreserving(String),
    /// The column is computed by any other expression.
    Other,
}

/// The operators of a physical plan, each with the metadata of its output that decides if the
/// plan is clustered or sorted by a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanNode {
    /// A scan of an ordered container whose partitions are ranges of `key` in order.
    RangePartitionedScan { key: String, partitions: usize },
    /// Any other leaf with the ordering it declares for each of its partitions.
    Scan {
        partitions: usize,
        ordering: Vec<SortKey>,
    },
    Sort {
        keys: Vec<SortKey>,
        preserve_partitioning: bool,
        input: Box<PlanNode>,
    },
    SortPreservingMerge {
        keys: Vec<SortKey>,
        input: Box<PlanNode>,
    },
    HashRepartition {
        keys: Vec<Option<String>>,
        partitions: usize,
        input: Box<PlanNode>,
    },
    RoundRobinRepartition {
        partitions: usize,
        input: Box<PlanNode>,
    },
    CoalescePartitions {
        input: Box<PlanNode>,
    },
    /// A projection with the source and name of each of its output columns.
    Projection {
        columns: Vec<(ProjectedColumn, String)>,
        input: Box<PlanNode>,
    },
    Filter {
        input: Box<PlanNode>,
    },
    CoalesceBatches {
        input: Box<PlanNode>,
    },
    Limit {
        input: Box<PlanNode>,
    },
    Union {
        inputs: Vec<PlanNode>,
    },
    /// An operator with unknown semantics.
    Opaque {
        operator: String,
        partitions: usize,
        inputs: Vec<PlanNode>,
    },
}

impl PlanNode {
    /// Create a [`PlanNode`] tree from `plan` by downcasting each of its operators. Operators that
    /// are not modelled become [`PlanNode::Opaque`].
    pub fn from_execution_plan(plan: &Arc<dyn ExecutionPlan>) -> Self {
        let any = plan.as_any();

        if let Some(ordered_partitions_exec) = any.downcast_ref::<OrderedPartitionsExec>() {
            let partitions = ordered_partitions_exec.num_partitions();

            match ordered_partitions_exec.time_column() {
                Some(key) => PlanNode::RangePartitionedScan {
                    key: key.to_owned(),
                    partitions,
                },
                None => PlanNode::Scan {
                    partitions,
                    ordering: vec![],
                },
            }
        } else if let Some(sort_exec) = any.downcast_ref::<SortExec>() {
            PlanNode::Sort {
                keys: sort_keys(sort_exec.expr()),
                preserve_partitioning: sort_exec.preserve_partitioning(),
                input: Self::boxed(sort_exec.input()),
            }
        } else if let Some(merge_exec) = any.downcast_ref::<SortPreservingMergeExec>() {
            PlanNode::SortPreservingMerge {
                keys: sort_keys(merge_exec.expr()),
                input: Self::boxed(merge_exec.input()),
            }
        } else if let Some(repartition_exec) = any.downcast_ref::<RepartitionExec>() {
            let input = Self::boxed(repartition_exec.input());

            match repartition_exec.partitioning() {
                Partitioning::Hash(expressions, partitions) => PlanNode::HashRepartition {
                    keys: expressions.iter().map(column_name).collect(),
                    partitions: *partitions,
                    input,
                },
                Partitioning::RoundRobinBatch(partitions) => PlanNode::RoundRobinRepartition {
                    partitions: *partitions,
                    input,
                },
                Partitioning::UnknownPartitioning(partitions) => PlanNode::Opaque {
                    operator: repartition_exec.name().to_owned(),
                    partitions: *partitions,
                    inputs: vec![*input],
                },
            }
        } else if let Some(coalesce_exec) = any.downcast_ref::<CoalescePartitionsExec>() {
            PlanNode::CoalescePartitions {
                input: Self::boxed(coalesce_exec.input()),
            }
        } else if let Some(projection_exec) = any.downcast_ref::<ProjectionExec>() {
            PlanNode::Projection {
                columns: projection_exec
                    .expr()
                    .iter()
                    .map(|(expression, name)| (projected_column(expression), name.clone()))
                    .collect(),
                input: Self::boxed(projection_exec.input()),
            }
        } else if let Some(filter_exec) = any.downcast_ref::<FilterExec>() {
            PlanNode::Filter {
                input: Self::boxed(filter_exec.input()),
            }
        } else if let Some(coalesce_exec) = any.downcast_ref::<CoalesceBatchesExec>() {
            PlanNode::CoalesceBatches {
                input: Self::boxed(coalesce_exec.input()),
            }
        } else if let Some(limit_exec) = any.downcast_ref::<GlobalLimitExec>() {
            PlanNode::Limit {
                input: Self::boxed(limit_exec.input()),
            }
        } else if let Some(limit_exec) = any.downcast_ref::<LocalLimitExec>() {
            PlanNode::Limit {
                input: Self::boxed(limit_exec.input()),
            }
        } else if let Some(union_exec) = any.downcast_ref::<UnionExec>() {
            PlanNode::Union {
                inputs: union_exec
                    .inputs()
                    .iter()
                    .map(Self::from_execution_plan)
                    .collect(),
            }
        } else if plan.children().is_empty() {
            PlanNode::Scan {
                partitions: plan.output_partitioning().partition_count(),
                ordering: plan.output_ordering().map(sort_keys).unwrap_or_default(),
            }
        } else {
            PlanNode::Opaque {
                operator: plan.name().to_owned(),
                partitions: plan.output_partitioning().partition_count(),
                inputs: plan
                    .children()
                    .into_iter()
                    .map(Self::from_execution_plan)
                    .collect(),
            }
        }
    }

    fn boxed(plan: &Arc<dyn ExecutionPlan>) -> Box<Self> {
        Box::new(Self::from_execution_plan(plan))
    }

    /// Return the number of partitions the operator outputs.
    pub fn partitions(&self) -> usize {
        match self {
            PlanNode::RangePartitionedScan { partitions, .. }
            | PlanNode::Scan { partitions, .. }
            | PlanNode::HashRepartition { partitions, .. }
            | PlanNode::RoundRobinRepartition { partitions, .. }
            | PlanNode::Opaque { partitions, .. } => *partitions,
            PlanNode::Sort {
                preserve_partitioning,
                input,
                ..
            } => {
                if *preserve_partitioning {
                    input.partitions()
                } else {
                    1
                }
            }
            PlanNode::SortPreservingMerge { .. } | PlanNode::CoalescePartitions { .. } => 1,
            PlanNode::Projection { input, .. }
            | PlanNode::Filter { input }
            | PlanNode::CoalesceBatches { input }
            | PlanNode::Limit { input } => input.partitions(),
            PlanNode::Union { inputs } => inputs.iter().map(PlanNode::partitions).sum(),
        }
    }

    /// Return how the output of the operator is laid out with respect to `key`.
    pub fn layout(&self, key: &str) -> Layout {
        inspector::layout(self, key)
    }

    /// Return `true` if every value of `key` is only in one partition of the output.
    pub fn is_clustered(&self, key: &str) -> bool {
        self.layout(key).is_clustered()
    }

    /// Return `true` if the output is sorted ascending by `key` within and across partitions.
    pub fn is_sorted(&self, key: &str) -> bool {
        self.layout(key).is_sorted()
    }
}

/// Convert the sort expressions in `ordering` to [`SortKeys`](SortKey).
fn sort_keys(ordering: &LexOrdering) -> Vec<SortKey> {
    ordering
        .iter()
        .map(|sort_expr| SortKey {
            column: column_name(&sort_expr.expr),
            ascending: !sort_expr.options.descending,
        })
        .collect()
}

/// Return the name of the column `expression` references if it is a column reference.
fn column_name(expression: &Arc<dyn PhysicalExpr>) -> Option<String> {
    expression
        .as_any()
        .downcast_ref::<Column>()
        .map(|column| column.name().to_owned())
}

/// Return how a projection computes a column using `expression`.
fn projected_column(expression: &Arc<dyn PhysicalExpr>) -> ProjectedColumn {
    if let Some(column) = column_name(expression) {
        return ProjectedColumn::Column(column);
    }

    if let Some(function_expr) = expression.as_any().downcast_ref::<ScalarFunctionExpr>() {
        let is_canonize_time = function_expr
            .fun()
            .inner()
            .as_any()
            .downcast_ref::<CanonizeTimeUdf>()
            .is_some();

        if let (true, [argument]) = (is_canonize_time, function_expr.args()) {
            if let Some(column) = column_name(argument) {
                return ProjectedColumn::OrderPreserving(column);
            }
        }
    }

    ProjectedColumn::Other
}
