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

//! Decides if the output of a physical plan is clustered or sorted by a key using structural
//! recursion over its [`PlanNode`] tree. A plan is clustered by a key if every value of the key is
//! only in one of its output partitions, and sorted by a key if it is clustered, each partition is
//! sorted ascending by the key, and the partitions are ordered by their ranges of the key. Only
//! explicit key-based operators establish clustering; operators that mix rows across partitions
//! without regard for the key remove it. A plan is never executed during the inspection.

use std::sync::Arc;

use datafusion::physical_plan::ExecutionPlan;
use tracing::debug;

use crate::plan::{PlanNode, ProjectedColumn, SortKey};

/// How the output of a plan is laid out with respect to a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Range partitioned by the key with each partition sorted ascending by the key.
    Sorted,
    /// Each value of the key is only in one partition.
    Clustered,
    /// No guarantee is known.
    Unknown,
}

impl Layout {
    pub fn is_sorted(&self) -> bool {
        *self == Layout::Sorted
    }

    /// Return `true` if the layout is [`Layout::Clustered`] or [`Layout::Sorted`] as a sorted
    /// layout is also clustered.
    pub fn is_clustered(&self) -> bool {
        *self != Layout::Unknown
    }
}

/// Return `true` if every value of `key` is only in one output partition of `plan`.
pub fn is_clustered(plan: &Arc<dyn ExecutionPlan>, key: &str) -> bool {
    let layout = PlanNode::from_execution_plan(plan).layout(key);
    debug!(key, ?layout, "Inspected plan for clustering.");
    layout.is_clustered()
}

/// Return `true` if the output partitions of `plan` are range partitioned by `key` in order and
/// each partition is sorted ascending by `key`.
pub fn is_sorted(plan: &Arc<dyn ExecutionPlan>, key: &str) -> bool {
    let layout = PlanNode::from_execution_plan(plan).layout(key);
    debug!(key, ?layout, "Inspected plan for sorting.");
    layout.is_sorted()
}

/// Return how the output of `node` is laid out with respect to `key`.
pub(crate) fn layout(node: &PlanNode, key: &str) -> Layout {
    match node {
        PlanNode::RangePartitionedScan {
            key: range_key, ..
        } => {
            if range_key == key {
                Layout::Sorted
            } else {
                Layout::Unknown
            }
        }
        PlanNode::Scan {
            partitions,
            ordering,
        } => {
            // The ordering of a leaf only holds within each of its partitions.
            if *partitions != 1 {
                return Layout::Unknown;
            }

            match leading_key_direction(ordering, key) {
                Some(true) => Layout::Sorted,
                Some(false) => Layout::Clustered,
                None => Layout::Unknown,
            }
        }
        PlanNode::Sort {
            keys,
            preserve_partitioning,
            input,
        } => {
            let single_partition = !preserve_partitioning || input.partitions() == 1;
            let input_layout = layout(input, key);

            match leading_key_direction(keys, key) {
                Some(true) if single_partition => Layout::Sorted,
                Some(true) => input_layout,
                Some(false) if single_partition => Layout::Clustered,
                Some(false) | None => clustered_if(input_layout.is_clustered()),
            }
        }
        PlanNode::SortPreservingMerge { keys, input } => {
            match leading_key_direction(keys, key) {
                Some(true) => Layout::Sorted,
                Some(false) => Layout::Clustered,
                None => clustered_if(layout(input, key).is_clustered()),
            }
        }
        PlanNode::HashRepartition { keys, .. } => match keys.as_slice() {
            [Some(hash_key)] if hash_key == key => Layout::Clustered,
            _ => Layout::Unknown,
        },
        PlanNode::RoundRobinRepartition { .. } => Layout::Unknown,
        PlanNode::CoalescePartitions { input } => {
            let input_layout = layout(input, key);

            if input_layout.is_sorted() && input.partitions() == 1 {
                Layout::Sorted
            } else {
                clustered_if(input_layout.is_clustered())
            }
        }
        PlanNode::Projection { columns, input } => {
            let source = columns
                .iter()
                .find(|(_, name)| name == key)
                .map(|(source, _)| source);

            match source {
                Some(ProjectedColumn::Column(column))
                | Some(ProjectedColumn::OrderPreserving(column)) => layout(input, column),
                Some(ProjectedColumn::Other) | None => Layout::Unknown,
            }
        }
        PlanNode::Filter { input }
        | PlanNode::CoalesceBatches { input }
        | PlanNode::Limit { input } => layout(input, key),
        PlanNode::Union { inputs } => match inputs.as_slice() {
            [input] => layout(input, key),
            _ => Layout::Unknown,
        },
        PlanNode::Opaque { .. } => Layout::Unknown,
    }
}

/// Return [`Some`] with `true` if `keys` starts with `key` ascending, [`Some`] with `false` if it
/// starts with `key` descending, and [`None`] if it does not start with `key`.
fn leading_key_direction(keys: &[SortKey], key: &str) -> Option<bool> {
    keys.first()
        .filter(|sort_key| sort_key.is_column(key))
        .map(|sort_key| sort_key.ascending)
}

fn clustered_if(is_clustered: bool) -> Layout {
    if is_clustered {
        Layout::Clustered
    } else {
        Layout::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use datafusion::dataframe::DataFrame;
    use datafusion::logical_expr::{SortExpr, col, lit};
    use datafusion::physical_expr::expressions;
    use datafusion::physical_plan::Partitioning;
    use datafusion::physical_plan::repartition::RepartitionExec;
    use proptest::prelude::*;
    use proptest::sample::select;
    use timeorder_types::schemas::TIME_COLUMN;
    use timeorder_types::time_unit::TimeUnit;

    use crate::canonicalizer;
    use crate::test;

    const KEY: &str = "time";

    fn scan(partitions: usize, ordering: Vec<SortKey>) -> Box<PlanNode> {
        Box::new(PlanNode::Scan {
            partitions,
            ordering,
        })
    }

    fn sort(keys: Vec<SortKey>, preserve_partitioning: bool, input: Box<PlanNode>) -> Box<PlanNode> {
        Box::new(PlanNode::Sort {
            keys,
            preserve_partitioning,
            input,
        })
    }

    // Tests for layout() on PlanNode trees.
    #[test]
    fn test_single_partition_scan_with_key_ordering_is_sorted() {
        let node = scan(1, vec![SortKey::new(KEY, true)]);
        assert_eq!(layout(&node, KEY), Layout::Sorted);
    }

    #[test]
    fn test_multiple_partition_scan_with_key_ordering_is_unknown() {
        let node = scan(4, vec![SortKey::new(KEY, true)]);
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_single_partition_scan_without_ordering_is_unknown() {
        assert_eq!(layout(&scan(1, vec![]), KEY), Layout::Unknown);
    }

    #[test]
    fn test_range_partitioned_scan_is_sorted_by_its_key_only() {
        let node = PlanNode::RangePartitionedScan {
            key: KEY.to_owned(),
            partitions: 3,
        };

        assert_eq!(layout(&node, KEY), Layout::Sorted);
        assert_eq!(layout(&node, "value"), Layout::Unknown);
    }

    #[test]
    fn test_sort_then_merge_by_key_is_sorted() {
        let node = PlanNode::SortPreservingMerge {
            keys: vec![SortKey::new(KEY, true)],
            input: sort(vec![SortKey::new(KEY, true)], true, scan(4, vec![])),
        };
        assert_eq!(layout(&node, KEY), Layout::Sorted);
    }

    #[test]
    fn test_partition_preserving_sort_of_unknown_input_is_unknown() {
        let node = sort(vec![SortKey::new(KEY, true)], true, scan(4, vec![]));
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_partition_preserving_sort_of_hash_partitioned_input_is_clustered() {
        let hash = Box::new(PlanNode::HashRepartition {
            keys: vec![Some(KEY.to_owned())],
            partitions: 4,
            input: scan(1, vec![]),
        });
        let node = sort(vec![SortKey::new(KEY, true)], true, hash);

        assert_eq!(layout(&node, KEY), Layout::Clustered);
    }

    #[test]
    fn test_descending_sort_is_clustered_but_not_sorted() {
        let node = sort(vec![SortKey::new(KEY, false)], false, scan(4, vec![]));
        assert_eq!(layout(&node, KEY), Layout::Clustered);
    }

    #[test]
    fn test_composite_sort_with_leading_key_is_sorted() {
        let keys = vec![SortKey::new(KEY, true), SortKey::new("value", true)];
        let node = sort(keys, false, scan(4, vec![]));
        assert_eq!(layout(&node, KEY), Layout::Sorted);
    }

    #[test]
    fn test_composite_sort_with_trailing_key_is_unknown() {
        let keys = vec![SortKey::new("value", true), SortKey::new(KEY, true)];
        let node = sort(keys, false, scan(4, vec![]));
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_composite_sort_with_middle_key_is_unknown() {
        let keys = vec![
            SortKey::new("value", true),
            SortKey::new(KEY, true),
            SortKey::new("tag", true),
        ];
        let node = sort(keys, false, scan(4, vec![]));
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_hash_repartition_by_other_keys_is_unknown() {
        let node = PlanNode::HashRepartition {
            keys: vec![Some(KEY.to_owned()), Some("tag".to_owned())],
            partitions: 4,
            input: scan(1, vec![SortKey::new(KEY, true)]),
        };
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_round_robin_repartition_removes_sorting() {
        let node = PlanNode::RoundRobinRepartition {
            partitions: 4,
            input: scan(1, vec![SortKey::new(KEY, true)]),
        };
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_coalesce_partitions_of_range_partitions_is_clustered() {
        let node = PlanNode::CoalescePartitions {
            input: Box::new(PlanNode::RangePartitionedScan {
                key: KEY.to_owned(),
                partitions: 3,
            }),
        };
        assert_eq!(layout(&node, KEY), Layout::Clustered);
    }

    #[test]
    fn test_projection_follows_renamed_and_converted_key() {
        let node = PlanNode::Projection {
            columns: vec![
                (ProjectedColumn::OrderPreserving("ts".to_owned()), KEY.to_owned()),
                (ProjectedColumn::Column(KEY.to_owned()), "original".to_owned()),
            ],
            input: scan(1, vec![SortKey::new("ts", true)]),
        };

        assert_eq!(layout(&node, KEY), Layout::Sorted);
        assert_eq!(layout(&node, "original"), Layout::Unknown);
    }

    #[test]
    fn test_projection_recomputing_key_is_unknown() {
        let node = PlanNode::Projection {
            columns: vec![(ProjectedColumn::Other, KEY.to_owned())],
            input: scan(1, vec![SortKey::new(KEY, true)]),
        };
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_projection_dropping_key_is_unknown() {
        let node = PlanNode::Projection {
            columns: vec![(ProjectedColumn::Column("value".to_owned()), "value".to_owned())],
            input: scan(1, vec![SortKey::new(KEY, true)]),
        };
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    #[test]
    fn test_union_of_multiple_inputs_is_unknown() {
        let sorted = PlanNode::RangePartitionedScan {
            key: KEY.to_owned(),
            partitions: 2,
        };

        let single = PlanNode::Union {
            inputs: vec![sorted.clone()],
        };
        assert_eq!(layout(&single, KEY), Layout::Sorted);

        let multiple = PlanNode::Union {
            inputs: vec![sorted.clone(), sorted],
        };
        assert_eq!(layout(&multiple, KEY), Layout::Unknown);
    }

    #[test]
    fn test_opaque_operator_is_unknown() {
        let node = PlanNode::Opaque {
            operator: "AggregateExec".to_owned(),
            partitions: 1,
            inputs: vec![*scan(1, vec![SortKey::new(KEY, true)])],
        };
        assert_eq!(layout(&node, KEY), Layout::Unknown);
    }

    // Property tests for layout().
    fn arbitrary_sort_keys() -> impl Strategy<Value = Vec<SortKey>> {
        prop::collection::vec(
            (
                prop::option::of(select(vec!["time", "value", "tag"])),
                any::<bool>(),
            )
                .prop_map(|(column, ascending)| SortKey {
                    column: column.map(str::to_owned),
                    ascending,
                }),
            0..3,
        )
    }

    fn arbitrary_plan_node() -> impl Strategy<Value = PlanNode> {
        let leaf = prop_oneof![
            (1..4_usize).prop_map(|partitions| PlanNode::RangePartitionedScan {
                key: KEY.to_owned(),
                partitions,
            }),
            (1..4_usize, arbitrary_sort_keys())
                .prop_map(|(partitions, ordering)| PlanNode::Scan {
                    partitions,
                    ordering,
                }),
        ];

        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (arbitrary_sort_keys(), any::<bool>(), inner.clone()).prop_map(
                    |(keys, preserve_partitioning, input)| PlanNode::Sort {
                        keys,
                        preserve_partitioning,
                        input: Box::new(input),
                    }
                ),
                (arbitrary_sort_keys(), inner.clone()).prop_map(|(keys, input)| {
                    PlanNode::SortPreservingMerge {
                        keys,
                        input: Box::new(input),
                    }
                }),
                (
                    prop::collection::vec(prop::option::of(select(vec!["time", "value"])), 1..3),
                    inner.clone()
                )
                    .prop_map(|(keys, input)| PlanNode::HashRepartition {
                        keys: keys.into_iter().map(|key| key.map(str::to_owned)).collect(),
                        partitions: 4,
                        input: Box::new(input),
                    }),
                inner.clone().prop_map(|input| PlanNode::RoundRobinRepartition {
                    partitions: 4,
                    input: Box::new(input),
                }),
                inner.clone().prop_map(|input| PlanNode::CoalescePartitions {
                    input: Box::new(input),
                }),
                inner.clone().prop_map(|input| PlanNode::Projection {
                    columns: vec![
                        (ProjectedColumn::OrderPreserving(KEY.to_owned()), KEY.to_owned()),
                        (ProjectedColumn::Other, "value".to_owned()),
                    ],
                    input: Box::new(input),
                }),
                inner.clone().prop_map(|input| PlanNode::Filter {
                    input: Box::new(input),
                }),
                prop::collection::vec(inner, 1..3).prop_map(|inputs| PlanNode::Union { inputs }),
            ]
        })
    }

    proptest! {
    #[test]
    fn test_sorted_plans_are_clustered(node in arbitrary_plan_node()) {
        for key in ["time", "value", "tag"] {
            let node_layout = layout(&node, key);
            prop_assert!(!node_layout.is_sorted() || node_layout.is_clustered());
        }
    }

    #[test]
    fn test_non_mixing_operators_keep_layout(node in arbitrary_plan_node()) {
        let filter = PlanNode::Filter { input: Box::new(node.clone()) };
        let limit = PlanNode::Limit { input: Box::new(node.clone()) };
        let coalesce_batches = PlanNode::CoalesceBatches { input: Box::new(node.clone()) };

        prop_assert_eq!(layout(&filter, KEY), layout(&node, KEY));
        prop_assert_eq!(layout(&limit, KEY), layout(&node, KEY));
        prop_assert_eq!(layout(&coalesce_batches, KEY), layout(&node, KEY));
    }

    #[test]
    fn test_round_robin_repartition_is_never_clustered(node in arbitrary_plan_node()) {
        let round_robin = PlanNode::RoundRobinRepartition {
            partitions: 4,
            input: Box::new(node),
        };
        prop_assert_eq!(layout(&round_robin, KEY), Layout::Unknown);
    }
    }

    // Tests for is_clustered() and is_sorted() on physical plans.
    #[tokio::test]
    async fn test_physical_plan_of_sorted_source_is_sorted() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[0, 1, 2, 3], 1, true);
        let plan = data_frame.create_physical_plan().await.unwrap();

        assert!(is_sorted(&plan, KEY));
        assert!(is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_of_unsorted_source_is_neither() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[3, 1, 2, 0], 2, false);
        let plan = data_frame.create_physical_plan().await.unwrap();

        assert!(!is_sorted(&plan, KEY));
        assert!(!is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_sorted_by_key_is_sorted() {
        let data_frame = sorted_data_frame(vec![col(KEY).sort(true, false)]);
        let plan = data_frame.create_physical_plan().await.unwrap();

        assert!(is_sorted(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_sorted_descending_is_only_clustered() {
        let data_frame = sorted_data_frame(vec![col(KEY).sort(false, false)]);
        let plan = data_frame.create_physical_plan().await.unwrap();

        assert!(!is_sorted(&plan, KEY));
        assert!(is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_sorted_by_composite_keys() {
        let leading = sorted_data_frame(vec![
            col(KEY).sort(true, false),
            col("value").sort(true, false),
        ]);
        let plan = leading.create_physical_plan().await.unwrap();
        assert!(is_sorted(&plan, KEY));

        let trailing = sorted_data_frame(vec![
            col("value").sort(true, false),
            col(KEY).sort(true, false),
        ]);
        let plan = trailing.create_physical_plan().await.unwrap();
        assert!(!is_sorted(&plan, KEY));
        assert!(!is_clustered(&plan, KEY));

        let middle = sorted_data_frame(vec![
            col("value").sort(true, false),
            col(KEY).sort(true, false),
            col("tag").sort(true, false),
        ]);
        let plan = middle.create_physical_plan().await.unwrap();
        assert!(!is_sorted(&plan, KEY));
        assert!(!is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_hash_partitioned_by_key_is_only_clustered() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[3, 1, 2, 0], 2, false);
        let scan = data_frame.create_physical_plan().await.unwrap();
        let key = expressions::col(KEY, &scan.schema()).unwrap();
        let plan = repartitioned(scan, Partitioning::Hash(vec![key], 4));

        assert!(matches!(
            PlanNode::from_execution_plan(&plan),
            PlanNode::HashRepartition { partitions: 4, .. }
        ));
        assert!(!is_sorted(&plan, KEY));
        assert!(is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_hash_partitioned_by_other_key_is_neither() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[3, 1, 2, 0], 2, false);
        let scan = data_frame.create_physical_plan().await.unwrap();
        let key = expressions::col("tag", &scan.schema()).unwrap();
        let plan = repartitioned(scan, Partitioning::Hash(vec![key], 4));

        assert!(!is_sorted(&plan, KEY));
        assert!(!is_clustered(&plan, KEY));
        assert!(is_clustered(&plan, "tag"));
    }

    #[tokio::test]
    async fn test_physical_plan_round_robin_partitioned_is_neither() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[0, 1, 2, 3], 1, true);
        let scan = data_frame.create_physical_plan().await.unwrap();
        assert!(is_sorted(&scan, KEY));

        let plan = repartitioned(scan, Partitioning::RoundRobinBatch(4));

        assert!(matches!(
            PlanNode::from_execution_plan(&plan),
            PlanNode::RoundRobinRepartition { partitions: 4, .. }
        ));
        assert!(!is_sorted(&plan, KEY));
        assert!(!is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_recomputing_key_is_neither() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[0, 1, 2, 3], 1, true)
            .with_column(KEY, col(KEY) * lit(-1_i64))
            .unwrap();
        let plan = data_frame.create_physical_plan().await.unwrap();

        assert!(!is_sorted(&plan, KEY));
        assert!(!is_clustered(&plan, KEY));
    }

    #[tokio::test]
    async fn test_physical_plan_canonizing_sorted_key_is_sorted() {
        let session_context = test::session_context(4);
        let data_frame = test::time_value_data_frame(&session_context, &[0, 1, 2, 3], 1, true);
        let canonical =
            canonicalizer::canonize(data_frame, TIME_COLUMN, Some(TimeUnit::Second), false)
                .unwrap();
        let plan = canonical.data_frame().clone().create_physical_plan().await.unwrap();

        assert!(matches!(
            PlanNode::from_execution_plan(&plan),
            PlanNode::Projection { .. }
        ));
        assert!(is_sorted(&plan, TIME_COLUMN));
    }

    fn repartitioned(
        input: Arc<dyn ExecutionPlan>,
        partitioning: Partitioning,
    ) -> Arc<dyn ExecutionPlan> {
        Arc::new(RepartitionExec::try_new(input, partitioning).unwrap())
    }

    fn sorted_data_frame(sort_exprs: Vec<SortExpr>) -> DataFrame {
        let session_context = test::session_context(4);
        test::time_value_data_frame(&session_context, &[3, 1, 2, 0, 5, 4], 3, false)
            .sort(sort_exprs)
            .unwrap()
    }
}
