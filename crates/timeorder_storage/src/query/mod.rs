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

//! Implementation of the scalar function that converts time columns to time keys and of the table
//! provider and execution plan that allow ordered containers to be queried with Apache DataFusion.

use std::sync::Arc;

use arrow::compute::SortOptions;
use datafusion::physical_expr::{LexOrdering, PhysicalSortExpr};
use datafusion::physical_plan::expressions::Column;
use timeorder_types::schemas::TIME_COLUMN;

pub mod canonize_time_udf;
pub(crate) mod ordered_partitions_exec;
pub(crate) mod ordered_table;

/// Return the order within each partition of an ordered container with the time column at
/// `time_column_index`, i.e., ascending by time key.
pub(crate) fn time_ordering(time_column_index: usize) -> LexOrdering {
    let sort_options = SortOptions {
        descending: false,
        nulls_first: false,
    };

    LexOrdering::new(vec![PhysicalSortExpr {
        expr: Arc::new(Column::new(TIME_COLUMN, time_column_index)),
        options: sort_options,
    }])
}
