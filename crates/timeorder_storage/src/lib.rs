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

//! Conversion of unordered tabular data in Apache DataFusion to [`OrderedContainers`](OrderedContainer)
//! that are range partitioned by time key, and back. The physical plan of the data is inspected
//! first, so data that is already range partitioned and sorted by time key is not sorted again.

pub mod canonicalizer;
pub mod configuration;
pub mod container;
pub mod error;
pub mod partitioner;
pub mod plan;
pub mod query;
pub mod range_index;

use datafusion::dataframe::DataFrame;
use datafusion::execution::session_state::SessionStateBuilder;
use datafusion::prelude::SessionContext;

pub use canonicalizer::canonize_time;
pub use container::OrderedContainer;
pub use plan::{is_clustered, is_sorted};
pub use timeorder_types::part_info::PartInfo;
pub use timeorder_types::time_unit::{TimeUnit, convert};

use crate::configuration::ConfigurationManager;
use crate::error::Result;

/// Create a new [`SessionContext`] for interacting with Apache DataFusion configured from the
/// environment variables read by [`ConfigurationManager`]. If a variable is set to an invalid
/// value, [`TimeorderStorageError`](error::TimeorderStorageError) is returned.
pub fn create_session_context() -> Result<SessionContext> {
    let configuration_manager = ConfigurationManager::try_from_env()?;
    Ok(create_session_context_with_configuration(
        &configuration_manager,
    ))
}

/// Create a new [`SessionContext`] for interacting with Apache DataFusion. The [`SessionContext`]
/// is constructed with the configuration in `configuration_manager`, default resource managers,
/// and the default optimizer rules.
pub fn create_session_context_with_configuration(
    configuration_manager: &ConfigurationManager,
) -> SessionContext {
    let session_state = SessionStateBuilder::new()
        .with_config(configuration_manager.session_config())
        .with_default_features()
        .build();

    SessionContext::new_with_state(session_state)
}

/// Convert `data_frame` to an [`OrderedContainer`] with the time keys computed from `time_column`.
/// See [`OrderedContainer::from_tabular()`].
pub async fn from_tabular(
    data_frame: DataFrame,
    is_sorted: bool,
    time_unit: Option<TimeUnit>,
    time_column: &str,
) -> Result<OrderedContainer> {
    OrderedContainer::from_tabular(data_frame, is_sorted, time_unit, time_column).await
}

/// Return a [`DataFrame`] that scans the partitions of `container` in `session_context`. See
/// [`OrderedContainer::to_tabular()`].
pub fn to_tabular(container: &OrderedContainer, session_context: &SessionContext) -> Result<DataFrame> {
    container.to_tabular(session_context)
}
