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

//! Management of the configuration of the Apache DataFusion sessions datasets are converted in.
//! The configuration consists of the maximum number of partitions a dataset is sorted into and the
//! number of rows in each batch produced while executing a plan.

use std::env::{self, VarError};
use std::num::NonZeroUsize;
use std::result::Result as StdResult;
use std::thread;

use datafusion::prelude::SessionConfig;
use tracing::debug;

use crate::error::{Result, TimeorderStorageError};

/// Environment variable with the maximum number of partitions a dataset is sorted into.
const TARGET_PARTITIONS_VARIABLE: &str = "TIMEORDER_TARGET_PARTITIONS";

/// Environment variable with the number of rows in each batch produced while executing a plan.
const BATCH_SIZE_VARIABLE: &str = "TIMEORDER_BATCH_SIZE";

/// Number of rows in each batch if [`BATCH_SIZE_VARIABLE`] is not set.
const DEFAULT_BATCH_SIZE: usize = 8192;

/// Manages the configuration of the Apache DataFusion sessions and provides functionality for
/// updating it.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigurationManager {
    /// The maximum number of partitions a dataset is sorted into and the number of partitions
    /// Apache DataFusion executes plans with.
    target_partitions: usize,
    /// The number of rows in each batch produced while executing a plan.
    batch_size: usize,
}

impl ConfigurationManager {
    /// Create a [`ConfigurationManager`] with `target_partitions` and `batch_size`. If either is
    /// zero, return [`TimeorderStorageError`].
    pub fn try_new(target_partitions: usize, batch_size: usize) -> Result<Self> {
        Ok(Self {
            target_partitions: validate_setting(TARGET_PARTITIONS_VARIABLE, target_partitions)?,
            batch_size: validate_setting(BATCH_SIZE_VARIABLE, batch_size)?,
        })
    }

    /// Create a [`ConfigurationManager`] from the environment variables. Unset variables use
    /// their defaults. If a variable is set but not a positive integer, return
    /// [`TimeorderStorageError`].
    pub fn try_from_env() -> Result<Self> {
        let default_target_partitions = thread::available_parallelism().map_or(1, NonZeroUsize::get);

        let target_partitions = parse_setting(
            TARGET_PARTITIONS_VARIABLE,
            env::var(TARGET_PARTITIONS_VARIABLE),
            default_target_partitions,
        )?;

        let batch_size = parse_setting(
            BATCH_SIZE_VARIABLE,
            env::var(BATCH_SIZE_VARIABLE),
            DEFAULT_BATCH_SIZE,
        )?;

        debug!(target_partitions, batch_size, "Read configuration.");

        Ok(Self {
            target_partitions,
            batch_size,
        })
    }

    pub fn target_partitions(&self) -> usize {
        self.target_partitions
    }

    /// Set the maximum number of partitions to `new_target_partitions`. If it is zero, return
    /// [`TimeorderStorageError`].
    pub fn set_target_partitions(&mut self, new_target_partitions: usize) -> Result<()> {
        self.target_partitions = validate_setting(TARGET_PARTITIONS_VARIABLE, new_target_partitions)?;
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Set the number of rows in each batch to `new_batch_size`. If it is zero, return
    /// [`TimeorderStorageError`].
    pub fn set_batch_size(&mut self, new_batch_size: usize) -> Result<()> {
        self.batch_size = validate_setting(BATCH_SIZE_VARIABLE, new_batch_size)?;
        Ok(())
    }

    /// Return a [`SessionConfig`] using the configuration. Round-robin repartitioning is disabled
    /// as it would remove the partitioning of plans that are already range partitioned.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_target_partitions(self.target_partitions)
            .with_batch_size(self.batch_size)
            .with_round_robin_repartition(false)
    }
}

/// Parse the value of the environment variable `name` or return `default` if it is not set. If it
/// is set but not a positive integer, return [`TimeorderStorageError`].
fn parse_setting(
    name: &str,
    maybe_value: StdResult<String, VarError>,
    default: usize,
) -> Result<usize> {
    match maybe_value {
        Ok(value) => {
            let setting = value.trim().parse::<usize>().map_err(|error| {
                TimeorderStorageError::InvalidArgument(format!(
                    "{name} must be a positive integer but is '{value}': {error}"
                ))
            })?;

            validate_setting(name, setting)
        }
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(value)) => Err(TimeorderStorageError::InvalidArgument(format!(
            "{name} must be a positive integer but is '{}'.",
            value.to_string_lossy()
        ))),
    }
}

/// Return `setting` if it is positive, otherwise return [`TimeorderStorageError`].
fn validate_setting(name: &str, setting: usize) -> Result<usize> {
    if setting == 0 {
        Err(TimeorderStorageError::InvalidArgument(format!(
            "{name} must be a positive integer but is 0."
        )))
    } else {
        Ok(setting)
    }
}
