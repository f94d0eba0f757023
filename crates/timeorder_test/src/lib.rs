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

//! Implementation of constants and functions used throughout the tests.

pub mod data_generation;
pub mod table;

/// Name of the column storing the values of the time series in the test data.
pub const VALUE_COLUMN: &str = "value";

/// Name of the column storing the tag of each row in the test data.
pub const TAG_COLUMN: &str = "tag";

/// Number of rows in the datasets used for the concrete scenarios.
pub const SCENARIO_ROW_COUNT: usize = 101;

/// Seed used when shuffling test data so failures can be reproduced.
pub const SHUFFLE_SEED: u64 = 1658671178;
