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

//! The canonical names and fields used throughout the system.

use std::sync::LazyLock;

use arrow::datatypes::{ArrowPrimitiveType, Field, FieldRef};

use crate::types::ArrowTimeKey;

/// Name of the column containing the time keys in the canonical form of a dataset.
pub const TIME_COLUMN: &str = "time";

/// [`Field`] of the column containing the time keys in the canonical form of a dataset. It is
/// always the first field.
pub static TIME_FIELD: LazyLock<FieldRef> =
    LazyLock::new(|| Field::new(TIME_COLUMN, ArrowTimeKey::DATA_TYPE, false).into());
