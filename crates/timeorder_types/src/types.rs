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

//! Implementation of the types used throughout the system to represent time keys.

use arrow::array::PrimitiveArray;
use arrow::datatypes::Int64Type;

/// Elapsed nanoseconds since the Unix epoch.
pub type TimeKey = i64;
pub type ArrowTimeKey = Int64Type;
pub type TimeKeyArray = PrimitiveArray<ArrowTimeKey>;
