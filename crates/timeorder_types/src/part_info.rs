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

//! Implementation of [`PartitionRange`] and [`PartInfo`] which describe the range of time keys each
//! partition of an ordered dataset contains. Partition `i` contains the time keys in the half-open
//! range from its `begin` to the `begin` of partition `i + 1`, and the last partition extends to
//! positive infinity. Thus, the partition containing a time key can be found without reading any
//! rows.

use std::ops::Range;

use crate::error::{Result, TimeorderTypesError};
use crate::types::TimeKey;

/// The lower bound of the time keys in the partition with `index`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PartitionRange {
    /// Index of the partition.
    pub index: usize,
    /// The first time key in the partition.
    pub begin: TimeKey,
}

impl PartitionRange {
    pub fn new(index: usize, begin: TimeKey) -> Self {
        Self { index, begin }
    }
}

/// Ordered sequence of [`PartitionRange`], one per partition. A [`PartInfo`] is validated when it
/// is created and cannot be changed afterwards, a new [`PartInfo`] must be created instead.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PartInfo {
    ranges: Vec<PartitionRange>,
}

impl PartInfo {
    /// Return a [`PartInfo`] for a dataset without any rows.
    pub fn empty() -> Self {
        Self { ranges: vec![] }
    }

    /// Return a [`PartInfo`] containing `ranges` if the indices of `ranges` are `0..ranges.len()`
    /// in order and the begins are non-decreasing, otherwise [`TimeorderTypesError`] is returned.
    pub fn try_new(ranges: Vec<PartitionRange>) -> Result<Self> {
        for (expected_index, range) in ranges.iter().enumerate() {
            if range.index != expected_index {
                return Err(TimeorderTypesError::InvalidPartInfo(format!(
                    "Expected partition {expected_index} but found partition {}.",
                    range.index
                )));
            }
        }

        for window in ranges.windows(2) {
            if window[0].begin > window[1].begin {
                return Err(TimeorderTypesError::InvalidPartInfo(format!(
                    "Partition {} begins at {} which is after partition {} that begins at {}.",
                    window[0].index, window[0].begin, window[1].index, window[1].begin
                )));
            }
        }

        Ok(Self { ranges })
    }

    /// Return a [`PartInfo`] computed from the first time key in each partition. [`None`] marks an
    /// empty partition. An empty partition followed by a non-empty partition begins where the
    /// non-empty partition begins, i.e., it is a zero-width range. Empty partitions after the last
    /// non-empty partition begin at `trailing_begin` which must be larger than all time keys in the
    /// dataset. If all partitions are empty, an empty [`PartInfo`] is returned. Returns
    /// [`TimeorderTypesError`] if the first time keys of the non-empty partitions are not strictly
    /// increasing or if `trailing_begin` is required but missing or too small.
    pub fn try_from_first_keys(
        first_keys: &[Option<TimeKey>],
        trailing_begin: Option<TimeKey>,
    ) -> Result<Self> {
        let Some(last_non_empty_index) = first_keys.iter().rposition(Option::is_some) else {
            return Ok(Self::empty());
        };

        let mut previous: Option<(usize, TimeKey)> = None;
        for (index, first_key) in first_keys.iter().enumerate() {
            if let Some(first_key) = first_key {
                if let Some((previous_index, previous_first_key)) = previous {
                    if previous_first_key >= *first_key {
                        return Err(TimeorderTypesError::InvalidPartInfo(format!(
                            "Partition {index} begins at {first_key} which is not after partition \
                             {previous_index} that begins at {previous_first_key}."
                        )));
                    }
                }
                previous = Some((index, *first_key));
            }
        }

        let mut next_begin = if last_non_empty_index + 1 < first_keys.len() {
            let trailing_begin = trailing_begin.ok_or_else(|| {
                TimeorderTypesError::EmptyKeyRange(format!(
                    "The partitions after partition {last_non_empty_index} are empty and no bound \
                     is known for them."
                ))
            })?;

            // The loop above guarantees that a non-empty partition exists.
            let last_first_key = first_keys[last_non_empty_index].unwrap_or(TimeKey::MIN);
            if trailing_begin <= last_first_key {
                return Err(TimeorderTypesError::EmptyKeyRange(format!(
                    "The empty partitions after partition {last_non_empty_index} cannot begin at \
                     {trailing_begin} as partition {last_non_empty_index} begins at \
                     {last_first_key}."
                )));
            }
            trailing_begin
        } else {
            TimeKey::MAX
        };

        let mut ranges = Vec::with_capacity(first_keys.len());
        for (index, first_key) in first_keys.iter().enumerate().rev() {
            let begin = first_key.unwrap_or(next_begin);
            ranges.push(PartitionRange::new(index, begin));
            next_begin = begin;
        }
        ranges.reverse();

        Self::try_new(ranges)
    }

    /// Return the ranges in partition order.
    pub fn ranges(&self) -> &[PartitionRange] {
        &self.ranges
    }

    /// Return the number of partitions.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Return `true` if the dataset contains no partitions.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Return the first time key in the partition with `index`, if the partition exists.
    pub fn begin(&self, index: usize) -> Option<TimeKey> {
        self.ranges.get(index).map(|range| range.begin)
    }

    /// Return the exclusive upper bound of the partition with `index`. [`None`] is returned for the
    /// last partition as it extends to positive infinity and for partitions that do not exist.
    pub fn end(&self, index: usize) -> Option<TimeKey> {
        self.ranges.get(index + 1).map(|range| range.begin)
    }

    /// Return the index of the partition whose range contains `time_key`. [`None`] is returned if
    /// `time_key` is before the first partition or if there are no partitions.
    pub fn partition_of(&self, time_key: TimeKey) -> Option<usize> {
        let position = self.ranges.partition_point(|range| range.begin <= time_key);
        position.checked_sub(1)
    }

    /// Return the indices of the partitions whose ranges overlap the half-open range from `begin`
    /// to `end`.
    pub fn overlapping(&self, begin: TimeKey, end: TimeKey) -> Range<usize> {
        if begin >= end {
            return 0..0;
        }

        let start = self.partition_of(begin).unwrap_or(0);
        let stop = self.ranges.partition_point(|range| range.begin < end);

        if start < stop { start..stop } else { start..start }
    }
}
