use super::{AddressMap, MapLayout, PropertyRef, Region};
use crate::MapError;
use alloc::vec;
use alloc::vec::Vec;
use core::mem::size_of;

/// Hard ceiling on index slots regardless of policy.
pub const MAX_INDEX_SLOTS: u32 = 1 << 24;

/// Decides whether a finished search map is converted to an index map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexPolicy {
    /// Always index when the covered range has at most this many addresses.
    pub max_slots: u32,
    /// Otherwise index when the table costs at most this multiple of the
    /// search map's memory.
    pub max_ratio: u32,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self {
            max_slots: 4096,
            max_ratio: 3,
        }
    }
}

impl IndexPolicy {
    pub const fn never() -> Self {
        Self {
            max_slots: 0,
            max_ratio: 0,
        }
    }

    pub fn prefers_index(&self, map: &AddressMap) -> bool {
        let Some(regions) = map.regions() else {
            return false;
        };
        let Some(slots) = covered_slots(regions) else {
            return false;
        };
        if slots > u64::from(MAX_INDEX_SLOTS) {
            return false;
        }
        if slots <= u64::from(self.max_slots) {
            return true;
        }
        let index_bytes = slots * size_of::<Option<PropertyRef>>() as u64;
        let search_bytes: usize = regions
            .iter()
            .map(|r| size_of::<Region>() + r.entry.test_count() * size_of::<PropertyRef>())
            .sum();
        index_bytes <= u64::from(self.max_ratio) * search_bytes as u64
    }
}

fn covered_slots(regions: &[Region]) -> Option<u64> {
    let (first, last) = (regions.first()?, regions.last()?);
    Some(u64::from(last.high) - u64::from(first.low) + 1)
}

impl AddressMap {
    /// Converts a search map into an equivalent index map.
    ///
    /// The region list is released; an index map is returned unchanged.
    pub fn to_index(self) -> Result<Self, MapError> {
        if self.is_index() {
            return Ok(self);
        }
        let (base, slots) = self.index_slots()?;
        Ok(self.with_index(base, slots))
    }

    pub(super) fn index_slots(&self) -> Result<(u32, Vec<Option<PropertyRef>>), MapError> {
        let regions = match &self.layout {
            MapLayout::Search(regions) => regions,
            MapLayout::Index { base, slots } => return Ok((*base, slots.clone())),
        };
        let Some(len) = covered_slots(regions) else {
            return Ok((0, Vec::new()));
        };
        if len > u64::from(MAX_INDEX_SLOTS) {
            return Err(MapError::TooLarge);
        }
        let base = regions[0].low;
        let mut slots = vec![None; len as usize];

        for region in regions {
            for &r in region.entry.refs() {
                for a in self.property(r).elements() {
                    if !region.contains(a) {
                        continue;
                    }
                    let slot = &mut slots[(a - base) as usize];
                    if slot.is_none() {
                        *slot = Some(r);
                    }
                }
            }
        }
        Ok((base, slots))
    }

    pub(super) fn with_index(mut self, base: u32, slots: Vec<Option<PropertyRef>>) -> Self {
        self.layout = MapLayout::Index { base, slots };
        self
    }
}
