//! Address maps: resolving a DMP address to the property that owns it.
//!
//! A map is built once from the properties of a device description with
//! [`MapBuilder`] and is immutable afterwards, so one map can be shared by
//! every peer using that description.
//!
//! Two layouts exist. The search layout is a sorted list of disjoint regions,
//! each naming the properties that may own addresses inside it. The index
//! layout is a direct table with one slot per address, produced from a
//! search map when the covered range is small enough to be worth it.

mod builder;
mod index;

pub use builder::MapBuilder;
pub use index::IndexPolicy;

use crate::property::Property;
use alloc::vec::Vec;
use core::slice;

/// Position of a property in the property table.
///
/// Table order is insertion order, which is also the precedence order when
/// several properties claim the same address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PropertyRef(u32);

impl PropertyRef {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The properties that may own the addresses of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionEntry {
    /// Every address in the region belongs to the property.
    Packed(PropertyRef),
    /// The property owns some addresses; membership must be tested.
    Sparse(PropertyRef),
    /// Candidates in insertion order; the first member wins.
    Many(Vec<PropertyRef>),
}

impl RegionEntry {
    /// Number of membership tests resolution may run.
    pub fn test_count(&self) -> usize {
        match self {
            Self::Packed(_) => 0,
            Self::Sparse(_) => 1,
            Self::Many(refs) => refs.len(),
        }
    }

    pub fn refs(&self) -> &[PropertyRef] {
        match self {
            Self::Packed(r) | Self::Sparse(r) => slice::from_ref(r),
            Self::Many(refs) => refs,
        }
    }

    /// This entry with `extra` appended as the last candidate.
    fn with(self, extra: PropertyRef) -> Self {
        match self {
            Self::Packed(r) | Self::Sparse(r) => Self::Many(alloc::vec![r, extra]),
            Self::Many(mut refs) => {
                refs.push(extra);
                Self::Many(refs)
            }
        }
    }
}

/// An inclusive address interval and the properties that may own it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub low: u32,
    pub high: u32,
    pub entry: RegionEntry,
}

impl Region {
    pub const fn contains(&self, address: u32) -> bool {
        self.low <= address && address <= self.high
    }
}

/// Storage layout of an [`AddressMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapLayout {
    Search(Vec<Region>),
    Index {
        base: u32,
        slots: Vec<Option<PropertyRef>>,
    },
}

/// Summary figures for diagnostics and the index policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapStats {
    pub properties: usize,
    pub regions: usize,
    /// Largest number of candidates any region tests.
    pub max_tests: usize,
    /// Lowest and highest covered address.
    pub covered: Option<(u32, u32)>,
    pub index_slots: usize,
    /// Addresses claimed by more than one property.
    pub ambiguous: usize,
}

/// The property table of one device description and its address map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMap {
    properties: Vec<Property>,
    layout: MapLayout,
    ambiguous: usize,
}

impl AddressMap {
    pub fn builder() -> MapBuilder {
        MapBuilder::new()
    }

    /// The property owning `address`, if any.
    pub fn resolve(&self, address: u32) -> Option<PropertyRef> {
        match &self.layout {
            MapLayout::Index { base, slots } => {
                let offset = address.checked_sub(*base)? as usize;
                slots.get(offset).copied().flatten()
            }
            MapLayout::Search(regions) => {
                let i = regions.partition_point(|r| r.high < address);
                let region = regions.get(i).filter(|r| r.contains(address))?;
                match &region.entry {
                    RegionEntry::Packed(r) => Some(*r),
                    RegionEntry::Sparse(r) => {
                        self.property(*r).contains(address).then_some(*r)
                    }
                    RegionEntry::Many(refs) => refs
                        .iter()
                        .copied()
                        .find(|r| self.property(*r).contains(address)),
                }
            }
        }
    }

    pub fn resolve_property(&self, address: u32) -> Option<&Property> {
        self.resolve(address).map(|r| self.property(r))
    }

    /// Looks up a table entry. `r` must come from this map.
    pub fn property(&self, r: PropertyRef) -> &Property {
        &self.properties[r.index()]
    }

    pub fn get(&self, r: PropertyRef) -> Option<&Property> {
        self.properties.get(r.index())
    }

    pub fn properties(&self) -> impl Iterator<Item = (PropertyRef, &Property)> {
        self.properties
            .iter()
            .enumerate()
            .map(|(i, p)| (PropertyRef(i as u32), p))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn layout(&self) -> &MapLayout {
        &self.layout
    }

    pub fn is_index(&self) -> bool {
        matches!(self.layout, MapLayout::Index { .. })
    }

    /// Regions of a search map; `None` once transformed to an index.
    pub fn regions(&self) -> Option<&[Region]> {
        match &self.layout {
            MapLayout::Search(regions) => Some(regions),
            MapLayout::Index { .. } => None,
        }
    }

    /// Region holding `address` in a search map.
    pub fn region_for(&self, address: u32) -> Option<&Region> {
        let regions = self.regions()?;
        let i = regions.partition_point(|r| r.high < address);
        regions.get(i).filter(|r| r.contains(address))
    }

    /// Lowest address at or above `address` that may resolve.
    ///
    /// Never skips an owned address, but may return an address that
    /// resolves to nothing. `None` when no owned address lies above.
    pub fn next_covered(&self, address: u32) -> Option<u32> {
        match &self.layout {
            MapLayout::Search(regions) => {
                let i = regions.partition_point(|r| r.high < address);
                regions.get(i).map(|r| r.low.max(address))
            }
            MapLayout::Index { base, slots } => {
                let end = u64::from(*base) + slots.len() as u64;
                if u64::from(address) >= end {
                    None
                } else {
                    Some(address.max(*base))
                }
            }
        }
    }

    pub fn stats(&self) -> MapStats {
        let mut stats = MapStats {
            properties: self.properties.len(),
            ambiguous: self.ambiguous,
            ..MapStats::default()
        };
        match &self.layout {
            MapLayout::Search(regions) => {
                stats.regions = regions.len();
                stats.max_tests = regions
                    .iter()
                    .map(|r| r.entry.test_count())
                    .max()
                    .unwrap_or(0);
                stats.covered = regions
                    .first()
                    .zip(regions.last())
                    .map(|(a, b)| (a.low, b.high));
            }
            MapLayout::Index { base, slots } => {
                stats.index_slots = slots.len();
                if !slots.is_empty() {
                    stats.covered = Some((*base, base + (slots.len() as u32 - 1)));
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyDescriptor;
    use crate::types::{ElementSize, PropertyFlags};
    use proptest::prelude::*;

    fn desc(address: u32, dims: &[(u32, u32)]) -> PropertyDescriptor {
        let mut d = PropertyDescriptor::scalar(address, ElementSize::Fixed(1), PropertyFlags::READ);
        for &(stride, count) in dims {
            d = d.with_dimension(stride, count);
        }
        d
    }

    fn search_map(props: &[PropertyDescriptor]) -> AddressMap {
        let mut b = MapBuilder::new();
        for p in props {
            b.add_property(p.clone()).unwrap();
        }
        b.finish(IndexPolicy::never())
    }

    fn assert_disjoint(map: &AddressMap) {
        let regions = map.regions().unwrap();
        for pair in regions.windows(2) {
            assert!(pair[0].low <= pair[0].high);
            assert!(pair[0].high < pair[1].low, "{pair:?}");
        }
    }

    #[test]
    fn scalar_resolution() {
        let map = search_map(&[desc(100, &[])]);
        assert_eq!(map.resolve(100), Some(PropertyRef(0)));
        assert_eq!(map.resolve(101), None);
        assert_eq!(map.resolve(99), None);
    }

    #[test]
    fn packed_array_resolution() {
        let map = search_map(&[desc(200, &[(1, 10)])]);
        assert_eq!(map.resolve(209), Some(PropertyRef(0)));
        assert_eq!(map.resolve(210), None);
        assert_eq!(map.regions().unwrap()[0].entry, RegionEntry::Packed(PropertyRef(0)));
    }

    #[test]
    fn sparse_array_resolution() {
        let map = search_map(&[desc(0, &[(3, 4)])]);
        assert_eq!(map.resolve(4), None);
        assert_eq!(map.resolve(6), Some(PropertyRef(0)));
        assert_eq!(map.regions().unwrap()[0].entry.test_count(), 1);
    }

    #[test]
    fn interleaved_arrays_share_one_region() {
        let map = search_map(&[desc(0, &[(2, 3)]), desc(1, &[(2, 3)])]);
        assert_eq!(map.resolve(0), Some(PropertyRef(0)));
        assert_eq!(map.resolve(1), Some(PropertyRef(1)));
        assert_eq!(map.resolve(4), Some(PropertyRef(0)));
        assert_eq!(map.resolve(5), Some(PropertyRef(1)));
        let regions = map.regions().unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].low, regions[0].high), (0, 5));
        assert_eq!(regions[0].entry.test_count(), 2);
    }

    #[test]
    fn scalar_inside_packed_array_splits_three_ways() {
        let map = search_map(&[desc(10, &[(1, 10)]), desc(14, &[])]);
        assert_disjoint(&map);
        let regions = map.regions().unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!((regions[1].low, regions[1].high), (14, 14));
        // The array was declared first and keeps the address.
        assert_eq!(map.resolve(14), Some(PropertyRef(0)));
        assert_eq!(map.stats().ambiguous, 1);
    }

    #[test]
    fn scalar_in_sparse_hole_resolves_to_itself() {
        let map = search_map(&[desc(0, &[(4, 3)]), desc(2, &[]), desc(20, &[])]);
        assert_disjoint(&map);
        assert_eq!(map.resolve(0), Some(PropertyRef(0)));
        assert_eq!(map.resolve(2), Some(PropertyRef(1)));
        assert_eq!(map.resolve(3), None);
        assert_eq!(map.resolve(20), Some(PropertyRef(2)));
        assert_eq!(map.stats().ambiguous, 0);
    }

    #[test]
    fn merge_spans_multiple_regions_and_gaps() {
        let map = search_map(&[
            desc(0, &[(5, 2)]),
            desc(12, &[(5, 2)]),
            desc(1, &[(4, 5)]),
        ]);
        assert_disjoint(&map);
        let regions = map.regions().unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0].entry,
            RegionEntry::Many(alloc::vec![PropertyRef(0), PropertyRef(1), PropertyRef(2)])
        );
        assert_eq!(map.resolve(9), Some(PropertyRef(2)));
        assert_eq!(map.resolve(17), Some(PropertyRef(1)));
    }

    #[test]
    fn index_transform_matches_search() {
        let props = [
            desc(0, &[(2, 3)]),
            desc(1, &[(2, 3)]),
            desc(10, &[(1, 4)]),
            desc(12, &[]),
            desc(20, &[(4, 2), (3, 3)]),
        ];
        let search = search_map(&props);
        let index = search.clone().to_index().unwrap();
        assert!(index.is_index());
        for a in 0..40 {
            assert_eq!(search.resolve(a), index.resolve(a), "address {a}");
        }
    }

    #[test]
    fn default_policy_indexes_small_maps() {
        let mut b = MapBuilder::new();
        b.add_property(desc(0, &[(1, 16)])).unwrap();
        let map = b.finish(IndexPolicy::default());
        assert!(map.is_index());
        assert_eq!(map.stats().index_slots, 16);
        assert_eq!(map.resolve(15), Some(PropertyRef(0)));
        assert_eq!(map.resolve(16), None);
    }

    #[test]
    fn next_covered_skips_gaps() {
        let search = search_map(&[desc(10, &[(1, 4)]), desc(100, &[])]);
        assert_eq!(search.next_covered(0), Some(10));
        assert_eq!(search.next_covered(12), Some(12));
        assert_eq!(search.next_covered(14), Some(100));
        assert_eq!(search.next_covered(101), None);

        let index = search.to_index().unwrap();
        assert_eq!(index.next_covered(0), Some(10));
        assert_eq!(index.next_covered(50), Some(50));
        assert_eq!(index.next_covered(101), None);
    }

    fn arb_descriptor() -> impl Strategy<Value = PropertyDescriptor> {
        (
            0u32..200,
            prop::collection::vec((1u32..8, 1u32..5), 0..3),
        )
            .prop_map(|(address, dims)| desc(address, &dims))
    }

    proptest! {
        #[test]
        fn maps_are_disjoint_and_complete(props in prop::collection::vec(arb_descriptor(), 1..12)) {
            let map = search_map(&props);
            assert_disjoint(&map);
            for (r, p) in map.properties() {
                for a in p.elements() {
                    let owner = map.resolve(a);
                    prop_assert!(owner.is_some());
                    // An earlier property may shadow a later one.
                    prop_assert!(owner.unwrap() <= r);
                    prop_assert_eq!(map.resolve(a), owner);
                }
                for a in p.address()..=p.last_address() {
                    if !p.contains(a) {
                        prop_assert_ne!(map.resolve(a), Some(r));
                    }
                }
            }
        }

        #[test]
        fn index_equals_search(props in prop::collection::vec(arb_descriptor(), 1..12)) {
            let search = search_map(&props);
            let index = search.clone().to_index().unwrap();
            for a in 0..260u32 {
                prop_assert_eq!(search.resolve(a), index.resolve(a));
            }
        }
    }
}
