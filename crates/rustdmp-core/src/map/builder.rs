use super::{AddressMap, IndexPolicy, MapLayout, PropertyRef, Region, RegionEntry};
use crate::property::{Property, PropertyDescriptor};
use crate::MapError;
use alloc::vec::Vec;

/// Builds a search map from properties in description order.
#[derive(Debug, Default)]
pub struct MapBuilder {
    properties: Vec<Property>,
    regions: Vec<Region>,
    ambiguous: usize,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Validates `desc`, appends it to the property table and maps its span.
    pub fn add_property(&mut self, desc: PropertyDescriptor) -> Result<PropertyRef, MapError> {
        let prop = Property::from_descriptor(desc)?;
        let r = u32::try_from(self.properties.len())
            .map(PropertyRef::new)
            .map_err(|_| MapError::TooManyProperties)?;
        let (lo, hi) = (prop.address(), prop.last_address());

        let first = self.regions.partition_point(|reg| reg.high < lo);
        let end = first + self.regions[first..].partition_point(|reg| reg.low <= hi);

        if first == end {
            let entry = if prop.is_packed() {
                RegionEntry::Packed(r)
            } else {
                RegionEntry::Sparse(r)
            };
            self.regions.insert(
                first,
                Region {
                    low: lo,
                    high: hi,
                    entry,
                },
            );
        } else {
            self.note_collisions(&prop, first, end);
            let touches_packed = self.regions[first..end]
                .iter()
                .any(|reg| matches!(reg.entry, RegionEntry::Packed(_)));
            if touches_packed {
                self.split(first, end, lo, hi, r, prop.is_packed());
            } else {
                self.merge(first, end, lo, hi, r);
            }
        }

        self.properties.push(prop);
        Ok(r)
    }

    /// Cuts the overlapped regions at `lo`/`hi` and appends `r` inside.
    fn split(&mut self, first: usize, end: usize, lo: u32, hi: u32, r: PropertyRef, packed: bool) {
        let own = || {
            if packed {
                RegionEntry::Packed(r)
            } else {
                RegionEntry::Sparse(r)
            }
        };
        let old: Vec<Region> = self.regions.drain(first..end).collect();
        let mut out = Vec::with_capacity(old.len() * 2 + 1);
        // Next address of [lo, hi] not yet covered; u64 so hi == u32::MAX ends cleanly.
        let mut cursor = u64::from(lo);

        for reg in old {
            if reg.low < lo {
                out.push(Region {
                    low: reg.low,
                    high: lo - 1,
                    entry: reg.entry.clone(),
                });
            }
            if u64::from(reg.low) > cursor {
                out.push(Region {
                    low: cursor as u32,
                    high: reg.low - 1,
                    entry: own(),
                });
            }
            let inner_high = reg.high.min(hi);
            out.push(Region {
                low: reg.low.max(lo),
                high: inner_high,
                entry: reg.entry.clone().with(r),
            });
            if reg.high > hi {
                out.push(Region {
                    low: hi + 1,
                    high: reg.high,
                    entry: reg.entry,
                });
            }
            cursor = u64::from(inner_high) + 1;
        }
        if cursor <= u64::from(hi) {
            out.push(Region {
                low: cursor as u32,
                high: hi,
                entry: own(),
            });
        }

        self.regions.splice(first..first, out);
    }

    /// Widens the overlapped sparse regions into one region testing every
    /// candidate, `r` last.
    fn merge(&mut self, first: usize, end: usize, lo: u32, hi: u32, r: PropertyRef) {
        let low = self.regions[first].low.min(lo);
        let high = self.regions[end - 1].high.max(hi);
        let mut refs: Vec<PropertyRef> = self.regions[first..end]
            .iter()
            .flat_map(|reg| reg.entry.refs().iter().copied())
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs.push(r);

        self.regions.drain(first + 1..end);
        self.regions[first] = Region {
            low,
            high,
            entry: RegionEntry::Many(refs),
        };
    }

    /// Counts addresses of `prop` already owned by an earlier property.
    ///
    /// Such addresses keep resolving to the earlier property.
    fn note_collisions(&mut self, prop: &Property, first: usize, end: usize) {
        let regions = &self.regions[first..end];
        let mut hits = 0usize;
        let mut first_hit = None;
        for a in prop.elements() {
            let i = regions.partition_point(|reg| reg.high < a);
            let Some(reg) = regions.get(i).filter(|reg| reg.contains(a)) else {
                continue;
            };
            let owner = reg
                .entry
                .refs()
                .iter()
                .copied()
                .find(|o| self.properties[o.index()].contains(a));
            if let Some(owner) = owner {
                hits += 1;
                first_hit.get_or_insert((a, owner));
            }
        }
        if let Some((address, owner)) = first_hit {
            log::warn!(
                "property {} at {} shares {} addresses with earlier properties \
                 (first {} owned by property {}); earlier declarations win",
                self.properties.len(),
                prop.address(),
                hits,
                address,
                owner.index()
            );
            self.ambiguous += hits;
        }
    }

    /// Freezes the table, converting to an index map when `policy` allows.
    pub fn finish(self, policy: IndexPolicy) -> AddressMap {
        let map = AddressMap {
            properties: self.properties,
            layout: MapLayout::Search(self.regions),
            ambiguous: self.ambiguous,
        };
        if !policy.prefers_index(&map) {
            return map;
        }
        match map.index_slots() {
            Ok((base, slots)) => map.with_index(base, slots),
            Err(err) => {
                log::debug!("keeping search map: {err}");
                map
            }
        }
    }
}
