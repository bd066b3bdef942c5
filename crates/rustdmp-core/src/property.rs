//! Property descriptors and the validated entries of a property table.

use crate::types::{ElementSize, EncodingType, PropertyFlags};
use crate::MapError;
use alloc::vec;
use alloc::vec::Vec;

/// One array dimension of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dimension {
    /// Address distance between consecutive indices.
    pub stride: u32,
    pub count: u32,
    /// Depth of the declaring node in the description tree.
    #[cfg_attr(feature = "serde", serde(default))]
    pub tree_depth: u16,
}

impl Dimension {
    pub const fn new(stride: u32, count: u32) -> Self {
        Self {
            stride,
            count,
            tree_depth: 0,
        }
    }
}

/// A property as declared by a device description, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyDescriptor {
    pub address: u32,
    pub element_size: ElementSize,
    #[cfg_attr(feature = "serde", serde(default))]
    pub encoding: EncodingType,
    pub flags: PropertyFlags,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dimensions: Vec<Dimension>,
}

impl PropertyDescriptor {
    pub fn scalar(address: u32, element_size: ElementSize, flags: PropertyFlags) -> Self {
        Self {
            address,
            element_size,
            encoding: EncodingType::default(),
            flags,
            dimensions: Vec::new(),
        }
    }

    pub fn with_dimension(mut self, stride: u32, count: u32) -> Self {
        let depth = self.dimensions.len() as u16;
        self.dimensions.push(Dimension {
            stride,
            count,
            tree_depth: depth,
        });
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingType) -> Self {
        self.encoding = encoding;
        self
    }
}

/// A validated property-table entry.
///
/// Dimensions are held largest stride first. Span, packing and overlap are
/// computed once at validation and never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    address: u32,
    element_size: ElementSize,
    encoding: EncodingType,
    flags: PropertyFlags,
    dimensions: Vec<Dimension>,
    /// Largest offset reachable from dimension `i` and those below it.
    reach: Vec<u32>,
    /// Flat-index weight of dimension `i`.
    weights: Vec<u32>,
    span: u32,
}

impl Property {
    pub fn from_descriptor(desc: PropertyDescriptor) -> Result<Self, MapError> {
        let PropertyDescriptor {
            address,
            element_size,
            encoding,
            flags,
            mut dimensions,
        } = desc;

        let mut flags = flags.intersection(PropertyFlags::DECLARED);
        if element_size.is_variable() {
            flags.insert(PropertyFlags::VARSIZE);
        } else if element_size == ElementSize::Fixed(0) {
            return Err(MapError::ZeroSpan);
        }

        dimensions.sort_by(|a, b| b.stride.cmp(&a.stride));

        let n = dimensions.len();
        let mut reach = vec![0u32; n + 1];
        let mut weights = vec![1u32; n];
        let mut span_below: u32 = 1;
        let mut elements: u32 = 1;
        let mut overlap = false;
        for i in (0..n).rev() {
            let d = dimensions[i];
            if d.count == 0 {
                return Err(MapError::ZeroCount);
            }
            if d.count > 1 && d.stride == 0 {
                return Err(MapError::ZeroStride);
            }
            if d.count > 1 && d.stride < span_below {
                overlap = true;
            }
            weights[i] = elements;
            let extent = (d.count - 1)
                .checked_mul(d.stride)
                .ok_or(MapError::AddressOverflow { address })?;
            reach[i] = reach[i + 1]
                .checked_add(extent)
                .ok_or(MapError::AddressOverflow { address })?;
            span_below = reach[i] + 1;
            elements = elements.checked_mul(d.count).ok_or(MapError::TooLarge)?;
        }

        let span = reach[0].checked_add(1).ok_or(MapError::AddressOverflow { address })?;
        if address.checked_add(span - 1).is_none() {
            return Err(MapError::AddressOverflow { address });
        }
        if overlap {
            flags.insert(PropertyFlags::OVERLAP);
        } else if span == elements {
            flags.insert(PropertyFlags::PACKED);
        }

        Ok(Self {
            address,
            element_size,
            encoding,
            flags,
            dimensions,
            reach,
            weights,
            span,
        })
    }

    pub const fn address(&self) -> u32 {
        self.address
    }

    /// Highest address the property occupies.
    pub const fn last_address(&self) -> u32 {
        self.address + (self.span - 1)
    }

    pub const fn span(&self) -> u32 {
        self.span
    }

    pub const fn element_size(&self) -> ElementSize {
        self.element_size
    }

    pub const fn encoding(&self) -> EncodingType {
        self.encoding
    }

    pub const fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn is_array(&self) -> bool {
        !self.dimensions.is_empty()
    }

    pub const fn is_packed(&self) -> bool {
        self.flags.contains(PropertyFlags::PACKED)
    }

    pub const fn is_overlapping(&self) -> bool {
        self.flags.contains(PropertyFlags::OVERLAP)
    }

    /// Number of elements, counting folded-back duplicates separately.
    pub fn element_count(&self) -> u32 {
        self.dimensions.iter().map(|d| d.count).product()
    }

    /// Whether `address` names an element of this property.
    pub fn contains(&self, address: u32) -> bool {
        let a0 = address.wrapping_sub(self.address);
        if a0 >= self.span {
            return false;
        }
        if a0 == 0 || self.is_packed() {
            return true;
        }
        if self.is_overlapping() {
            return self.search(0, a0, 0).is_some();
        }

        let mut rem = a0;
        for d in self.dimensions.iter().filter(|d| d.count > 1) {
            let q = rem / d.stride;
            if q >= d.count {
                return false;
            }
            rem -= q * d.stride;
            if rem == 0 {
                return true;
            }
        }
        false
    }

    /// Flat element index of `address`, most significant dimension first.
    ///
    /// Where overlapping dimensions reach one address by several index
    /// combinations, the one with the largest leading indices is used.
    pub fn element_index(&self, address: u32) -> Option<u32> {
        let a0 = address.wrapping_sub(self.address);
        if a0 >= self.span {
            return None;
        }
        self.search(0, a0, 0)
    }

    fn search(&self, dim: usize, rem: u32, flat: u32) -> Option<u32> {
        if rem == 0 {
            return Some(flat);
        }
        let d = self.dimensions.get(dim)?;
        let below = self.reach[dim + 1];
        let top = (d.count - 1).min(rem / d.stride.max(1));
        for q in (0..=top).rev() {
            let r = rem - q * d.stride;
            if r > below {
                break;
            }
            if let Some(found) = self.search(dim + 1, r, flat + q * self.weights[dim]) {
                return Some(found);
            }
        }
        None
    }

    /// Every element address, most significant dimension first.
    pub fn elements(&self) -> Elements<'_> {
        Elements {
            property: self,
            indices: vec![0; self.dimensions.len()],
            done: false,
        }
    }
}

/// Iterator over the element addresses of a [`Property`].
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    property: &'a Property,
    indices: Vec<u32>,
    done: bool,
}

impl Iterator for Elements<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.done {
            return None;
        }
        let dims = &self.property.dimensions;
        let offset: u32 = self
            .indices
            .iter()
            .zip(dims)
            .map(|(i, d)| i * d.stride)
            .sum();

        // Odometer step, least significant dimension last.
        self.done = true;
        for k in (0..dims.len()).rev() {
            self.indices[k] += 1;
            if self.indices[k] < dims[k].count {
                self.done = false;
                break;
            }
            self.indices[k] = 0;
        }
        Some(self.property.address + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(address: u32, dims: &[(u32, u32)]) -> Property {
        let mut d = PropertyDescriptor::scalar(address, ElementSize::Fixed(2), PropertyFlags::READ);
        for &(stride, count) in dims {
            d = d.with_dimension(stride, count);
        }
        Property::from_descriptor(d).unwrap()
    }

    #[test]
    fn scalar_is_packed() {
        let p = prop(100, &[]);
        assert_eq!(p.span(), 1);
        assert!(p.is_packed());
        assert!(p.contains(100));
        assert!(!p.contains(101));
        assert!(!p.contains(99));
    }

    #[test]
    fn packed_array() {
        let p = prop(200, &[(1, 10)]);
        assert_eq!(p.span(), 10);
        assert!(p.is_packed());
        assert!(p.contains(209));
        assert!(!p.contains(210));
    }

    #[test]
    fn sparse_array() {
        let p = prop(0, &[(3, 4)]);
        assert_eq!(p.span(), 10);
        assert!(!p.is_packed());
        assert!(!p.is_overlapping());
        assert!(!p.contains(4));
        assert!(p.contains(6));
        assert!(p.contains(9));
        assert_eq!(p.element_index(6), Some(2));
        assert_eq!(p.element_index(7), None);
    }

    #[test]
    fn two_dimensional_sparse() {
        // Rows of three at stride 10: 0,1,2, 10,11,12.
        let p = prop(0, &[(1, 3), (10, 2)]);
        assert_eq!(p.dimensions()[0].stride, 10);
        assert_eq!(p.span(), 13);
        assert!(p.contains(11));
        assert!(!p.contains(5));
        assert_eq!(p.element_index(11), Some(4));
        assert_eq!(p.elements().collect::<Vec<_>>(), [0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn row_major_is_packed() {
        let p = prop(0, &[(3, 2), (1, 3)]);
        assert_eq!(p.span(), 6);
        assert!(p.is_packed());
    }

    #[test]
    fn self_overlapping_array() {
        // Outer stride 4, inner stride 3 over 3 elements: offsets
        // {0,3,6} + {0,4} = 0,3,4,6,7,10.
        let p = prop(0, &[(4, 2), (3, 3)]);
        assert!(p.is_overlapping());
        assert_eq!(p.span(), 11);
        let members: Vec<u32> = (0..12).filter(|&a| p.contains(a)).collect();
        assert_eq!(members, [0, 3, 4, 6, 7, 10]);
        let mut listed: Vec<u32> = p.elements().collect();
        listed.sort_unstable();
        assert_eq!(listed, members);
    }

    #[test]
    fn validation_rejects_degenerate_shapes() {
        let zero_count = PropertyDescriptor::scalar(0, ElementSize::Fixed(1), PropertyFlags::READ)
            .with_dimension(1, 0);
        assert_eq!(
            Property::from_descriptor(zero_count).unwrap_err(),
            MapError::ZeroCount
        );

        let zero_stride = PropertyDescriptor::scalar(0, ElementSize::Fixed(1), PropertyFlags::READ)
            .with_dimension(0, 3);
        assert_eq!(
            Property::from_descriptor(zero_stride).unwrap_err(),
            MapError::ZeroStride
        );

        let overflow =
            PropertyDescriptor::scalar(u32::MAX - 2, ElementSize::Fixed(1), PropertyFlags::READ)
                .with_dimension(1, 4);
        assert_eq!(
            Property::from_descriptor(overflow).unwrap_err(),
            MapError::AddressOverflow {
                address: u32::MAX - 2
            }
        );

        let empty = PropertyDescriptor::scalar(0, ElementSize::Fixed(0), PropertyFlags::READ);
        assert_eq!(
            Property::from_descriptor(empty).unwrap_err(),
            MapError::ZeroSpan
        );
    }

    #[test]
    fn computed_flags_are_not_declarable() {
        let d = PropertyDescriptor::scalar(
            0,
            ElementSize::Variable,
            PropertyFlags::READ | PropertyFlags::OVERLAP,
        )
        .with_dimension(2, 3);
        let p = Property::from_descriptor(d).unwrap();
        assert!(!p.is_overlapping());
        assert!(p.flags().contains(PropertyFlags::VARSIZE));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn descriptor_from_json() {
        let json = r#"{ "address": 40, "element_size": "variable", "flags": 35,
                        "dimensions": [ { "stride": 4, "count": 3 } ] }"#;
        let d: PropertyDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(
            d.flags,
            PropertyFlags::READ | PropertyFlags::WRITE | PropertyFlags::PACKED
        );
        assert_eq!(d.dimensions, vec![Dimension::new(4, 3)]);

        let p = Property::from_descriptor(d).unwrap();
        assert_eq!(
            p.flags().intersection(PropertyFlags::DECLARED),
            PropertyFlags::READ | PropertyFlags::WRITE | PropertyFlags::VARSIZE
        );
        assert!(p.is_array());
        assert!(!p.is_packed());
    }
}
