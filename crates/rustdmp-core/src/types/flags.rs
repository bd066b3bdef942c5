use core::fmt;

/// Access and layout flags of a property.
///
/// Access bits come from the description. `PACKED` and `OVERLAP` are
/// derived when the property's dimensions are validated. Serialized as the
/// raw bit pattern.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PropertyFlags(u16);

bitflags::bitflags! {
    impl PropertyFlags: u16 {
        const READ = 0x0001;
        const WRITE = 0x0002;
        const EVENT = 0x0004;
        const VARSIZE = 0x0008;
        const ABSOLUTE = 0x0010;
        const PACKED = 0x0020;
        const OVERLAP = 0x0040;
        const CONSTANT = 0x0080;
        const PERSISTENT = 0x0100;
    }
}

impl PropertyFlags {
    /// Bits a description may set; the rest are computed.
    pub const DECLARED: Self = Self::READ
        .union(Self::WRITE)
        .union(Self::EVENT)
        .union(Self::VARSIZE)
        .union(Self::ABSOLUTE)
        .union(Self::CONSTANT)
        .union(Self::PERSISTENT);
}

impl fmt::Debug for PropertyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PropertyFlags(")?;
        bitflags::parser::to_writer(self, &mut *f)?;
        f.write_str(")")
    }
}
