/// Size of one element of a property's value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ElementSize {
    Fixed(u16),
    /// Each value carries a two-octet length prefix counting itself.
    Variable,
}

impl ElementSize {
    pub const fn fixed(self) -> Option<usize> {
        match self {
            Self::Fixed(n) => Some(n as usize),
            Self::Variable => None,
        }
    }

    pub const fn is_variable(self) -> bool {
        matches!(self, Self::Variable)
    }
}
