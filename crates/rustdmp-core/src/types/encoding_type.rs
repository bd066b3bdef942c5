/// How a property's value octets are interpreted.
///
/// The core never inspects values; the type is carried for handlers and
/// tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodingType {
    Boolean,
    SignedInt,
    UnsignedInt,
    Float,
    String,
    Enumeration,
    #[default]
    Opaque,
    Uuid,
    Bitmap,
    Date,
    Uri,
    Unknown(u8),
}

impl EncodingType {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Boolean,
            1 => Self::SignedInt,
            2 => Self::UnsignedInt,
            3 => Self::Float,
            4 => Self::String,
            5 => Self::Enumeration,
            6 => Self::Opaque,
            7 => Self::Uuid,
            8 => Self::Bitmap,
            9 => Self::Date,
            10 => Self::Uri,
            v => Self::Unknown(v),
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Boolean => 0,
            Self::SignedInt => 1,
            Self::UnsignedInt => 2,
            Self::Float => 3,
            Self::String => 4,
            Self::Enumeration => 5,
            Self::Opaque => 6,
            Self::Uuid => 7,
            Self::Bitmap => 8,
            Self::Date => 9,
            Self::Uri => 10,
            Self::Unknown(v) => v,
        }
    }
}
