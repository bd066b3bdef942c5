pub mod element_size;
pub mod encoding_type;
pub mod flags;

pub use element_size::ElementSize;
pub use encoding_type::EncodingType;
pub use flags::PropertyFlags;
