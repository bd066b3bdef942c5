/// Zero-copy byte reader for decoding DMP blocks.
pub mod reader;
/// Byte writer for encoding into a caller-owned buffer.
pub mod writer;
