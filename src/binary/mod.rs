//! Binary codec for the sectioned, length-prefixed module format.

pub mod buffer;
pub mod constants;
pub mod error;
pub mod leb;
pub mod opcode_table;
pub mod reader;
pub mod writer;

pub use buffer::Buffer;
pub use error::{BinaryError, BinaryErrorKind};
pub use opcode_table::{OpcodeEntry, OpcodeInfo, OpcodeTable};
pub use reader::read_module;
pub use writer::{
    write_module, write_module_optimized, BinaryOutput, TableOfContents, TocEntry, Writer,
};
