//! Binary codec error contracts.

use std::error::Error;
use std::fmt;

/// Stable binary error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryErrorKind {
    /// Magic or version bytes did not match.
    BadHeader,
    /// Input ended inside a value or section.
    TruncatedInput,
    /// A section's inline name is not in the known set.
    UnknownSection,
    /// An opcode byte is neither a base opcode nor an opcode-table entry.
    UnknownOpcode,
    /// A value-type byte is outside the encoding.
    BadValueType,
    /// A section's declared size does not match its content.
    SectionSizeMismatch,
    /// The stream is structurally inconsistent (bad index, bad arity,
    /// unbalanced expression stack).
    MalformedStream,
    /// The module cannot be expressed in the binary format.
    InvalidModule,
}

/// Binary error payload: the category plus where in the stream it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryError {
    pub kind: BinaryErrorKind,
    /// Byte offset in the input, for reader errors.
    pub offset: Option<usize>,
    /// Section being processed, when known.
    pub section: Option<&'static str>,
    pub message: String,
}

impl BinaryError {
    pub fn new(kind: BinaryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset: None,
            section: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn in_section(mut self, section: &'static str) -> Self {
        self.section = Some(section);
        self
    }

    pub fn bad_header(message: impl Into<String>) -> Self {
        Self::new(BinaryErrorKind::BadHeader, message)
    }

    pub fn truncated(offset: usize) -> Self {
        Self::new(BinaryErrorKind::TruncatedInput, "unexpected end of input").at(offset)
    }

    pub fn unknown_section(name: impl Into<String>, offset: usize) -> Self {
        Self::new(
            BinaryErrorKind::UnknownSection,
            format!("unfamiliar section: {}", name.into()),
        )
        .at(offset)
    }

    pub fn unknown_opcode(code: u8, offset: usize) -> Self {
        Self::new(
            BinaryErrorKind::UnknownOpcode,
            format!("bad opcode 0x{code:02x}"),
        )
        .at(offset)
    }

    pub fn bad_value_type(code: u8, offset: usize) -> Self {
        Self::new(
            BinaryErrorKind::BadValueType,
            format!("bad value type byte 0x{code:02x}"),
        )
        .at(offset)
    }

    pub fn size_mismatch(section: &'static str, declared: usize, actual: usize) -> Self {
        Self::new(
            BinaryErrorKind::SectionSizeMismatch,
            format!("section declared {declared} bytes but spans {actual}"),
        )
        .in_section(section)
    }

    pub fn malformed(message: impl Into<String>, offset: usize) -> Self {
        Self::new(BinaryErrorKind::MalformedStream, message).at(offset)
    }

    pub fn invalid_module(message: impl Into<String>) -> Self {
        Self::new(BinaryErrorKind::InvalidModule, message)
    }
}

impl fmt::Display for BinaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(section) = self.section {
            write!(f, " [section {section}]")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " [at byte {offset}]")?;
        }
        Ok(())
    }
}

impl Error for BinaryError {}
