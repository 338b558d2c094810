//! Typed message contracts for link dialogs.
//!
//! Every message exchanged with the equipment is an explicit encode/decode
//! pair instead of an ad-hoc format string, so the transaction protocol
//! stays agnostic of any one hardware family's wire encoding.

/// A request message the driver can place on the wire.
pub trait Command {
    /// Serializes the message into its on-wire byte form.
    fn encode(&self) -> Vec<u8>;
}

/// An answer message parsed off the wire.
pub trait Response: Sized {
    /// Parses one complete received message.
    fn parse(bytes: &[u8]) -> Result<Self, ParseError>;
}

/// Failure to understand a received message.
#[derive(Debug, thiserror::Error)]
#[error("answer not understood: expected {expected}, got {got:?}")]
pub struct ParseError {
    /// Human description of the expected shape.
    pub expected: &'static str,
    /// Lossy rendering of the offending bytes.
    pub got: String,
}

impl ParseError {
    /// Builds a parse error from the expected shape and the raw answer.
    pub fn new(expected: &'static str, bytes: &[u8]) -> Self {
        Self {
            expected,
            got: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}
