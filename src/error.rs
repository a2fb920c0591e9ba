//! Error types for the classification engine.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Compile-time errors carry the
//! [`Location`] of the text that triggered them.

use std::fmt;

/// A span within an expression, 1-based, end column inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub begin: u32,
    pub end: u32,
}

impl Location {
    pub fn new(line: u32, begin: u32, end: u32) -> Self {
        Self { line, begin, end }
    }

    /// Returns a span covering both `self` and `other`.
    pub fn to(self, other: Location) -> Self {
        Self {
            line: self.line,
            begin: self.begin,
            end: other.end,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin >= self.end {
            write!(f, "{}.{}", self.line, self.begin)
        } else {
            write!(f, "{}.{}-{}", self.line, self.begin, self.end)
        }
    }
}

/// Errors produced while compiling or evaluating classification expressions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid literal or unrecognized character in the expression text.
    #[error("<string>:{location}: {message}")]
    Lex { location: Location, message: String },

    /// Unexpected terminal. The message lists the accepted alternatives
    /// when there are few enough of them.
    #[error("<string>:{location}: {message}")]
    Syntax { location: Location, message: String },

    /// Well-formed text that cannot be compiled: a construct used with the
    /// wrong protocol family, or a literal that does not convert.
    #[error("<string>:{location}: {message}")]
    Semantic { location: Location, message: String },

    /// The stack did not hold what a token required.
    ///
    /// Programs produced by the parser never trigger this; it indicates a
    /// hand-built or corrupted program.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Malformed DHCP packet handed to the packet decoders.
    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),

    /// Invalid class configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File system I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the source span for compile-time errors.
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Lex { location, .. }
            | Self::Syntax { location, .. }
            | Self::Semantic { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// True for errors raised while turning text into a program.
    pub fn is_compile_error(&self) -> bool {
        self.location().is_some()
    }
}

/// A specialized Result type for classification operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new(1, 5, 5).to_string(), "1.5");
        assert_eq!(Location::new(1, 1, 6).to_string(), "1.1-6");
    }

    #[test]
    fn test_compile_error_display() {
        let error = Error::Semantic {
            location: Location::new(1, 1, 6),
            message: "relay6 can only be used in DHCPv6.".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "<string>:1.1-6: relay6 can only be used in DHCPv6."
        );
        assert!(error.is_compile_error());
        assert!(!Error::Evaluation("x".to_string()).is_compile_error());
    }
}
