//! Compilation state shared by the parser.
//!
//! An [`EvalContext`] fixes the protocol family and the parse mode for one
//! compilation, owns the program being emitted, and converts literal text
//! into the checked numbers tokens carry.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Location, Result};
use crate::lexer::Lexeme;
use crate::options::OptionRegistry;
use crate::packet::Family;
use crate::token::Token;

/// Deepest DHCPv6 relay nest level an expression may name.
pub const MAX_NEST_LEVEL: u8 = 31;

/// Root production of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionKind {
    /// The expression must produce a boolean (`bool_expr`).
    #[default]
    Bool,
    /// The expression must produce a byte string (`string_expr`).
    String,
}

/// Per-compilation context: family, parse mode and the program so far.
///
/// Tokens are only ever appended. The context is consumed when compilation
/// succeeds and dropped with its partial program when it fails.
#[derive(Debug)]
pub struct EvalContext<'r> {
    family: Family,
    kind: ExpressionKind,
    registry: &'r OptionRegistry,
    program: Vec<Token>,
}

impl<'r> EvalContext<'r> {
    pub fn new(family: Family, kind: ExpressionKind, registry: &'r OptionRegistry) -> Self {
        Self {
            family,
            kind,
            registry,
            program: Vec::new(),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    pub fn push(&mut self, token: Token) {
        trace!("emitting {}", token);
        self.program.push(token);
    }

    pub fn into_program(self) -> Vec<Token> {
        self.program
    }

    /// Rejects a family-specific construct introduced by `keyword`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Semantic`] at the keyword's location when the context
    /// family is not `required`.
    pub fn require_family(&self, required: Family, keyword: &Lexeme) -> Result<()> {
        if self.family == required {
            return Ok(());
        }
        Err(Error::Semantic {
            location: keyword.location,
            message: format!("{} can only be used in {}.", keyword.text, required),
        })
    }

    /// Converts a numeric option code, checking the family's code range.
    pub fn convert_option_code(&self, text: &str, location: Location) -> Result<u16> {
        let limit: i64 = match self.family {
            Family::V4 => u8::MAX as i64,
            Family::V6 => u16::MAX as i64,
        };
        match text.parse::<i64>() {
            Ok(code) if (0..=limit).contains(&code) => Ok(code as u16),
            _ => Err(semantic(
                location,
                format!(
                    "Option code has invalid value in {}. Allowed range: 0..{}",
                    text, limit
                ),
            )),
        }
    }

    /// Resolves an option name through the registry for the context's family.
    pub fn convert_option_name(&self, name: &str, location: Location) -> Result<u16> {
        self.registry
            .lookup(self.family, name)
            .ok_or_else(|| semantic(location, format!("option '{}' is not defined", name)))
    }

    pub fn convert_nest_level(&self, text: &str, location: Location) -> Result<u8> {
        match text.parse::<i64>() {
            Ok(level) if (0..=MAX_NEST_LEVEL as i64).contains(&level) => Ok(level as u8),
            _ => Err(semantic(
                location,
                format!(
                    "Nest level has invalid value in {}. Allowed range: 0..{}",
                    text, MAX_NEST_LEVEL
                ),
            )),
        }
    }

    pub fn convert_uint32(text: &str, location: Location) -> Result<u32> {
        let value = parse_integer(text, location)?;
        u32::try_from(value).map_err(|_| {
            semantic(
                location,
                format!("Failed to convert {} to an unsigned 32-bit integer.", text),
            )
        })
    }

    pub fn convert_uint8(text: &str, location: Location) -> Result<u8> {
        let value = parse_integer(text, location)?;
        u8::try_from(value).map_err(|_| {
            semantic(
                location,
                format!("Failed to convert {} to an unsigned 8-bit integer.", text),
            )
        })
    }
}

fn parse_integer(text: &str, location: Location) -> Result<i64> {
    text.parse::<i64>()
        .map_err(|_| semantic(location, format!("Failed to convert {} to an integer.", text)))
}

fn semantic(location: Location, message: String) -> Error {
    Error::Semantic { location, message }
}
