//! Compiled expressions and their evaluation.

use std::fmt;
use std::sync::LazyLock;

use tracing::debug;

use crate::context::{EvalContext, ExpressionKind};
use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::options::OptionRegistry;
use crate::packet::{Family, Packet};
use crate::parser::Parser;
use crate::token::{Token, Value};

static STANDARD_OPTIONS: LazyLock<OptionRegistry> = LazyLock::new(OptionRegistry::standard);

/// An immutable token program.
///
/// A program is built once by [`compile`] and may be evaluated any number of
/// times, from any number of threads, against packets of its family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    family: Family,
    kind: ExpressionKind,
    tokens: Vec<Token>,
}

/// Compiles `text` using the standard option names.
///
/// # Errors
///
/// Returns [`Error::Lex`], [`Error::Syntax`] or [`Error::Semantic`]
/// describing the first problem found. No partial program is produced.
///
/// # Example
///
/// ```
/// use dhcpclass::{ExpressionKind, Family, compile};
///
/// let program = compile("option[60].text == 'PXE'", Family::V4, ExpressionKind::Bool).unwrap();
/// assert_eq!(program.tokens().len(), 3);
/// ```
pub fn compile(text: &str, family: Family, kind: ExpressionKind) -> Result<Program> {
    compile_with(text, family, kind, &STANDARD_OPTIONS)
}

/// Compiles `text`, resolving option names through `registry`.
pub fn compile_with(
    text: &str,
    family: Family,
    kind: ExpressionKind,
    registry: &OptionRegistry,
) -> Result<Program> {
    let lexemes = Lexer::new(text).tokenize()?;
    let context = Parser::new(lexemes, EvalContext::new(family, kind, registry)).parse()?;
    let tokens = context.into_program();

    debug!("Compiled {} expression into {} tokens: {}", family, tokens.len(), text);

    Ok(Program {
        family,
        kind,
        tokens,
    })
}

impl Program {
    pub fn family(&self) -> Family {
        self.family
    }

    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Runs the program against `packet` and returns the single value left
    /// on the stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] when `packet` is of another family or
    /// the stack does not end with exactly one value.
    pub fn evaluate(&self, packet: &Packet) -> Result<Value> {
        if packet.family() != self.family {
            return Err(Error::Evaluation(format!(
                "expression compiled for {} cannot evaluate a {} packet",
                self.family,
                packet.family()
            )));
        }

        let mut stack = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            token.evaluate(packet, &mut stack)?;
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(value), true) => Ok(value),
            (value, _) => Err(Error::Evaluation(format!(
                "expected exactly one value after evaluation, found {}",
                stack.len() + usize::from(value.is_some())
            ))),
        }
    }

    /// Evaluates a boolean expression.
    pub fn evaluate_bool(&self, packet: &Packet) -> Result<bool> {
        match self.evaluate(packet)? {
            Value::Bool(verdict) => Ok(verdict),
            other => Err(Error::Evaluation(format!(
                "expected a boolean result, got {}",
                other
            ))),
        }
    }

    /// Evaluates an expression to its byte form.
    pub fn evaluate_string(&self, packet: &Packet) -> Result<Vec<u8>> {
        self.evaluate(packet).map(Value::into_bytes)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, token) in self.tokens.iter().enumerate() {
            writeln!(f, "{:>3}: {}", index, token)?;
        }
        Ok(())
    }
}
