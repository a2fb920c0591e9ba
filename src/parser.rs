//! Recursive-descent parser for classification expressions.
//!
//! The parser walks the lexeme stream once and appends tokens to the
//! [`EvalContext`] as each construct completes, so operands always precede
//! their operator and no syntax tree is built.
//!
//! ```text
//! bool_expr   := unary { ("and" | "or") unary }
//! unary       := "not" unary | "(" bool_expr ")" | bool_operand | string_expr "==" string_expr
//! string_expr := literal | option | relay | pkt | vendor | substring | concat
//! ```

use std::net::IpAddr;

use crate::context::{EvalContext, ExpressionKind};
use crate::error::{Error, Location, Result};
use crate::lexer::{Lexeme, Terminal};
use crate::packet::Family;
use crate::token::{
    OptionRepr, Pkt4Field, Pkt6Field, PktMetadata, Relay6Field, Token, VendorClassMode,
    VendorMode,
};

/// Expected terminals listed in a syntax error before it degrades to the
/// bare "unexpected" form.
const MAX_EXPECTED: usize = 4;

/// Nesting limit for parentheses, `not`, `substring` and `concat`.
pub const MAX_DEPTH: usize = 128;

/// Terminals that can start an operand, in the order they are reported.
const OPERAND_START: &[Terminal] = &[
    Terminal::String,
    Terminal::HexString,
    Terminal::IpAddress,
    Terminal::Integer,
    Terminal::Option,
    Terminal::Relay4,
    Terminal::Relay6,
    Terminal::Pkt,
    Terminal::Pkt4,
    Terminal::Pkt6,
    Terminal::Substring,
    Terminal::Concat,
    Terminal::Vendor,
    Terminal::VendorClass,
];

/// What an operand left on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Bool,
    String,
}

pub struct Parser<'r> {
    lexemes: Vec<Lexeme>,
    position: usize,
    /// Terminals tried and rejected at the current position.
    expected: Vec<Terminal>,
    depth: usize,
    context: EvalContext<'r>,
}

impl<'r> Parser<'r> {
    /// `lexemes` must end with [`Terminal::EndOfFile`], as
    /// [`Lexer::tokenize`](crate::lexer::Lexer::tokenize) guarantees.
    pub fn new(lexemes: Vec<Lexeme>, context: EvalContext<'r>) -> Self {
        Self {
            lexemes,
            position: 0,
            expected: Vec::new(),
            depth: 0,
            context,
        }
    }

    /// Parses the whole input and returns the context holding the program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Syntax`] for text outside the grammar and
    /// [`Error::Semantic`] for constructs the context rejects. The first
    /// error ends parsing.
    pub fn parse(mut self) -> Result<EvalContext<'r>> {
        match self.context.kind() {
            ExpressionKind::Bool => self.bool_expr()?,
            ExpressionKind::String => self.string_expr()?,
        }
        self.expect(Terminal::EndOfFile)?;
        Ok(self.context)
    }

    /// The lexeme at the current position. The position never moves past
    /// the trailing end of file.
    fn current(&self) -> Lexeme {
        self.lexemes
            .get(self.position)
            .or_else(|| self.lexemes.last())
            .cloned()
            .unwrap_or_else(|| Lexeme {
                terminal: Terminal::EndOfFile,
                text: String::new(),
                location: Location::new(1, 1, 1),
            })
    }

    fn peek_terminal(&self) -> Terminal {
        self.lexemes
            .get(self.position)
            .map_or(Terminal::EndOfFile, |lexeme| lexeme.terminal)
    }

    fn check(&mut self, terminal: Terminal) -> bool {
        if self.peek_terminal() == terminal {
            return true;
        }
        if !self.expected.contains(&terminal) {
            self.expected.push(terminal);
        }
        false
    }

    fn bump(&mut self) -> Lexeme {
        let lexeme = self.current();
        if self.position + 1 < self.lexemes.len() {
            self.position += 1;
        }
        self.expected.clear();
        lexeme
    }

    fn accept(&mut self, terminal: Terminal) -> Option<Lexeme> {
        self.check(terminal).then(|| self.bump())
    }

    fn expect(&mut self, terminal: Terminal) -> Result<Lexeme> {
        match self.accept(terminal) {
            Some(lexeme) => Ok(lexeme),
            None => Err(self.syntax_error()),
        }
    }

    fn expect_one_of(&mut self, terminals: &[Terminal]) -> Result<Lexeme> {
        for terminal in terminals {
            if let Some(lexeme) = self.accept(*terminal) {
                return Ok(lexeme);
            }
        }
        Err(self.syntax_error())
    }

    fn syntax_error(&self) -> Error {
        let found = self.current();

        let message = if self.expected.is_empty() || self.expected.len() > MAX_EXPECTED {
            format!("syntax error, unexpected {}", found.terminal)
        } else {
            let expected: Vec<&str> = self.expected.iter().map(|t| t.name()).collect();
            format!(
                "syntax error, unexpected {}, expecting {}",
                found.terminal,
                expected.join(" or ")
            )
        };

        Error::Syntax {
            location: found.location,
            message,
        }
    }

    fn bool_expr(&mut self) -> Result<()> {
        self.unary()?;
        loop {
            let operator = if self.accept(Terminal::And).is_some() {
                Token::And
            } else if self.accept(Terminal::Or).is_some() {
                Token::Or
            } else {
                return Ok(());
            };
            self.unary()?;
            self.context.push(operator);
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth == MAX_DEPTH {
            return Err(Error::Syntax {
                location: self.current().location,
                message: format!("expression nested deeper than {} levels", MAX_DEPTH),
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unary(&mut self) -> Result<()> {
        self.nested(Self::unary_inner)
    }

    fn unary_inner(&mut self) -> Result<()> {
        if self.accept(Terminal::Not).is_some() {
            self.unary()?;
            self.context.push(Token::Not);
            return Ok(());
        }

        if self.accept(Terminal::LParen).is_some() {
            self.bool_expr()?;
            self.expect(Terminal::RParen)?;
            return Ok(());
        }

        if self.operand(true)? == Operand::String {
            self.expect(Terminal::Equal)?;
            self.string_expr()?;
            self.context.push(Token::Equal);
        }
        Ok(())
    }

    fn string_expr(&mut self) -> Result<()> {
        self.nested(|parser| parser.operand(false).map(|_| ()))
    }

    /// Parses one operand. Boolean forms (`exists`) are only accepted when
    /// `allow_bool` is set.
    fn operand(&mut self, allow_bool: bool) -> Result<Operand> {
        let terminal = self.peek_terminal();
        match terminal {
            Terminal::String => {
                let lexeme = self.bump();
                self.context.push(Token::String(lexeme.text.into_bytes()));
                Ok(Operand::String)
            }
            Terminal::HexString => {
                let lexeme = self.bump();
                self.context.push(Token::hex_string(&lexeme.text));
                Ok(Operand::String)
            }
            Terminal::IpAddress => {
                let lexeme = self.bump();
                let address: IpAddr = lexeme.text.parse().map_err(|_| Error::Semantic {
                    location: lexeme.location,
                    message: format!("Failed to convert {} to an IP address.", lexeme.text),
                })?;
                self.context.push(Token::ip_address(address));
                Ok(Operand::String)
            }
            Terminal::Integer => {
                let lexeme = self.bump();
                let number = EvalContext::convert_uint32(&lexeme.text, lexeme.location)?;
                self.context.push(Token::Integer(number));
                Ok(Operand::String)
            }
            Terminal::Option => self.option(allow_bool),
            Terminal::Relay4 => self.relay4(allow_bool),
            Terminal::Relay6 => self.relay6(allow_bool),
            Terminal::Pkt => self.pkt(),
            Terminal::Pkt4 => self.pkt4(),
            Terminal::Pkt6 => self.pkt6(),
            Terminal::Substring => self.substring(),
            Terminal::Concat => self.concat(),
            Terminal::Vendor => self.vendor(allow_bool),
            Terminal::VendorClass => self.vendor_class(allow_bool),
            _ => {
                for start in OPERAND_START {
                    self.check(*start);
                }
                Err(self.syntax_error())
            }
        }
    }

    /// `"[" option_code "]"` where the code is an integer or an option name.
    fn bracketed_option_code(&mut self) -> Result<u16> {
        self.expect(Terminal::LBracket)?;
        let lexeme = self.expect_one_of(&[Terminal::Integer, Terminal::OptionName])?;
        let code = match lexeme.terminal {
            Terminal::Integer => self
                .context
                .convert_option_code(&lexeme.text, lexeme.location)?,
            _ => self
                .context
                .convert_option_name(&lexeme.text, lexeme.location)?,
        };
        self.expect(Terminal::RBracket)?;
        Ok(code)
    }

    fn option_repr(&mut self, allow_bool: bool) -> Result<OptionRepr> {
        let choices: &[Terminal] = if allow_bool {
            &[Terminal::Text, Terminal::Hex, Terminal::Exists]
        } else {
            &[Terminal::Text, Terminal::Hex]
        };
        Ok(match self.expect_one_of(choices)?.terminal {
            Terminal::Exists => OptionRepr::Exists,
            Terminal::Hex => OptionRepr::Hex,
            _ => OptionRepr::Text,
        })
    }

    fn operand_kind(repr: OptionRepr) -> Operand {
        match repr {
            OptionRepr::Exists => Operand::Bool,
            OptionRepr::Text | OptionRepr::Hex => Operand::String,
        }
    }

    // option[code].text | .hex | .exists
    fn option(&mut self, allow_bool: bool) -> Result<Operand> {
        self.bump();
        let code = self.bracketed_option_code()?;
        self.expect(Terminal::Dot)?;
        let repr = self.option_repr(allow_bool)?;
        self.context.push(Token::Option { code, repr });
        Ok(Self::operand_kind(repr))
    }

    // relay4[code].text | .hex | .exists
    fn relay4(&mut self, allow_bool: bool) -> Result<Operand> {
        let keyword = self.bump();
        let code = self.bracketed_option_code()?;
        self.expect(Terminal::Dot)?;
        let repr = self.option_repr(allow_bool)?;
        self.context.require_family(Family::V4, &keyword)?;
        self.context.push(Token::Relay4Option { code, repr });
        Ok(Self::operand_kind(repr))
    }

    // relay6[level].option[code].repr | relay6[level].peeraddr | .linkaddr
    fn relay6(&mut self, allow_bool: bool) -> Result<Operand> {
        let keyword = self.bump();
        self.expect(Terminal::LBracket)?;
        let level = self.expect(Terminal::Integer)?;
        let nest_level = self.context.convert_nest_level(&level.text, level.location)?;
        self.expect(Terminal::RBracket)?;
        self.expect(Terminal::Dot)?;

        let selector =
            self.expect_one_of(&[Terminal::Option, Terminal::PeerAddr, Terminal::LinkAddr])?;
        let (token, operand) = match selector.terminal {
            Terminal::Option => {
                let code = self.bracketed_option_code()?;
                self.expect(Terminal::Dot)?;
                let repr = self.option_repr(allow_bool)?;
                (
                    Token::Relay6Option {
                        nest_level,
                        code,
                        repr,
                    },
                    Self::operand_kind(repr),
                )
            }
            Terminal::PeerAddr => (
                Token::Relay6Field {
                    nest_level,
                    field: Relay6Field::PeerAddr,
                },
                Operand::String,
            ),
            _ => (
                Token::Relay6Field {
                    nest_level,
                    field: Relay6Field::LinkAddr,
                },
                Operand::String,
            ),
        };

        self.context.require_family(Family::V6, &keyword)?;
        self.context.push(token);
        Ok(operand)
    }

    fn pkt(&mut self) -> Result<Operand> {
        self.bump();
        self.expect(Terminal::Dot)?;
        let field = match self
            .expect_one_of(&[Terminal::Iface, Terminal::Src, Terminal::Dst, Terminal::Len])?
            .terminal
        {
            Terminal::Iface => PktMetadata::Iface,
            Terminal::Src => PktMetadata::Src,
            Terminal::Dst => PktMetadata::Dst,
            _ => PktMetadata::Len,
        };
        self.context.push(Token::Pkt(field));
        Ok(Operand::String)
    }

    fn pkt4(&mut self) -> Result<Operand> {
        let keyword = self.bump();
        self.expect(Terminal::Dot)?;
        let field = match self
            .expect_one_of(&[
                Terminal::Mac,
                Terminal::Hlen,
                Terminal::Htype,
                Terminal::Ciaddr,
                Terminal::Giaddr,
                Terminal::Yiaddr,
                Terminal::Siaddr,
                Terminal::MsgType,
                Terminal::TransId,
            ])?
            .terminal
        {
            Terminal::Mac => Pkt4Field::Mac,
            Terminal::Hlen => Pkt4Field::Hlen,
            Terminal::Htype => Pkt4Field::Htype,
            Terminal::Ciaddr => Pkt4Field::Ciaddr,
            Terminal::Giaddr => Pkt4Field::Giaddr,
            Terminal::Yiaddr => Pkt4Field::Yiaddr,
            Terminal::Siaddr => Pkt4Field::Siaddr,
            Terminal::MsgType => Pkt4Field::MsgType,
            _ => Pkt4Field::TransId,
        };
        self.context.require_family(Family::V4, &keyword)?;
        self.context.push(Token::Pkt4(field));
        Ok(Operand::String)
    }

    fn pkt6(&mut self) -> Result<Operand> {
        let keyword = self.bump();
        self.expect(Terminal::Dot)?;
        let field = match self
            .expect_one_of(&[Terminal::MsgType, Terminal::TransId])?
            .terminal
        {
            Terminal::MsgType => Pkt6Field::MsgType,
            _ => Pkt6Field::TransId,
        };
        self.context.require_family(Family::V6, &keyword)?;
        self.context.push(Token::Pkt6(field));
        Ok(Operand::String)
    }

    // substring(string_expr, start, length | all)
    fn substring(&mut self) -> Result<Operand> {
        self.bump();
        self.expect(Terminal::LParen)?;
        self.string_expr()?;
        self.expect(Terminal::Comma)?;
        let start = self.expect(Terminal::Integer)?;
        self.context.push(Token::String(start.text.into_bytes()));
        self.expect(Terminal::Comma)?;
        let length = self.expect_one_of(&[Terminal::Integer, Terminal::All])?;
        self.context.push(Token::String(length.text.into_bytes()));
        self.expect(Terminal::RParen)?;
        self.context.push(Token::Substring);
        Ok(Operand::String)
    }

    // concat(string_expr, string_expr)
    fn concat(&mut self) -> Result<Operand> {
        self.bump();
        self.expect(Terminal::LParen)?;
        self.string_expr()?;
        self.expect(Terminal::Comma)?;
        self.string_expr()?;
        self.expect(Terminal::RParen)?;
        self.context.push(Token::Concat);
        Ok(Operand::String)
    }

    /// `"[" (INTEGER | "*" | ε) "]"`; `*` and an empty bracket mean any
    /// enterprise (0).
    fn bracketed_enterprise_id(&mut self) -> Result<u32> {
        let id = if let Some(lexeme) = self.accept(Terminal::Integer) {
            EvalContext::convert_uint32(&lexeme.text, lexeme.location)?
        } else {
            self.accept(Terminal::Star);
            0
        };
        self.expect(Terminal::RBracket)?;
        Ok(id)
    }

    /// `vendor.enterprise`, `vendor[id].exists`,
    /// `vendor[id].option[code].repr`, and `vendor[id].repr.option[code]`.
    fn vendor(&mut self, allow_bool: bool) -> Result<Operand> {
        self.bump();
        if self.expect_one_of(&[Terminal::Dot, Terminal::LBracket])?.terminal == Terminal::Dot {
            self.expect(Terminal::Enterprise)?;
            self.context.push(Token::Vendor {
                enterprise_id: 0,
                mode: VendorMode::EnterpriseId,
            });
            return Ok(Operand::String);
        }

        let enterprise_id = self.bracketed_enterprise_id()?;
        self.expect(Terminal::Dot)?;

        let choices: &[Terminal] = if allow_bool {
            &[Terminal::Option, Terminal::Exists, Terminal::Text, Terminal::Hex]
        } else {
            &[Terminal::Option, Terminal::Text, Terminal::Hex]
        };
        let selector = self.expect_one_of(choices)?;
        let (mode, operand) = match selector.terminal {
            Terminal::Exists => (VendorMode::Exists, Operand::Bool),
            Terminal::Option => {
                let code = self.bracketed_option_code()?;
                self.expect(Terminal::Dot)?;
                let repr = self.option_repr(allow_bool)?;
                (VendorMode::SubOption { code, repr }, Self::operand_kind(repr))
            }
            repr_first => {
                let repr = if repr_first == Terminal::Hex {
                    OptionRepr::Hex
                } else {
                    OptionRepr::Text
                };
                self.expect(Terminal::Dot)?;
                self.expect(Terminal::Option)?;
                let code = self.bracketed_option_code()?;
                (VendorMode::SubOption { code, repr }, Operand::String)
            }
        };

        self.context.push(Token::Vendor {
            enterprise_id,
            mode,
        });
        Ok(operand)
    }

    /// `vendor-class.enterprise`, `vendor-class[id].exists` and
    /// `vendor-class[id].data[index]` with the index defaulting to 0.
    fn vendor_class(&mut self, allow_bool: bool) -> Result<Operand> {
        self.bump();
        if self.expect_one_of(&[Terminal::Dot, Terminal::LBracket])?.terminal == Terminal::Dot {
            self.expect(Terminal::Enterprise)?;
            self.context.push(Token::VendorClass {
                enterprise_id: 0,
                mode: VendorClassMode::EnterpriseId,
            });
            return Ok(Operand::String);
        }

        let enterprise_id = self.bracketed_enterprise_id()?;
        self.expect(Terminal::Dot)?;

        let choices: &[Terminal] = if allow_bool {
            &[Terminal::Data, Terminal::Exists]
        } else {
            &[Terminal::Data]
        };
        let (mode, operand) = match self.expect_one_of(choices)?.terminal {
            Terminal::Exists => (VendorClassMode::Exists, Operand::Bool),
            _ => {
                let index = if self.accept(Terminal::LBracket).is_some() {
                    let lexeme = self.expect(Terminal::Integer)?;
                    let index = EvalContext::convert_uint8(&lexeme.text, lexeme.location)?;
                    self.expect(Terminal::RBracket)?;
                    index
                } else {
                    0
                };
                (VendorClassMode::Data(index), Operand::String)
            }
        };

        self.context.push(Token::VendorClass {
            enterprise_id,
            mode,
        });
        Ok(operand)
    }
}
