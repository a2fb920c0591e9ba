//! Lexer for classification expressions.
//!
//! Converts expression text into a flat [`Lexeme`] stream terminated by
//! [`Terminal::EndOfFile`]. Lexing stops at the first error.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Location, Result};

/// Terminal symbols of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    EndOfFile,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Equal,
    Star,
    Not,
    And,
    Or,
    Option,
    Relay4,
    Relay6,
    PeerAddr,
    LinkAddr,
    Text,
    Hex,
    Exists,
    Pkt,
    Iface,
    Src,
    Dst,
    Len,
    Pkt4,
    Mac,
    Hlen,
    Htype,
    Ciaddr,
    Giaddr,
    Yiaddr,
    Siaddr,
    Substring,
    All,
    Concat,
    Pkt6,
    MsgType,
    TransId,
    VendorClass,
    Vendor,
    Data,
    Enterprise,
    String,
    Integer,
    HexString,
    OptionName,
    IpAddress,
}

const KEYWORDS: &[(&str, Terminal)] = &[
    ("not", Terminal::Not),
    ("and", Terminal::And),
    ("or", Terminal::Or),
    ("option", Terminal::Option),
    ("relay4", Terminal::Relay4),
    ("relay6", Terminal::Relay6),
    ("peeraddr", Terminal::PeerAddr),
    ("linkaddr", Terminal::LinkAddr),
    ("text", Terminal::Text),
    ("hex", Terminal::Hex),
    ("exists", Terminal::Exists),
    ("pkt", Terminal::Pkt),
    ("iface", Terminal::Iface),
    ("src", Terminal::Src),
    ("dst", Terminal::Dst),
    ("len", Terminal::Len),
    ("pkt4", Terminal::Pkt4),
    ("mac", Terminal::Mac),
    ("hlen", Terminal::Hlen),
    ("htype", Terminal::Htype),
    ("ciaddr", Terminal::Ciaddr),
    ("giaddr", Terminal::Giaddr),
    ("yiaddr", Terminal::Yiaddr),
    ("siaddr", Terminal::Siaddr),
    ("substring", Terminal::Substring),
    ("all", Terminal::All),
    ("concat", Terminal::Concat),
    ("pkt6", Terminal::Pkt6),
    ("msgtype", Terminal::MsgType),
    ("transid", Terminal::TransId),
    ("vendor-class", Terminal::VendorClass),
    ("vendor", Terminal::Vendor),
    ("data", Terminal::Data),
    ("enterprise", Terminal::Enterprise),
];

impl Terminal {
    fn keyword(word: &str) -> Option<Self> {
        KEYWORDS
            .iter()
            .find_map(|(keyword, terminal)| (*keyword == word).then_some(*terminal))
    }

    /// Name used in syntax error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::EndOfFile => "end of file",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Dot => ".",
            Self::Comma => ",",
            Self::Equal => "==",
            Self::Star => "*",
            Self::String => "constant string",
            Self::Integer => "integer",
            Self::HexString => "constant hexstring",
            Self::OptionName => "option name",
            Self::IpAddress => "ip address",
            keyword => KEYWORDS
                .iter()
                .find_map(|(text, terminal)| (*terminal == keyword).then_some(*text))
                .unwrap_or("?"),
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A terminal with its source text and location.
///
/// `text` holds the literal's content: the characters between the quotes of
/// a string, the digits of an integer, the full `0x...` of a hex string,
/// the address text, or the option name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub terminal: Terminal,
    pub text: String,
    pub location: Location,
}

/// Lexer for classification expressions.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenizes the entire input.
    pub fn tokenize(mut self) -> Result<Vec<Lexeme>> {
        let mut lexemes = Vec::new();

        loop {
            self.skip_whitespace();

            if self.position >= self.input.len() {
                let at = Location::new(self.line, self.column, self.column);
                lexemes.push(Lexeme {
                    terminal: Terminal::EndOfFile,
                    text: String::new(),
                    location: at,
                });
                break;
            }

            lexemes.push(self.next_lexeme()?);
        }

        Ok(lexemes)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.advance();
        }
    }

    fn error(&self, begin: u32, message: impl Into<String>) -> Error {
        Error::Lex {
            location: Location::new(self.line, begin, self.column.saturating_sub(1).max(begin)),
            message: message.into(),
        }
    }

    fn lexeme(&self, terminal: Terminal, text: String, begin: u32) -> Lexeme {
        Lexeme {
            terminal,
            text,
            location: Location::new(self.line, begin, self.column - 1),
        }
    }

    fn next_lexeme(&mut self) -> Result<Lexeme> {
        let begin = self.column;
        let Some(ch) = self.peek() else {
            return Err(self.error(begin, "Unexpected end of input"));
        };

        let single = match ch {
            '(' => Some(Terminal::LParen),
            ')' => Some(Terminal::RParen),
            '[' => Some(Terminal::LBracket),
            ']' => Some(Terminal::RBracket),
            '.' => Some(Terminal::Dot),
            ',' => Some(Terminal::Comma),
            '*' => Some(Terminal::Star),
            _ => None,
        };
        if let Some(terminal) = single {
            self.advance();
            return Ok(self.lexeme(terminal, ch.to_string(), begin));
        }

        match ch {
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(self.lexeme(Terminal::Equal, "==".to_string(), begin))
                } else {
                    Err(self.error(begin, "Invalid character: ="))
                }
            }
            '\'' => self.string_literal(begin),
            '-' if self.peek_at(1).is_some_and(|next| next.is_ascii_digit()) => {
                self.advance();
                let digits = self.take_while(|c| c.is_ascii_digit());
                Ok(self.lexeme(Terminal::Integer, format!("-{}", digits), begin))
            }
            c if c.is_ascii_hexdigit() || c == ':' => {
                if let Some(address) = self.address_literal(begin)? {
                    return Ok(address);
                }
                if c.is_ascii_digit() {
                    self.number_literal(begin)
                } else {
                    Ok(self.identifier(begin))
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.identifier(begin)),
            other => {
                self.advance();
                Err(self.error(begin, format!("Invalid character: {}", other)))
            }
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        text
    }

    fn string_literal(&mut self, begin: u32) -> Result<Lexeme> {
        self.advance();
        let mut content = String::new();
        loop {
            match self.peek() {
                Some('\'') => {
                    self.advance();
                    return Ok(self.lexeme(Terminal::String, content, begin));
                }
                Some('\n') | None => return Err(self.error(begin, "Unterminated string")),
                Some(c) => {
                    content.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Recognizes `d.d.d.d` and any hex/colon/dot run containing a colon.
    ///
    /// Returns `Ok(None)` without consuming input when the text ahead is not
    /// shaped like an address.
    fn address_literal(&mut self, begin: u32) -> Result<Option<Lexeme>> {
        let run: String = self.input[self.position..]
            .iter()
            .take_while(|c| c.is_ascii_hexdigit() || **c == ':' || **c == '.')
            .collect();

        let is_v6 = run.contains(':');
        let is_v4 = !is_v6
            && run.split('.').count() == 4
            && run
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));

        if !is_v4 && !is_v6 {
            return Ok(None);
        }

        for _ in 0..run.chars().count() {
            self.advance();
        }

        let valid = if is_v4 {
            run.parse::<Ipv4Addr>().is_ok()
        } else {
            run.parse::<Ipv6Addr>().is_ok()
        };
        if !valid {
            return Err(self.error(
                begin,
                format!("Failed to convert {} to an IP address.", run),
            ));
        }

        Ok(Some(self.lexeme(Terminal::IpAddress, run, begin)))
    }

    fn number_literal(&mut self, begin: u32) -> Result<Lexeme> {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.advance();
            self.advance();
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(self.error(begin, "Invalid hex string: missing digits after 0x"));
            }
            return Ok(self.lexeme(Terminal::HexString, format!("0x{}", digits), begin));
        }

        let digits = self.take_while(|c| c.is_ascii_digit());
        Ok(self.lexeme(Terminal::Integer, digits, begin))
    }

    fn identifier(&mut self, begin: u32) -> Lexeme {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        let terminal = Terminal::keyword(&word).unwrap_or(Terminal::OptionName);
        self.lexeme(terminal, word, begin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminals(input: &str) -> Vec<Terminal> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|lexeme| lexeme.terminal)
            .collect()
    }

    #[test]
    fn test_option_expression() {
        assert_eq!(
            terminals("option[60].text == 'PXE'"),
            vec![
                Terminal::Option,
                Terminal::LBracket,
                Terminal::Integer,
                Terminal::RBracket,
                Terminal::Dot,
                Terminal::Text,
                Terminal::Equal,
                Terminal::String,
                Terminal::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_literal_text_and_locations() {
        let lexemes = Lexer::new("'PXE' == 0x0a").tokenize().unwrap();
        assert_eq!(lexemes[0].text, "PXE");
        assert_eq!(lexemes[0].location, Location::new(1, 1, 5));
        assert_eq!(lexemes[1].location, Location::new(1, 7, 8));
        assert_eq!(lexemes[2].terminal, Terminal::HexString);
        assert_eq!(lexemes[2].text, "0x0a");
        assert_eq!(lexemes[3].location, Location::new(1, 14, 14));
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            terminals("vendor-class vendor host-name dead"),
            vec![
                Terminal::VendorClass,
                Terminal::Vendor,
                Terminal::OptionName,
                Terminal::OptionName,
                Terminal::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_addresses() {
        let lexemes = Lexer::new("192.0.2.1 2001:db8::1 fe80::1").tokenize().unwrap();
        assert!(lexemes[..3].iter().all(|l| l.terminal == Terminal::IpAddress));
        assert_eq!(lexemes[1].text, "2001:db8::1");
    }

    #[test]
    fn test_integer_followed_by_dot() {
        assert_eq!(
            terminals("relay6[0].peeraddr"),
            vec![
                Terminal::Relay6,
                Terminal::LBracket,
                Terminal::Integer,
                Terminal::RBracket,
                Terminal::Dot,
                Terminal::PeerAddr,
                Terminal::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_negative_integer() {
        let lexemes = Lexer::new("-12").tokenize().unwrap();
        assert_eq!(lexemes[0].terminal, Terminal::Integer);
        assert_eq!(lexemes[0].text, "-12");
    }

    #[test]
    fn test_unterminated_string() {
        let error = Lexer::new("option[1].text == 'abc").tokenize().unwrap_err();
        assert!(matches!(error, Error::Lex { .. }));
        assert_eq!(error.location(), Some(Location::new(1, 19, 22)));
    }

    #[test]
    fn test_invalid_character() {
        let error = Lexer::new("option[1].text == @").tokenize().unwrap_err();
        assert_eq!(error.to_string(), "<string>:1.19: Invalid character: @");
    }

    #[test]
    fn test_invalid_address() {
        let error = Lexer::new("300.1.1.1").tokenize().unwrap_err();
        assert!(error.to_string().contains("Failed to convert 300.1.1.1"));
        assert!(Lexer::new("1:2:3").tokenize().is_err());
    }

    #[test]
    fn test_bare_hex_prefix() {
        assert!(Lexer::new("0x").tokenize().is_err());
    }

    #[test]
    fn test_terminal_names() {
        assert_eq!(Terminal::RBracket.name(), "]");
        assert_eq!(Terminal::VendorClass.name(), "vendor-class");
        assert_eq!(Terminal::EndOfFile.name(), "end of file");
        assert_eq!(Terminal::HexString.name(), "constant hexstring");
    }
}
