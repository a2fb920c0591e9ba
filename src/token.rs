//! Program instructions and their stack semantics.
//!
//! A compiled expression is a sequence of [`Token`]s in Reverse-Polish
//! order. Each token pops its operands from the evaluation stack and pushes
//! at most one [`Value`]. Data missing from the packet is never an error:
//! lookups push an empty string or `false`. Only a stack that does not hold
//! what a token needs produces [`Error::Evaluation`].

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use tracing::debug;

use crate::error::{Error, Result};
use crate::options::{
    OptionCode, enterprise_blocks, find_suboption, tuples, vendor_class_code, vendor_opts_code,
};
use crate::packet::{Family, Packet};

/// A runtime value on the evaluation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    String(Vec<u8>),
}

impl Value {
    /// Wire form of the value. Booleans are the one-byte strings `"\0"` and `"\1"`.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bool(false) => &[0],
            Self::Bool(true) => &[1],
            Self::String(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::String(bytes) => bytes,
            other => other.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::String(bytes) => fmt_bytes(bytes, f),
        }
    }
}

/// Quoted text when printable, otherwise `0x` followed by hex digits.
fn fmt_bytes(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if bytes.iter().all(|byte| byte.is_ascii_graphic() || *byte == b' ') {
        write!(f, "'{}'", String::from_utf8_lossy(bytes))
    } else {
        write!(f, "0x")?;
        for byte in bytes {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// How an option lookup reports its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionRepr {
    /// Push whether the option is present.
    Exists,
    /// Push the payload as text.
    Text,
    /// Push the payload as raw bytes.
    Hex,
}

impl OptionRepr {
    fn name(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Text => "text",
            Self::Hex => "hex",
        }
    }

    /// Value pushed when the option is absent.
    fn missing(self) -> Value {
        match self {
            Self::Exists => Value::Bool(false),
            Self::Text | Self::Hex => Value::String(Vec::new()),
        }
    }

    fn found(self, payload: &[u8]) -> Value {
        match self {
            Self::Exists => Value::Bool(true),
            Self::Text | Self::Hex => Value::String(payload.to_vec()),
        }
    }

    fn lookup(self, payload: Option<&[u8]>) -> Value {
        payload.map_or_else(|| self.missing(), |payload| self.found(payload))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PktMetadata {
    Iface,
    Src,
    Dst,
    Len,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pkt4Field {
    Mac,
    Hlen,
    Htype,
    Ciaddr,
    Giaddr,
    Yiaddr,
    Siaddr,
    MsgType,
    TransId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pkt6Field {
    MsgType,
    TransId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay6Field {
    PeerAddr,
    LinkAddr,
}

/// What a vendor-specific information lookup produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorMode {
    Exists,
    EnterpriseId,
    SubOption { code: u16, repr: OptionRepr },
}

/// What a vendor class lookup produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorClassMode {
    Exists,
    EnterpriseId,
    /// Tuple at the given index of the class data.
    Data(u8),
}

/// One instruction of a compiled expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Not,
    And,
    Or,
    Equal,
    String(Vec<u8>),
    HexString(Vec<u8>),
    IpAddress(Vec<u8>),
    Integer(u32),
    Pkt(PktMetadata),
    Pkt4(Pkt4Field),
    Pkt6(Pkt6Field),
    Option {
        code: u16,
        repr: OptionRepr,
    },
    Relay4Option {
        code: u16,
        repr: OptionRepr,
    },
    Relay6Option {
        nest_level: u8,
        code: u16,
        repr: OptionRepr,
    },
    Relay6Field {
        nest_level: u8,
        field: Relay6Field,
    },
    Vendor {
        enterprise_id: u32,
        mode: VendorMode,
    },
    VendorClass {
        enterprise_id: u32,
        mode: VendorClassMode,
    },
    Substring,
    Concat,
}

impl Token {
    /// Builds a hex string literal from `0x...` text.
    ///
    /// An odd number of digits is read as if it had a leading zero. Text
    /// that is not a hex literal yields an empty string.
    pub fn hex_string(text: &str) -> Self {
        let digits = match text.get(..2) {
            Some("0x" | "0X") => &text[2..],
            _ => return Self::HexString(Vec::new()),
        };

        let padded = if !digits.len().is_multiple_of(2) {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };

        let decoded: Option<Vec<u8>> = padded
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            })
            .collect();

        Self::HexString(decoded.unwrap_or_default())
    }

    /// Builds an address literal holding 4 or 16 network-order bytes.
    pub fn ip_address(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(v4) => Self::IpAddress(v4.octets().to_vec()),
            IpAddr::V6(v6) => Self::IpAddress(v6.octets().to_vec()),
        }
    }

    /// Executes this token against `packet`, updating `stack`.
    pub fn evaluate(&self, packet: &Packet, stack: &mut Vec<Value>) -> Result<()> {
        let value = match self {
            Self::Not => {
                let operand = pop_bool(stack, self)?;
                Value::Bool(!operand)
            }
            Self::And => {
                let right = pop_bool(stack, self)?;
                let left = pop_bool(stack, self)?;
                Value::Bool(left && right)
            }
            Self::Or => {
                let right = pop_bool(stack, self)?;
                let left = pop_bool(stack, self)?;
                Value::Bool(left || right)
            }
            Self::Equal => {
                let right = pop(stack, self)?;
                let left = pop(stack, self)?;
                Value::Bool(left.as_bytes() == right.as_bytes())
            }
            Self::String(bytes) | Self::HexString(bytes) | Self::IpAddress(bytes) => {
                Value::String(bytes.clone())
            }
            Self::Integer(number) => Value::String(number.to_be_bytes().to_vec()),
            Self::Pkt(field) => Self::pkt_metadata(*field, packet),
            Self::Pkt4(field) => self.pkt4_field(*field, packet)?,
            Self::Pkt6(field) => self.pkt6_field(*field, packet)?,
            Self::Option { code, repr } => repr.lookup(packet.find_option(*code)),
            Self::Relay4Option { code, repr } => {
                if packet.family() != Family::V4 {
                    return Err(self.family_mismatch(packet));
                }
                let suboption = packet
                    .find_option(OptionCode::RelayAgentInfo as u16)
                    .and_then(|info| find_suboption(info, *code, Family::V4));
                repr.lookup(suboption)
            }
            Self::Relay6Option {
                nest_level,
                code,
                repr,
            } => {
                if packet.family() != Family::V6 {
                    return Err(self.family_mismatch(packet));
                }
                let option = packet
                    .relay_at(*nest_level)
                    .and_then(|relay| relay.find_option(*code));
                repr.lookup(option)
            }
            Self::Relay6Field { nest_level, field } => {
                if packet.family() != Family::V6 {
                    return Err(self.family_mismatch(packet));
                }
                let address = packet.relay_at(*nest_level).map(|relay| match field {
                    Relay6Field::PeerAddr => relay.peer_addr,
                    Relay6Field::LinkAddr => relay.link_addr,
                });
                Value::String(address.map(|a: Ipv6Addr| a.octets().to_vec()).unwrap_or_default())
            }
            Self::Vendor {
                enterprise_id,
                mode,
            } => Self::vendor(*enterprise_id, *mode, packet),
            Self::VendorClass {
                enterprise_id,
                mode,
            } => Self::vendor_class(*enterprise_id, *mode, packet),
            Self::Substring => self.substring(stack)?,
            Self::Concat => {
                let right = pop(stack, self)?;
                let mut left = pop(stack, self)?.into_bytes();
                left.extend_from_slice(right.as_bytes());
                Value::String(left)
            }
        };

        debug!("{}: pushing {}", self, value);
        stack.push(value);
        Ok(())
    }

    fn family_mismatch(&self, packet: &Packet) -> Error {
        Error::Evaluation(format!(
            "{} evaluated against a {} packet",
            self,
            packet.family()
        ))
    }

    fn pkt_metadata(field: PktMetadata, packet: &Packet) -> Value {
        let metadata = packet.metadata();
        let address = |address: IpAddr| match address {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        Value::String(match field {
            PktMetadata::Iface => metadata.iface.as_bytes().to_vec(),
            PktMetadata::Src => address(metadata.src),
            PktMetadata::Dst => address(metadata.dst),
            PktMetadata::Len => metadata.len.to_be_bytes().to_vec(),
        })
    }

    fn pkt4_field(&self, field: Pkt4Field, packet: &Packet) -> Result<Value> {
        let Packet::V4(pkt) = packet else {
            return Err(self.family_mismatch(packet));
        };
        Ok(Value::String(match field {
            Pkt4Field::Mac => pkt.chaddr_bytes().to_vec(),
            Pkt4Field::Hlen => vec![pkt.hlen],
            Pkt4Field::Htype => vec![pkt.htype],
            Pkt4Field::Ciaddr => pkt.ciaddr.octets().to_vec(),
            Pkt4Field::Giaddr => pkt.giaddr.octets().to_vec(),
            Pkt4Field::Yiaddr => pkt.yiaddr.octets().to_vec(),
            Pkt4Field::Siaddr => pkt.siaddr.octets().to_vec(),
            Pkt4Field::MsgType => pkt.message_type().map(|t| vec![t]).unwrap_or_default(),
            Pkt4Field::TransId => pkt.xid.to_be_bytes().to_vec(),
        }))
    }

    fn pkt6_field(&self, field: Pkt6Field, packet: &Packet) -> Result<Value> {
        let Packet::V6(pkt) = packet else {
            return Err(self.family_mismatch(packet));
        };
        Ok(Value::String(match field {
            Pkt6Field::MsgType => vec![pkt.msg_type],
            Pkt6Field::TransId => pkt.transid.to_be_bytes()[1..].to_vec(),
        }))
    }

    fn vendor(enterprise_id: u32, mode: VendorMode, packet: &Packet) -> Value {
        let failure = match mode {
            VendorMode::Exists => Value::Bool(false),
            VendorMode::EnterpriseId => Value::String(Vec::new()),
            VendorMode::SubOption { repr, .. } => repr.missing(),
        };

        let family = packet.family();
        let Some(payload) = packet.find_option(vendor_opts_code(family)) else {
            return failure;
        };
        let blocks = enterprise_blocks(payload, family);

        if mode == VendorMode::EnterpriseId {
            return blocks
                .first()
                .map(|block| Value::String(block.enterprise_id.to_be_bytes().to_vec()))
                .unwrap_or(failure);
        }

        let block = if enterprise_id == 0 {
            blocks.first()
        } else {
            blocks.iter().find(|block| block.enterprise_id == enterprise_id)
        };
        let Some(block) = block else {
            return failure;
        };

        match mode {
            VendorMode::SubOption { code, repr } => {
                repr.lookup(find_suboption(block.data, code, family))
            }
            _ => Value::Bool(true),
        }
    }

    fn vendor_class(enterprise_id: u32, mode: VendorClassMode, packet: &Packet) -> Value {
        let failure = match mode {
            VendorClassMode::Exists => Value::Bool(false),
            _ => Value::String(Vec::new()),
        };

        let family = packet.family();
        let Some(payload) = packet.find_option(vendor_class_code(family)) else {
            return failure;
        };
        let blocks = enterprise_blocks(payload, family);

        if mode == VendorClassMode::EnterpriseId {
            return blocks
                .first()
                .map(|block| Value::String(block.enterprise_id.to_be_bytes().to_vec()))
                .unwrap_or(failure);
        }

        let block = if enterprise_id == 0 {
            blocks.first()
        } else {
            blocks.iter().find(|block| block.enterprise_id == enterprise_id)
        };
        let Some(block) = block else {
            return failure;
        };

        match mode {
            VendorClassMode::Data(index) => Value::String(
                tuples(block.data, family)
                    .get(index as usize)
                    .map(|tuple| tuple.to_vec())
                    .unwrap_or_default(),
            ),
            _ => Value::Bool(true),
        }
    }

    /// Pops length, start and source; pushes the selected bytes.
    ///
    /// A negative start counts from the end and is clamped at 0. A negative
    /// length selects the bytes before start. The end is clamped to the
    /// source length, so the result is always defined.
    fn substring(&self, stack: &mut Vec<Value>) -> Result<Value> {
        let length = pop(stack, self)?;
        let start = pop(stack, self)?;
        let source = pop(stack, self)?.into_bytes();

        if source.is_empty() {
            return Ok(Value::String(Vec::new()));
        }

        let size = source.len() as i64;
        let start = parse_offset(start.as_bytes()).ok_or_else(|| {
            Error::Evaluation(format!(
                "the starting position {} of the substring is not an integer",
                start
            ))
        })?;
        let length = if length.as_bytes() == b"all" {
            size
        } else {
            parse_offset(length.as_bytes()).ok_or_else(|| {
                Error::Evaluation(format!(
                    "the length {} of the substring is neither an integer nor 'all'",
                    length
                ))
            })?
        };

        let start = if start < 0 {
            size.saturating_add(start).max(0)
        } else {
            start
        };
        if start >= size {
            return Ok(Value::String(Vec::new()));
        }

        let (begin, end) = if length < 0 {
            let before = length.saturating_neg().min(start);
            (start - before, start)
        } else {
            (start, start.saturating_add(length).min(size))
        };

        Ok(Value::String(source[begin as usize..end as usize].to_vec()))
    }
}

/// Parses optionally signed decimal text, saturating on overflow.
fn parse_offset(text: &[u8]) -> Option<i64> {
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let magnitude = digits.iter().fold(0i64, |acc, digit| {
        acc.saturating_mul(10).saturating_add((digit - b'0') as i64)
    });
    Some(if negative { -magnitude } else { magnitude })
}

fn pop(stack: &mut Vec<Value>, token: &Token) -> Result<Value> {
    stack.pop().ok_or_else(|| {
        Error::Evaluation(format!("{} requires more values than the stack holds", token))
    })
}

fn pop_bool(stack: &mut Vec<Value>, token: &Token) -> Result<bool> {
    match pop(stack, token)? {
        Value::Bool(value) => Ok(value),
        other => Err(Error::Evaluation(format!(
            "{} requires a boolean operand, got {}",
            token, other
        ))),
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Not => write!(f, "not"),
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::Equal => write!(f, "=="),
            Self::String(bytes) => {
                write!(f, "string ")?;
                fmt_bytes(bytes, f)
            }
            Self::HexString(bytes) => {
                write!(f, "hexstring ")?;
                fmt_bytes(bytes, f)
            }
            Self::IpAddress(bytes) => {
                write!(f, "ipaddress ")?;
                fmt_bytes(bytes, f)
            }
            Self::Integer(number) => write!(f, "integer {}", number),
            Self::Pkt(field) => write!(f, "pkt.{}", format!("{:?}", field).to_lowercase()),
            Self::Pkt4(field) => write!(f, "pkt4.{}", format!("{:?}", field).to_lowercase()),
            Self::Pkt6(field) => write!(f, "pkt6.{}", format!("{:?}", field).to_lowercase()),
            Self::Option { code, repr } => write!(f, "option[{}].{}", code, repr.name()),
            Self::Relay4Option { code, repr } => write!(f, "relay4[{}].{}", code, repr.name()),
            Self::Relay6Option {
                nest_level,
                code,
                repr,
            } => write!(f, "relay6[{}].option[{}].{}", nest_level, code, repr.name()),
            Self::Relay6Field { nest_level, field } => write!(
                f,
                "relay6[{}].{}",
                nest_level,
                format!("{:?}", field).to_lowercase()
            ),
            Self::Vendor {
                enterprise_id,
                mode,
            } => match mode {
                VendorMode::Exists => write!(f, "vendor[{}].exists", enterprise_id),
                VendorMode::EnterpriseId => write!(f, "vendor.enterprise"),
                VendorMode::SubOption { code, repr } => write!(
                    f,
                    "vendor[{}].option[{}].{}",
                    enterprise_id,
                    code,
                    repr.name()
                ),
            },
            Self::VendorClass {
                enterprise_id,
                mode,
            } => match mode {
                VendorClassMode::Exists => write!(f, "vendor-class[{}].exists", enterprise_id),
                VendorClassMode::EnterpriseId => write!(f, "vendor-class.enterprise"),
                VendorClassMode::Data(index) => {
                    write!(f, "vendor-class[{}].data[{}]", enterprise_id, index)
                }
            },
            Self::Substring => write!(f, "substring"),
            Self::Concat => write!(f, "concat"),
        }
    }
}
