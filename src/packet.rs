//! Decoded DHCP packets as seen by the evaluator.
//!
//! The evaluator only reads packets. This module provides the [`Packet`]
//! view it consumes and a DHCPv4 decoder ([`Pkt4`]); DHCPv6 lives in
//! [`packet6`](crate::packet6).
//!
//! # DHCPv4 Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                          options (variable)                   |
//! +---------------------------------------------------------------+
//! ```
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::options::{OptionCode, OverloadFlag};
use crate::packet6::{Pkt6, RelayLayer};

/// DHCP magic cookie that identifies DHCP packets (vs BOOTP).
const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const DHCP_CHADDR_OFFSET: usize = 28;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_SIZE: usize = 128;

const DHCP_SNAME_OFFSET: usize = DHCP_CHADDR_OFFSET + DHCP_CHADDR_SIZE;
const DHCP_FILE_OFFSET: usize = DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE;
const DHCP_MAGIC_COOKIE_OFFSET: usize = DHCP_FILE_OFFSET + DHCP_FILE_SIZE;

/// Size of the fixed header portion including magic cookie.
const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// Hardware type for Ethernet (most common).
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// Protocol family of a packet, and of the expressions compiled for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    V4,
    V6,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "DHCPv4"),
            Self::V6 => write!(f, "DHCPv6"),
        }
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "v4" | "4" | "dhcp4" | "dhcpv4" => Ok(Self::V4),
            "v6" | "6" | "dhcp6" | "dhcpv6" => Ok(Self::V6),
            other => Err(format!("unknown protocol family '{}'", other)),
        }
    }
}

/// Reception metadata attached to a packet by the receive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Name of the interface the packet arrived on.
    pub iface: String,
    /// Source address from the IP header.
    pub src: IpAddr,
    /// Destination address from the IP header.
    pub dst: IpAddr,
    /// Total length of the DHCP message in bytes.
    pub len: u32,
}

impl Metadata {
    pub fn new(iface: impl Into<String>, src: IpAddr, dst: IpAddr) -> Self {
        Self {
            iface: iface.into(),
            src,
            dst,
            len: 0,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new("", IpAddr::V4(Ipv4Addr::UNSPECIFIED), IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

/// A top-level option with its raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl RawOption {
    pub fn new(code: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }
}

/// Returns the payload of the first option with `code`.
pub(crate) fn find_in(options: &[RawOption], code: u16) -> Option<&[u8]> {
    options
        .iter()
        .find(|option| option.code == code)
        .map(|option| option.data.as_slice())
}

/// A decoded DHCPv4 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkt4 {
    /// Operation code: [`BOOTREQUEST`] (1) or BOOTREPLY (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    /// Client IP address (set by client in RENEWING/REBINDING states).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Server IP address (next server in BOOTP, or DHCP server).
    pub siaddr: Ipv4Addr,

    /// Gateway IP address - set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address (MAC for Ethernet).
    pub chaddr: [u8; 16],

    /// Options in wire order, including any carried in sname/file.
    pub options: Vec<RawOption>,

    pub metadata: Metadata,
}

impl Default for Pkt4 {
    fn default() -> Self {
        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0u8; 16],
            options: Vec::new(),
            metadata: Metadata::default(),
        }
    }
}

impl Pkt4 {
    /// Decodes a DHCPv4 packet from raw bytes.
    ///
    /// `metadata.len` is overwritten with the length of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if:
    /// - Packet is shorter than 240 bytes (fixed header + magic cookie)
    /// - Magic cookie is invalid (not 99.130.83.99)
    /// - Hardware length exceeds the 16-byte chaddr field
    /// - Options are malformed (truncated length or data)
    pub fn parse(data: &[u8], mut metadata: Metadata) -> Result<Self> {
        if data.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                DHCP_FIXED_HEADER_SIZE
            )));
        }

        if data[DHCP_MAGIC_COOKIE_OFFSET..DHCP_FIXED_HEADER_SIZE] != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("Invalid magic cookie".to_string()));
        }

        let hlen = data[2];
        if hlen as usize > DHCP_CHADDR_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Invalid hlen {} (maximum {})",
                hlen, DHCP_CHADDR_SIZE
            )));
        }

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[DHCP_CHADDR_OFFSET..DHCP_SNAME_OFFSET]);

        let mut options = Self::parse_options(&data[DHCP_FIXED_HEADER_SIZE..])?;

        let overload = find_in(&options, OptionCode::OptionOverload as u16)
            .and_then(|value| value.first().copied())
            .and_then(|flag| OverloadFlag::try_from(flag).ok());

        if let Some(flag) = overload {
            if matches!(flag, OverloadFlag::File | OverloadFlag::Both) {
                let file = &data[DHCP_FILE_OFFSET..DHCP_FILE_OFFSET + DHCP_FILE_SIZE];
                options.extend(Self::parse_options(file)?);
            }
            if matches!(flag, OverloadFlag::Sname | OverloadFlag::Both) {
                let sname = &data[DHCP_SNAME_OFFSET..DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE];
                options.extend(Self::parse_options(sname)?);
            }
        }

        metadata.len = data.len() as u32;

        Ok(Self {
            op: data[0],
            htype: data[1],
            hlen,
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr,
            options,
            metadata,
        })
    }

    fn parse_options(data: &[u8]) -> Result<Vec<RawOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::InvalidPacket("Option length missing".to_string()));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::InvalidPacket("Option data truncated".to_string()));
            }

            options.push(RawOption::new(
                code as u16,
                &data[index + 2..index + 2 + length],
            ));

            index += 2 + length;
        }

        Ok(options)
    }

    /// Returns the DHCP message type (Option 53) if present.
    ///
    /// Returns `None` for BOOTP packets which don't have this option.
    pub fn message_type(&self) -> Option<u8> {
        find_in(&self.options, OptionCode::MessageType as u16)
            .and_then(|value| value.first().copied())
    }

    /// Returns the client hardware address bytes (respecting hlen).
    pub fn chaddr_bytes(&self) -> &[u8] {
        &self.chaddr[..(self.hlen as usize).min(self.chaddr.len())]
    }
}

/// A decoded packet of either family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    V4(Pkt4),
    V6(Pkt6),
}

impl Packet {
    pub fn family(&self) -> Family {
        match self {
            Self::V4(_) => Family::V4,
            Self::V6(_) => Family::V6,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::V4(pkt) => &pkt.metadata,
            Self::V6(pkt) => &pkt.metadata,
        }
    }

    /// Looks up a top-level option by code.
    ///
    /// For relayed DHCPv6 packets this is the client's own message, not a
    /// relay layer.
    pub fn find_option(&self, code: u16) -> Option<&[u8]> {
        match self {
            Self::V4(pkt) => find_in(&pkt.options, code),
            Self::V6(pkt) => find_in(&pkt.options, code),
        }
    }

    /// Returns the DHCPv6 relay layer at `level` (0 = nearest the client).
    pub fn relay_at(&self, level: u8) -> Option<&RelayLayer> {
        match self {
            Self::V4(_) => None,
            Self::V6(pkt) => pkt.relays.get(level as usize),
        }
    }
}

impl From<Pkt4> for Packet {
    fn from(pkt: Pkt4) -> Self {
        Self::V4(pkt)
    }
}

impl From<Pkt6> for Packet {
    fn from(pkt: Pkt6) -> Self {
        Self::V6(pkt)
    }
}
