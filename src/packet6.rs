//! DHCPv6 packet decoding per RFC 8415.
//!
//! Client/server messages carry a 1-byte message type, a 3-byte transaction
//! id and options with 2-byte codes and lengths. Relay agents wrap a message
//! in RELAY-FORW (or RELAY-REPL) whose Relay Message option holds the inner
//! message:
//!
//! ```text
//! +---------------+---------------+
//! | msg-type (1)  | hop-count (1) |
//! +---------------+---------------+-------------------------------+
//! |                       link-address (16)                       |
//! +---------------------------------------------------------------+
//! |                       peer-address (16)                       |
//! +---------------------------------------------------------------+
//! |              options (variable, includes relay-msg)           |
//! +---------------------------------------------------------------+
//! ```
//!
//! Decoding unwraps every layer. The resulting [`Pkt6`] holds the client's
//! message plus the relay layers ordered from the one nearest the client
//! (level 0) outwards.

use std::net::Ipv6Addr;

use crate::error::{Error, Result};
use crate::options::Option6Code;
use crate::packet::{Metadata, RawOption, find_in};

/// RELAY-FORW message type.
pub const RELAY_FORW: u8 = 12;

/// RELAY-REPL message type.
pub const RELAY_REPL: u8 = 13;

/// Maximum relay nesting accepted, per RFC 8415 §7.6 HOP_COUNT_LIMIT.
pub const MAX_RELAY_HOPS: usize = 32;

const CLIENT_HEADER_SIZE: usize = 4;
const RELAY_HEADER_SIZE: usize = 34;
const OPTION_HEADER_SIZE: usize = 4;

/// One relay encapsulation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLayer {
    pub msg_type: u8,
    pub hop_count: u8,
    pub link_addr: Ipv6Addr,
    pub peer_addr: Ipv6Addr,
    /// Options the relay added, including the Relay Message option.
    pub options: Vec<RawOption>,
}

impl RelayLayer {
    pub fn find_option(&self, code: u16) -> Option<&[u8]> {
        find_in(&self.options, code)
    }
}

/// A decoded DHCPv6 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkt6 {
    pub msg_type: u8,
    /// 24-bit transaction id.
    pub transid: u32,
    pub options: Vec<RawOption>,
    /// Relay layers, index 0 nearest the client.
    pub relays: Vec<RelayLayer>,
    pub metadata: Metadata,
}

impl Pkt6 {
    /// Creates an unrelayed message with no options.
    pub fn new(msg_type: u8, transid: u32, metadata: Metadata) -> Self {
        Self {
            msg_type,
            transid: transid & 0x00ff_ffff,
            options: Vec::new(),
            relays: Vec::new(),
            metadata,
        }
    }

    /// Decodes a DHCPv6 message, unwrapping relay layers.
    ///
    /// `metadata.len` is overwritten with the length of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if a header or option is truncated,
    /// a relay message lacks the Relay Message option, or the nesting exceeds
    /// [`MAX_RELAY_HOPS`].
    pub fn parse(data: &[u8], mut metadata: Metadata) -> Result<Self> {
        metadata.len = data.len() as u32;

        let mut outermost_first = Vec::new();
        let mut message = data;

        while let Some(&msg_type) = message.first() {
            if msg_type != RELAY_FORW && msg_type != RELAY_REPL {
                break;
            }
            if outermost_first.len() == MAX_RELAY_HOPS {
                return Err(Error::InvalidPacket(format!(
                    "Relay nesting exceeds {} levels",
                    MAX_RELAY_HOPS
                )));
            }
            if message.len() < RELAY_HEADER_SIZE {
                return Err(Error::InvalidPacket(format!(
                    "Relay header too short: {} bytes (minimum {})",
                    message.len(),
                    RELAY_HEADER_SIZE
                )));
            }

            let link_addr = Self::read_addr(&message[2..18]);
            let peer_addr = Self::read_addr(&message[18..34]);
            let options = Self::parse_options(&message[RELAY_HEADER_SIZE..])?;
            let (start, end) = Self::relay_msg_range(&message[RELAY_HEADER_SIZE..])
                .ok_or_else(|| {
                    Error::InvalidPacket("Relay message option missing".to_string())
                })?;

            outermost_first.push(RelayLayer {
                msg_type,
                hop_count: message[1],
                link_addr,
                peer_addr,
                options,
            });

            message = &message[RELAY_HEADER_SIZE + start..RELAY_HEADER_SIZE + end];
        }

        if message.len() < CLIENT_HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Message too short: {} bytes (minimum {})",
                message.len(),
                CLIENT_HEADER_SIZE
            )));
        }

        let transid = u32::from_be_bytes([0, message[1], message[2], message[3]]);
        let options = Self::parse_options(&message[CLIENT_HEADER_SIZE..])?;

        outermost_first.reverse();

        Ok(Self {
            msg_type: message[0],
            transid,
            options,
            relays: outermost_first,
            metadata,
        })
    }

    fn read_addr(bytes: &[u8]) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(bytes);
        Ipv6Addr::from(octets)
    }

    fn parse_options(data: &[u8]) -> Result<Vec<RawOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            if index + OPTION_HEADER_SIZE > data.len() {
                return Err(Error::InvalidPacket("Option header truncated".to_string()));
            }

            let code = u16::from_be_bytes([data[index], data[index + 1]]);
            let length = u16::from_be_bytes([data[index + 2], data[index + 3]]) as usize;
            let start = index + OPTION_HEADER_SIZE;

            if start + length > data.len() {
                return Err(Error::InvalidPacket("Option data truncated".to_string()));
            }

            options.push(RawOption::new(code, &data[start..start + length]));
            index = start + length;
        }

        Ok(options)
    }

    /// Byte range of the Relay Message payload within relay options.
    fn relay_msg_range(data: &[u8]) -> Option<(usize, usize)> {
        let mut index = 0;
        while index + OPTION_HEADER_SIZE <= data.len() {
            let code = u16::from_be_bytes([data[index], data[index + 1]]);
            let length = u16::from_be_bytes([data[index + 2], data[index + 3]]) as usize;
            let start = index + OPTION_HEADER_SIZE;
            if code == Option6Code::RelayMsg as u16 {
                return Some((start, start + length));
            }
            index = start + length;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(code: u16, data: &[u8]) -> Vec<u8> {
        let mut encoded = code.to_be_bytes().to_vec();
        encoded.extend_from_slice(&(data.len() as u16).to_be_bytes());
        encoded.extend_from_slice(data);
        encoded
    }

    fn relay(link: Ipv6Addr, peer: Ipv6Addr, inner: &[u8], extra: &[u8]) -> Vec<u8> {
        let mut message = vec![RELAY_FORW, 0];
        message.extend_from_slice(&link.octets());
        message.extend_from_slice(&peer.octets());
        message.extend_from_slice(extra);
        message.extend_from_slice(&option(Option6Code::RelayMsg as u16, inner));
        message
    }

    fn solicit() -> Vec<u8> {
        let mut message = vec![1, 0xab, 0xcd, 0xef];
        message.extend_from_slice(&option(1, &[0, 1, 0, 1]));
        message
    }

    #[test]
    fn test_parse_client_message() {
        let packet = Pkt6::parse(&solicit(), Metadata::default()).unwrap();
        assert_eq!(packet.msg_type, 1);
        assert_eq!(packet.transid, 0xabcdef);
        assert_eq!(find_in(&packet.options, 1), Some(&[0, 1, 0, 1][..]));
        assert!(packet.relays.is_empty());
        assert_eq!(packet.metadata.len, 12);
    }

    #[test]
    fn test_parse_nested_relays_innermost_first() {
        let inner_link: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let outer_link: Ipv6Addr = "2001:db8::2".parse().unwrap();
        let peer: Ipv6Addr = "fe80::1".parse().unwrap();

        let first = relay(inner_link, peer, &solicit(), &option(18, b"eth0"));
        let second = relay(outer_link, peer, &first, &option(37, b"remote"));

        let packet = Pkt6::parse(&second, Metadata::default()).unwrap();
        assert_eq!(packet.msg_type, 1);
        assert_eq!(packet.relays.len(), 2);
        assert_eq!(packet.relays[0].link_addr, inner_link);
        assert_eq!(packet.relays[0].find_option(18), Some(&b"eth0"[..]));
        assert_eq!(packet.relays[1].link_addr, outer_link);
        assert_eq!(packet.relays[1].find_option(37), Some(&b"remote"[..]));
    }

    #[test]
    fn test_relay_without_relay_msg() {
        let mut message = vec![RELAY_FORW, 0];
        message.extend_from_slice(&[0u8; 32]);
        message.extend_from_slice(&option(18, b"eth0"));
        assert!(Pkt6::parse(&message, Metadata::default()).is_err());
    }

    #[test]
    fn test_truncated_messages() {
        assert!(Pkt6::parse(&[1, 0, 0], Metadata::default()).is_err());
        assert!(Pkt6::parse(&[RELAY_FORW, 0, 0], Metadata::default()).is_err());
        assert!(Pkt6::parse(&[1, 0, 0, 1, 0, 1, 0, 9], Metadata::default()).is_err());
    }

    #[test]
    fn test_new_masks_transid() {
        let packet = Pkt6::new(1, 0x12345678, Metadata::default());
        assert_eq!(packet.transid, 0x345678);
    }
}
