//! # dhcpclass
//!
//! Client classification for DHCP servers: compiles expressions such as
//! `option[60].text == 'PXE'` into token programs and evaluates them against
//! decoded DHCPv4 and DHCPv6 packets.
//!
//! ## Features
//!
//! - Option, relay agent (option 82 and DHCPv6 relay layers), header field,
//!   vendor and vendor-class lookups
//! - `substring`, `concat`, `==`, `not`, `and`, `or`
//! - Family checks at compile time with located error messages
//! - Standard option names plus site-defined names
//! - JSON-configured client classes
//!
//! ## Quick Start
//!
//! ```
//! use dhcpclass::{ExpressionKind, Family, Packet, Pkt4, RawOption, compile};
//!
//! let program = compile("option[60].text == 'PXE'", Family::V4, ExpressionKind::Bool)?;
//!
//! let packet = Packet::V4(Pkt4 {
//!     options: vec![RawOption::new(60, b"PXE".to_vec())],
//!     ..Default::default()
//! });
//! assert!(program.evaluate_bool(&packet)?);
//! # Ok::<(), dhcpclass::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`lexer`] - expression text to located terminals
//! - [`parser`] - recursive descent, emitting tokens into an [`EvalContext`]
//! - [`Program`] - immutable token list, evaluated on a private stack
//! - [`Token`] - one instruction and its stack semantics
//! - [`Packet`] - decoded DHCPv4 ([`Pkt4`]) or DHCPv6 ([`Pkt6`]) message
//! - [`ClientClasses`] - compiled classes from a [`Config`]

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod lexer;
pub mod options;
pub mod packet;
pub mod packet6;
pub mod parser;
pub mod program;
pub mod token;

pub use classify::{ClientClass, ClientClasses};
pub use config::Config;
pub use context::{EvalContext, ExpressionKind};
pub use error::{Error, Location, Result};
pub use options::OptionRegistry;
pub use packet::{Family, Metadata, Packet, Pkt4, RawOption};
pub use packet6::{Pkt6, RelayLayer};
pub use program::{Program, compile, compile_with};
pub use token::{Token, Value};
