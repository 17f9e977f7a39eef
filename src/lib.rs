//! Remote Desktop Protocol client stack
//!
//! The layers stack bottom up: tpkt framing, x224 transport
//! PDUs, the T.125 MCS domain, the security and license layer,
//! then the pdu layer with its capability exchange, bitmap
//! updates and input events. Enhanced security front ends
//! (TLS and CredSSP with NTLMv2) live in [`nla`].
//!
//! [`crate::core::client::Connector`] assembles a session out
//! of all of this.

pub mod codecs;
pub mod core;
pub mod model;
pub mod nla;
