//! The RPKI-to-Router protocol.
//!
//! The server side of RTR as defined by RFC 6810 (version 0) and
//! RFC 8210 (version 1): PDU framing in [`pdu`], session state and
//! serial numbers in [`state`], and the actual server with its
//! notification plumbing in [`server`].

pub mod pdu;
pub mod server;
pub mod state;
