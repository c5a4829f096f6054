//! RTR protocol data units.
//!
//! The PDU formats of RFC 6810 and RFC 8210. Values are built into
//! plain byte buffers – the header and all integer fields are big
//! endian – and written out in one piece. Reading happens in two
//! steps: the fixed eight byte [`Header`] first, then whatever the
//! type and length fields promise.
//!
//! The length field is 32 bits wide, so a misbehaving peer could
//! announce a gigantic PDU. Anything above [`MAX_PDU_SIZE`] is
//! rejected before any allocation happens.

use std::io;
use std::net::IpAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::payload::Payload;
use crate::rtr::server::Timing;
use crate::rtr::state::{Serial, State};


/// The maximum size of a PDU we are prepared to accept.
pub const MAX_PDU_SIZE: u32 = 256 * 1024;

/// The highest protocol version we speak.
pub const MAX_VERSION: u8 = 1;


//------------ PduType -------------------------------------------------------

/// The PDU type codes.
pub mod pdu_type {
    pub const SERIAL_NOTIFY: u8 = 0;
    pub const SERIAL_QUERY: u8 = 1;
    pub const RESET_QUERY: u8 = 2;
    pub const CACHE_RESPONSE: u8 = 3;
    pub const IPV4_PREFIX: u8 = 4;
    pub const IPV6_PREFIX: u8 = 6;
    pub const END_OF_DATA: u8 = 7;
    pub const CACHE_RESET: u8 = 8;
    pub const ROUTER_KEY: u8 = 9;
    pub const ERROR_REPORT: u8 = 10;
}

//------------ Error codes ---------------------------------------------------

/// The error codes of the Error Report PDU.
pub mod err_code {
    pub const CORRUPT_DATA: u16 = 0;
    pub const INTERNAL_ERROR: u16 = 1;
    pub const NO_DATA_AVAILABLE: u16 = 2;
    pub const INVALID_REQUEST: u16 = 3;
    pub const UNSUPPORTED_PROTOCOL_VERSION: u16 = 4;
    pub const UNSUPPORTED_PDU_TYPE: u16 = 5;
}


//------------ Header --------------------------------------------------------

/// The fixed eight byte header every PDU starts with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    /// The protocol version of the PDU.
    version: u8,

    /// The PDU type.
    pdu: u8,

    /// The session ID or other use of the third and fourth octet.
    session: u16,

    /// The full length of the PDU including the header.
    length: u32,
}

impl Header {
    pub const LEN: u32 = 8;

    pub fn new(version: u8, pdu: u8, session: u16, length: u32) -> Self {
        Header { version, pdu, session, length }
    }

    pub fn version(self) -> u8 {
        self.version
    }

    pub fn pdu(self) -> u8 {
        self.pdu
    }

    pub fn session(self) -> u16 {
        self.session
    }

    pub fn length(self) -> u32 {
        self.length
    }

    /// Reads a header from a socket.
    pub async fn read<Sock: AsyncRead + Unpin>(
        sock: &mut Sock
    ) -> Result<Self, io::Error> {
        let mut buf = [0u8; 8];
        sock.read_exact(&mut buf).await?;
        Ok(Self::parse(buf))
    }

    /// Parses a header from its wire representation.
    pub fn parse(buf: [u8; 8]) -> Self {
        Header {
            version: buf[0],
            pdu: buf[1],
            session: u16::from_be_bytes([buf[2], buf[3]]),
            length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    /// Appends the wire representation to a buffer.
    fn push(self, target: &mut Vec<u8>) {
        target.push(self.version);
        target.push(self.pdu);
        target.extend_from_slice(&self.session.to_be_bytes());
        target.extend_from_slice(&self.length.to_be_bytes());
    }

    /// Returns the wire representation.
    pub fn to_bytes(self) -> [u8; 8] {
        let mut res = [0u8; 8];
        res[0] = self.version;
        res[1] = self.pdu;
        res[2..4].copy_from_slice(&self.session.to_be_bytes());
        res[4..8].copy_from_slice(&self.length.to_be_bytes());
        res
    }
}


//------------ SerialQueryPayload --------------------------------------------

/// The serial number that follows a Serial Query header.
#[derive(Clone, Copy, Debug)]
pub struct SerialQueryPayload(Serial);

impl SerialQueryPayload {
    pub const LEN: u32 = 4;

    pub async fn read<Sock: AsyncRead + Unpin>(
        sock: &mut Sock
    ) -> Result<Self, io::Error> {
        let mut buf = [0u8; 4];
        sock.read_exact(&mut buf).await?;
        Ok(SerialQueryPayload(Serial(u32::from_be_bytes(buf))))
    }

    pub fn serial(self) -> Serial {
        self.0
    }
}


//------------ SerialNotify --------------------------------------------------

/// The Serial Notify PDU: new data is available at the given serial.
#[derive(Clone, Debug)]
pub struct SerialNotify(Vec<u8>);

impl SerialNotify {
    pub fn new(version: u8, state: State) -> Self {
        let mut buf = Vec::with_capacity(12);
        Header::new(
            version, pdu_type::SERIAL_NOTIFY, state.session(), 12
        ).push(&mut buf);
        buf.extend_from_slice(&state.serial().into_u32().to_be_bytes());
        SerialNotify(buf)
    }
}


//------------ SerialQuery ---------------------------------------------------

/// The Serial Query PDU, sent by clients.
#[derive(Clone, Debug)]
pub struct SerialQuery(Vec<u8>);

impl SerialQuery {
    pub const SIZE: u32 = 12;

    pub fn new(version: u8, state: State) -> Self {
        let mut buf = Vec::with_capacity(12);
        Header::new(
            version, pdu_type::SERIAL_QUERY, state.session(), 12
        ).push(&mut buf);
        buf.extend_from_slice(&state.serial().into_u32().to_be_bytes());
        SerialQuery(buf)
    }
}


//------------ ResetQuery ----------------------------------------------------

/// The Reset Query PDU, sent by clients wanting the full data set.
#[derive(Clone, Debug)]
pub struct ResetQuery(Vec<u8>);

impl ResetQuery {
    pub const SIZE: u32 = 8;

    pub fn new(version: u8) -> Self {
        let mut buf = Vec::with_capacity(8);
        Header::new(version, pdu_type::RESET_QUERY, 0, 8).push(&mut buf);
        ResetQuery(buf)
    }
}


//------------ CacheResponse -------------------------------------------------

/// The Cache Response PDU opening a data transfer.
#[derive(Clone, Debug)]
pub struct CacheResponse(Vec<u8>);

impl CacheResponse {
    pub fn new(version: u8, state: State) -> Self {
        let mut buf = Vec::with_capacity(8);
        Header::new(
            version, pdu_type::CACHE_RESPONSE, state.session(), 8
        ).push(&mut buf);
        CacheResponse(buf)
    }
}


//------------ PayloadPdu ----------------------------------------------------

/// A payload-carrying PDU: IPv4 Prefix, IPv6 Prefix, or Router Key.
///
/// Router keys only exist in protocol version 1; for a version 0
/// session [`new`][Self::new] returns `None` and the item is simply
/// not sent.
#[derive(Clone, Debug)]
pub struct PayloadPdu(Vec<u8>);

impl PayloadPdu {
    pub fn new(version: u8, flags: u8, payload: &Payload) -> Option<Self> {
        match payload {
            Payload::Origin(origin) => {
                let mut buf;
                match origin.addr {
                    IpAddr::V4(addr) => {
                        buf = Vec::with_capacity(20);
                        Header::new(
                            version, pdu_type::IPV4_PREFIX, 0, 20
                        ).push(&mut buf);
                        buf.push(flags);
                        buf.push(origin.prefix_len);
                        buf.push(origin.max_len);
                        buf.push(0);
                        buf.extend_from_slice(&addr.octets());
                    }
                    IpAddr::V6(addr) => {
                        buf = Vec::with_capacity(32);
                        Header::new(
                            version, pdu_type::IPV6_PREFIX, 0, 32
                        ).push(&mut buf);
                        buf.push(flags);
                        buf.push(origin.prefix_len);
                        buf.push(origin.max_len);
                        buf.push(0);
                        buf.extend_from_slice(&addr.octets());
                    }
                }
                buf.extend_from_slice(
                    &origin.asn.into_u32().to_be_bytes()
                );
                Some(PayloadPdu(buf))
            }
            Payload::RouterKey(key) => {
                if version < 1 {
                    return None
                }
                let length = 8 + 20 + 4 + key.key_info.len() as u32;
                let mut buf = Vec::with_capacity(length as usize);
                Header::new(
                    version, pdu_type::ROUTER_KEY,
                    u16::from(flags) << 8, length,
                ).push(&mut buf);
                buf.extend_from_slice(key.key_identifier.as_slice());
                buf.extend_from_slice(&key.asn.into_u32().to_be_bytes());
                buf.extend_from_slice(key.key_info.as_ref());
                Some(PayloadPdu(buf))
            }
        }
    }
}


//------------ EndOfData -----------------------------------------------------

/// The End of Data PDU closing a data transfer.
///
/// The version 1 form additionally carries the timing parameters for
/// the client.
#[derive(Clone, Debug)]
pub struct EndOfData(Vec<u8>);

impl EndOfData {
    pub fn new(version: u8, state: State, timing: Timing) -> Self {
        if version == 0 {
            let mut buf = Vec::with_capacity(12);
            Header::new(
                version, pdu_type::END_OF_DATA, state.session(), 12
            ).push(&mut buf);
            buf.extend_from_slice(
                &state.serial().into_u32().to_be_bytes()
            );
            EndOfData(buf)
        }
        else {
            let mut buf = Vec::with_capacity(24);
            Header::new(
                version, pdu_type::END_OF_DATA, state.session(), 24
            ).push(&mut buf);
            buf.extend_from_slice(
                &state.serial().into_u32().to_be_bytes()
            );
            buf.extend_from_slice(&timing.refresh.to_be_bytes());
            buf.extend_from_slice(&timing.retry.to_be_bytes());
            buf.extend_from_slice(&timing.expire.to_be_bytes());
            EndOfData(buf)
        }
    }
}


//------------ CacheReset ----------------------------------------------------

/// The Cache Reset PDU: the client must fall back to a reset query.
#[derive(Clone, Debug)]
pub struct CacheReset(Vec<u8>);

impl CacheReset {
    pub fn new(version: u8) -> Self {
        let mut buf = Vec::with_capacity(8);
        Header::new(version, pdu_type::CACHE_RESET, 0, 8).push(&mut buf);
        CacheReset(buf)
    }
}


//------------ Error ---------------------------------------------------------

/// The Error Report PDU.
///
/// Carries an error code in the header’s session field, the PDU that
/// caused the error, and a diagnostic text.
#[derive(Clone, Debug)]
pub struct Error(Vec<u8>);

impl Error {
    pub fn new(
        version: u8,
        error_code: u16,
        erroneous_pdu: impl AsRef<[u8]>,
        text: impl AsRef<[u8]>,
    ) -> Self {
        // Keep the embedded PDU bounded; the text is ours and short.
        let pdu = erroneous_pdu.as_ref();
        let pdu = if pdu.len() > 0xFFFF { &pdu[..0xFFFF] } else { pdu };
        let text = text.as_ref();
        let length = 16 + pdu.len() as u32 + text.len() as u32;
        let mut buf = Vec::with_capacity(length as usize);
        Header::new(
            version, pdu_type::ERROR_REPORT, error_code, length
        ).push(&mut buf);
        buf.extend_from_slice(&(pdu.len() as u32).to_be_bytes());
        buf.extend_from_slice(pdu);
        buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
        buf.extend_from_slice(text);
        Error(buf)
    }
}


//------------ Writing -------------------------------------------------------

macro_rules! writable {
    ( $( $type:ident ),* ) => {
        $(
            impl $type {
                /// Writes the PDU to a writer.
                pub async fn write<A: AsyncWrite + Unpin>(
                    &self,
                    a: &mut A,
                ) -> Result<(), io::Error> {
                    a.write_all(self.0.as_ref()).await
                }
            }

            impl AsRef<[u8]> for $type {
                fn as_ref(&self) -> &[u8] {
                    self.0.as_ref()
                }
            }
        )*
    }
}

writable!(
    SerialNotify, SerialQuery, ResetQuery, CacheResponse, PayloadPdu,
    EndOfData, CacheReset, Error
);


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use crate::payload::{RouteOrigin, RouterKey};
    use crate::crypto::KeyIdentifier;
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = Header::new(1, pdu_type::SERIAL_NOTIFY, 0xbeef, 12);
        let parsed = Header::parse(header.to_bytes());
        assert_eq!(header, parsed);
        assert_eq!(parsed.version(), 1);
        assert_eq!(parsed.pdu(), pdu_type::SERIAL_NOTIFY);
        assert_eq!(parsed.session(), 0xbeef);
        assert_eq!(parsed.length(), 12);
    }

    #[test]
    fn serial_notify_wire_format() {
        let pdu = SerialNotify::new(
            0, State::from_parts(0x1234, Serial(0xdeadbeef))
        );
        assert_eq!(
            pdu.as_ref(),
            &[
                0, 0, 0x12, 0x34, 0, 0, 0, 12,
                0xde, 0xad, 0xbe, 0xef,
            ]
        );
    }

    #[test]
    fn ipv4_prefix_wire_format() {
        let origin = RouteOrigin::new(
            IpAddr::from([192, 0, 2, 0]), 24, 26, 64496.into()
        );
        let pdu = PayloadPdu::new(
            1, 1, &Payload::Origin(origin)
        ).unwrap();
        assert_eq!(
            pdu.as_ref(),
            &[
                1, 4, 0, 0, 0, 0, 0, 20,
                1, 24, 26, 0,
                192, 0, 2, 0,
                0, 0, 0xfb, 0xf0,
            ]
        );
    }

    #[test]
    fn ipv6_prefix_wire_format() {
        let origin = RouteOrigin::new(
            IpAddr::from([
                0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0,
                0, 0, 0, 0, 0, 0, 0, 0
            ]),
            32, 32, 64496.into()
        );
        let pdu = PayloadPdu::new(
            1, 0, &Payload::Origin(origin)
        ).unwrap();
        assert_eq!(pdu.as_ref().len(), 32);
        assert_eq!(&pdu.as_ref()[..8], &[1, 6, 0, 0, 0, 0, 0, 32]);
        assert_eq!(&pdu.as_ref()[8..12], &[0, 32, 32, 0]);
    }

    #[test]
    fn router_key_versions() {
        let key = Payload::RouterKey(RouterKey::new(
            KeyIdentifier::from(*b"12345678901234567890"),
            64496.into(),
            bytes::Bytes::from_static(b"spki"),
        ));
        // No router keys in version 0.
        assert!(PayloadPdu::new(0, 1, &key).is_none());
        let pdu = PayloadPdu::new(1, 1, &key).unwrap();
        assert_eq!(pdu.as_ref().len(), 36);
        // The flags live in the upper octet of the session field.
        assert_eq!(&pdu.as_ref()[..8], &[1, 9, 1, 0, 0, 0, 0, 36]);
    }

    #[test]
    fn end_of_data_lengths() {
        let state = State::from_parts(7, Serial(1));
        let timing = Timing::default();
        assert_eq!(EndOfData::new(0, state, timing).as_ref().len(), 12);
        let v1 = EndOfData::new(1, state, timing);
        assert_eq!(v1.as_ref().len(), 24);
        assert_eq!(
            &v1.as_ref()[12..16], &timing.refresh.to_be_bytes()
        );
    }

    #[test]
    fn error_report_embeds_pdu() {
        let header = Header::new(1, 99, 0, 8);
        let err = Error::new(
            1, err_code::UNSUPPORTED_PDU_TYPE,
            header.to_bytes(), "unsupported",
        );
        let buf = err.as_ref();
        assert_eq!(buf[1], pdu_type::ERROR_REPORT);
        assert_eq!(
            u16::from_be_bytes([buf[2], buf[3]]),
            err_code::UNSUPPORTED_PDU_TYPE
        );
        // Length of the embedded PDU.
        assert_eq!(
            u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]), 8
        );
        // Total length adds up.
        assert_eq!(
            u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize,
            buf.len()
        );
    }
}
