//! Route Origin Authorizations.
//!
//! A ROA is a signed object binding a set of address prefixes to the AS
//! number authorized to originate routes for them. See [RFC 6482].
//!
//! [RFC 6482]: https://tools.ietf.org/html/rfc6482

use std::fmt;
use bcder::{decode, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use crate::oid;
use crate::cert::{Cert, ResourceCert};
use crate::resources::{AddressFamily, Asn, Prefix};
use crate::sigobj::SignedObject;
use crate::x509::{Time, ValidationError};


//------------ Roa -----------------------------------------------------------

/// A decoded ROA.
#[derive(Clone, Debug)]
pub struct Roa {
    signed: SignedObject,
    content: RouteOriginAttestation,
}

impl Roa {
    /// Decodes a ROA from a source.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        let signed = SignedObject::decode_if_type(
            source, &oid::CT_ROUTE_ORIGIN_AUTHZ,
        )?;
        let content = signed.decode_content(
            RouteOriginAttestation::take_from
        ).map_err(DecodeError::convert)?;
        Ok(Roa { signed, content })
    }

    /// Validates the ROA.
    ///
    /// On success returns the EE certificate and the attestation whose
    /// prefixes have all been verified to be covered by the
    /// certificate’s IP resources.
    pub fn process<F>(
        self,
        issuer: &ResourceCert,
        now: Time,
        check_crl: F,
    ) -> Result<(ResourceCert, RouteOriginAttestation), ValidationError>
    where F: FnOnce(&Cert) -> Result<(), ValidationError> {
        let cert = self.signed.process(issuer, now, check_crl)?;
        self.content.verify(&cert)?;
        Ok((cert, self.content))
    }
}


//------------ RouteOriginAttestation ----------------------------------------

/// The content of a ROA.
#[derive(Clone, Debug)]
pub struct RouteOriginAttestation {
    /// The AS number authorized to originate routes.
    as_id: Asn,

    /// The authorized IPv4 prefixes.
    v4_addrs: Vec<RoaIpAddress>,

    /// The authorized IPv6 prefixes.
    v6_addrs: Vec<RoaIpAddress>,
}

impl RouteOriginAttestation {
    /// Parses the ROA content.
    ///
    /// ```text
    /// RouteOriginAttestation  ::= SEQUENCE {
    ///     version             [0] INTEGER DEFAULT 0,
    ///     asID                ASID,
    ///     ipAddrBlocks        SEQUENCE (SIZE(1..MAX)) OF
    ///                             ROAIPAddressFamily }
    ///
    /// ROAIPAddressFamily      ::= SEQUENCE {
    ///     addressFamily       OCTET STRING (SIZE (2..3)),
    ///     addresses           SEQUENCE (SIZE (1..MAX)) OF ROAIPAddress }
    /// ```
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            cons.take_opt_constructed_if(
                Tag::CTX_0, |c| c.skip_u8_if(0)
            )?;
            let as_id = Asn::take_from(cons)?;
            let mut v4 = None;
            let mut v6 = None;
            cons.take_sequence(|cons| {
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    let family = AddressFamily::take_from(cons)?;
                    let slot = match family {
                        AddressFamily::Ipv4 => &mut v4,
                        AddressFamily::Ipv6 => &mut v6,
                    };
                    if slot.is_some() {
                        return Err(cons.content_err(
                            "duplicate address family in ROA"
                        ))
                    }
                    let mut addrs = Vec::new();
                    cons.take_sequence(|cons| {
                        while let Some(addr)
                            = RoaIpAddress::take_opt_from(cons, family)?
                        {
                            addrs.push(addr);
                        }
                        Ok(())
                    })?;
                    *slot = Some(addrs);
                    Ok(())
                })? { }
                Ok(())
            })?;
            Ok(RouteOriginAttestation {
                as_id,
                v4_addrs: v4.unwrap_or_default(),
                v6_addrs: v6.unwrap_or_default(),
            })
        })
    }

    pub fn as_id(&self) -> Asn {
        self.as_id
    }

    pub fn v4_addrs(&self) -> &[RoaIpAddress] {
        &self.v4_addrs
    }

    pub fn v6_addrs(&self) -> &[RoaIpAddress] {
        &self.v6_addrs
    }

    /// Verifies the attestation against the validated EE certificate.
    ///
    /// Every prefix must be covered by the certificate’s IP resources.
    /// If the certificate carries AS resources – which EE certificates
    /// using inherit always do – the attested AS number must be among
    /// them.
    fn verify(
        &self, cert: &ResourceCert
    ) -> Result<(), ValidationError> {
        for addr in &self.v4_addrs {
            if !cert.resources().v4().contains_prefix(addr.prefix()) {
                return Err(ValidationError::resources(
                    format!(
                        "ROA prefix {} not covered by certificate",
                        addr.display(AddressFamily::Ipv4)
                    )
                ))
            }
        }
        for addr in &self.v6_addrs {
            if !cert.resources().v6().contains_prefix(addr.prefix()) {
                return Err(ValidationError::resources(
                    format!(
                        "ROA prefix {} not covered by certificate",
                        addr.display(AddressFamily::Ipv6)
                    )
                ))
            }
        }
        if !cert.resources().asn().is_empty()
            && !cert.resources().asn().contains_asn(self.as_id)
        {
            return Err(ValidationError::resources(
                format!(
                    "ROA for {} not covered by certificate", self.as_id
                )
            ))
        }
        Ok(())
    }
}


//------------ RoaIpAddress --------------------------------------------------

/// A single prefix authorized by a ROA, with its optional max length.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RoaIpAddress {
    prefix: Prefix,
    max_length: Option<u8>,
}

impl RoaIpAddress {
    pub fn prefix(self) -> Prefix {
        self.prefix
    }

    pub fn max_length(self) -> Option<u8> {
        self.max_length
    }

    /// Returns the max length, defaulting to the prefix length.
    pub fn resolved_max_length(self) -> u8 {
        self.max_length.unwrap_or_else(|| self.prefix.addr_len())
    }

    /// Takes an optional ROA address from a constructed value.
    ///
    /// ```text
    /// ROAIPAddress ::= SEQUENCE {
    ///     address      IPAddress,
    ///     maxLength    INTEGER OPTIONAL }
    /// ```
    ///
    /// The prefix length must fit the address family and the max length
    /// must lie between the prefix length and the family width.
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        family: AddressFamily,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        let res = cons.take_opt_sequence(|cons| {
            Ok(RoaIpAddress {
                prefix: Prefix::take_from(cons)?,
                max_length: cons.take_opt_u8()?,
            })
        })?;
        let addr = match res {
            Some(addr) => addr,
            None => return Ok(None)
        };
        if addr.prefix.addr_len() > family.max_addr_len() {
            return Err(cons.content_err(
                "prefix length too large in ROA prefix"
            ))
        }
        if let Some(max_length) = addr.max_length {
            if max_length > family.max_addr_len()
                || max_length < addr.prefix.addr_len()
            {
                return Err(cons.content_err(
                    "invalid max length in ROA prefix"
                ))
            }
        }
        Ok(Some(addr))
    }

    /// Returns a display wrapper using the given family’s syntax.
    pub fn display(self, family: AddressFamily) -> RoaIpAddressDisplay {
        RoaIpAddressDisplay { addr: self, family }
    }
}


//------------ RoaIpAddressDisplay -------------------------------------------

/// Helper displaying a ROA address in its family’s syntax.
#[derive(Clone, Copy, Debug)]
pub struct RoaIpAddressDisplay {
    addr: RoaIpAddress,
    family: AddressFamily,
}

impl fmt::Display for RoaIpAddressDisplay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.family {
            AddressFamily::Ipv4 => self.addr.prefix.fmt_v4(f)?,
            AddressFamily::Ipv6 => self.addr.prefix.fmt_v6(f)?,
        }
        if let Some(max_len) = self.addr.max_length {
            write!(f, "-{}", max_len)?;
        }
        Ok(())
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use bcder::{encode, Mode, OctetString};
    use bcder::encode::{PrimitiveContent, Values};
    use crate::resources::Addr;
    use super::*;

    fn encode_roa_addr(
        prefix: Prefix, max_len: Option<u8>
    ) -> impl encode::Values {
        encode::sequence((
            prefix.encode(),
            max_len.map(|v| v.encode()),
        ))
    }

    fn encode_roa(
        as_id: u32,
        family: &'static [u8],
        addrs: Vec<(Prefix, Option<u8>)>,
    ) -> Vec<u8> {
        let mut addr_list = bcder::Captured::builder(Mode::Der);
        for (prefix, max_len) in addrs {
            addr_list.extend(encode_roa_addr(prefix, max_len));
        }
        encode::sequence((
            as_id.encode(),
            encode::sequence(
                encode::sequence((
                    OctetString::encode_slice(family),
                    encode::sequence(addr_list.freeze()),
                ))
            )
        )).to_captured(Mode::Der).into_bytes().to_vec()
    }

    fn decode_content(
        data: &[u8]
    ) -> Result<
        RouteOriginAttestation, DecodeError<std::convert::Infallible>
    > {
        Mode::Der.decode(data, RouteOriginAttestation::take_from)
    }

    #[test]
    fn content_roundtrip() {
        let prefix = Prefix::new(
            Addr::from(Ipv4Addr::new(192, 0, 2, 0)), 24
        );
        let content = decode_content(&encode_roa(
            64496, b"\x00\x01", vec![(prefix, Some(26))]
        )).unwrap();
        assert_eq!(content.as_id(), Asn::from(64496));
        assert_eq!(content.v4_addrs().len(), 1);
        assert!(content.v6_addrs().is_empty());
        let addr = content.v4_addrs()[0];
        assert_eq!(addr.prefix(), prefix);
        assert_eq!(addr.max_length(), Some(26));
        assert_eq!(addr.resolved_max_length(), 26);
        assert_eq!(
            addr.display(AddressFamily::Ipv4).to_string(),
            "192.0.2.0/24-26"
        );
    }

    #[test]
    fn reject_bad_max_length() {
        let prefix = Prefix::new(
            Addr::from(Ipv4Addr::new(192, 0, 2, 0)), 24
        );
        // Max length smaller than the prefix length.
        assert!(decode_content(&encode_roa(
            64496, b"\x00\x01", vec![(prefix, Some(20))]
        )).is_err());
        // Max length beyond the family width.
        assert!(decode_content(&encode_roa(
            64496, b"\x00\x01", vec![(prefix, Some(33))]
        )).is_err());
        // Prefix length beyond the family width.
        assert!(decode_content(&encode_roa(
            64496, b"\x00\x01", vec![(
                Prefix::new(Addr::from_bits(0), 64), None
            )]
        )).is_err());
    }

    #[test]
    fn reject_duplicate_family() {
        let prefix = Prefix::new(
            Addr::from(Ipv4Addr::new(192, 0, 2, 0)), 24
        );
        let mut addr_list = bcder::Captured::builder(Mode::Der);
        addr_list.extend(encode_roa_addr(prefix, None));
        let addr_list = addr_list.freeze();
        let data = encode::sequence((
            64496u32.encode(),
            encode::sequence((
                encode::sequence((
                    OctetString::encode_slice(b"\x00\x01".as_ref()),
                    encode::sequence(addr_list.clone()),
                )),
                encode::sequence((
                    OctetString::encode_slice(b"\x00\x01".as_ref()),
                    encode::sequence(addr_list),
                )),
            ))
        )).to_captured(Mode::Der).into_bytes();
        assert!(decode_content(data.as_ref()).is_err());
    }
}
