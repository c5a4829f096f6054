//! Certificate Revocation Lists.
//!
//! Each CA publishes exactly one CRL naming the serial numbers of the
//! certificates it has revoked. The CRL a CA’s objects must be checked
//! against is the one listed on the CA’s manifest. See [RFC 6487],
//! section 5.
//!
//! [RFC 6487]: https://tools.ietf.org/html/rfc6487

use bcder::{decode, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use crate::crypto::{KeyIdentifier, PublicKey, SignatureAlgorithm};
use crate::oid;
use crate::x509::{
    Name, Serial, SignedData, Time, VerificationError,
};


//------------ Crl -----------------------------------------------------------

/// A certificate revocation list.
#[derive(Clone, Debug)]
pub struct Crl {
    /// The outer structure of the CRL.
    signed_data: SignedData,

    /// The issuer of the CRL.
    issuer: Name,

    /// The time this CRL was created.
    this_update: Time,

    /// The time the next CRL is due.
    next_update: Time,

    /// The revoked serial numbers, sorted for lookup.
    revoked: Vec<Serial>,

    /// The key identifier of the issuing key.
    authority_key_identifier: KeyIdentifier,
}

impl Crl {
    /// Decodes a source as a CRL.
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let signed_data = SignedData::from_constructed(cons)?;
        let tbs = signed_data.data().clone().decode(
            TbsCertList::from_constructed
        ).map_err(DecodeError::convert)?;
        Ok(Crl {
            signed_data,
            issuer: tbs.issuer,
            this_update: tbs.this_update,
            next_update: tbs.next_update,
            revoked: tbs.revoked,
            authority_key_identifier: tbs.authority_key_identifier,
        })
    }
}


//------------ TbsCertList ---------------------------------------------------

/// The payload of a CRL while it is being parsed.
struct TbsCertList {
    issuer: Name,
    this_update: Time,
    next_update: Time,
    revoked: Vec<Serial>,
    authority_key_identifier: KeyIdentifier,
}

impl TbsCertList {
    /// Parses the content of the TBSCertList sequence.
    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            // version must be v2 which is encoded as 1.
            cons.skip_u8_if(1)?;
            let _sig_alg = SignatureAlgorithm::x509_take_from(cons)?;
            let issuer = Name::take_from(cons)?;
            let this_update = Time::take_from(cons)?;
            let next_update = Time::take_from(cons)?;
            if this_update > next_update {
                return Err(cons.content_err(
                    "CRL thisUpdate after nextUpdate"
                ))
            }

            let mut revoked = Vec::new();
            cons.take_opt_sequence(|cons| {
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    revoked.push(Serial::take_from(cons)?);
                    Time::take_from(cons)?;
                    // Skip any crlEntryExtensions.
                    cons.skip_all()
                })? { }
                Ok(())
            })?;
            revoked.sort_unstable();

            let mut authority_key_identifier = None;
            let mut number_seen = false;
            cons.take_constructed_if(Tag::CTX_0, |cons| {
                cons.take_sequence(|cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let id = Oid::take_from(cons)?;
                        let _critical
                            = cons.take_opt_bool()?.unwrap_or(false);
                        let value = OctetString::take_from(cons)?;
                        Mode::Der.decode(value, |cons| {
                            if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                                if authority_key_identifier.is_some() {
                                    return Err(cons.content_err(
                                        "duplicate Authority Key \
                                         Identifier extension"
                                    ))
                                }
                                authority_key_identifier = Some(
                                    cons.take_sequence(|cons| {
                                        cons.take_value_if(
                                            Tag::CTX_0,
                                            KeyIdentifier::from_content,
                                        )
                                    })?
                                );
                                Ok(())
                            }
                            else if id == oid::CE_CRL_NUMBER {
                                if number_seen {
                                    return Err(cons.content_err(
                                        "duplicate CRL Number extension"
                                    ))
                                }
                                number_seen = true;
                                // The number itself only matters for
                                // caches, which we don’t keep.
                                cons.skip_all()
                            }
                            else {
                                Err(cons.content_err(
                                    "unexpected extension in CRL"
                                ))
                            }
                        }).map_err(DecodeError::convert)?;
                        Ok(())
                    })? { }
                    Ok(())
                })
            })?;

            let authority_key_identifier = match authority_key_identifier {
                Some(some) => some,
                None => {
                    return Err(cons.content_err(
                        "missing Authority Key Identifier extension in CRL"
                    ))
                }
            };
            if !number_seen {
                return Err(cons.content_err(
                    "missing CRL Number extension"
                ))
            }

            Ok(TbsCertList {
                issuer,
                this_update,
                next_update,
                revoked,
                authority_key_identifier,
            })
        })
    }
}

/// # Data Access and Validation
///
impl Crl {
    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn this_update(&self) -> Time {
        self.this_update
    }

    pub fn next_update(&self) -> Time {
        self.next_update
    }

    pub fn authority_key_identifier(&self) -> KeyIdentifier {
        self.authority_key_identifier
    }

    /// Returns whether the CRL’s nextUpdate has passed.
    pub fn is_stale(&self, now: Time) -> bool {
        self.next_update < now
    }

    /// Verifies that the CRL was signed with the given key.
    pub fn verify_signature(
        &self, public_key: &PublicKey
    ) -> Result<(), VerificationError> {
        if self.authority_key_identifier != public_key.key_identifier() {
            return Err(VerificationError::new(
                "CRL not issued by expected key"
            ))
        }
        self.signed_data.verify_signature(public_key)
    }

    /// Returns whether the given serial number is revoked.
    pub fn contains(&self, serial: Serial) -> bool {
        self.revoked.binary_search(&serial).is_ok()
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_lookup() {
        let mut revoked: Vec<Serial> = [12u64, 5, 1999, 7].iter().map(|&v| {
            Serial::from(v)
        }).collect();
        revoked.sort_unstable();
        let crl = sample_crl(revoked);
        assert!(crl.contains(Serial::from(12u64)));
        assert!(crl.contains(Serial::from(1999u64)));
        assert!(!crl.contains(Serial::from(13u64)));
    }

    #[test]
    fn staleness() {
        let crl = sample_crl(Vec::new());
        assert!(!crl.is_stale(Time::utc(2026, 1, 15, 0, 0, 0)));
        assert!(crl.is_stale(Time::utc(2026, 2, 2, 0, 0, 0)));
    }

    fn sample_crl(revoked: Vec<Serial>) -> Crl {
        Crl {
            signed_data: sample_signed_data(),
            issuer: sample_name(),
            this_update: Time::utc(2026, 1, 1, 0, 0, 0),
            next_update: Time::utc(2026, 2, 1, 0, 0, 0),
            revoked,
            authority_key_identifier: KeyIdentifier::from([0u8; 20]),
        }
    }

    fn sample_name() -> Name {
        // An empty RDNSequence is enough for these tests.
        Mode::Der.decode(b"\x30\x00".as_ref(), Name::take_from).unwrap()
    }

    fn sample_signed_data() -> SignedData {
        // SEQUENCE { NULL, sha256WithRSAEncryption, BIT STRING {} }
        const DER: &[u8] = &[
            0x30, 0x14, 0x05, 0x00, 0x30, 0x0d, 0x06, 0x09,
            0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01,
            0x0b, 0x05, 0x00, 0x03, 0x01, 0x00,
        ];
        SignedData::decode(DER).unwrap()
    }
}
