//! Signed objects.
//!
//! All payload-bearing files in an RPKI repository – manifests, ROAs,
//! Ghostbusters records – share the same envelope: a restricted CMS
//! SignedData structure with exactly one signer and an embedded EE
//! certificate, specified in [RFC 6488]. This module parses and verifies
//! that envelope; the content inside is handled by the per-object
//! modules.
//!
//! [RFC 6488]: https://tools.ietf.org/html/rfc6488

use bcder::{decode, Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::string::OctetStringSource;
use bytes::Bytes;
use crate::oid;
use crate::cert::{Cert, ResourceCert};
use crate::crypto::{
    DigestAlgorithm, KeyIdentifier, Signature, SignatureAlgorithm,
};
use crate::x509::{
    InspectionError, Time, ValidationError, VerificationError,
};


//------------ SignedObject --------------------------------------------------

/// A signed object: CMS with exactly one signer and an EE certificate.
#[derive(Clone, Debug)]
pub struct SignedObject {
    //--- From SignedData
    digest_algorithm: DigestAlgorithm,
    content_type: Oid<Bytes>,
    content: OctetString,
    cert: Cert,

    //--- From SignerInfo
    sid: KeyIdentifier,
    signed_attrs: SignedAttrs,
    signature: Signature,

    //--- From the signed attributes
    message_digest: Bytes,
    signing_time: Option<Time>,
}

/// # Data Access
///
impl SignedObject {
    /// Returns a reference to the object’s content type.
    pub fn content_type(&self) -> &Oid<Bytes> {
        &self.content_type
    }

    /// Decodes the object’s content.
    pub fn decode_content<F, T>(
        &self, op: F
    ) -> Result<T, DecodeError<<OctetStringSource as decode::Source>::Error>>
    where F: FnOnce(
        &mut decode::Constructed<OctetStringSource>
    ) -> Result<
        T, DecodeError<<OctetStringSource as decode::Source>::Error>
    > {
        Mode::Der.decode(self.content.clone(), op)
    }

    /// Returns a reference to the embedded EE certificate.
    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    /// Returns the signing time if the object carries one.
    pub fn signing_time(&self) -> Option<Time> {
        self.signing_time
    }
}

/// # Decoding and Validation
///
impl SignedObject {
    /// Decodes a signed object from the given source.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Ber.decode(source.into_source(), Self::take_from)
    }

    /// Decodes a signed object, checking the content type.
    pub fn decode_if_type<S: IntoSource>(
        source: S,
        content_type: &impl PartialEq<Oid<Bytes>>,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        let res = Self::decode(source)?;
        if content_type.ne(res.content_type()) {
            return Err(DecodeError::content(
                "invalid content type", Default::default()
            ))
        }
        Ok(res)
    }

    /// Takes a signed object from an encoded constructed value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| { // ContentInfo
            oid::SIGNED_DATA.skip_if(cons)?; // contentType
            cons.take_constructed_if(Tag::CTX_0, |cons| { // content
                cons.take_sequence(|cons| { // SignedData
                    cons.skip_u8_if(3)?; // version -- must be 3
                    let digest_algorithm
                        = DigestAlgorithm::take_set_from(cons)?;
                    let (content_type, content) = {
                        cons.take_sequence(|cons| { // encapContentInfo
                            Ok((
                                Oid::take_from(cons)?,
                                cons.take_constructed_if(
                                    Tag::CTX_0,
                                    OctetString::take_from
                                )?
                            ))
                        })?
                    };
                    let cert = cons.take_constructed_if( // certificates
                        Tag::CTX_0,
                        Cert::take_from
                    )?;
                    // no crls
                    let (sid, attrs, signature) = { // signerInfos
                        cons.take_set(|cons| {
                            cons.take_sequence(|cons| {
                                cons.skip_u8_if(3)?;
                                let sid = cons.take_value_if(
                                    Tag::CTX_0, |content| {
                                        KeyIdentifier::from_content(content)
                                    }
                                )?;
                                let alg = DigestAlgorithm::take_from(cons)?;
                                if alg != digest_algorithm {
                                    return Err(cons.content_err(
                                        "digest algorithm mismatch"
                                    ))
                                }
                                let attrs = SignedAttrs::take_from(cons)?;
                                if attrs.1 != content_type {
                                    return Err(cons.content_err(
                                        "content type in signed \
                                         attributes differs"
                                    ))
                                }
                                let signature = Signature::new(
                                    SignatureAlgorithm::cms_take_from(
                                        cons
                                    )?,
                                    OctetString::take_from(
                                        cons
                                    )?.into_bytes()
                                );
                                // no unsignedAttributes
                                Ok((sid, attrs, signature))
                            })
                        })?
                    };
                    Ok(Self {
                        digest_algorithm,
                        content_type,
                        content,
                        cert,
                        sid,
                        signed_attrs: attrs.0,
                        signature,
                        message_digest: attrs.2,
                        signing_time: attrs.3,
                    })
                })
            })
        })
    }

    /// Validates the signed object at the given time.
    ///
    /// Runs the checks of section 3 of RFC 6488: the signer matches the
    /// embedded certificate, the message digest matches the content, the
    /// signature verifies, and the EE certificate validates against the
    /// issuing CA. The CRL check is left to the caller via `check_crl`
    /// since the CRL belongs to the issuing CA’s publication point.
    pub fn process<F>(
        self,
        issuer: &ResourceCert,
        now: Time,
        check_crl: F,
    ) -> Result<ResourceCert, ValidationError>
    where F: FnOnce(&Cert) -> Result<(), ValidationError> {
        self.inspect()?;
        self.verify()?;
        check_crl(&self.cert)?;
        self.cert.validate_ee_at(issuer, now)
    }

    /// Checks the properties parsing could not check.
    fn inspect(&self) -> Result<(), InspectionError> {
        // The certificate must be the signer: its subject key identifier
        // must match the sid of the SignerInfo.
        if self.sid != self.cert.subject_key_identifier() {
            return Err(InspectionError::new(
                "subject key identifier mismatch in signed object"
            ))
        }
        Ok(())
    }

    /// Verifies digest and signature.
    fn verify(&self) -> Result<(), VerificationError> {
        let digest = {
            let mut context = self.digest_algorithm.start();
            self.content.iter().for_each(|x| context.update(x));
            context.finish()
        };
        if digest.as_ref() != self.message_digest.as_ref() {
            return Err(VerificationError::new(
                "message digest mismatch in signed object"
            ))
        }
        let msg = self.signed_attrs.encode_verify();
        self.cert.subject_public_key_info().verify(
            &msg, &self.signature
        ).map_err(Into::into)
    }
}


//------------ SignedAttrs ---------------------------------------------------

/// The raw signed attributes of a signed object.
///
/// The signature is calculated over the DER encoding of the attribute
/// set – with the regular SET OF tag, not the \[0\] appearing in the
/// message. A value of this type holds the captured content of the set
/// without tag and length so [`encode_verify`][Self::encode_verify] can
/// put the proper tag in front.
#[derive(Clone, Debug)]
pub struct SignedAttrs(Captured);

impl SignedAttrs {
    /// Takes the signed attributes from a constructed value.
    ///
    /// Returns the raw attributes, the content type, the message digest,
    /// and the optional signing time.
    #[allow(clippy::type_complexity)]
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<
        (Self, Oid<Bytes>, Bytes, Option<Time>),
        DecodeError<S::Error>
    > {
        let mut content_type = None;
        let mut message_digest = None;
        let mut signing_time = None;
        let raw = cons.take_constructed_if(Tag::CTX_0, |cons| {
            cons.capture(|cons| {
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    let oid = Oid::take_from(cons)?;
                    if oid == oid::CONTENT_TYPE {
                        if content_type.is_some() {
                            return Err(cons.content_err(
                                "duplicate Content Type attribute"
                            ))
                        }
                        content_type = Some(
                            cons.take_set(|cons| Oid::take_from(cons))?
                        );
                        Ok(())
                    }
                    else if oid == oid::MESSAGE_DIGEST {
                        if message_digest.is_some() {
                            return Err(cons.content_err(
                                "duplicate Message Digest attribute"
                            ))
                        }
                        message_digest = Some(
                            cons.take_set(|cons| {
                                OctetString::take_from(cons)
                            })?
                        );
                        Ok(())
                    }
                    else if oid == oid::SIGNING_TIME {
                        if signing_time.is_some() {
                            return Err(cons.content_err(
                                "duplicate Signing Time attribute"
                            ))
                        }
                        signing_time = Some(
                            cons.take_set(Time::take_from)?
                        );
                        Ok(())
                    }
                    else {
                        Err(cons.content_err(
                            "unexpected signed attribute"
                        ))
                    }
                })? { }
                Ok(())
            })
        })?;
        if raw.len() > 0xFFFF {
            return Err(cons.content_err(
                "signed attributes over 65535 bytes not supported"
            ))
        }
        let content_type = match content_type {
            Some(some) => some,
            None => {
                return Err(cons.content_err(
                    "missing content type in signed attributes"
                ))
            }
        };
        let message_digest = match message_digest {
            Some(some) => some.into_bytes(),
            None => {
                return Err(cons.content_err(
                    "missing message digest in signed attributes"
                ))
            }
        };
        Ok((Self(raw), content_type, message_digest, signing_time))
    }

    /// Creates the message the signature is verified against.
    ///
    /// This is the captured attribute content with a SET tag and length
    /// in front. The length is limited to 65535 octets at parse time, so
    /// the long form never exceeds two length octets.
    pub fn encode_verify(&self) -> Vec<u8> {
        let len = self.0.len();
        let mut res = Vec::with_capacity(len + 4);
        res.push(0x31); // SET
        if len < 128 {
            res.push(len as u8)
        }
        else {
            res.push(0x82);
            res.push((len >> 8) as u8);
            res.push(len as u8);
        }
        res.extend_from_slice(self.0.as_ref());
        res
    }
}

impl AsRef<[u8]> for SignedAttrs {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}
