//! Resource certificates.
//!
//! This module implements decoding and validation of the certificates
//! used within RPKI as profiled by [RFC 6487] and, for BGPsec router
//! certificates, [RFC 8209].
//!
//! The certificate chain is verified step by step right here: the
//! extensions the RPKI profile mandates – including the IP and AS
//! resource extensions – are parsed first-class, so no generic X.509
//! verifier with extension callbacks is involved anywhere.
//!
//! Validation happens in two steps named consistently across methods:
//! _inspection_ checks that a certificate conforms to the profile by
//! itself, _verification_ checks that it was properly issued. The
//! `validate_*` methods run both and, on success, return a
//! [`ResourceCert`] which pairs the certificate with its fully resolved
//! resources.
//!
//! [RFC 6487]: https://tools.ietf.org/html/rfc6487
//! [RFC 8209]: https://tools.ietf.org/html/rfc8209

use std::ops;
use std::sync::Arc;
use bcder::{decode, BitString, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bytes::Bytes;
use crate::{oid, uri};
use crate::crypto::{KeyIdentifier, PublicKey};
use crate::resources::{
    AsResources, IpResources, ResourceSet
};
use crate::tal::TalInfo;
use crate::x509::{
    InspectionError, Name, Serial, SignedData, Time, ValidationError,
    Validity, VerificationError,
};


//------------ Cert ----------------------------------------------------------

/// A resource certificate.
///
/// A value of this type can be a CA certificate appearing in its own
/// repository file, an EE certificate embedded in a signed object, a
/// BGPsec router certificate, or an installed trust anchor. Decoding only
/// checks the encoding; which kind the certificate actually is gets
/// decided by the `validate_*` method applied to it.
#[derive(Clone, Debug)]
pub struct Cert {
    /// The outer structure of the certificate.
    signed_data: SignedData,

    /// The data of the certificate.
    tbs: TbsCert,
}

/// # Decoding
///
impl Cert {
    /// Decodes a source as a certificate.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes an encoded certificate from the beginning of a value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Parses the content of a Certificate sequence.
    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let signed_data = SignedData::from_constructed(cons)?;
        let tbs = signed_data.data().clone().decode(
            TbsCert::from_constructed
        ).map_err(DecodeError::convert)?;
        Ok(Self { signed_data, tbs })
    }
}

/// # Validation
///
impl Cert {
    /// Validates the certificate as a trust anchor.
    ///
    /// The certificate must be a current, self-signed CA certificate
    /// with literal, non-empty resources.
    pub fn validate_ta_at(
        self,
        tal: Arc<TalInfo>,
        now: Time,
    ) -> Result<ResourceCert, ValidationError> {
        self.inspect_ca()?;
        self.verify_validity(now)?;

        // A trust anchor must be self-signed: the authority key, if
        // present, must equal the subject key, and the signature must
        // verify under its own key.
        if let Some(aki) = self.tbs.authority_key_identifier {
            if aki != self.tbs.subject_key_identifier {
                return Err(VerificationError::new(
                    "trust anchor not self-signed"
                ).into())
            }
        }
        self.signed_data.verify_signature(
            &self.tbs.subject_public_key_info
        )?;

        // Trust anchors must not use inherit and must hold something.
        let resources = self.literal_resources()?;
        if resources.is_empty() {
            return Err(ValidationError::resources(
                "trust anchor without any resources"
            ))
        }

        Ok(ResourceCert { cert: self, resources, tal })
    }

    /// Validates the certificate as a CA certificate.
    ///
    /// On success returns the certificate with its resources resolved
    /// against and checked to be contained in the issuer’s.
    pub fn validate_ca_at(
        self,
        issuer: &ResourceCert,
        now: Time,
    ) -> Result<ResourceCert, ValidationError> {
        self.inspect_ca()?;
        if self.tbs.authority_key_identifier.is_none() {
            return Err(InspectionError::new(
                "missing Authority Key Identifier extension"
            ).into())
        }
        if self.tbs.crl_uri.is_none() {
            return Err(InspectionError::new(
                "missing CRL Distribution Points extension"
            ).into())
        }
        self.verify_validity(now)?;
        self.verify_issuer(issuer)?;
        let resources = self.verify_resources(issuer)?;
        Ok(ResourceCert {
            cert: self, resources, tal: issuer.tal.clone()
        })
    }

    /// Validates the certificate as the EE certificate of a signed object.
    pub fn validate_ee_at(
        self,
        issuer: &ResourceCert,
        now: Time,
    ) -> Result<ResourceCert, ValidationError> {
        self.inspect_ee()?;
        if self.tbs.signed_object.is_none() {
            return Err(InspectionError::new(
                "EE certificate lacks signed object URI"
            ).into())
        }
        if !self.tbs.subject_public_key_info.allow_rpki_cert() {
            return Err(InspectionError::new(
                "invalid key type in EE certificate"
            ).into())
        }
        self.verify_validity(now)?;
        self.verify_issuer(issuer)?;
        let resources = self.verify_resources(issuer)?;
        Ok(ResourceCert {
            cert: self, resources, tal: issuer.tal.clone()
        })
    }

    /// Validates the certificate as a BGPsec router certificate.
    ///
    /// Router certificates are EE certificates with the BGPsec router
    /// extended key usage, an ECDSA P-256 key, AS resources, and no IP
    /// resources.
    pub fn validate_router_at(
        self,
        issuer: &ResourceCert,
        now: Time,
    ) -> Result<ResourceCert, ValidationError> {
        self.inspect_ee()?;
        if !self.tbs.has_router_eku {
            return Err(InspectionError::new(
                "router certificate lacks BGPsec router key purpose"
            ).into())
        }
        if !self.tbs.subject_public_key_info.allow_router_cert() {
            return Err(InspectionError::new(
                "invalid key type in router certificate"
            ).into())
        }
        if self.tbs.v4_resources.is_present()
            || self.tbs.v6_resources.is_present()
        {
            return Err(InspectionError::new(
                "router certificate with IP resources"
            ).into())
        }
        if !self.tbs.as_resources.is_present() {
            return Err(InspectionError::new(
                "router certificate without AS resources"
            ).into())
        }
        self.verify_validity(now)?;
        self.verify_issuer(issuer)?;
        let resources = self.verify_resources(issuer)?;
        Ok(ResourceCert {
            cert: self, resources, tal: issuer.tal.clone()
        })
    }

    //--- Validation steps

    /// Inspects properties every CA certificate must have.
    fn inspect_ca(&self) -> Result<(), InspectionError> {
        if self.tbs.basic_ca != Some(true) {
            return Err(InspectionError::new(
                "CA certificate without cA Basic Constraint"
            ))
        }
        if self.tbs.key_usage != KeyUsage::Ca {
            return Err(InspectionError::new(
                "invalid Key Usage for CA certificate"
            ))
        }
        if self.tbs.ca_repository.is_none() {
            return Err(InspectionError::new(
                "CA certificate lacks repository URI"
            ))
        }
        if self.tbs.rpki_manifest.is_none() {
            return Err(InspectionError::new(
                "CA certificate lacks manifest URI"
            ))
        }
        Ok(())
    }

    /// Inspects properties every EE certificate must have.
    fn inspect_ee(&self) -> Result<(), InspectionError> {
        if self.tbs.basic_ca.is_some() {
            return Err(InspectionError::new(
                "EE certificate with Basic Constraints extension"
            ))
        }
        if self.tbs.key_usage != KeyUsage::Ee {
            return Err(InspectionError::new(
                "invalid Key Usage for EE certificate"
            ))
        }
        if self.tbs.authority_key_identifier.is_none() {
            return Err(InspectionError::new(
                "missing Authority Key Identifier extension"
            ))
        }
        if self.tbs.crl_uri.is_none() {
            return Err(InspectionError::new(
                "missing CRL Distribution Points extension"
            ))
        }
        Ok(())
    }

    /// Verifies that the validity window covers the given time.
    fn verify_validity(&self, now: Time) -> Result<(), VerificationError> {
        self.tbs.validity.verify_at(now).map_err(Into::into)
    }

    /// Verifies that the certificate was issued by the given issuer.
    fn verify_issuer(
        &self, issuer: &ResourceCert
    ) -> Result<(), VerificationError> {
        if self.tbs.authority_key_identifier
            != Some(issuer.cert.tbs.subject_key_identifier)
        {
            return Err(VerificationError::new(
                "authority key identifier does not match issuer"
            ))
        }
        if self.tbs.issuer != *issuer.subject() {
            return Err(VerificationError::new(
                "issuer name does not match issuing certificate"
            ))
        }
        self.signed_data.verify_signature(
            &issuer.cert.tbs.subject_public_key_info
        ).map_err(Into::into)
    }

    /// Resolves inherit and verifies resource containment.
    ///
    /// A certificate using inherit adopts the issuer’s resources of that
    /// family once, here; the returned set is literal from then on.
    fn verify_resources(
        &self, issuer: &ResourceCert
    ) -> Result<ResourceSet, ValidationError> {
        let v4 = match self.tbs.v4_resources.to_blocks() {
            Ok(blocks) => blocks,
            Err(_) => issuer.resources.v4().clone(),
        };
        let v6 = match self.tbs.v6_resources.to_blocks() {
            Ok(blocks) => blocks,
            Err(_) => issuer.resources.v6().clone(),
        };
        let asn = match self.tbs.as_resources.to_blocks() {
            Ok(blocks) => blocks,
            Err(_) => issuer.resources.asn().clone(),
        };
        let resources = ResourceSet::new(v4, v6, asn);
        if resources.is_empty() {
            return Err(ValidationError::resources(
                "certificate without any resources"
            ))
        }
        if !issuer.resources.contains(&resources) {
            return Err(ValidationError::resources(
                "certificate claims resources not held by issuer"
            ))
        }
        Ok(resources)
    }

    /// Returns the literal resources, failing on inherit.
    fn literal_resources(&self) -> Result<ResourceSet, ValidationError> {
        let err = || ValidationError::resources(
            "inherit resources on trust anchor"
        );
        Ok(ResourceSet::new(
            self.tbs.v4_resources.to_blocks().map_err(|_| err())?,
            self.tbs.v6_resources.to_blocks().map_err(|_| err())?,
            self.tbs.as_resources.to_blocks().map_err(|_| err())?,
        ))
    }
}


//--- Deref and AsRef

impl ops::Deref for Cert {
    type Target = TbsCert;

    fn deref(&self) -> &Self::Target {
        &self.tbs
    }
}

impl AsRef<TbsCert> for Cert {
    fn as_ref(&self) -> &TbsCert {
        &self.tbs
    }
}


//------------ TbsCert -------------------------------------------------------

/// The data of a certificate: the part the signature covers.
#[derive(Clone, Debug)]
pub struct TbsCert {
    /// The serial number.
    serial_number: Serial,

    /// The name of the issuer.
    issuer: Name,

    /// The validity of the certificate.
    validity: Validity,

    /// The name of the subject.
    subject: Name,

    /// The public key of the subject.
    subject_public_key_info: PublicKey,

    /// The cA flag of the Basic Constraints extension, if present.
    basic_ca: Option<bool>,

    /// The Subject Key Identifier extension.
    subject_key_identifier: KeyIdentifier,

    /// The Authority Key Identifier extension, if present.
    authority_key_identifier: Option<KeyIdentifier>,

    /// The Key Usage extension.
    key_usage: KeyUsage,

    /// Whether the Extended Key Usage names the BGPsec router purpose.
    has_router_eku: bool,

    /// The rsync URI of the issuing CA’s CRL.
    crl_uri: Option<uri::Rsync>,

    /// The rsync URI of the issuing CA’s certificate.
    ca_issuer: Option<uri::Rsync>,

    //--- Subject Information Access
    /// The rsync URI of the CA’s publication point.
    ca_repository: Option<uri::Rsync>,

    /// The rsync URI of the CA’s manifest.
    rpki_manifest: Option<uri::Rsync>,

    /// The rsync URI of the signed object an EE certificate signs.
    signed_object: Option<uri::Rsync>,

    /// The IPv4 resources.
    v4_resources: IpResources,

    /// The IPv6 resources.
    v6_resources: IpResources,

    /// The AS resources.
    as_resources: AsResources,
}

/// # Data Access
///
impl TbsCert {
    pub fn serial_number(&self) -> Serial {
        self.serial_number
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn subject(&self) -> &Name {
        &self.subject
    }

    pub fn subject_public_key_info(&self) -> &PublicKey {
        &self.subject_public_key_info
    }

    pub fn subject_key_identifier(&self) -> KeyIdentifier {
        self.subject_key_identifier
    }

    pub fn authority_key_identifier(&self) -> Option<KeyIdentifier> {
        self.authority_key_identifier
    }

    pub fn crl_uri(&self) -> Option<&uri::Rsync> {
        self.crl_uri.as_ref()
    }

    pub fn ca_issuer(&self) -> Option<&uri::Rsync> {
        self.ca_issuer.as_ref()
    }

    pub fn ca_repository(&self) -> Option<&uri::Rsync> {
        self.ca_repository.as_ref()
    }

    pub fn rpki_manifest(&self) -> Option<&uri::Rsync> {
        self.rpki_manifest.as_ref()
    }

    pub fn signed_object(&self) -> Option<&uri::Rsync> {
        self.signed_object.as_ref()
    }

    pub fn v4_resources(&self) -> &IpResources {
        &self.v4_resources
    }

    pub fn v6_resources(&self) -> &IpResources {
        &self.v6_resources
    }

    pub fn as_resources(&self) -> &AsResources {
        &self.as_resources
    }
}

/// # Decoding
///
impl TbsCert {
    /// Parses the content of a TBSCertificate sequence.
    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            // version [0] EXPLICIT Version DEFAULT v1 -- we need
            // extensions, so must be v3 which, confusingly, is 2.
            cons.take_constructed_if(Tag::CTX_0, |c| c.skip_u8_if(2))?;

            let serial_number = Serial::take_from(cons)?;
            let _sig_alg
                = crate::crypto::SignatureAlgorithm::x509_take_from(cons)?;
            let issuer = Name::take_from(cons)?;
            let validity = Validity::take_from(cons)?;
            let subject = Name::take_from(cons)?;
            let subject_public_key_info = PublicKey::take_from(cons)?;

            // issuerUniqueID and subjectUniqueID are not allowed in
            // resource certificates, so extensions come next.

            let mut basic_ca = None;
            let mut subject_key_id = None;
            let mut authority_key_id = None;
            let mut key_usage = None;
            let mut has_router_eku = false;
            let mut eku_seen = false;
            let mut crl_uri = None;
            let mut ca_issuer = None;
            let mut sia = None;
            let mut policy_seen = false;
            let mut ip_resources = None;
            let mut as_resources = None;

            cons.take_constructed_if(Tag::CTX_3, |c| c.take_sequence(
                |cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let id = Oid::take_from(cons)?;
                        let critical
                            = cons.take_opt_bool()?.unwrap_or(false);
                        let value = OctetString::take_from(cons)?;
                        Mode::Der.decode(value, |cons| {
                            if id == oid::CE_BASIC_CONSTRAINTS {
                                Self::take_basic_constraints(
                                    cons, &mut basic_ca
                                )
                            }
                            else if id == oid::CE_SUBJECT_KEY_IDENTIFIER {
                                Self::take_one(
                                    cons, &mut subject_key_id,
                                    KeyIdentifier::take_from,
                                )
                            }
                            else if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                                Self::take_one(
                                    cons, &mut authority_key_id,
                                    Self::take_authority_key_identifier,
                                )
                            }
                            else if id == oid::CE_KEY_USAGE {
                                Self::take_one(
                                    cons, &mut key_usage,
                                    KeyUsage::take_from,
                                )
                            }
                            else if id == oid::CE_EXTENDED_KEY_USAGE {
                                Self::take_extended_key_usage(
                                    cons, &mut eku_seen,
                                    &mut has_router_eku,
                                )
                            }
                            else if id == oid::CE_CRL_DISTRIBUTION_POINTS {
                                Self::take_one(
                                    cons, &mut crl_uri,
                                    Self::take_crl_distribution_points,
                                )
                            }
                            else if id == oid::PE_AUTHORITY_INFO_ACCESS {
                                Self::take_one(
                                    cons, &mut ca_issuer,
                                    Self::take_authority_info_access,
                                )
                            }
                            else if id == oid::PE_SUBJECT_INFO_ACCESS {
                                Self::take_one(
                                    cons, &mut sia, Sia::take_from,
                                )
                            }
                            else if id == oid::CE_CERTIFICATE_POLICIES {
                                Self::take_certificate_policies(
                                    cons, &mut policy_seen
                                )
                            }
                            else if id == oid::PE_IP_ADDR_BLOCK {
                                Self::take_one(
                                    cons, &mut ip_resources,
                                    IpResources::take_families_from,
                                )
                            }
                            else if id == oid::PE_AUTONOMOUS_SYS_IDS {
                                Self::take_one(
                                    cons, &mut as_resources,
                                    AsResources::take_from,
                                )
                            }
                            else if critical {
                                Err(cons.content_err(
                                    "unexpected critical extension"
                                ))
                            }
                            else {
                                // RFC 5280 and RFC 6487 both allow
                                // skipping unknown non-critical
                                // extensions.
                                cons.skip_all()
                            }
                        }).map_err(DecodeError::convert)?;
                        Ok(())
                    })? { }
                    Ok(())
                }
            ))?;

            if ip_resources.is_none() && as_resources.is_none() {
                return Err(cons.content_err(
                    "both AS and IP resources extensions are missing"
                ))
            }
            if !policy_seen {
                return Err(cons.content_err(
                    "missing Certificate Policies extension"
                ))
            }
            let (v4_resources, v6_resources) = match ip_resources {
                Some((v4, v6)) => (v4, v6),
                None => (None, None)
            };
            let (ca_repository, rpki_manifest, signed_object) = match sia {
                Some(sia) => (
                    sia.ca_repository, sia.rpki_manifest, sia.signed_object
                ),
                None => (None, None, None)
            };

            Ok(TbsCert {
                serial_number,
                issuer,
                validity,
                subject,
                subject_public_key_info,
                basic_ca,
                subject_key_identifier: subject_key_id.ok_or_else(|| {
                    cons.content_err(
                        "missing Subject Key Identifier extension"
                    )
                })?,
                authority_key_identifier: authority_key_id,
                key_usage: key_usage.ok_or_else(|| {
                    cons.content_err("missing Key Usage extension")
                })?,
                has_router_eku,
                crl_uri,
                ca_issuer,
                ca_repository,
                rpki_manifest,
                signed_object,
                v4_resources: v4_resources.unwrap_or_else(
                    IpResources::missing
                ),
                v6_resources: v6_resources.unwrap_or_else(
                    IpResources::missing
                ),
                as_resources: as_resources.unwrap_or_else(
                    AsResources::missing
                ),
            })
        })
    }

    /// Parses an extension that may appear only once.
    fn take_one<S: decode::Source, T>(
        cons: &mut decode::Constructed<S>,
        slot: &mut Option<T>,
        op: impl FnOnce(
            &mut decode::Constructed<S>
        ) -> Result<T, DecodeError<S::Error>>,
    ) -> Result<(), DecodeError<S::Error>> {
        if slot.is_some() {
            return Err(cons.content_err("duplicate extension"))
        }
        *slot = Some(op(cons)?);
        Ok(())
    }

    /// Parses the Basic Constraints extension.
    ///
    /// ```text
    /// BasicConstraints ::= SEQUENCE {
    ///     cA                  BOOLEAN DEFAULT FALSE,
    ///     pathLenConstraint   INTEGER (0..MAX) OPTIONAL }
    /// ```
    ///
    /// The pathLenConstraint field must not be present.
    fn take_basic_constraints<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        basic_ca: &mut Option<bool>,
    ) -> Result<(), DecodeError<S::Error>> {
        if basic_ca.is_some() {
            return Err(cons.content_err(
                "duplicate Basic Constraints extension"
            ))
        }
        cons.take_sequence(|cons| {
            *basic_ca = Some(cons.take_opt_bool()?.unwrap_or(false));
            if cons.take_opt_u64()?.is_some() {
                Err(cons.content_err(
                    "pathLenConstraint in Basic Constraints extension"
                ))
            }
            else {
                Ok(())
            }
        })
    }

    /// Parses the Authority Key Identifier extension.
    ///
    /// ```text
    /// AuthorityKeyIdentifier ::= SEQUENCE {
    ///   keyIdentifier             [0] KeyIdentifier           OPTIONAL,
    ///   authorityCertIssuer       [1] GeneralNames            OPTIONAL,
    ///   authorityCertSerialNumber [2] CertificateSerialNumber OPTIONAL }
    /// ```
    ///
    /// Only the keyIdentifier field may be present.
    fn take_authority_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<KeyIdentifier, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            cons.take_value_if(Tag::CTX_0, KeyIdentifier::from_content)
        })
    }

    /// Parses the Extended Key Usage extension.
    ///
    /// ```text
    /// ExtKeyUsageSyntax ::= SEQUENCE SIZE (1..MAX) OF KeyPurposeId
    /// ```
    ///
    /// The only purpose we care about is the BGPsec router one.
    fn take_extended_key_usage<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        seen: &mut bool,
        has_router: &mut bool,
    ) -> Result<(), DecodeError<S::Error>> {
        if *seen {
            return Err(cons.content_err(
                "duplicate Extended Key Usage extension"
            ))
        }
        *seen = true;
        cons.take_sequence(|cons| {
            let mut any = false;
            while let Some(purpose) = Oid::take_opt_from(cons)? {
                any = true;
                if purpose == oid::KP_BGPSEC_ROUTER {
                    *has_router = true;
                }
            }
            if any {
                Ok(())
            }
            else {
                Err(cons.content_err("empty Extended Key Usage extension"))
            }
        })
    }

    /// Parses the CRL Distribution Points extension.
    ///
    /// The profile requires a single distribution point with only the
    /// fullName form of the distributionPoint field present.
    fn take_crl_distribution_points<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<uri::Rsync, DecodeError<S::Error>> {
        let res = cons.take_sequence(|cons| {      // DistributionPoints
            cons.take_sequence(|cons| {            // DistributionPoint
                cons.take_constructed_if(Tag::CTX_0, |cons| {
                    cons.take_constructed_if(Tag::CTX_0, |cons| {
                        take_general_names(cons)   // fullName
                    })
                })
            })
        })?;
        res.ok_or_else(|| {
            cons.content_err("no rsync URI in CRL Distribution Points")
        })
    }

    /// Parses the Authority Information Access extension.
    ///
    /// The profile requires a single description with the caIssuers
    /// method naming the certificate of the issuing CA.
    fn take_authority_info_access<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<uri::Rsync, DecodeError<S::Error>> {
        let res = cons.take_sequence(|cons| {
            cons.take_sequence(|cons| {
                oid::AD_CA_ISSUERS.skip_if(cons)?;
                take_general_names(cons)
            })
        })?;
        res.ok_or_else(|| {
            cons.content_err(
                "no rsync URI in Authority Information Access"
            )
        })
    }

    /// Parses the Certificate Policies extension.
    ///
    /// There must be exactly one policy and it must be the RPKI
    /// certificate policy of RFC 6484. Qualifiers are skipped.
    fn take_certificate_policies<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        seen: &mut bool,
    ) -> Result<(), DecodeError<S::Error>> {
        if *seen {
            return Err(cons.content_err(
                "duplicate Certificate Policies extension"
            ))
        }
        *seen = true;
        cons.take_sequence(|cons| {
            cons.take_sequence(|cons| {
                oid::CP_IPADDR_ASNUMBER.skip_if(cons).map_err(|_| {
                    cons.content_err("unexpected certificate policy")
                })?;
                cons.skip_all()
            })
        })
    }
}


//------------ Sia -----------------------------------------------------------

/// The content of the Subject Information Access extension.
#[derive(Clone, Debug, Default)]
struct Sia {
    ca_repository: Option<uri::Rsync>,
    rpki_manifest: Option<uri::Rsync>,
    signed_object: Option<uri::Rsync>,
}

impl Sia {
    /// Parses the extension value.
    ///
    /// ```text
    /// SubjectInfoAccessSyntax ::= SEQUENCE SIZE (1..MAX) OF
    ///                                 AccessDescription
    /// AccessDescription       ::= SEQUENCE {
    ///     accessMethod            OBJECT IDENTIFIER,
    ///     accessLocation          GeneralName }
    /// ```
    ///
    /// Access methods other than the ones we use – e.g. the RRDP
    /// notification URI – are skipped.
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let mut res = Sia::default();
        cons.take_sequence(|cons| {
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let method = Oid::take_from(cons)?;
                if method == oid::AD_CA_REPOSITORY {
                    let uri = take_general_names(cons)?;
                    if res.ca_repository.is_none() {
                        res.ca_repository = uri;
                    }
                }
                else if method == oid::AD_RPKI_MANIFEST {
                    let uri = take_general_names(cons)?;
                    if res.rpki_manifest.is_none() {
                        res.rpki_manifest = uri;
                    }
                }
                else if method == oid::AD_SIGNED_OBJECT {
                    let uri = take_general_names(cons)?;
                    if res.signed_object.is_none() {
                        res.signed_object = uri;
                    }
                }
                else {
                    cons.skip_all()?;
                }
                Ok(())
            })? { }
            Ok(())
        })?;
        Ok(res)
    }
}


//------------ GeneralNames --------------------------------------------------

/// Takes GeneralNames content, returning the first rsync URI among them.
///
/// The only name form appearing in RPKI certificates is the
/// uniformResourceIdentifier choice, a primitive with context tag 6.
/// Names that are no rsync URIs – HTTPS variants, say – are skipped.
fn take_general_names<S: decode::Source>(
    cons: &mut decode::Constructed<S>,
) -> Result<Option<uri::Rsync>, DecodeError<S::Error>> {
    let mut res = None;
    while let Some(()) = cons.take_opt_value_if(Tag::CTX_6, |content| {
        let octets = OctetString::from_content(content)?;
        if res.is_none() {
            if let Ok(uri) = uri::Rsync::from_bytes(octets.into_bytes()) {
                res = Some(uri);
            }
        }
        Ok(())
    })? { }
    Ok(res)
}


//------------ KeyUsage ------------------------------------------------------

/// The Key Usage of a certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyUsage {
    /// A CA certificate: keyCertSign and CRLSign are set.
    Ca,

    /// An EE certificate: digitalSignature is set.
    Ee,
}

impl KeyUsage {
    /// Parses the Key Usage extension value.
    ///
    /// ```text
    /// KeyUsage ::= BIT STRING {
    ///     digitalSignature (0), ... keyCertSign (5), cRLSign (6), ... }
    /// ```
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let bits = BitString::take_from(cons)?;
        if bits.bit(5) && bits.bit(6) {
            Ok(KeyUsage::Ca)
        }
        else if bits.bit(0) {
            Ok(KeyUsage::Ee)
        }
        else {
            Err(cons.content_err("invalid Key Usage"))
        }
    }
}


//------------ ResourceCert --------------------------------------------------

/// A validated certificate together with its resolved resources.
///
/// Values of this type are only ever created through the `validate_*`
/// methods on [`Cert`], so holding one proves the certificate has been
/// both inspected and verified. The resource set is literal: any inherit
/// the certificate used has been resolved against the issuer.
#[derive(Clone, Debug)]
pub struct ResourceCert {
    /// The certificate itself.
    cert: Cert,

    /// The resolved resources.
    resources: ResourceSet,

    /// Information about the TAL this certificate descends from.
    tal: Arc<TalInfo>,
}

impl ResourceCert {
    pub fn as_cert(&self) -> &Cert {
        &self.cert
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    pub fn tal(&self) -> &Arc<TalInfo> {
        &self.tal
    }

    /// Returns the subject public key as encoded SPKI bytes.
    pub fn spki_bytes(&self) -> Bytes {
        self.cert.subject_public_key_info().to_info_bytes()
    }
}

impl ops::Deref for ResourceCert {
    type Target = Cert;

    fn deref(&self) -> &Self::Target {
        &self.cert
    }
}

impl AsRef<Cert> for ResourceCert {
    fn as_ref(&self) -> &Cert {
        &self.cert
    }
}
