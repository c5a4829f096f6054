//! Crypto primitives: digests, keys, and signatures.
//!
//! RPKI limits the set of algorithms rather drastically: SHA-256 is the
//! only digest algorithm, RSA PKCS#1 the only signature algorithm for
//! repository objects, and ECDSA P-256 the only key type for BGPsec
//! router certificates. The types in this module encode exactly that and
//! refuse everything else with an unsupported-algorithm error.

use std::{fmt, io, str};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{BitString, Mode, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::{PrimitiveContent, Values};
use bytes::Bytes;
use ring::digest;
use ring::signature::{self, UnparsedPublicKey};
use crate::oid;

pub use ring::digest::Digest;


//------------ DigestAlgorithm -----------------------------------------------

/// The digest algorithms used by RPKI.
///
/// [RFC 7935] limits these to exactly one, SHA-256, so this type is a
/// zero-sized struct for now. Algorithm identifiers naming any other
/// algorithm fail to decode with an unsupported-algorithm error.
///
/// [RFC 7935]: https://tools.ietf.org/html/rfc7935
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DigestAlgorithm(());

impl DigestAlgorithm {
    /// Creates a value representing the SHA-256 algorithm.
    pub fn sha256() -> Self {
        DigestAlgorithm(())
    }

    /// Returns the digest size in octets for this algorithm.
    pub fn digest_len(self) -> usize {
        32
    }

    /// Returns the digest of `data` using this algorithm.
    pub fn digest(self, data: &[u8]) -> Digest {
        digest::digest(&digest::SHA256, data)
    }

    /// Calculates the digest of the content of a file.
    ///
    /// The file is read in blocks so arbitrarily large objects can be
    /// hashed in constant memory.
    pub fn digest_file(
        self, path: impl AsRef<Path>
    ) -> Result<Digest, io::Error> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; 8 * 1024];
        let mut ctx = self.start();
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            ctx.update(&buf[..read]);
        }
        Ok(ctx.finish())
    }

    /// Returns a digest context for multi-step calculation of the digest.
    pub fn start(self) -> Context {
        Context(digest::Context::new(&digest::SHA256))
    }
}

/// # ASN.1 Values
///
/// In certificates and signed objects the digest algorithm appears as an
/// `AlgorithmIdentifier` with optional absent-or-NULL parameters, either
/// alone or as the sole member of a set.
impl DigestAlgorithm {
    /// Takes and returns a single digest algorithm identifier.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Takes and returns an optional digest algorithm identifier.
    pub fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(Self::from_constructed)
    }

    /// Takes and returns a set of exactly one digest algorithm identifier.
    ///
    /// Section 2.1.2 of RFC 6488 limits the digestAlgorithms set of a
    /// signed object to a single allowed value.
    pub fn take_set_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_set(Self::take_from)
    }

    /// Takes a bare algorithm object identifier from a constructed value.
    pub fn take_oid_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        oid::SHA256.skip_if(cons).map_err(|_| {
            cons.content_err("unsupported digest algorithm")
        })?;
        Ok(Self::default())
    }

    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        oid::SHA256.skip_if(cons).map_err(|_| {
            cons.content_err("unsupported digest algorithm")
        })?;
        cons.take_opt_null()?;
        Ok(DigestAlgorithm::default())
    }
}


//------------ Context -------------------------------------------------------

/// A digest context for incremental digest calculation.
#[derive(Clone)]
pub struct Context(digest::Context);

impl Context {
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data)
    }

    pub fn finish(self) -> Digest {
        self.0.finish()
    }
}

impl io::Write for Context {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }
}


//------------ PublicKeyFormat -----------------------------------------------

/// The formats of public keys used by RPKI.
///
/// Repository certificates use 2048 bit RSA keys, BGPsec router
/// certificates use ECDSA P-256 keys. Both are represented here so the
/// verifier can accept the right kind in the right place.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PublicKeyFormat {
    /// An RSA public key.
    Rsa,

    /// An ECDSA public key on the P-256 curve.
    EcdsaP256,
}

impl PublicKeyFormat {
    /// Returns whether the key format is allowed for repository certificates.
    pub fn allow_rpki_cert(self) -> bool {
        matches!(self, PublicKeyFormat::Rsa)
    }

    /// Returns whether the key format is allowed for router certificates.
    pub fn allow_router_cert(self) -> bool {
        matches!(self, PublicKeyFormat::EcdsaP256)
    }

    /// Takes and returns an algorithm identifier.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let alg = bcder::Oid::take_from(cons)?;
        if alg == oid::RSA_ENCRYPTION {
            cons.take_opt_null()?;
            Ok(PublicKeyFormat::Rsa)
        }
        else if alg == oid::EC_PUBLIC_KEY {
            oid::SECP256R1.skip_if(cons).map_err(|_| {
                cons.content_err("unsupported elliptic curve")
            })?;
            Ok(PublicKeyFormat::EcdsaP256)
        }
        else {
            Err(cons.content_err("unsupported public key algorithm"))
        }
    }

    /// Provides an encoder for the algorithm identifier.
    pub fn encode(self) -> impl encode::Values {
        match self {
            PublicKeyFormat::Rsa => {
                encode::Choice2::One(encode::sequence((
                    oid::RSA_ENCRYPTION.encode(),
                    ().encode(),
                )))
            }
            PublicKeyFormat::EcdsaP256 => {
                encode::Choice2::Two(encode::sequence((
                    oid::EC_PUBLIC_KEY.encode(),
                    oid::SECP256R1.encode(),
                )))
            }
        }
    }
}


//------------ PublicKey -----------------------------------------------------

/// A public key as it appears in a `SubjectPublicKeyInfo` structure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey {
    algorithm: PublicKeyFormat,
    bits: BitString,
}

impl PublicKey {
    /// Returns the algorithm of this public key.
    pub fn algorithm(&self) -> PublicKeyFormat {
        self.algorithm
    }

    /// Returns the bits of this public key.
    pub fn bits(&self) -> &[u8] {
        // The bit string is guaranteed to have a full number of octets
        // by the decoder below.
        self.bits.octet_slice().unwrap()
    }

    /// Returns whether the key is acceptable for repository certificates.
    pub fn allow_rpki_cert(&self) -> bool {
        self.algorithm.allow_rpki_cert()
    }

    /// Returns whether the key is acceptable for router certificates.
    pub fn allow_router_cert(&self) -> bool {
        self.algorithm.allow_router_cert()
    }

    /// Returns the key identifier of this key.
    ///
    /// This is the SHA-1 hash over the key’s bits.
    pub fn key_identifier(&self) -> KeyIdentifier {
        KeyIdentifier::try_from(
            digest::digest(
                &digest::SHA1_FOR_LEGACY_USE_ONLY,
                self.bits()
            ).as_ref()
        ).unwrap()
    }

    /// Verifies a signature over `message` using this public key.
    pub fn verify(
        &self, message: &[u8], signature: &Signature
    ) -> Result<(), VerificationError> {
        if !self.allow_rpki_cert() {
            return Err(VerificationError)
        }
        UnparsedPublicKey::new(
            &signature::RSA_PKCS1_2048_8192_SHA256,
            self.bits()
        ).verify(
            message, signature.value().as_ref()
        ).map_err(|_| VerificationError)
    }
}

/// # Decoding and Encoding
///
impl PublicKey {
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let algorithm = PublicKeyFormat::take_from(cons)?;
            let bits = BitString::take_from(cons)?;
            if bits.octet_slice().is_none() {
                return Err(cons.content_err(
                    "public key with incomplete final octet"
                ))
            }
            Ok(PublicKey { algorithm, bits })
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.algorithm.encode(),
            self.bits.encode_ref()
        ))
    }

    /// Returns the DER encoded `SubjectPublicKeyInfo` for this key.
    pub fn to_info_bytes(&self) -> Bytes {
        self.encode_ref().to_captured(Mode::Der).into_bytes()
    }
}


//------------ KeyIdentifier -------------------------------------------------

/// A key identifier: the SHA-1 hash over a public key’s bits.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KeyIdentifier([u8; 20]);

impl KeyIdentifier {
    /// Returns an octet slice of the key identifier’s value.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Takes an encoded key identifier from a constructed value.
    ///
    /// ```text
    /// KeyIdentifier ::= OCTET STRING
    /// ```
    ///
    /// The content must be exactly 20 octets.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_value_if(Tag::OCTET_STRING, Self::from_content)
    }

    /// Parses an encoded key identifier from encoded content.
    pub fn from_content<S: decode::Source>(
        content: &mut decode::Content<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let octets = bcder::OctetString::from_content(content)?;
        if let Some(slice) = octets.as_slice() {
            Self::try_from(slice).map_err(|_| {
                content.content_err("invalid key identifier length")
            })
        }
        else if octets.len() != 20 {
            Err(content.content_err("invalid key identifier length"))
        }
        else {
            let mut res = KeyIdentifier(Default::default());
            let mut pos = 0;
            for slice in &octets {
                let end = pos + slice.len();
                res.0[pos..end].copy_from_slice(slice);
                pos = end;
            }
            Ok(res)
        }
    }
}


//--- From and FromStr

impl From<[u8; 20]> for KeyIdentifier {
    fn from(src: [u8; 20]) -> Self {
        KeyIdentifier(src)
    }
}

impl<'a> TryFrom<&'a [u8]> for KeyIdentifier {
    type Error = RepresentationError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        value.try_into().map(KeyIdentifier).map_err(|_| RepresentationError)
    }
}

impl FromStr for KeyIdentifier {
    type Err = RepresentationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 40 || !value.is_ascii() {
            return Err(RepresentationError)
        }
        let mut res = KeyIdentifier(Default::default());
        for (pos, ch) in value.as_bytes().chunks(2).enumerate() {
            let ch = str::from_utf8(ch).map_err(|_| RepresentationError)?;
            res.0[pos] = u8::from_str_radix(ch, 16)
                .map_err(|_| RepresentationError)?;
        }
        Ok(res)
    }
}


//--- AsRef

impl AsRef<[u8]> for KeyIdentifier {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}


//--- Display and Debug

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for ch in self.0.iter() {
            write!(f, "{:02x}", ch)?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyIdentifier({})", self)
    }
}


//------------ SignatureAlgorithm --------------------------------------------

/// The signature algorithm used by RPKI.
///
/// This is `sha256WithRSAEncryption` everywhere. In the CMS
/// `signatureAlgorithm` field, `rsaEncryption` is tolerated as well as
/// required by RFC 7935.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignatureAlgorithm(());

impl SignatureAlgorithm {
    /// Takes a signature algorithm identifier as used in X.509.
    pub fn x509_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            oid::SHA256_WITH_RSA_ENCRYPTION.skip_if(cons).map_err(|_| {
                cons.content_err("unsupported signature algorithm")
            })?;
            cons.take_opt_null()?;
            Ok(SignatureAlgorithm(()))
        })
    }

    /// Takes a signature algorithm identifier as used in CMS.
    pub fn cms_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let alg = bcder::Oid::take_from(cons)?;
            if alg != oid::SHA256_WITH_RSA_ENCRYPTION
                && alg != oid::RSA_ENCRYPTION
            {
                return Err(cons.content_err(
                    "unsupported signature algorithm"
                ))
            }
            cons.take_opt_null()?;
            Ok(SignatureAlgorithm(()))
        })
    }
}


//------------ Signature -----------------------------------------------------

/// A signature together with its algorithm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    algorithm: SignatureAlgorithm,
    value: Bytes,
}

impl Signature {
    pub fn new(algorithm: SignatureAlgorithm, value: Bytes) -> Self {
        Signature { algorithm, value }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}


//------------ VerificationError ---------------------------------------------

/// A signature did not verify.
///
/// No further information is provided on purpose.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VerificationError;

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("signature verification failed")
    }
}

impl std::error::Error for VerificationError { }


//------------ RepresentationError -------------------------------------------

/// A value did not have the right textual or binary representation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RepresentationError;

impl fmt::Display for RepresentationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid representation")
    }
}

impl std::error::Error for RepresentationError { }


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;
    use super::*;

    #[test]
    fn digest_file_matches_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![0xabu8; 100 * 1024];
        file.write_all(&data).unwrap();
        let alg = DigestAlgorithm::sha256();
        assert_eq!(
            alg.digest_file(file.path()).unwrap().as_ref(),
            alg.digest(&data).as_ref()
        );
    }

    #[test]
    fn key_identifier_from_str() {
        let ki = KeyIdentifier::from_str(
            "0102030405060708090a0b0c0d0e0f1011121314"
        ).unwrap();
        assert_eq!(
            ki.as_slice(),
            &[
                1, 2, 3, 4, 5, 6, 7, 8, 9, 10,
                11, 12, 13, 14, 15, 16, 17, 18, 19, 20
            ]
        );
        assert_eq!(
            ki.to_string(),
            "0102030405060708090a0b0c0d0e0f1011121314"
        );
        assert!(KeyIdentifier::from_str("0102").is_err());
    }

    #[test]
    fn reject_short_key_identifier() {
        assert!(KeyIdentifier::try_from(b"too short".as_ref()).is_err());
        assert!(
            KeyIdentifier::try_from(
                b"12345678901234567890".as_ref()
            ).is_ok()
        );
    }
}
