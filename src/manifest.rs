//! RPKI manifests.
//!
//! A manifest lists all the files a CA currently publishes together with
//! their SHA-256 hashes, so a relying party can tell a complete,
//! untampered publication point from a broken or stale one. Manifests
//! are specified in [RFC 6486].
//!
//! [RFC 6486]: https://tools.ietf.org/html/rfc6486

use std::{fmt, str};
use std::path::Path;
use bcder::{decode, BitString, OctetString, Tag, Unsigned};
use bcder::decode::{DecodeError, IntoSource, Source};
use bytes::Bytes;
use crate::oid;
use crate::cert::{Cert, ResourceCert};
use crate::sigobj::SignedObject;
use crate::x509::{Time, ValidationError, VerificationError};


//------------ Manifest ------------------------------------------------------

/// A decoded manifest.
///
/// To get to the content, validate the manifest via
/// [`process`][Self::process].
#[derive(Clone, Debug)]
pub struct Manifest {
    signed: SignedObject,
    content: ManifestContent,
}

impl Manifest {
    /// Decodes a manifest from a source.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        let signed = SignedObject::decode_if_type(
            source, &oid::CT_RPKI_MANIFEST,
        )?;
        let content = signed.decode_content(
            ManifestContent::take_from
        ).map_err(DecodeError::convert)?;
        Ok(Manifest { signed, content })
    }

    /// Returns the EE certificate the manifest was signed with.
    ///
    /// The certificate has not been validated yet; this is primarily
    /// useful to find the CRL of the publication point before
    /// validation can run.
    pub fn cert(&self) -> &Cert {
        self.signed.cert()
    }

    /// Validates the manifest.
    ///
    /// On success returns the EE certificate the manifest was signed
    /// with and the manifest content.
    pub fn process<F>(
        self,
        issuer: &ResourceCert,
        now: Time,
        check_crl: F,
    ) -> Result<(ResourceCert, ManifestContent), ValidationError>
    where F: FnOnce(&Cert) -> Result<(), ValidationError> {
        let cert = self.signed.process(issuer, now, check_crl)?;
        Ok((cert, self.content))
    }
}


//------------ ManifestContent -----------------------------------------------

/// The content of a manifest.
#[derive(Clone, Debug)]
pub struct ManifestContent {
    /// The number of this manifest.
    manifest_number: Unsigned,

    /// The time this iteration of the manifest was created.
    this_update: Time,

    /// The time the next iteration is likely to be created.
    next_update: Time,

    /// The files the issuing CA vouches for.
    files: Vec<FileAndHash>,
}

impl ManifestContent {
    /// Parses the manifest content.
    ///
    /// ```text
    /// Manifest        ::= SEQUENCE {
    ///     version         [0] INTEGER DEFAULT 0,
    ///     manifestNumber  INTEGER (0..MAX),
    ///     thisUpdate      GeneralizedTime,
    ///     nextUpdate      GeneralizedTime,
    ///     fileHashAlg     OBJECT IDENTIFIER,
    ///     fileList        SEQUENCE SIZE (0..MAX) OF FileAndHash }
    /// ```
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            cons.take_opt_constructed_if(
                Tag::CTX_0, |cons| cons.skip_u8_if(0)
            )?;
            let manifest_number = Unsigned::take_from(cons)?;
            let this_update = Time::take_from(cons)?;
            let next_update = Time::take_from(cons)?;
            if this_update > next_update {
                return Err(cons.content_err(
                    "manifest thisUpdate after nextUpdate"
                ))
            }
            crate::crypto::DigestAlgorithm::take_oid_from(cons)?;
            let mut files = Vec::new();
            cons.take_sequence(|cons| {
                while let Some(item) = FileAndHash::take_opt_from(cons)? {
                    files.push(item);
                }
                Ok(())
            })?;
            Ok(ManifestContent {
                manifest_number, this_update, next_update, files
            })
        })
    }

    pub fn manifest_number(&self) -> &Unsigned {
        &self.manifest_number
    }

    pub fn this_update(&self) -> Time {
        self.this_update
    }

    pub fn next_update(&self) -> Time {
        self.next_update
    }

    /// Returns the number of entries in the file list.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns an iterator over the files in listed order.
    pub fn iter(&self) -> impl Iterator<Item = &FileAndHash> {
        self.files.iter()
    }

    /// Returns whether the manifest window covers the given time.
    pub fn is_current(&self, now: Time) -> bool {
        self.this_update <= now && now < self.next_update
    }

    /// Returns whether the manifest is stale at the given time.
    pub fn is_stale(&self, now: Time) -> bool {
        self.next_update < now
    }
}


//------------ FileAndHash ---------------------------------------------------

/// An entry in the file list of a manifest.
#[derive(Clone, Debug)]
pub struct FileAndHash {
    /// The name of the file.
    file: Bytes,

    /// The SHA-256 hash over the file’s content.
    hash: ManifestHash,
}

impl FileAndHash {
    /// Takes an optional entry from a constructed value.
    ///
    /// File names must be simple: ASCII without path separators, so an
    /// entry can never escape its publication point.
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let file = cons.take_value_if(
                Tag::IA5_STRING,
                OctetString::from_content
            )?.into_bytes();
            if file.is_empty()
                || !file.is_ascii()
                || file.contains(&b'/')
                || file.contains(&b'\\')
                || file.as_ref() == b"."
                || file.as_ref() == b".."
            {
                return Err(cons.content_err(
                    "invalid file name on manifest"
                ))
            }
            let hash = BitString::take_from(cons)?;
            if hash.bit_len() != 256 {
                return Err(cons.content_err(
                    "invalid hash length on manifest"
                ))
            }
            Ok(FileAndHash {
                file,
                hash: ManifestHash(hash.octet_bytes()),
            })
        })
    }

    /// Returns the file name.
    pub fn file(&self) -> &str {
        // Checked to be ASCII at parse time.
        unsafe { str::from_utf8_unchecked(self.file.as_ref()) }
    }

    /// Returns the expected hash of the file.
    pub fn hash(&self) -> &ManifestHash {
        &self.hash
    }
}


//------------ ManifestHash --------------------------------------------------

/// A SHA-256 hash from a manifest file list.
#[derive(Clone, Debug)]
pub struct ManifestHash(Bytes);

impl ManifestHash {
    /// Checks that the content of the file at `path` hashes to this value.
    ///
    /// The file is digested block-wise, so even the largest object is
    /// checked in constant memory.
    pub fn verify_file(
        &self, path: impl AsRef<Path>
    ) -> Result<(), VerificationError> {
        let digest = crate::crypto::DigestAlgorithm::sha256()
            .digest_file(path)
            .map_err(|err| {
                VerificationError::new(
                    format!("listed on manifest but unreadable: {}", err)
                )
            })?;
        ring::constant_time::verify_slices_are_equal(
            self.0.as_ref(),
            digest.as_ref()
        ).map_err(|_| {
            VerificationError::new("file hash mismatch with manifest")
        })
    }
}

impl fmt::Display for ManifestHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for ch in self.0.as_ref() {
            write!(f, "{:02x}", ch)?;
        }
        Ok(())
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use bcder::encode;
    use bcder::encode::{PrimitiveContent, Values};
    use bcder::Mode;
    use super::*;

    fn encode_content(files: &[(&[u8], [u8; 32])]) -> Vec<u8> {
        let mut file_list = bcder::Captured::builder(Mode::Der);
        for (name, hash) in files {
            file_list.extend(encode::sequence((
                OctetString::encode_slice_as(*name, Tag::IA5_STRING),
                BitString::encode_slice(hash, 0),
            )));
        }
        encode::sequence((
            12u32.encode(),
            OctetString::encode_slice_as(
                b"20260101000000Z", Tag::GENERALIZED_TIME
            ),
            OctetString::encode_slice_as(
                b"20260108000000Z", Tag::GENERALIZED_TIME
            ),
            oid::SHA256.encode(),
            encode::sequence(file_list.freeze()),
        )).to_captured(Mode::Der).into_bytes().to_vec()
    }

    fn decode_content(
        data: &[u8]
    ) -> Result<ManifestContent, DecodeError<std::convert::Infallible>> {
        Mode::Der.decode(data, ManifestContent::take_from)
    }

    #[test]
    fn content_roundtrip() {
        let hash = [0xabu8; 32];
        let content = decode_content(&encode_content(&[
            (b"rta.mft", hash),
            (b"ca1.cer", hash),
            (b"route.roa", hash),
        ])).unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(
            content.iter().map(|item| item.file()).collect::<Vec<_>>(),
            ["rta.mft", "ca1.cer", "route.roa"]
        );
        assert_eq!(
            content.this_update(), Time::utc(2026, 1, 1, 0, 0, 0)
        );
        assert!(content.is_current(Time::utc(2026, 1, 3, 0, 0, 0)));
        assert!(content.is_stale(Time::utc(2026, 2, 1, 0, 0, 0)));
        assert!(!content.is_current(Time::utc(2026, 2, 1, 0, 0, 0)));
    }

    #[test]
    fn reject_path_separators() {
        let hash = [0u8; 32];
        assert!(decode_content(&encode_content(&[
            (b"../escape.cer", hash),
        ])).is_err());
        assert!(decode_content(&encode_content(&[
            (b"dir/inner.cer", hash),
        ])).is_err());
        assert!(decode_content(&encode_content(&[
            (b"", hash),
        ])).is_err());
    }

    #[test]
    fn hash_verify_file() {
        use std::io::Write;

        let data = b"some file content";
        let digest = crate::crypto::DigestAlgorithm::sha256().digest(data);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(digest.as_ref());
        let content = decode_content(&encode_content(&[
            (b"file.roa", hash),
        ])).unwrap();
        let entry = content.iter().next().unwrap();

        let mut good = tempfile::NamedTempFile::new().unwrap();
        good.write_all(data).unwrap();
        assert!(entry.hash().verify_file(good.path()).is_ok());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(b"other content").unwrap();
        assert!(entry.hash().verify_file(bad.path()).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(
            entry.hash().verify_file(dir.path().join("gone.roa")).is_err()
        );
    }
}
