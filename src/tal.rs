//! Trust Anchor Locators.
//!
//! A TAL is a small text file pinning a trust anchor: one or more URIs
//! where the TA certificate can be fetched, a blank line, and the
//! base64-encoded SubjectPublicKeyInfo the fetched certificate must
//! carry. See [RFC 8630].
//!
//! [RFC 8630]: https://tools.ietf.org/html/rfc8630

use std::{fmt, io};
use std::fs::{read_dir, DirEntry, File, ReadDir};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use bcder::decode;
use bcder::decode::IntoSource;
use log::{debug, error, warn};
use crate::crypto::PublicKey;
use crate::uri;


//------------ Tal -----------------------------------------------------------

/// A trust anchor locator.
#[derive(Clone, Debug)]
pub struct Tal {
    /// The rsync URIs the TA certificate can be fetched from.
    uris: Vec<uri::Rsync>,

    /// The public key the TA certificate must have.
    key_info: PublicKey,

    /// Information shared by all certificates derived from this TAL.
    info: Arc<TalInfo>,
}

impl Tal {
    /// Returns an iterator over the TAL files in a directory.
    pub fn read_dir<P: AsRef<Path>>(path: P) -> Result<TalIter, io::Error> {
        read_dir(path).map(TalIter)
    }

    /// Reads a TAL from a reader using the path’s stem as its name.
    pub fn read<P: AsRef<Path>, R: Read>(
        path: P,
        reader: &mut R
    ) -> Result<Self, ReadError> {
        let name = match path.as_ref().file_stem() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return Err(ReadError::MissingName),
        };
        Self::read_named(name, reader)
    }

    /// Reads a TAL with the given name from a reader.
    pub fn read_named<R: Read>(
        name: String,
        reader: &mut R
    ) -> Result<Self, ReadError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut data = data.as_slice();
        // Comment lines may precede the URI section.
        while let Some(&ch) = data.first() {
            if ch == b'#' {
                Self::skip_line(&mut data)?;
            }
            else {
                break
            }
        }
        let mut uris = Vec::new();
        while let Some(line) = Self::take_line(&mut data)? {
            // Only rsync URIs can be fetched; skip everything else with
            // a warning.
            match uri::Rsync::from_slice(line) {
                Ok(uri) => uris.push(uri),
                Err(_) => {
                    warn!(
                        "TAL {}: skipping unsupported URI {}",
                        name, String::from_utf8_lossy(line)
                    );
                }
            }
        }
        if uris.is_empty() {
            return Err(ReadError::NoUris)
        }
        let data: Vec<_> = data.iter().filter_map(|b| {
            if b.is_ascii_whitespace() { None }
            else { Some(*b) }
        }).collect();
        let key_info = base64::decode(&data)?;
        let key_info = PublicKey::decode(key_info.as_slice().into_source())?;
        Ok(Tal {
            uris,
            key_info,
            info: Arc::new(TalInfo::from_name(name))
        })
    }

    fn skip_line(data: &mut &[u8]) -> Result<(), ReadError> {
        let mut split = data.splitn(2, |&ch| ch == b'\n');
        let _ = split.next().ok_or(ReadError::UnexpectedEof)?;
        *data = split.next().ok_or(ReadError::UnexpectedEof)?;
        Ok(())
    }

    /// Takes the next line, returning `None` on the blank separator.
    fn take_line<'a>(
        data: &mut &'a [u8]
    ) -> Result<Option<&'a [u8]>, ReadError> {
        let mut split = data.splitn(2, |&ch| ch == b'\n');
        let mut line = split.next().ok_or(ReadError::UnexpectedEof)?;
        *data = split.next().ok_or(ReadError::UnexpectedEof)?;
        if line.ends_with(b"\r") {
            line = line.split_last().map(|(_, rest)| rest).unwrap_or(line);
        }
        if line.is_empty() {
            Ok(None)
        }
        else {
            Ok(Some(line))
        }
    }
}

impl Tal {
    /// Returns an iterator over the URIs of the TAL.
    pub fn uris(&self) -> std::slice::Iter<uri::Rsync> {
        self.uris.iter()
    }

    /// Returns the public key the TA certificate must carry.
    pub fn key_info(&self) -> &PublicKey {
        &self.key_info
    }

    pub fn info(&self) -> &Arc<TalInfo> {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }
}


//------------ TalIter -------------------------------------------------------

/// An iterator over the TALs in a directory.
pub struct TalIter(ReadDir);

impl Iterator for TalIter {
    type Item = Result<Tal, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.0.next() {
                Some(Ok(entry)) => {
                    match next_entry(&entry) {
                        Ok(Some(res)) => return Some(Ok(res)),
                        Ok(None) => { }
                        Err(err) => {
                            error!("Bad trust anchor locator: {}", err);
                            return Some(Err(err))
                        }
                    }
                }
                Some(Err(err)) => return Some(Err(err.into())),
                None => return None
            };
        }
    }
}

fn next_entry(entry: &DirEntry) -> Result<Option<Tal>, ReadError> {
    if !entry.file_type()?.is_file() {
        return Ok(None)
    }
    let path = entry.path();
    if path.extension().map(|ext| ext != "tal").unwrap_or(true) {
        return Ok(None)
    }
    debug!("Processing TAL {}", path.display());
    Tal::read(&path, &mut File::open(&path)?).map(Some)
}


//------------ TalInfo -------------------------------------------------------

/// Information shared by all certificates derived from a single TAL.
#[derive(Clone, Debug)]
pub struct TalInfo {
    /// The name of the TAL, taken from its file name.
    name: String,
}

impl TalInfo {
    pub fn from_name(name: String) -> Self {
        TalInfo { name }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        self.name.as_ref()
    }
}


//------------ ReadError -----------------------------------------------------

/// An error happened while reading a TAL.
#[derive(Debug)]
pub enum ReadError {
    /// An IO error occurred.
    Io(io::Error),

    /// The TAL file ended unexpectedly.
    UnexpectedEof,

    /// The TAL file name provides no TAL name.
    MissingName,

    /// The TAL contained no usable URI.
    NoUris,

    /// The key info was not correct base64.
    BadBase64(base64::DecodeError),

    /// The key info was not a valid SubjectPublicKeyInfo.
    BadKeyInfo(decode::DecodeError<std::convert::Infallible>),
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> ReadError {
        ReadError::Io(err)
    }
}

impl From<base64::DecodeError> for ReadError {
    fn from(err: base64::DecodeError) -> ReadError {
        ReadError::BadBase64(err)
    }
}

impl From<decode::DecodeError<std::convert::Infallible>> for ReadError {
    fn from(err: decode::DecodeError<std::convert::Infallible>) -> Self {
        ReadError::BadKeyInfo(err)
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReadError::Io(ref err) => err.fmt(f),
            ReadError::UnexpectedEof => {
                f.write_str("unexpected end of file")
            }
            ReadError::MissingName => {
                f.write_str("file name provides no TAL name")
            }
            ReadError::NoUris => {
                f.write_str("no usable trust anchor URI")
            }
            ReadError::BadBase64(ref err) => {
                write!(f, "bad key info: {}", err)
            }
            ReadError::BadKeyInfo(ref err) => {
                write!(f, "bad key info: {}", err)
            }
        }
    }
}

impl std::error::Error for ReadError { }


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // A 2048 bit RSA SubjectPublicKeyInfo, base64 encoded.
    const KEY_INFO: &str =
        "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA0iPDwyc1ZbrUCQUgdZMV\
         WxhvUCCH6WzNRKvpRtrT9agMyild/K6ML16kQUXGtuu9dMBP7P9uIHWIMMtHbXXS\
         qbyYGv08adjzHmzWfUdBT0OdRCPDeWYRh1LMWLYH5HVCkx5uFbPbjPBXz0HLfRSR\
         9udYSMIvLHx0kJBQnSMYsQZKcXZUIHCHiZQCHHBcdZMbhnRvvczP1fgnob/36hnx\
         BqXzLMSHi4zbh6u1yu3sTLIcXQHAnb2m9nE4iM6hMvbAhhWp+nXGbvBM+nkxufYn\
         F5OBkCmdKHbRXWmHX9aJfinhCnotUYZLsgRfKSOYW2VMSAGaSKIh+mqq8y9kUJ0d\
         vQIDAQAB";

    fn tal_bytes() -> Vec<u8> {
        let mut res = Vec::new();
        res.extend_from_slice(b"# example trust anchor\n");
        res.extend_from_slice(b"rsync://example.com/ta/root.cer\n");
        res.extend_from_slice(b"https://example.com/ta/root.cer\n");
        res.extend_from_slice(b"\n");
        res.extend_from_slice(KEY_INFO.as_bytes());
        res.extend_from_slice(b"\n");
        res
    }

    #[test]
    fn read_tal() {
        let data = tal_bytes();
        let tal = Tal::read_named(
            "example".into(), &mut data.as_slice()
        ).unwrap();
        assert_eq!(tal.name(), "example");
        // The HTTPS URI is skipped; only the rsync URI remains.
        assert_eq!(
            tal.uris().map(ToString::to_string).collect::<Vec<_>>(),
            ["rsync://example.com/ta/root.cer"]
        );
        assert_eq!(
            tal.key_info().key_identifier(),
            tal.key_info().key_identifier()
        );
    }

    #[test]
    fn reject_empty_tal() {
        assert!(matches!(
            Tal::read_named("empty".into(), &mut b"\nZm9v".as_ref()),
            Err(ReadError::NoUris)
        ));
    }
}
