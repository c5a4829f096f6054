//! Rsync URIs.
//!
//! RPKI repositories are published in an rsync namespace and all objects
//! reference each other through `rsync://` URIs. This module provides the
//! [`Rsync`] type for such URIs, split into the module part –
//! authority and first path component – that forms the unit of
//! synchronization, and the path below it.

use std::{fmt, hash, str};
use std::cmp::Ordering;
use std::str::FromStr;
use bytes::Bytes;


//------------ Rsync ---------------------------------------------------------

/// An rsync URI.
///
/// This implements a simplified form of the the rsync URI defined in RFC
/// 5781 which in turn references RFC 3986. Only absolute URIs including an
/// authority are allowed.
#[derive(Clone, Debug)]
pub struct Rsync {
    module: RsyncModule,
    path: Bytes,
}

impl Rsync {
    /// Creates a new URI from a module and a path.
    pub fn new(module: RsyncModule, path: Bytes) -> Self {
        Rsync { module, path }
    }

    pub fn from_string(s: String) -> Result<Self, Error> {
        Self::from_bytes(Bytes::from(s))
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        Self::from_bytes(Bytes::copy_from_slice(slice))
    }

    pub fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        if !is_uri_ascii(&bytes) {
            return Err(Error::NotAscii)
        }
        if !starts_with_ignore_case(&bytes, b"rsync://") {
            return Err(Error::BadScheme)
        }
        let _ = bytes.split_to(8);
        let (authority, module) = {
            let mut parts = bytes.splitn(3, |ch| *ch == b'/');
            let authority = match parts.next() {
                Some(part) => part.len(),
                None => return Err(Error::BadUri)
            };
            let module = match parts.next() {
                Some(part) => part.len(),
                None => return Err(Error::BadUri)
            };
            if parts.next().is_none() {
                return Err(Error::BadUri)
            }
            (authority, module)
        };
        if authority == 0 || module == 0 {
            return Err(Error::BadUri)
        }
        let authority = bytes.split_to(authority);
        let _ = bytes.split_to(1);
        let module = bytes.split_to(module);
        let _ = bytes.split_to(1);
        Ok(Rsync {
            module: RsyncModule::new(authority, module),
            path: bytes
        })
    }

    /// Returns a reference to the module of the URI.
    pub fn module(&self) -> &RsyncModule {
        &self.module
    }

    /// Returns a clone of the module of the URI.
    pub fn to_module(&self) -> RsyncModule {
        self.module.clone()
    }

    /// Returns the path of the URI below the module.
    pub fn path(&self) -> &str {
        unsafe { str::from_utf8_unchecked(self.path.as_ref()) }
    }

    /// Returns a new URI with `path` appended.
    ///
    /// If the current path isn’t empty, a slash is inserted between the
    /// paths.
    pub fn join(&self, path: &[u8]) -> Self {
        assert!(is_uri_ascii(path));
        let mut res = Vec::with_capacity(self.path.len() + path.len() + 1);
        if !self.path.is_empty() {
            res.extend_from_slice(self.path.as_ref());
            if !self.path.ends_with(b"/") {
                res.push(b'/')
            }
        }
        res.extend_from_slice(path);
        Rsync::new(self.module.clone(), res.into())
    }

    /// Returns the URI of the directory containing this URI’s target.
    pub fn parent(&self) -> Option<Self> {
        if self.path.is_empty() {
            return None
        }
        let bytes = match self.path.iter().rposition(|ch| *ch == b'/') {
            Some(idx) => self.path.slice(..idx + 1),
            None => Bytes::new(),
        };
        Some(Rsync::new(self.module.clone(), bytes))
    }

    /// Returns whether the URI’s path ends in `extension`.
    pub fn ends_with(&self, extension: &str) -> bool {
        self.path().ends_with(extension)
    }

    /// Returns the path of `other` relative to `self`, if there is one.
    pub fn relative_to<'a>(&self, other: &'a Rsync) -> Option<&'a [u8]> {
        if self.module != other.module {
            return None
        }
        if !other.path.starts_with(&self.path) {
            return None
        }
        let rest = &other.path.as_ref()[self.path.len()..];
        if self.path.is_empty() || self.path.ends_with(b"/") {
            Some(rest)
        }
        else if let Some(stripped) = rest.strip_prefix(b"/") {
            Some(stripped)
        }
        else {
            None
        }
    }

}


//--- PartialEq, Eq, Hash, PartialOrd, Ord

impl PartialEq for Rsync {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module && self.path == other.path
    }
}

impl Eq for Rsync { }

impl hash::Hash for Rsync {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.path.hash(state);
    }
}

impl PartialOrd for Rsync {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rsync {
    fn cmp(&self, other: &Self) -> Ordering {
        self.module.cmp(&other.module).then_with(|| {
            self.path.cmp(&other.path)
        })
    }
}


//--- FromStr and Display

impl FromStr for Rsync {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(s.as_bytes())
    }
}

impl fmt::Display for Rsync {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.module, self.path())
    }
}


//------------ RsyncModule ---------------------------------------------------

/// The module portion of an rsync URI.
///
/// Downloads happen per module, so this type serves as the key for the
/// synchronization state kept by the local cache.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RsyncModule {
    authority: Bytes,
    module: Bytes,
}

impl RsyncModule {
    /// Creates a new module from authority and module name.
    ///
    /// # Panics
    ///
    /// Both components must be cleared for use in a URI; the accessors
    /// below rely on it.
    pub fn new(authority: impl Into<Bytes>, module: impl Into<Bytes>) -> Self {
        let mut authority = authority.into();
        let module = module.into();
        assert!(is_uri_ascii(&authority));
        assert!(is_uri_ascii(&module));
        // The authority is case insensitive. Lowercase it so equal modules
        // compare equal.
        if authority.iter().any(u8::is_ascii_uppercase) {
            authority = authority.to_ascii_lowercase().into();
        }
        RsyncModule { authority, module }
    }

    /// Returns a URI for the root of the module.
    pub fn to_uri(&self) -> Rsync {
        Rsync {
            module: self.clone(),
            path: Bytes::new(),
        }
    }

    pub fn authority(&self) -> &str {
        unsafe { str::from_utf8_unchecked(self.authority.as_ref()) }
    }

    pub fn module(&self) -> &str {
        unsafe { str::from_utf8_unchecked(self.module.as_ref()) }
    }
}

impl fmt::Display for RsyncModule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rsync://{}/{}/", self.authority(), self.module())
    }
}


//------------ Helper Functions ----------------------------------------------

fn starts_with_ignore_case(s: &[u8], expected: &[u8]) -> bool {
    s.len() >= expected.len()
        && s[..expected.len()].eq_ignore_ascii_case(expected)
}

/// Returns whether the given octets are acceptable in a URI.
///
/// This is a conservative choice: visible ASCII without the delimiters
/// that would allow escaping into a different path.
pub fn is_uri_ascii(slice: impl AsRef<[u8]>) -> bool {
    slice.as_ref().iter().all(|&ch| {
        ch.is_ascii_graphic() && ch != b'"' && ch != b'<' && ch != b'>'
            && ch != b'\\' && ch != b'^' && ch != b'`' && ch != b'{'
            && ch != b'|' && ch != b'}'
    })
}


//------------ Error ---------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    NotAscii,
    BadScheme,
    BadUri,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Error::NotAscii => "invalid characters",
            Error::BadScheme => "invalid URI scheme",
            Error::BadUri => "invalid URI",
        })
    }
}

impl std::error::Error for Error { }


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_split() {
        let uri = Rsync::from_str(
            "rsync://rpki.example.net/repo/ta/child.cer"
        ).unwrap();
        assert_eq!(uri.module().authority(), "rpki.example.net");
        assert_eq!(uri.module().module(), "repo");
        assert_eq!(uri.path(), "ta/child.cer");
        assert_eq!(
            uri.to_string(),
            "rsync://rpki.example.net/repo/ta/child.cer"
        );
    }

    #[test]
    fn reject_bad_uris() {
        assert_eq!(
            Rsync::from_str("https://example.com/mod/p"),
            Err(Error::BadScheme)
        );
        assert_eq!(
            Rsync::from_str("rsync://example.com"),
            Err(Error::BadUri)
        );
        assert_eq!(
            Rsync::from_str("rsync://example.com/"),
            Err(Error::BadUri)
        );
        assert_eq!(
            Rsync::from_str("rsync:///module/path"),
            Err(Error::BadUri)
        );
    }

    #[test]
    fn case_insensitive_authority() {
        let left = Rsync::from_str("rsync://Example.Com/mod/a").unwrap();
        let right = Rsync::from_str("rsync://example.com/mod/a").unwrap();
        assert_eq!(left, right);
        assert_eq!(left.module(), right.module());
    }

    #[test]
    fn join() {
        let base = Rsync::from_str("rsync://example.com/mod/dir").unwrap();
        assert_eq!(
            base.join(b"file.cer").to_string(),
            "rsync://example.com/mod/dir/file.cer"
        );
        let root = Rsync::from_str("rsync://example.com/mod/").unwrap();
        assert_eq!(
            root.join(b"file.cer").to_string(),
            "rsync://example.com/mod/file.cer"
        );
    }

    #[test]
    fn parent() {
        let uri = Rsync::from_str("rsync://example.com/mod/a/b.cer").unwrap();
        assert_eq!(
            uri.parent().unwrap().to_string(),
            "rsync://example.com/mod/a/"
        );
        assert_eq!(
            Rsync::from_str("rsync://example.com/mod/b.cer").unwrap()
                .parent().unwrap().to_string(),
            "rsync://example.com/mod/"
        );
    }

    #[test]
    fn relative_to() {
        let base = Rsync::from_str("rsync://example.com/mod/repo/").unwrap();
        let inner = Rsync::from_str(
            "rsync://example.com/mod/repo/sub/x.roa"
        ).unwrap();
        assert_eq!(base.relative_to(&inner).unwrap(), b"sub/x.roa");
        let other = Rsync::from_str("rsync://example.com/other/x").unwrap();
        assert!(base.relative_to(&other).is_none());
    }

    #[test]
    fn ends_with() {
        let uri = Rsync::from_str("rsync://example.com/mod/x.roa").unwrap();
        assert!(uri.ends_with(".roa"));
        assert!(!uri.ends_with(".cer"));
    }
}
