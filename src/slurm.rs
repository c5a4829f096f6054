//! Local exceptions for validated payload.
//!
//! SLURM – Simplified Local Internet Number Resource Management – lets
//! an operator remove entries from the validated data set and add their
//! own. The file format is the JSON document defined in [RFC 8416],
//! (de-)serialized via _serde_.
//!
//! [RFC 8416]: https://tools.ietf.org/html/rfc8416

use std::{fmt, fs, io};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::crypto::KeyIdentifier;
use crate::payload::{Payload, RouteOrigin, RouterKey};
use crate::resources::{Addr, Asn, Prefix};


//------------ LocalExceptions -----------------------------------------------

/// The local exceptions applied to every validation result.
///
/// This is a loaded SLURM file, or the neutral element if the operator
/// did not configure one.
#[derive(Clone, Debug, Default)]
pub struct LocalExceptions {
    file: SlurmFile,
}

impl LocalExceptions {
    /// Loads the exceptions from the given file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = fs::read(path)?;
        let file = SlurmFile::from_slice(&content)?;
        Ok(LocalExceptions { file })
    }

    /// Returns whether the given payload item should be dropped.
    pub fn drop_payload(&self, payload: &Payload) -> bool {
        self.file.filters.drop_payload(payload)
    }

    /// Returns an iterator over the locally asserted payload.
    pub fn assertions(&self) -> impl Iterator<Item = Payload> + '_ {
        self.file.assertions.iter_payload()
    }
}


//------------ SlurmFile -----------------------------------------------------

/// The content of a SLURM file.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize
)]
#[serde(deny_unknown_fields)]
pub struct SlurmFile {
    #[serde(rename = "slurmVersion")]
    version: SlurmVersion,

    #[serde(rename = "validationOutputFilters")]
    pub filters: ValidationOutputFilters,

    #[serde(rename = "locallyAddedAssertions")]
    pub assertions: LocallyAddedAssertions,
}

impl SlurmFile {
    /// Parses a SLURM file from a byte slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(slice)
    }

    /// Parses a SLURM file from a reader.
    pub fn from_reader(
        reader: impl io::Read
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }
}

impl FromStr for SlurmFile {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}


//------------ SlurmVersion --------------------------------------------------

/// The SLURM version of the file, required to be 1.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(try_from = "u8")]
struct SlurmVersion;

impl TryFrom<u8> for SlurmVersion {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == 1 {
            Ok(Self)
        }
        else {
            Err("slurmVersion must be 1")
        }
    }
}

impl Serialize for SlurmVersion {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(1)
    }
}


//------------ ValidationOutputFilters ---------------------------------------

/// The set of descriptions of entries to remove from the data set.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize
)]
#[serde(deny_unknown_fields)]
pub struct ValidationOutputFilters {
    /// Descriptions of route origins to remove.
    #[serde(rename = "prefixFilters")]
    pub prefix: Vec<PrefixFilter>,

    /// Descriptions of router keys to remove.
    #[serde(rename = "bgpsecFilters")]
    pub bgpsec: Vec<BgpsecFilter>,
}

impl ValidationOutputFilters {
    /// Returns whether any filter matches the given payload item.
    pub fn drop_payload(&self, payload: &Payload) -> bool {
        match payload {
            Payload::Origin(origin) => {
                self.prefix.iter().any(|filter| filter.matches(origin))
            }
            Payload::RouterKey(key) => {
                self.bgpsec.iter().any(|filter| filter.matches(key))
            }
        }
    }
}


//------------ PrefixFilter --------------------------------------------------

/// A description of route origins to remove.
///
/// Prefix and ASN are both optional; an absent field matches anything,
/// so a filter with only an ASN removes every VRP for that ASN. The
/// comment never takes part in matching.
// serde cannot flatten enums, so empty filters have to be allowed
// unless we write our own Deserialize impl. Which we don’t.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrefixFilter {
    /// The prefix covering the origins to remove.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<FilterPrefix>,

    /// The origin AS of the VRPs to remove.
    #[serde(with = "self::serde_opt_asn")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<Asn>,

    /// An optional comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl PrefixFilter {
    pub fn new(
        prefix: Option<FilterPrefix>,
        asn: Option<Asn>,
        comment: Option<String>,
    ) -> Self {
        PrefixFilter { prefix, asn, comment }
    }

    /// Returns whether the filter matches the given origin.
    fn matches(&self, origin: &RouteOrigin) -> bool {
        let prefix = self.prefix.as_ref().map(|prefix| {
            prefix.covers(origin)
        });
        let asn = self.asn.map(|asn| asn == origin.asn);
        match (prefix, asn) {
            (Some(prefix), Some(asn)) => prefix && asn,
            (Some(prefix), None) => prefix,
            (None, Some(asn)) => asn,
            (None, None) => false,
        }
    }
}


//------------ BgpsecFilter --------------------------------------------------

/// A description of router keys to remove.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize
)]
pub struct BgpsecFilter {
    /// The SKI of the keys to remove.
    #[serde(rename = "SKI")]
    #[serde(with = "self::serde_opt_key_identifier")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ski: Option<KeyIdentifier>,

    /// The AS whose keys are to be removed.
    #[serde(with = "self::serde_opt_asn")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<Asn>,

    /// An optional comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl BgpsecFilter {
    /// Returns whether the filter matches the given router key.
    fn matches(&self, key: &RouterKey) -> bool {
        let ski = self.ski.map(|ski| ski == key.key_identifier);
        let asn = self.asn.map(|asn| asn == key.asn);
        match (ski, asn) {
            (Some(ski), Some(asn)) => ski && asn,
            (Some(ski), None) => ski,
            (None, Some(asn)) => asn,
            (None, None) => false,
        }
    }
}


//------------ LocallyAddedAssertions ----------------------------------------

/// The set of payload items added to the data set.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize
)]
#[serde(deny_unknown_fields)]
pub struct LocallyAddedAssertions {
    /// The route origins to add.
    #[serde(rename = "prefixAssertions")]
    pub prefix: Vec<PrefixAssertion>,

    /// The router keys to add.
    #[serde(rename = "bgpsecAssertions")]
    pub bgpsec: Vec<BgpsecAssertion>,
}

impl LocallyAddedAssertions {
    /// Returns an iterator over the asserted payload items.
    pub fn iter_payload(&self) -> impl Iterator<Item = Payload> + '_ {
        self.prefix.iter().map(|item| item.to_payload()).chain(
            self.bgpsec.iter().map(|item| item.to_payload())
        )
    }
}


//------------ PrefixAssertion -----------------------------------------------

/// A route origin to add to the data set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrefixAssertion {
    /// The asserted prefix.
    pub prefix: FilterPrefix,

    /// The asserted maximum prefix length, if different.
    pub max_prefix_length: Option<u8>,

    /// The AS authorized to originate the prefix.
    pub asn: Asn,

    /// An optional comment.
    pub comment: Option<String>,
}

impl PrefixAssertion {
    fn to_payload(&self) -> Payload {
        Payload::Origin(RouteOrigin::new(
            self.prefix.addr,
            self.prefix.len,
            self.max_prefix_length.unwrap_or(self.prefix.len),
            self.asn,
        ))
    }
}

//--- Deserialize and Serialize
//
// The max prefix length needs to be checked against the prefix length
// and family, so this is hand-written.

impl<'de> Deserialize<'de> for PrefixAssertion {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        use serde::de;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        enum Fields { Prefix, Asn, MaxPrefixLength, Comment }

        struct StructVisitor;

        impl<'de> de::Visitor<'de> for StructVisitor {
            type Value = PrefixAssertion;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("PrefixAssertion struct")
            }

            fn visit_map<V: de::MapAccess<'de>>(
                self, mut map: V
            ) -> Result<Self::Value, V::Error> {
                let mut prefix: Option<FilterPrefix> = None;
                let mut asn: Option<u32> = None;
                let mut max_len: Option<u8> = None;
                let mut comment: Option<String> = None;

                while let Some(key) = map.next_key()? {
                    match key {
                        Fields::Prefix => {
                            if prefix.is_some() {
                                return Err(
                                    de::Error::duplicate_field("prefix")
                                );
                            }
                            prefix = Some(map.next_value()?);
                        }
                        Fields::Asn => {
                            if asn.is_some() {
                                return Err(
                                    de::Error::duplicate_field("asn")
                                );
                            }
                            asn = Some(map.next_value()?);
                        }
                        Fields::MaxPrefixLength => {
                            if max_len.is_some() {
                                return Err(de::Error::duplicate_field(
                                    "maxPrefixLength"
                                ));
                            }
                            max_len = Some(map.next_value()?);
                        }
                        Fields::Comment => {
                            if comment.is_some() {
                                return Err(
                                    de::Error::duplicate_field("comment")
                                );
                            }
                            comment = Some(map.next_value()?);
                        }
                    }
                }

                let prefix = prefix.ok_or_else(|| {
                    de::Error::missing_field("prefix")
                })?;
                let asn = asn.ok_or_else(|| {
                    de::Error::missing_field("asn")
                })?;
                if let Some(max_len) = max_len {
                    if max_len < prefix.len {
                        return Err(de::Error::custom(
                            "maxPrefixLength smaller than prefix length"
                        ));
                    }
                    if max_len > prefix.family_len() {
                        return Err(de::Error::custom(
                            "maxPrefixLength too large for address family"
                        ));
                    }
                }

                Ok(PrefixAssertion {
                    prefix,
                    max_prefix_length: max_len,
                    asn: asn.into(),
                    comment,
                })
            }
        }

        const FIELDS: &[&str] = &[
            "prefix", "asn", "maxPrefixLength", "comment"
        ];
        deserializer.deserialize_struct(
            "PrefixAssertion", FIELDS, StructVisitor
        )
    }
}

impl Serialize for PrefixAssertion {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let len = 2
            + usize::from(self.max_prefix_length.is_some())
            + usize::from(self.comment.is_some());
        let mut serializer = serializer.serialize_struct(
            "PrefixAssertion", len
        )?;
        serializer.serialize_field("prefix", &self.prefix)?;
        serializer.serialize_field("asn", &self.asn.into_u32())?;
        if let Some(max_len) = self.max_prefix_length {
            serializer.serialize_field("maxPrefixLength", &max_len)?;
        }
        if let Some(comment) = self.comment.as_ref() {
            serializer.serialize_field("comment", comment.as_str())?;
        }
        serializer.end()
    }
}


//------------ BgpsecAssertion -----------------------------------------------

/// A router key to add to the data set.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BgpsecAssertion {
    /// The AS using the key.
    #[serde(with = "self::serde_asn")]
    pub asn: Asn,

    /// The key’s subject key identifier.
    ///
    /// In the file this is “the Base64 encoding without trailing ‘=’
    /// (Section 5 of RFC 4648) of the certificate’s Subject Key
    /// Identifier.”
    #[serde(rename = "SKI")]
    #[serde(with = "self::serde_key_identifier")]
    pub ski: KeyIdentifier,

    /// The router’s public key, equally Base64 encoded.
    #[serde(rename = "routerPublicKey")]
    pub router_public_key: Base64Binary,

    /// An optional comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl BgpsecAssertion {
    fn to_payload(&self) -> Payload {
        Payload::RouterKey(RouterKey::new(
            self.ski,
            self.asn,
            self.router_public_key.0.clone(),
        ))
    }
}


//------------ FilterPrefix --------------------------------------------------

/// A prefix as it appears in SLURM filters and assertions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FilterPrefix {
    /// The address of the prefix.
    addr: IpAddr,

    /// The prefix length.
    len: u8,
}

impl FilterPrefix {
    /// Returns whether this prefix covers the given origin’s prefix.
    fn covers(&self, origin: &RouteOrigin) -> bool {
        if self.addr.is_ipv4() != origin.addr.is_ipv4() {
            return false
        }
        Prefix::new(Addr::from(self.addr), self.len)
            .covers(origin.prefix())
    }

    /// Returns the maximum prefix length of the prefix’s family.
    fn family_len(&self) -> u8 {
        if self.addr.is_ipv4() { 32 } else { 128 }
    }
}

impl FromStr for FilterPrefix {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let slash = s.find('/').ok_or("missing prefix length")?;
        let addr = IpAddr::from_str(&s[..slash]).map_err(|_| {
            "invalid address"
        })?;
        let len = u8::from_str(&s[slash + 1..]).map_err(|_| {
            "invalid prefix length"
        })?;
        let max_len = if addr.is_ipv4() { 32 } else { 128 };
        if len > max_len {
            return Err("prefix length too large")
        }
        // The host portion must be zero.
        let bits = Addr::from(addr);
        if bits.to_min(len) != bits {
            return Err("non-zero host portion")
        }
        Ok(FilterPrefix { addr, len })
    }
}

impl fmt::Display for FilterPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl<'de> Deserialize<'de> for FilterPrefix {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = FilterPrefix;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string with an IPv4 or IPv6 prefix")
            }

            fn visit_str<E: serde::de::Error>(
                self, v: &str
            ) -> Result<Self::Value, E> {
                FilterPrefix::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

impl Serialize for FilterPrefix {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}


//------------ Base64Binary --------------------------------------------------

/// Binary data encoded in Base64 when serialized.
///
/// The encoding uses the URL and filename safe alphabet without
/// trailing equals signs, as section 3.3 of RFC 8416 demands.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Base64Binary(Bytes);

impl Base64Binary {
    const BASE64_CONFIG: base64::Config = base64::Config::new(
        base64::CharacterSet::UrlSafe, false
    );
}

impl From<Vec<u8>> for Base64Binary {
    fn from(src: Vec<u8>) -> Self {
        Base64Binary(src.into())
    }
}

impl From<Bytes> for Base64Binary {
    fn from(src: Bytes) -> Self {
        Base64Binary(src)
    }
}

impl FromStr for Base64Binary {
    type Err = base64::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        base64::decode_config(s, Self::BASE64_CONFIG).map(Into::into)
    }
}

impl AsRef<[u8]> for Base64Binary {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for Base64Binary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        base64::display::Base64Display::with_config(
            self.0.as_ref(),
            Self::BASE64_CONFIG
        ).fmt(f)
    }
}

impl fmt::Debug for Base64Binary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Base64Binary")
            .field(&format_args!("{}", self))
            .finish()
    }
}

impl Serialize for Base64Binary {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Base64Binary {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = Base64Binary;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Base64 string")
            }

            fn visit_str<E: serde::de::Error>(
                self, v: &str
            ) -> Result<Self::Value, E> {
                Base64Binary::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}


//------------ LoadError -----------------------------------------------------

/// Loading local exceptions failed.
#[derive(Debug)]
pub enum LoadError {
    /// Reading the file failed.
    Io(io::Error),

    /// The file was not valid SLURM.
    Json(serde_json::Error),
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        LoadError::Io(err)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Json(err)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::Io(err) => err.fmt(f),
            LoadError::Json(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LoadError { }


//----------- Serialization of ASNs ------------------------------------------

mod serde_asn {
    use super::Asn;

    pub fn serialize<S: serde::Serializer>(
        asn: &Asn, serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(asn.into_u32())
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Asn, D::Error> {
        <u32 as serde::Deserialize>::deserialize(deserializer)
            .map(Into::into)
    }
}

mod serde_opt_asn {
    use super::Asn;

    pub fn serialize<S: serde::Serializer>(
        asn: &Option<Asn>, serializer: S
    ) -> Result<S::Ok, S::Error> {
        match asn.as_ref() {
            Some(asn) => serializer.serialize_u32(asn.into_u32()),
            None => serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Option<Asn>, D::Error> {
        <Option<u32> as serde::Deserialize>::deserialize(deserializer)
            .map(|ok| ok.map(Into::into))
    }
}


//----------- Serialization of Key Identifiers -------------------------------

mod serde_key_identifier {
    use std::fmt;
    use super::{Base64Binary, KeyIdentifier};

    pub fn serialize<S: serde::Serializer>(
        key_id: &KeyIdentifier, serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(
            &base64::encode_config(
                key_id.as_slice(), Base64Binary::BASE64_CONFIG
            )
        )
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<KeyIdentifier, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = KeyIdentifier;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Base64-encoded key identifier")
            }

            fn visit_str<E: serde::de::Error>(
                self, v: &str
            ) -> Result<Self::Value, E> {
                // A 20 byte key identifier is 27 Base64 characters
                // without padding.
                if v.len() != 27 {
                    return Err(E::custom(
                        "invalid length for key identifier"
                    ))
                }

                // 27 characters can decode into 20 or 21 bytes; the
                // length check below catches the latter.
                let mut buf = [0u8; 21];
                let len = base64::decode_config_slice(
                    v, Base64Binary::BASE64_CONFIG, &mut buf
                ).map_err(E::custom)?;

                KeyIdentifier::try_from(&buf[..len]).map_err(|_| {
                    E::custom("invalid length for key identifier")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

mod serde_opt_key_identifier {
    use super::KeyIdentifier;

    pub fn serialize<S: serde::Serializer>(
        key_id: &Option<KeyIdentifier>, serializer: S
    ) -> Result<S::Ok, S::Error> {
        match key_id.as_ref() {
            Some(key_id) => {
                super::serde_key_identifier::serialize(key_id, serializer)
            }
            None => serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Option<KeyIdentifier>, D::Error> {
        // By not accepting `None` here, the field can never be `null`
        // in the JSON.
        super::serde_key_identifier::deserialize(deserializer).map(Some)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use super::*;

    fn origin(
        addr: [u8; 4], len: u8, max: u8, asn: u32
    ) -> Payload {
        Payload::Origin(RouteOrigin::new(
            IpAddr::from(Ipv4Addr::from(addr)), len, max, asn.into()
        ))
    }

    #[test]
    fn parse_empty_slurm_file() {
        let json = r#"
            {
              "slurmVersion": 1,
              "validationOutputFilters": {
                "prefixFilters": [],
                "bgpsecFilters": []
              },
              "locallyAddedAssertions": {
                "prefixAssertions": [],
                "bgpsecAssertions": []
              }
            }
        "#;
        let file = SlurmFile::from_str(json).unwrap();
        assert!(file.filters.prefix.is_empty());
        assert!(file.filters.bgpsec.is_empty());
        assert!(file.assertions.prefix.is_empty());
        assert!(file.assertions.bgpsec.is_empty());
    }

    #[test]
    fn reject_wrong_version() {
        assert!(
            SlurmFile::from_str(r#"
                {
                  "slurmVersion": 2,
                  "validationOutputFilters": {
                    "prefixFilters": [], "bgpsecFilters": []
                  },
                  "locallyAddedAssertions": {
                    "prefixAssertions": [], "bgpsecAssertions": []
                  }
                }
            "#).is_err()
        );
    }

    #[test]
    fn filter_matching() {
        let json = r#"
            {
              "slurmVersion": 1,
              "validationOutputFilters": {
                "prefixFilters": [
                  { "prefix": "192.0.2.0/24",
                    "comment": "All VRPs encompassed by prefix" },
                  { "asn": 64496,
                    "comment": "All VRPs matching ASN" },
                  { "prefix": "198.51.100.0/24", "asn": 64497,
                    "comment": "Both must match" }
                ],
                "bgpsecFilters": []
              },
              "locallyAddedAssertions": {
                "prefixAssertions": [],
                "bgpsecAssertions": []
              }
            }
        "#;
        let file = SlurmFile::from_str(json).unwrap();

        // Covered by the prefix-only filter, any ASN.
        assert!(file.filters.drop_payload(
            &origin([192, 0, 2, 0], 25, 25, 64500)
        ));
        // Matches the ASN-only filter, any prefix.
        assert!(file.filters.drop_payload(
            &origin([203, 0, 113, 0], 24, 24, 64496)
        ));
        // Matches both fields of the combined filter.
        assert!(file.filters.drop_payload(
            &origin([198, 51, 100, 0], 24, 24, 64497)
        ));
        // Prefix of the combined filter but the wrong ASN.
        assert!(!file.filters.drop_payload(
            &origin([198, 51, 100, 0], 24, 24, 64498)
        ));
        // Nothing matches.
        assert!(!file.filters.drop_payload(
            &origin([203, 0, 113, 0], 24, 24, 64500)
        ));
    }

    #[test]
    fn bgpsec_filter_matching() {
        let json = r#"
            {
              "slurmVersion": 1,
              "validationOutputFilters": {
                "prefixFilters": [],
                "bgpsecFilters": [
                  { "asn": 64496, "comment": "All keys for ASN" }
                ]
              },
              "locallyAddedAssertions": {
                "prefixAssertions": [],
                "bgpsecAssertions": []
              }
            }
        "#;
        let file = SlurmFile::from_str(json).unwrap();
        let key = Payload::RouterKey(RouterKey::new(
            KeyIdentifier::from(*b"12345678901234567890"),
            64496.into(),
            Bytes::from_static(b"key data"),
        ));
        assert!(file.filters.drop_payload(&key));
        // A prefix filter for the same ASN must not drop router keys.
        assert!(!file.filters.drop_payload(
            &origin([192, 0, 2, 0], 24, 24, 64497)
        ));
    }

    #[test]
    fn assertions_to_payload() {
        let json = r#"
            {
              "slurmVersion": 1,
              "validationOutputFilters": {
                "prefixFilters": [],
                "bgpsecFilters": []
              },
              "locallyAddedAssertions": {
                "prefixAssertions": [
                  { "asn": 64496, "prefix": "198.51.100.0/24",
                    "comment": "My important route" },
                  { "asn": 64496, "prefix": "2001:db8::/32",
                    "maxPrefixLength": 48,
                    "comment": "My de-aggregated route" }
                ],
                "bgpsecAssertions": [
                  { "asn": 64496,
                    "SKI": "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA",
                    "routerPublicKey": "Zm9v" }
                ]
              }
            }
        "#;
        let file = SlurmFile::from_str(json).unwrap();
        let payload: Vec<_> = file.assertions.iter_payload().collect();
        assert_eq!(payload.len(), 3);
        assert_eq!(
            payload[0],
            origin([198, 51, 100, 0], 24, 24, 64496)
        );
        match &payload[2] {
            Payload::RouterKey(key) => {
                assert_eq!(key.asn, Asn::from(64496));
                assert_eq!(
                    key.key_identifier,
                    KeyIdentifier::from(*b"12345678901234567890")
                );
                assert_eq!(key.key_info.as_ref(), b"foo");
            }
            _ => panic!("expected router key"),
        }
    }

    #[test]
    fn reject_bad_assertions() {
        // maxPrefixLength smaller than the prefix length.
        assert!(SlurmFile::from_str(r#"
            {
              "slurmVersion": 1,
              "validationOutputFilters": {
                "prefixFilters": [], "bgpsecFilters": []
              },
              "locallyAddedAssertions": {
                "prefixAssertions": [
                  { "asn": 64496, "prefix": "198.51.100.0/24",
                    "maxPrefixLength": 20 }
                ],
                "bgpsecAssertions": []
              }
            }
        "#).is_err());

        // Non-zero host portion.
        assert!(SlurmFile::from_str(r#"
            {
              "slurmVersion": 1,
              "validationOutputFilters": {
                "prefixFilters": [], "bgpsecFilters": []
              },
              "locallyAddedAssertions": {
                "prefixAssertions": [
                  { "asn": 64496, "prefix": "198.51.100.1/24" }
                ],
                "bgpsecAssertions": []
              }
            }
        "#).is_err());
    }
}
