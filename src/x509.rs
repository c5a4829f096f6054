//! Common X.509 building blocks.
//!
//! Names, serial numbers, times, validity periods, and the signed-data
//! wrapper shared by certificates and CRLs, plus the family of errors the
//! validation stages produce.

use std::{fmt, ops, str};
use std::str::FromStr;
use bcder::decode;
use bcder::{BitString, Captured, Mode, Tag, Unsigned};
use bcder::decode::{DecodeError, IntoSource, Source};
use chrono::{DateTime, Datelike, LocalResult, TimeZone, Timelike, Utc};
use crate::crypto::{PublicKey, Signature, SignatureAlgorithm};


//------------ Name ----------------------------------------------------------

/// An X.509 distinguished name.
///
/// We only ever compare names and print them for diagnostics, so the
/// captured encoded form is all we keep.
#[derive(Clone, Debug)]
pub struct Name(Captured);

impl Name {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.capture_one().map(Name)
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for Name { }


//------------ Serial --------------------------------------------------------

/// A certificate serial number.
//
//  Kept as 20 octets left padded which is the maximum RFC 5280 allows.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Serial([u8; 20]);

impl Serial {
    /// Creates a serial number from an octet slice.
    pub fn from_slice(s: &[u8]) -> Result<Self, SerialError> {
        if s.is_empty() || s.len() > 20 {
            return Err(SerialError)
        }
        let mut res = <[u8; 20]>::default();
        res[20 - s.len()..].copy_from_slice(s);
        if res[0] & 0x80 != 0 {
            return Err(SerialError)
        }
        Ok(Serial(res))
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Unsigned::take_from(cons).and_then(|s| {
            Self::from_slice(s.as_ref()).map_err(|_| {
                cons.content_err("invalid certificate serial number")
            })
        })
    }
}

impl From<u64> for Serial {
    fn from(value: u64) -> Self {
        let mut res = <[u8; 20]>::default();
        res[12..].copy_from_slice(&value.to_be_bytes());
        Serial(res)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let start = self.0.iter().position(|&ch| ch != 0).unwrap_or(19);
        for ch in &self.0[start..] {
            write!(f, "{:02x}", ch)?;
        }
        Ok(())
    }
}


//------------ SignedData ----------------------------------------------------

/// The bundle of signed data, algorithm, and signature.
///
/// Both certificates and CRLs are a sequence of exactly these three
/// elements. The data is kept in captured form so the signature can later
/// be checked over the exact encoded octets.
#[derive(Clone, Debug)]
pub struct SignedData {
    data: Captured,
    signature: Signature,
}

impl SignedData {
    pub fn data(&self) -> &Captured {
        &self.data
    }

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

    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Ok(SignedData {
            data: cons.capture_one()?,
            signature: Signature::new(
                SignatureAlgorithm::x509_take_from(cons)?,
                BitString::take_from(cons)?.octet_bytes()
            )
        })
    }

    /// Verifies the signature over the data with the given key.
    pub fn verify_signature(
        &self,
        public_key: &PublicKey
    ) -> Result<(), VerificationError> {
        public_key.verify(
            self.data.as_ref(), &self.signature
        ).map_err(Into::into)
    }
}


//------------ Time ----------------------------------------------------------

/// A point in time.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Time(DateTime<Utc>);

impl Time {
    pub fn new(dt: DateTime<Utc>) -> Self {
        Time(dt)
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn utc(
        year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32
    ) -> Self {
        Self::from_parts((year, month, day, hour, min, sec))
            .expect("invalid date")
    }

    /// Takes a time value in either UTCTime or GeneralizedTime encoding.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| {
            match tag {
                Tag::UTC_TIME => {
                    // RFC 5280 requires the format YYMMDDHHMMSSZ.
                    let year = read_two_char(prim)? as i32;
                    let year = if year >= 50 { year + 1900 }
                               else { year + 2000 };
                    let res = (
                        year,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                    );
                    if prim.take_u8()? != b'Z' {
                        return Err(prim.content_err("malformed time value"))
                    }
                    Self::from_parts(res).ok_or_else(|| {
                        prim.content_err("malformed time value")
                    })
                }
                Tag::GENERALIZED_TIME => {
                    // RFC 5280 requires the format YYYYMMDDHHMMSSZ.
                    let res = (
                        read_four_char(prim)? as i32,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                    );
                    if prim.take_u8()? != b'Z' {
                        return Err(prim.content_err("malformed time value"))
                    }
                    Self::from_parts(res).ok_or_else(|| {
                        prim.content_err("malformed time value")
                    })
                }
                _ => Err(prim.content_err("malformed time value"))
            }
        })
    }

    fn from_parts(parts: (i32, u32, u32, u32, u32, u32)) -> Option<Self> {
        match Utc.with_ymd_and_hms(
            parts.0, parts.1, parts.2, parts.3, parts.4, parts.5
        ) {
            LocalResult::Single(dt) => Some(Time(dt)),
            _ => None
        }
    }

    pub fn verify_not_before(
        &self, now: Time
    ) -> Result<(), ValidityPeriodError> {
        if now.0 < self.0 {
            Err(ValidityPeriodError::NotYetValid)
        }
        else {
            Ok(())
        }
    }

    pub fn verify_not_after(
        &self, now: Time
    ) -> Result<(), ValidityPeriodError> {
        if now.0 > self.0 {
            Err(ValidityPeriodError::Expired)
        }
        else {
            Ok(())
        }
    }
}


//--- Deref, From

impl ops::Deref for Time {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(time: DateTime<Utc>) -> Self {
        Time(time)
    }
}


//--- Display

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.0.year(), self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}


fn read_two_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 2];
    s[0] = source.take_u8()?;
    s[1] = source.take_u8()?;
    let s = match str::from_utf8(&s[..]) {
        Ok(s) => s,
        Err(_) => return Err(source.content_err("malformed time value"))
    };
    u32::from_str(s).map_err(|_| {
        source.content_err("malformed time value")
    })
}

fn read_four_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 4];
    s[0] = source.take_u8()?;
    s[1] = source.take_u8()?;
    s[2] = source.take_u8()?;
    s[3] = source.take_u8()?;
    let s = match str::from_utf8(&s[..]) {
        Ok(s) => s,
        Err(_) => return Err(source.content_err("malformed time value"))
    };
    u32::from_str(s).map_err(|_| {
        source.content_err("malformed time value")
    })
}


//------------ Validity ------------------------------------------------------

/// The validity period of a certificate or similar object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Validity {
    not_before: Time,
    not_after: Time,
}

impl Validity {
    pub fn new(not_before: Time, not_after: Time) -> Self {
        Validity { not_before, not_after }
    }

    pub fn not_before(self) -> Time {
        self.not_before
    }

    pub fn not_after(self) -> Time {
        self.not_after
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(Validity::new(
                Time::take_from(cons)?,
                Time::take_from(cons)?,
            ))
        })
    }

    pub fn verify_at(self, now: Time) -> Result<(), ValidityPeriodError> {
        self.not_before.verify_not_before(now)?;
        self.not_after.verify_not_after(now)?;
        Ok(())
    }
}


//============ Errors ========================================================

//------------ SerialError ---------------------------------------------------

/// A certificate serial number was out of range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SerialError;

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid certificate serial number")
    }
}

impl std::error::Error for SerialError { }


//------------ ValidityPeriodError -------------------------------------------

/// The validity period did not contain the reference time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidityPeriodError {
    NotYetValid,
    Expired,
}

impl fmt::Display for ValidityPeriodError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ValidityPeriodError::NotYetValid => "certificate not yet valid",
            ValidityPeriodError::Expired => "certificate expired",
        })
    }
}

impl std::error::Error for ValidityPeriodError { }


//------------ InspectionError -----------------------------------------------

/// An object did not conform to the RPKI profile.
#[derive(Clone, Debug)]
pub struct InspectionError(String);

impl InspectionError {
    pub fn new(msg: impl Into<String>) -> Self {
        InspectionError(msg.into())
    }
}

impl fmt::Display for InspectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InspectionError { }


//------------ VerificationError ---------------------------------------------

/// An object failed a cryptographic or semantic verification step.
#[derive(Clone, Debug)]
pub struct VerificationError(String);

impl VerificationError {
    pub fn new(msg: impl Into<String>) -> Self {
        VerificationError(msg.into())
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for VerificationError { }

impl From<crate::crypto::VerificationError> for VerificationError {
    fn from(err: crate::crypto::VerificationError) -> Self {
        VerificationError::new(err.to_string())
    }
}

impl From<ValidityPeriodError> for VerificationError {
    fn from(err: ValidityPeriodError) -> Self {
        VerificationError::new(err.to_string())
    }
}


//------------ ValidationError -----------------------------------------------

/// An object failed validation for any reason.
///
/// This is the error the walker sees. It distinguishes the classes the
/// rejection policy cares about and carries the message for the log line.
#[derive(Clone, Debug)]
pub enum ValidationError {
    /// The encoded object was malformed.
    InvalidInput(String),

    /// A digest or signature did not verify.
    CryptoFailure(String),

    /// Resources exceeded the issuer’s resources or inherit was illegal.
    ResourceViolation(String),

    /// The object is past its validity window.
    StaleObject(String),
}

impl ValidationError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ValidationError::InvalidInput(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        ValidationError::CryptoFailure(msg.into())
    }

    pub fn resources(msg: impl Into<String>) -> Self {
        ValidationError::ResourceViolation(msg.into())
    }

    pub fn stale(msg: impl Into<String>) -> Self {
        ValidationError::StaleObject(msg.into())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::InvalidInput(msg) => {
                write!(f, "invalid input: {}", msg)
            }
            ValidationError::CryptoFailure(msg) => {
                write!(f, "crypto failure: {}", msg)
            }
            ValidationError::ResourceViolation(msg) => {
                write!(f, "resource violation: {}", msg)
            }
            ValidationError::StaleObject(msg) => {
                write!(f, "stale object: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValidationError { }

impl From<InspectionError> for ValidationError {
    fn from(err: InspectionError) -> Self {
        ValidationError::InvalidInput(err.0)
    }
}

impl From<VerificationError> for ValidationError {
    fn from(err: VerificationError) -> Self {
        ValidationError::CryptoFailure(err.0)
    }
}

impl<S: fmt::Display> From<DecodeError<S>> for ValidationError {
    fn from(err: DecodeError<S>) -> Self {
        ValidationError::InvalidInput(err.to_string())
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use bcder::encode;
    use bcder::encode::Values;
    use super::*;

    #[test]
    fn serial_from_slice() {
        assert!(Serial::from_slice(&[]).is_err());
        assert!(Serial::from_slice(&[0x80]).is_err());
        assert!(Serial::from_slice(&[21; 21]).is_err());
        let serial = Serial::from_slice(&[0x12, 0x34]).unwrap();
        assert_eq!(serial.to_string(), "1234");
        assert_eq!(serial, Serial::from(0x1234u64));
    }

    #[test]
    fn validity_window() {
        let validity = Validity::new(
            Time::utc(2021, 2, 1, 0, 0, 0),
            Time::utc(2031, 2, 1, 0, 0, 0),
        );
        assert!(validity.verify_at(Time::utc(2026, 1, 1, 0, 0, 0)).is_ok());
        assert_eq!(
            validity.verify_at(Time::utc(2020, 1, 1, 0, 0, 0)),
            Err(ValidityPeriodError::NotYetValid)
        );
        assert_eq!(
            validity.verify_at(Time::utc(2032, 1, 1, 0, 0, 0)),
            Err(ValidityPeriodError::Expired)
        );
    }

    #[test]
    fn time_decode() {
        // 260214120000Z as UTCTime.
        let der = b"\x17\x0d260214120000Z";
        let time = Mode::Der.decode(
            der.as_ref(), Time::take_from
        ).unwrap();
        assert_eq!(time, Time::utc(2026, 2, 14, 12, 0, 0));

        // 20260214120000Z as GeneralizedTime.
        let der = b"\x18\x0f20260214120000Z";
        let time = Mode::Der.decode(
            der.as_ref(), Time::take_from
        ).unwrap();
        assert_eq!(time, Time::utc(2026, 2, 14, 12, 0, 0));

        assert!(
            Mode::Der.decode(
                b"\x17\x0d269914120000Z".as_ref(), Time::take_from
            ).is_err()
        );
    }

    #[test]
    fn validity_decode() {
        let der = encode::sequence((
            bcder::OctetString::encode_slice_as(
                b"260101000000Z", Tag::UTC_TIME
            ),
            bcder::OctetString::encode_slice_as(
                b"270101000000Z", Tag::UTC_TIME
            ),
        )).to_captured(Mode::Der);
        let validity = Mode::Der.decode(
            der.as_slice(), Validity::take_from
        ).unwrap();
        assert_eq!(validity.not_before(), Time::utc(2026, 1, 1, 0, 0, 0));
        assert_eq!(validity.not_after(), Time::utc(2027, 1, 1, 0, 0, 0));
    }
}
