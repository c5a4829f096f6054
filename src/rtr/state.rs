//! RTR session state.
//!
//! The state of an RTR session is a sixteen bit session ID, chosen when
//! the cache starts a new data set lineage, and a serial number that
//! increases with every revision of the set. Serial numbers follow the
//! special arithmetic of [RFC 1982], encapsulated in [`Serial`].
//!
//! [RFC 1982]: https://tools.ietf.org/html/rfc1982

use std::{cmp, fmt, hash, str};
use std::time::SystemTime;


//------------ State ---------------------------------------------------------

/// The state of an RTR session: session ID and serial number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct State {
    session: u16,
    serial: Serial,
}

impl State {
    /// Creates a state value for a new session.
    ///
    /// The session ID is the lower sixteen bits of the current Unix
    /// time, the serial starts at zero.
    pub fn new() -> Self {
        State {
            session: {
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map(|dur| dur.as_secs() as u16)
                    .unwrap_or(0)
            },
            serial: Serial(0),
        }
    }

    /// Creates a state value from its components.
    pub const fn from_parts(session: u16, serial: Serial) -> Self {
        State { session, serial }
    }

    /// Increases the serial number by one, wrapping as RFC 1982 allows.
    pub fn inc(&mut self) {
        self.serial = self.serial.add(1)
    }

    pub fn session(self) -> u16 {
        self.session
    }

    pub fn serial(self) -> Serial {
        self.serial
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}


//------------ Serial --------------------------------------------------------

/// A serial number.
///
/// Serial numbers are 32 bit integers with comparison and addition
/// defined by [RFC 1982] so values may wrap. Addition is only defined
/// for amounts up to `2^31 - 1`, which is why there is a dedicated
/// [`add`][Self::add] method rather than an `Add` impl that could panic
/// by surprise.
///
/// Comparison is partial: two values exactly half the number space
/// apart are not ordered.
///
/// [RFC 1982]: https://tools.ietf.org/html/rfc1982
#[derive(Clone, Copy, Debug)]
pub struct Serial(pub u32);

impl Serial {
    /// Adds `other` to `self`, wrapping around the number space.
    ///
    /// # Panics
    ///
    /// Panics if `other` is greater than `2^31 - 1`.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: u32) -> Self {
        assert!(other <= 0x7FFF_FFFF);
        Serial(self.0.wrapping_add(other))
    }

    pub fn into_u32(self) -> u32 {
        self.0
    }
}


//--- Default

impl Default for Serial {
    fn default() -> Self {
        Serial(0)
    }
}


//--- From and FromStr

impl From<u32> for Serial {
    fn from(value: u32) -> Serial {
        Serial(value)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> u32 {
        serial.0
    }
}

impl str::FromStr for Serial {
    type Err = <u32 as str::FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <u32 as str::FromStr>::from_str(s).map(Into::into)
    }
}


//--- Display

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


//--- PartialEq and Eq

impl PartialEq for Serial {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<u32> for Serial {
    fn eq(&self, other: &u32) -> bool {
        self.0.eq(other)
    }
}

impl Eq for Serial { }


//--- PartialOrd

impl cmp::PartialOrd for Serial {
    fn partial_cmp(&self, other: &Serial) -> Option<cmp::Ordering> {
        match self.0.cmp(&other.0) {
            cmp::Ordering::Equal => Some(cmp::Ordering::Equal),
            cmp::Ordering::Less => {
                let sub = other.0 - self.0;
                match sub.cmp(&0x8000_0000) {
                    cmp::Ordering::Less => Some(cmp::Ordering::Less),
                    cmp::Ordering::Greater => Some(cmp::Ordering::Greater),
                    _ => None
                }
            }
            cmp::Ordering::Greater => {
                let sub = self.0 - other.0;
                match sub.cmp(&0x8000_0000) {
                    cmp::Ordering::Less => Some(cmp::Ordering::Greater),
                    cmp::Ordering::Greater => Some(cmp::Ordering::Less),
                    _ => None
                }
            }
        }
    }
}


//--- Hash

impl hash::Hash for Serial {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn good_addition() {
        assert_eq!(Serial(0).add(4), Serial(4));
        assert_eq!(
            Serial(0xFF00_0000).add(0x0F00_0000),
            Serial(
                ((0xFF00_0000u64 + 0x0F00_0000u64) % 0x1_0000_0000) as u32
            )
        );
        assert_eq!(Serial(u32::MAX).add(1), Serial(0));
    }

    #[test]
    #[should_panic]
    fn bad_addition() {
        let _ = Serial(0).add(0x8000_0000);
    }

    #[test]
    fn comparison() {
        use std::cmp::Ordering::*;

        assert_eq!(Serial(12), Serial(12));
        assert_ne!(Serial(12), Serial(112));

        assert_eq!(Serial(12).partial_cmp(&Serial(12)), Some(Equal));

        // s1 < s2 if (i1 < i2 and i2 - i1 < 2^31)
        assert_eq!(Serial(12).partial_cmp(&Serial(13)), Some(Less));
        assert_ne!(
            Serial(12).partial_cmp(&Serial(3_000_000_012)), Some(Less)
        );

        // or (i1 > i2 and i1 - i2 > 2^31)
        assert_eq!(
            Serial(3_000_000_012).partial_cmp(&Serial(12)), Some(Less)
        );
        assert_ne!(Serial(13).partial_cmp(&Serial(12)), Some(Less));

        // s1 > s2 if (i1 < i2 and i2 - i1 > 2^31)
        assert_eq!(
            Serial(12).partial_cmp(&Serial(3_000_000_012)), Some(Greater)
        );
        assert_ne!(Serial(12).partial_cmp(&Serial(13)), Some(Greater));

        // or (i1 > i2 and i1 - i2 < 2^31)
        assert_eq!(Serial(13).partial_cmp(&Serial(12)), Some(Greater));
        assert_ne!(
            Serial(3_000_000_012).partial_cmp(&Serial(12)), Some(Greater)
        );

        // The wrap boundary: no ordering at exactly half the space.
        assert_eq!(Serial(1).partial_cmp(&Serial(0x8000_0001)), None);
        assert_eq!(Serial(0x8000_0001).partial_cmp(&Serial(1)), None);

        // Comparison works across the wrap.
        assert_eq!(
            Serial(u32::MAX).partial_cmp(&Serial(2)), Some(Less)
        );
        assert_eq!(
            Serial(2).partial_cmp(&Serial(u32::MAX)), Some(Greater)
        );
    }
}
