//! Certified resources: IP address blocks and AS number blocks.
//!
//! Every RPKI certificate carries the Internet number resources its
//! subject holds: sets of IPv4 prefixes, IPv6 prefixes, and AS numbers,
//! in the encoding of [RFC 3779] restricted by [RFC 6487]. This module
//! provides the set types and their arithmetic – containment, union,
//! intersection, difference – as well as the inherit choice a certificate
//! may use instead of literal sets.
//!
//! Sets are kept canonical at all times: sorted, with overlapping or
//! adjacent entries merged. IP sets store address ranges which prefixes
//! convert into; AS sets store half-open number ranges, so `[a, a+1)` is
//! the single AS number `a`.
//!
//! [RFC 3779]: https://tools.ietf.org/html/rfc3779
//! [RFC 6487]: https://tools.ietf.org/html/rfc6487

use std::{cmp, fmt, io};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use bcder::decode;
use bcder::{BitString, Mode, OctetString, Tag};
use bcder::decode::DecodeError;
use bcder::encode::PrimitiveContent;


//------------ Asn -----------------------------------------------------------

/// An AS number.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Asn(u32);

impl Asn {
    pub const MIN: Asn = Asn(u32::MIN);
    pub const MAX: Asn = Asn(u32::MAX);

    pub fn from_u32(value: u32) -> Self {
        Asn(value)
    }

    pub fn into_u32(self) -> u32 {
        self.0
    }

    /// Takes an AS number from the beginning of an encoded value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_u32().map(Asn)
    }

    fn parse_content<S: decode::Source>(
        content: &mut decode::Content<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        content.to_u32().map(Asn)
    }
}

impl From<u32> for Asn {
    fn from(value: u32) -> Self {
        Asn(value)
    }
}

impl From<Asn> for u32 {
    fn from(value: Asn) -> Self {
        value.0
    }
}

impl FromStr for Asn {
    type Err = ParseAsnError;

    /// Accepts both `AS64500` and a plain number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = if s.len() > 2 && s[..2].eq_ignore_ascii_case("as") {
            &s[2..]
        }
        else {
            s
        };
        u32::from_str(s).map(Asn).map_err(|_| ParseAsnError)
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}


//------------ AsBlock -------------------------------------------------------

/// A continuous, half-open range of AS numbers `[start, end)`.
///
/// The upper bound is a `u64` so the range can include `AS4294967295`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AsBlock {
    start: u32,
    end: u64,
}

impl AsBlock {
    /// Creates a block covering a single AS number.
    pub fn single(asn: Asn) -> Self {
        AsBlock {
            start: asn.into_u32(),
            end: u64::from(asn.into_u32()) + 1,
        }
    }

    /// Creates a block from an inclusive range of AS numbers.
    pub fn range(min: Asn, max: Asn) -> Self {
        assert!(min <= max);
        AsBlock {
            start: min.into_u32(),
            end: u64::from(max.into_u32()) + 1,
        }
    }

    /// Returns the smallest AS number of the block.
    pub fn min(self) -> Asn {
        Asn(self.start)
    }

    /// Returns the largest AS number of the block.
    pub fn max(self) -> Asn {
        Asn((self.end - 1) as u32)
    }

    fn contains_block(self, other: AsBlock) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Takes an optional choice of a single ASN or a range.
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_value(|tag, content| {
            if tag == Tag::INTEGER {
                Asn::parse_content(content).map(AsBlock::single)
            }
            else if tag == Tag::SEQUENCE {
                let cons = content.as_constructed()?;
                let min = Asn::take_from(cons)?;
                let max = Asn::take_from(cons)?;
                if min > max {
                    return Err(cons.content_err("inverted AS range"))
                }
                Ok(AsBlock::range(min, max))
            }
            else {
                Err(content.content_err("invalid AS number block"))
            }
        })
    }
}

impl From<Asn> for AsBlock {
    fn from(asn: Asn) -> Self {
        AsBlock::single(asn)
    }
}

impl From<(Asn, Asn)> for AsBlock {
    fn from((min, max): (Asn, Asn)) -> Self {
        AsBlock::range(min, max)
    }
}

impl FromStr for AsBlock {
    type Err = ParseAsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.find('-') {
            Some(idx) => {
                let min = Asn::from_str(s[..idx].trim())?;
                let max = Asn::from_str(s[idx + 1..].trim())?;
                if min > max {
                    return Err(ParseAsnError)
                }
                Ok(AsBlock::range(min, max))
            }
            None => Asn::from_str(s).map(AsBlock::single)
        }
    }
}

impl fmt::Display for AsBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.end == u64::from(self.start) + 1 {
            self.min().fmt(f)
        }
        else {
            write!(f, "{}-{}", self.min(), self.max())
        }
    }
}


//------------ AsBlocks ------------------------------------------------------

/// A set of AS numbers, kept as canonical sorted disjoint blocks.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AsBlocks(Vec<AsBlock>);

impl AsBlocks {
    pub fn empty() -> Self {
        AsBlocks(Vec::new())
    }

    /// Creates a set covering all AS numbers.
    pub fn all() -> Self {
        Self::from_iter([AsBlock::range(Asn::MIN, Asn::MAX)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AsBlock> + '_ {
        self.0.iter().copied()
    }

    /// Returns an iterator over every individual AS number in the set.
    pub fn iter_asns(&self) -> impl Iterator<Item = Asn> + '_ {
        self.0.iter().flat_map(|block| {
            (u64::from(block.start)..block.end).map(|val| Asn(val as u32))
        })
    }

    /// Inserts a block, merging on overlap or adjacency.
    pub fn push(&mut self, block: AsBlock) {
        // Find the first existing block that ends at or after the start of
        // the new one.
        let start = self.0.partition_point(|item| {
            item.end < u64::from(block.start)
        });
        let mut merged = block;
        let mut end = start;
        while end < self.0.len()
            && u64::from(self.0[end].start) <= merged.end
        {
            merged.start = cmp::min(merged.start, self.0[end].start);
            merged.end = cmp::max(merged.end, self.0[end].end);
            end += 1;
        }
        self.0.splice(start..end, [merged]);
    }

    /// Returns whether the set contains the whole other set.
    pub fn contains(&self, other: &AsBlocks) -> bool {
        // Both sets are sorted, so a two-pointer sweep does.
        let mut mine = self.0.iter();
        let mut current = mine.next();
        'outer: for block in &other.0 {
            while let Some(candidate) = current {
                if candidate.contains_block(*block) {
                    continue 'outer
                }
                if candidate.start > block.start {
                    return false
                }
                current = mine.next();
            }
            return false
        }
        true
    }

    /// Returns whether the set contains a single AS number.
    pub fn contains_asn(&self, asn: Asn) -> bool {
        self.contains(&Self::from_iter([AsBlock::single(asn)]))
    }

    /// Returns the union of this and the other set.
    pub fn union(&self, other: &AsBlocks) -> Self {
        let mut res = self.clone();
        for block in &other.0 {
            res.push(*block);
        }
        res
    }

    /// Returns the intersection of this and the other set.
    pub fn intersection(&self, other: &AsBlocks) -> Self {
        let mut res = AsBlocks::empty();
        for left in &self.0 {
            for right in &other.0 {
                let start = cmp::max(left.start, right.start);
                let end = cmp::min(left.end, right.end);
                if u64::from(start) < end {
                    res.push(AsBlock { start, end });
                }
            }
        }
        res
    }

    /// Returns the blocks of `self` not covered by `other`.
    pub fn difference(&self, other: &AsBlocks) -> Self {
        let mut res = AsBlocks::empty();
        for left in &self.0 {
            let mut start = u64::from(left.start);
            for right in &other.0 {
                if right.end <= start || u64::from(right.start) >= left.end {
                    continue
                }
                if u64::from(right.start) > start {
                    res.push(AsBlock {
                        start: start as u32,
                        end: u64::from(right.start),
                    });
                }
                start = cmp::max(start, right.end);
            }
            if start < left.end {
                res.push(AsBlock { start: start as u32, end: left.end });
            }
        }
        res
    }

    /// Parses the content of an AS number block sequence.
    fn parse_content<S: decode::Source>(
        content: &mut decode::Content<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let cons = content.as_constructed()?;
        let mut res = AsBlocks::empty();
        while let Some(block) = AsBlock::take_opt_from(cons)? {
            res.push(block);
        }
        Ok(res)
    }
}

impl FromIterator<AsBlock> for AsBlocks {
    fn from_iter<I: IntoIterator<Item = AsBlock>>(iter: I) -> Self {
        let mut res = AsBlocks::empty();
        for block in iter {
            res.push(block);
        }
        res
    }
}

impl FromStr for AsBlocks {
    type Err = ParseAsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut res = AsBlocks::empty();
        for el in s.split(',') {
            let el = el.trim();
            if !el.is_empty() {
                res.push(AsBlock::from_str(el)?);
            }
        }
        Ok(res)
    }
}

impl fmt::Display for AsBlocks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for block in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            block.fmt(f)?;
            first = false;
        }
        Ok(())
    }
}


//------------ Addr ----------------------------------------------------------

/// An address of either family.
///
/// The value is kept as a 128 bit integer in host byte order with IPv4
/// addresses in the upper four bytes. Prefix arithmetic thus counts from
/// the top for both families. Which family a value belongs to has to be
/// tracked separately.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Addr(u128);

impl Addr {
    pub fn from_bits(bits: u128) -> Self {
        Addr(bits)
    }

    pub fn from_v4(addr: Ipv4Addr) -> Self {
        Addr(u128::from(u32::from(addr)) << 96)
    }

    pub fn from_v6(addr: Ipv6Addr) -> Self {
        Addr(u128::from(addr))
    }

    pub fn to_bits(self) -> u128 {
        self.0
    }

    pub fn to_v4(self) -> Ipv4Addr {
        ((self.0 >> 96) as u32).into()
    }

    pub fn to_v6(self) -> Ipv6Addr {
        self.0.into()
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Clears all but the first `prefix_len` bits.
    pub fn to_min(self, prefix_len: u8) -> Self {
        if prefix_len >= 128 {
            self
        }
        else {
            Addr(self.0 & !(!0 >> u32::from(prefix_len)))
        }
    }

    /// Sets all but the first `prefix_len` bits.
    pub fn to_max(self, prefix_len: u8) -> Self {
        if prefix_len >= 128 {
            self
        }
        else {
            Addr(self.0 | (!0 >> prefix_len as usize))
        }
    }
}

impl From<Ipv4Addr> for Addr {
    fn from(addr: Ipv4Addr) -> Self {
        Addr::from_v4(addr)
    }
}

impl From<Ipv6Addr> for Addr {
    fn from(addr: Ipv6Addr) -> Self {
        Addr::from_v6(addr)
    }
}

impl From<IpAddr> for Addr {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(addr) => Addr::from_v4(addr),
            IpAddr::V6(addr) => Addr::from_v6(addr),
        }
    }
}


//------------ Prefix --------------------------------------------------------

/// An IP address prefix.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Prefix {
    /// The address with all host bits zero.
    addr: Addr,

    /// The prefix length, never more than 128.
    len: u8,
}

impl Prefix {
    /// Creates a new prefix from an address and a length.
    ///
    /// # Panics
    ///
    /// Panics if `len` is larger than 128.
    pub fn new<A: Into<Addr>>(addr: A, len: u8) -> Self {
        assert!(len <= 128);
        Prefix {
            addr: addr.into().to_min(len),
            len,
        }
    }

    /// Creates a new prefix from its encoding as a BIT STRING.
    pub fn from_bit_string<E>(
        src: &BitString,
        err: impl FnOnce(&'static str) -> DecodeError<E>,
    ) -> Result<Self, DecodeError<E>> {
        if src.octet_len() > 16 || src.bit_len() > 128 {
            return Err(err("invalid IP address prefix"))
        }
        let mut addr = 0u128;
        for octet in src.octets() {
            addr = (addr << 8) | u128::from(octet);
        }
        for _ in src.octet_len()..16 {
            addr <<= 8;
        }
        Ok(Self::new(Addr::from_bits(addr), src.bit_len() as u8))
    }

    /// Takes an encoded prefix from a source.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let bits = BitString::take_from(cons)?;
        Self::from_bit_string(&bits, |msg| cons.content_err(msg))
    }

    pub fn addr(self) -> Addr {
        self.addr
    }

    pub fn addr_len(self) -> u8 {
        self.len
    }

    pub fn to_v4(self) -> Ipv4Addr {
        self.addr.to_v4()
    }

    pub fn to_v6(self) -> Ipv6Addr {
        self.addr.to_v6()
    }

    /// Returns the smallest address covered by the prefix.
    pub fn min(self) -> Addr {
        self.addr
    }

    /// Returns the largest address covered by the prefix.
    pub fn max(self) -> Addr {
        self.addr.to_max(self.len)
    }

    /// Returns whether this prefix covers the other prefix.
    ///
    /// Both prefixes must be of the same address family for the result to
    /// be meaningful.
    pub fn covers(self, other: Prefix) -> bool {
        self.len <= other.len
            && other.addr.to_min(self.len) == self.addr
    }

    pub fn fmt_v4(self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr.to_v4(), self.len)
    }

    pub fn fmt_v6(self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr.to_v6(), self.len)
    }
}

//--- PrimitiveContent

impl PrimitiveContent for Prefix {
    const TAG: Tag = Tag::BIT_STRING;

    fn encoded_len(&self, _: Mode) -> usize {
        if self.len % 8 == 0 {
            self.len as usize / 8 + 1
        }
        else {
            self.len as usize / 8 + 2
        }
    }

    fn write_encoded<W: io::Write>(
        &self,
        _: Mode,
        target: &mut W
    ) -> Result<(), io::Error> {
        // The type keeps all unused bits zero, so the raw address bytes
        // can be written as they are.
        let addr = self.addr.to_bytes();
        if self.len % 8 == 0 {
            target.write_all(&[0])?;
            target.write_all(&addr[..(self.len / 8) as usize])
        }
        else {
            target.write_all(&[8 - self.len % 8])?;
            target.write_all(&addr[..(self.len / 8 + 1) as usize])
        }
    }
}


//------------ AddressFamily -------------------------------------------------

/// The address family of an IP resources value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    /// IPv4, encoded as the two byte octet string `00 01`.
    Ipv4,

    /// IPv6, encoded as the two byte octet string `00 02`.
    Ipv6,
}

impl AddressFamily {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let str = OctetString::take_from(cons)?;
        let mut octets = str.octets();
        let (first, second) = match (octets.next(), octets.next()) {
            (Some(first), Some(second)) => (first, second),
            _ => return Err(cons.content_err("invalid address family")),
        };
        if octets.next().is_some() {
            return Err(cons.content_err("invalid address family"))
        }
        match (first, second) {
            (0, 1) => Ok(AddressFamily::Ipv4),
            (0, 2) => Ok(AddressFamily::Ipv6),
            _ => Err(cons.content_err("invalid address family")),
        }
    }

    /// Returns the maximum prefix length for this family.
    pub fn max_addr_len(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            AddressFamily::Ipv4 => "IPv4",
            AddressFamily::Ipv6 => "IPv6",
        })
    }
}


//------------ IpBlock -------------------------------------------------------

/// A continuous, inclusive range of addresses of one family.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IpBlock {
    min: Addr,
    max: Addr,
}

impl IpBlock {
    /// Creates a block from an inclusive address range.
    pub fn range(min: Addr, max: Addr) -> Self {
        assert!(min <= max);
        IpBlock { min, max }
    }

    pub fn min(self) -> Addr {
        self.min
    }

    pub fn max(self) -> Addr {
        self.max
    }

    fn contains_block(self, other: IpBlock) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    /// Takes an optional choice of a prefix or an explicit range.
    ///
    /// ```text
    /// IPAddressOrRange    ::= CHOICE {
    ///     addressPrefix       IPAddress,
    ///     addressRange        IPAddressRange }
    ///
    /// IPAddressRange      ::= SEQUENCE {
    ///     min                 IPAddress,
    ///     max                 IPAddress }
    ///
    /// IPAddress           ::= BIT STRING
    /// ```
    ///
    /// The min address has its insignificant bits zero, the max address
    /// has them one, which [`Prefix::min`] and [`Prefix::max`] produce.
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        family: AddressFamily,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_value(|tag, content| {
            if tag == Tag::BIT_STRING {
                let bits = BitString::from_content(content)?;
                let prefix = Prefix::from_bit_string(&bits, |msg| {
                    content.content_err(msg)
                })?;
                if prefix.addr_len() > family.max_addr_len() {
                    return Err(content.content_err(
                        "prefix length too large for address family"
                    ))
                }
                Ok(IpBlock::range(prefix.min(), prefix.max()))
            }
            else if tag == Tag::SEQUENCE {
                let cons = content.as_constructed()?;
                let min = Prefix::take_from(cons)?;
                let max = Prefix::take_from(cons)?;
                if min.addr_len() > family.max_addr_len()
                    || max.addr_len() > family.max_addr_len()
                {
                    return Err(cons.content_err(
                        "prefix length too large for address family"
                    ))
                }
                if min.min() > max.max() {
                    return Err(cons.content_err("inverted address range"))
                }
                Ok(IpBlock::range(min.min(), max.max()))
            }
            else {
                Err(content.content_err("invalid IP address block"))
            }
        })
    }

    fn fmt_family(
        self, f: &mut fmt::Formatter, family: AddressFamily
    ) -> fmt::Result {
        match family {
            AddressFamily::Ipv4 => {
                write!(f, "{}-{}", self.min.to_v4(), self.max.to_v4())
            }
            AddressFamily::Ipv6 => {
                write!(f, "{}-{}", self.min.to_v6(), self.max.to_v6())
            }
        }
    }
}

impl From<Prefix> for IpBlock {
    fn from(prefix: Prefix) -> Self {
        IpBlock::range(prefix.min(), prefix.max())
    }
}


//------------ IpBlocks ------------------------------------------------------

/// A set of addresses of one family, as canonical sorted disjoint ranges.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct IpBlocks(Vec<IpBlock>);

impl IpBlocks {
    pub fn empty() -> Self {
        IpBlocks(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IpBlock> + '_ {
        self.0.iter().copied()
    }

    /// Inserts a block, merging on overlap or adjacency.
    pub fn push(&mut self, block: IpBlock) {
        // An item stays left of the merge range if it ends before the
        // address preceding the new block’s start.
        let start = self.0.partition_point(|item| {
            item.max.to_bits().saturating_add(1) < block.min.to_bits()
        });
        let mut merged = block;
        let mut end = start;
        while end < self.0.len() && {
            let next = self.0[end];
            next.min.to_bits() <= merged.max.to_bits()
                || (merged.max.to_bits() != u128::MAX
                    && next.min.to_bits() == merged.max.to_bits() + 1)
        } {
            merged.min = cmp::min(merged.min, self.0[end].min);
            merged.max = cmp::max(merged.max, self.0[end].max);
            end += 1;
        }
        self.0.splice(start..end, [merged]);
    }

    /// Returns whether the set contains the whole other set.
    pub fn contains(&self, other: &IpBlocks) -> bool {
        let mut mine = self.0.iter();
        let mut current = mine.next();
        'outer: for block in &other.0 {
            while let Some(candidate) = current {
                if candidate.contains_block(*block) {
                    continue 'outer
                }
                if candidate.min > block.min {
                    return false
                }
                current = mine.next();
            }
            return false
        }
        true
    }

    /// Returns whether the set covers the given prefix entirely.
    pub fn contains_prefix(&self, prefix: Prefix) -> bool {
        let block = IpBlock::from(prefix);
        self.0.iter().any(|item| item.contains_block(block))
    }

    /// Returns the union of this and the other set.
    pub fn union(&self, other: &IpBlocks) -> Self {
        let mut res = self.clone();
        for block in &other.0 {
            res.push(*block);
        }
        res
    }

    /// Returns the intersection of this and the other set.
    pub fn intersection(&self, other: &IpBlocks) -> Self {
        let mut res = IpBlocks::empty();
        for left in &self.0 {
            for right in &other.0 {
                let min = cmp::max(left.min, right.min);
                let max = cmp::min(left.max, right.max);
                if min <= max {
                    res.push(IpBlock { min, max });
                }
            }
        }
        res
    }

    /// Returns the parts of `self` not covered by `other`.
    pub fn difference(&self, other: &IpBlocks) -> Self {
        let mut res = IpBlocks::empty();
        for left in &self.0 {
            let mut min = left.min;
            let mut exhausted = false;
            for right in &other.0 {
                if right.max < min || right.min > left.max {
                    continue
                }
                if right.min > min {
                    res.push(IpBlock {
                        min,
                        max: Addr::from_bits(right.min.to_bits() - 1),
                    });
                }
                if right.max.to_bits() == u128::MAX
                    || right.max >= left.max
                {
                    exhausted = true;
                    break
                }
                min = cmp::max(
                    min, Addr::from_bits(right.max.to_bits() + 1)
                );
            }
            if !exhausted && min <= left.max {
                res.push(IpBlock { min, max: left.max });
            }
        }
        res
    }

    /// Parses the content of an address block sequence.
    fn parse_content<S: decode::Source>(
        content: &mut decode::Content<S>,
        family: AddressFamily,
    ) -> Result<Self, DecodeError<S::Error>> {
        let cons = content.as_constructed()?;
        let mut res = IpBlocks::empty();
        while let Some(block) = IpBlock::take_opt_from(cons, family)? {
            res.push(block);
        }
        Ok(res)
    }

    /// Creates a set from a string of comma-separated prefixes.
    ///
    /// This is mainly useful in tests; certificates produce sets through
    /// decoding.
    pub fn from_prefix_strs(
        s: &str, family: AddressFamily
    ) -> Result<Self, ParsePrefixError> {
        let mut res = IpBlocks::empty();
        for el in s.split(',') {
            let el = el.trim();
            if el.is_empty() {
                continue
            }
            let idx = el.find('/').ok_or(ParsePrefixError)?;
            let len = u8::from_str(&el[idx + 1..])
                .map_err(|_| ParsePrefixError)?;
            if len > family.max_addr_len() {
                return Err(ParsePrefixError)
            }
            let addr = match family {
                AddressFamily::Ipv4 => {
                    Addr::from_v4(
                        Ipv4Addr::from_str(&el[..idx])
                            .map_err(|_| ParsePrefixError)?
                    )
                }
                AddressFamily::Ipv6 => {
                    Addr::from_v6(
                        Ipv6Addr::from_str(&el[..idx])
                            .map_err(|_| ParsePrefixError)?
                    )
                }
            };
            res.push(Prefix::new(addr, len).into());
        }
        Ok(res)
    }
}

impl FromIterator<IpBlock> for IpBlocks {
    fn from_iter<I: IntoIterator<Item = IpBlock>>(iter: I) -> Self {
        let mut res = IpBlocks::empty();
        for block in iter {
            res.push(block);
        }
        res
    }
}


//------------ ResourcesChoice -----------------------------------------------

/// The choice between literal resources and inheriting from the issuer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourcesChoice<T> {
    /// Resources are to be inherited from the issuer.
    Inherit,

    /// The resources are provided as a set of blocks.
    Blocks(T),

    /// The certificate did not carry this resource family at all.
    Missing,
}

impl<T> ResourcesChoice<T> {
    pub fn is_inherited(&self) -> bool {
        matches!(self, ResourcesChoice::Inherit)
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, ResourcesChoice::Missing)
    }

    /// Returns the literal blocks or an error on inherit.
    ///
    /// Containment must never be asked of an unresolved inherit
    /// container, so that case is an error, not a default.
    pub fn to_blocks(&self) -> Result<T, InheritError>
    where T: Clone + Default {
        match self {
            ResourcesChoice::Inherit => Err(InheritError),
            ResourcesChoice::Blocks(inner) => Ok(inner.clone()),
            ResourcesChoice::Missing => Ok(T::default()),
        }
    }
}


//------------ IpResources ---------------------------------------------------

/// The IP resources of a certificate for one address family.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpResources(ResourcesChoice<IpBlocks>);

impl IpResources {
    pub fn inherit() -> Self {
        IpResources(ResourcesChoice::Inherit)
    }

    pub fn missing() -> Self {
        IpResources(ResourcesChoice::Missing)
    }

    pub fn blocks(blocks: IpBlocks) -> Self {
        IpResources(ResourcesChoice::Blocks(blocks))
    }

    pub fn is_inherited(&self) -> bool {
        self.0.is_inherited()
    }

    pub fn is_present(&self) -> bool {
        self.0.is_present()
    }

    pub fn to_blocks(&self) -> Result<IpBlocks, InheritError> {
        self.0.to_blocks()
    }

    /// Takes the value of an IP resources extension.
    ///
    /// ```text
    /// IPAddrBlocks        ::= SEQUENCE OF IPAddressFamily
    ///
    /// IPAddressFamily     ::= SEQUENCE {
    ///     addressFamily       OCTET STRING (SIZE (2..3)),
    ///     ipAddressChoice     IPAddressChoice }
    ///
    /// IPAddressChoice     ::= CHOICE {
    ///     inherit             NULL,
    ///     addressesOrRanges   SEQUENCE OF IPAddressOrRange }
    /// ```
    ///
    /// Returns the IPv4 and IPv6 resources separately; a family not
    /// mentioned in the extension is `None`.
    #[allow(clippy::type_complexity)]
    pub fn take_families_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<
        (Option<IpResources>, Option<IpResources>),
        DecodeError<S::Error>
    > {
        cons.take_sequence(|cons| {
            let mut v4 = None;
            let mut v6 = None;
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let family = AddressFamily::take_from(cons)?;
                let choice = cons.take_value(|tag, content| {
                    if tag == Tag::NULL {
                        content.to_null()?;
                        Ok(ResourcesChoice::Inherit)
                    }
                    else if tag == Tag::SEQUENCE {
                        IpBlocks::parse_content(content, family)
                            .map(ResourcesChoice::Blocks)
                    }
                    else {
                        Err(content.content_err("invalid IP resources"))
                    }
                })?;
                let slot = match family {
                    AddressFamily::Ipv4 => &mut v4,
                    AddressFamily::Ipv6 => &mut v6,
                };
                if slot.replace(IpResources(choice)).is_some() {
                    return Err(cons.content_err(
                        "duplicate address family in IP resources"
                    ))
                }
                Ok(())
            })? { }
            if v4.is_none() && v6.is_none() {
                return Err(cons.content_err("empty IP resources extension"))
            }
            Ok((v4, v6))
        })
    }
}


//------------ AsResources ---------------------------------------------------

/// The AS resources of a certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AsResources(ResourcesChoice<AsBlocks>);

impl AsResources {
    pub fn inherit() -> Self {
        AsResources(ResourcesChoice::Inherit)
    }

    pub fn missing() -> Self {
        AsResources(ResourcesChoice::Missing)
    }

    pub fn blocks(blocks: AsBlocks) -> Self {
        AsResources(ResourcesChoice::Blocks(blocks))
    }

    pub fn is_inherited(&self) -> bool {
        self.0.is_inherited()
    }

    pub fn is_present(&self) -> bool {
        self.0.is_present()
    }

    pub fn to_blocks(&self) -> Result<AsBlocks, InheritError> {
        self.0.to_blocks()
    }

    /// Takes the value of an AS resources extension.
    ///
    /// ```text
    /// ASIdentifiers      ::= SEQUENCE {
    ///     asnum              [0] EXPLICIT AsIdentifierChoice OPTIONAL,
    ///     rdi                [1] EXPLICIT AsIdentifierChoice OPTIONAL }
    ///
    /// AsIdentifierChoice ::= CHOICE {
    ///     inherit            NULL,
    ///     asIdsOrRanges      SEQUENCE OF ASIdOrRange }
    /// ```
    ///
    /// RFC 6487 limits the value to the asnum choice.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            cons.take_constructed_if(Tag::CTX_0, |cons| {
                cons.take_value(|tag, content| {
                    if tag == Tag::NULL {
                        content.to_null()?;
                        Ok(ResourcesChoice::Inherit)
                    }
                    else if tag == Tag::SEQUENCE {
                        AsBlocks::parse_content(content)
                            .map(ResourcesChoice::Blocks)
                    }
                    else {
                        Err(content.content_err("invalid AS resources"))
                    }
                })
            })
        }).map(AsResources)
    }
}


//------------ ResourceSet ---------------------------------------------------

/// The combined, fully resolved resources of a certificate.
///
/// A value of this type never contains an inherit marker; it is built
/// during validation after inherit has been resolved against the issuer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceSet {
    v4: IpBlocks,
    v6: IpBlocks,
    asn: AsBlocks,
}

impl ResourceSet {
    pub fn new(v4: IpBlocks, v6: IpBlocks, asn: AsBlocks) -> Self {
        ResourceSet { v4, v6, asn }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a set from string representations, for tests and fixtures.
    pub fn from_strs(
        v4: &str, v6: &str, asn: &str
    ) -> Result<Self, ParsePrefixError> {
        Ok(ResourceSet {
            v4: IpBlocks::from_prefix_strs(v4, AddressFamily::Ipv4)?,
            v6: IpBlocks::from_prefix_strs(v6, AddressFamily::Ipv6)?,
            asn: AsBlocks::from_str(asn).map_err(|_| ParsePrefixError)?,
        })
    }

    pub fn v4(&self) -> &IpBlocks {
        &self.v4
    }

    pub fn v6(&self) -> &IpBlocks {
        &self.v6
    }

    pub fn asn(&self) -> &AsBlocks {
        &self.asn
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty() && self.asn.is_empty()
    }

    /// Returns whether this set contains the whole other set.
    pub fn contains(&self, other: &ResourceSet) -> bool {
        self.v4.contains(&other.v4)
            && self.v6.contains(&other.v6)
            && self.asn.contains(&other.asn)
    }

    pub fn union(&self, other: &ResourceSet) -> Self {
        ResourceSet {
            v4: self.v4.union(&other.v4),
            v6: self.v6.union(&other.v6),
            asn: self.asn.union(&other.asn),
        }
    }

    pub fn intersection(&self, other: &ResourceSet) -> Self {
        ResourceSet {
            v4: self.v4.intersection(&other.v4),
            v6: self.v6.intersection(&other.v6),
            asn: self.asn.intersection(&other.asn),
        }
    }

    /// Returns the resources of `self` that are not in `other`.
    pub fn subtract(&self, other: &ResourceSet) -> Self {
        ResourceSet {
            v4: self.v4.difference(&other.v4),
            v6: self.v6.difference(&other.v6),
            asn: self.asn.difference(&other.asn),
        }
    }
}


//============ Errors ========================================================

//------------ InheritError --------------------------------------------------

/// Resources were queried on an unresolved inherit container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InheritError;

impl fmt::Display for InheritError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(
            "cannot determine resources of certificate using inherit"
        )
    }
}

impl std::error::Error for InheritError { }


//------------ ParseAsnError -------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseAsnError;

impl fmt::Display for ParseAsnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid AS number")
    }
}

impl std::error::Error for ParseAsnError { }


//------------ ParsePrefixError ----------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParsePrefixError;

impl fmt::Display for ParsePrefixError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid IP prefix")
    }
}

impl std::error::Error for ParsePrefixError { }


//------------ IpBlocksForFamily ---------------------------------------------

/// Helper for displaying IP blocks with their family.
pub struct IpBlocksForFamily<'a> {
    blocks: &'a IpBlocks,
    family: AddressFamily,
}

impl IpBlocks {
    /// Returns a display wrapper formatting the blocks in `family` syntax.
    pub fn as_family(&self, family: AddressFamily) -> IpBlocksForFamily {
        IpBlocksForFamily { blocks: self, family }
    }
}

impl fmt::Display for IpBlocksForFamily<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for block in &self.blocks.0 {
            if !first {
                write!(f, ", ")?;
            }
            block.fmt_family(f, self.family)?;
            first = false;
        }
        Ok(())
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_blocks(s: &str) -> IpBlocks {
        IpBlocks::from_prefix_strs(s, AddressFamily::Ipv4).unwrap()
    }

    #[test]
    fn as_blocks_canonical() {
        let mut blocks = AsBlocks::empty();
        blocks.push(AsBlock::range(Asn(10), Asn(20)));
        blocks.push(AsBlock::range(Asn(30), Asn(40)));
        blocks.push(AsBlock::range(Asn(15), Asn(29)));
        // All three merge into one: 15-29 overlaps 10-20 and is adjacent
        // to 30-40.
        assert_eq!(
            blocks.iter().collect::<Vec<_>>(),
            vec![AsBlock::range(Asn(10), Asn(40))]
        );
    }

    #[test]
    fn as_blocks_unordered_input() {
        let left = AsBlocks::from_str("AS65005, AS65000-AS65003").unwrap();
        let right = AsBlocks::from_str("AS65000-AS65003, AS65005").unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn as_blocks_contains() {
        let outer = AsBlocks::from_str("AS64496-AS64511, AS65000").unwrap();
        let inner = AsBlocks::from_str("AS64500, AS64505-AS64510").unwrap();
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains_asn(Asn::from(65000)));
        assert!(!outer.contains_asn(Asn::from(65001)));

        // The maximum AS number works in both positions.
        let top = AsBlocks::from_str("AS4294967295").unwrap();
        assert!(top.contains(&top));
        assert!(AsBlocks::all().contains(&top));
    }

    #[test]
    fn as_blocks_difference() {
        let left = AsBlocks::from_str("AS65000-AS65003, AS65005").unwrap();
        let right = AsBlocks::from_str("AS65000, AS65003, AS65005").unwrap();
        assert_eq!(
            left.difference(&right),
            AsBlocks::from_str("AS65001-AS65002").unwrap()
        );
        assert!(right.difference(&left).is_empty());
    }

    #[test]
    fn as_blocks_intersection() {
        let left = AsBlocks::from_str("AS100-AS200").unwrap();
        let right = AsBlocks::from_str("AS150-AS300, AS400").unwrap();
        assert_eq!(
            left.intersection(&right),
            AsBlocks::from_str("AS150-AS200").unwrap()
        );
    }

    #[test]
    fn ip_blocks_merge_adjacent() {
        let blocks = v4_blocks("10.0.0.0/25, 10.0.0.128/25");
        assert_eq!(blocks, v4_blocks("10.0.0.0/24"));
        assert_eq!(blocks.iter().count(), 1);
    }

    #[test]
    fn ip_blocks_contains() {
        let outer = v4_blocks("10.0.0.0/8");
        let inner = v4_blocks("10.1.0.0/16, 10.2.0.0/24");
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains_prefix(
            Prefix::new(Ipv4Addr::new(10, 42, 0, 0), 16)
        ));
        assert!(!outer.contains_prefix(
            Prefix::new(Ipv4Addr::new(11, 0, 0, 0), 16)
        ));
    }

    #[test]
    fn ip_blocks_difference() {
        let left = v4_blocks("10.0.0.0/8");
        let right = v4_blocks("10.0.0.0/9");
        let diff = left.difference(&right);
        assert_eq!(diff, v4_blocks("10.128.0.0/9"));
        assert!(right.difference(&left).is_empty());
    }

    #[test]
    fn ip_blocks_union_properties() {
        // A.contains(B) implies A.union(B) == A and B.subtract(A) empty.
        let a = v4_blocks("192.0.2.0/24, 198.51.100.0/24");
        let b = v4_blocks("192.0.2.0/25");
        assert!(a.contains(&b));
        assert_eq!(a.union(&b), a);
        assert!(b.difference(&a).is_empty());
    }

    #[test]
    fn prefix_covers() {
        let outer = Prefix::new(Ipv4Addr::new(192, 168, 0, 0), 16);
        let inner = Prefix::new(Ipv4Addr::new(192, 168, 10, 0), 24);
        assert!(outer.covers(inner));
        assert!(!inner.covers(outer));
        assert!(outer.covers(outer));
    }

    #[test]
    fn prefix_decode_roundtrip() {
        use bcder::encode::Values;

        for (addr, len) in [
            (IpAddr::from(Ipv4Addr::new(10, 0, 0, 0)), 8),
            (IpAddr::from(Ipv4Addr::new(192, 0, 2, 0)), 26),
            (IpAddr::from(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0)),
             32),
            (IpAddr::from(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0)), 0),
        ] {
            let prefix = Prefix::new(Addr::from(addr), len);
            let encoded = prefix.encode().to_captured(Mode::Der);
            let decoded = Mode::Der.decode(
                encoded.as_slice(), Prefix::take_from
            ).unwrap();
            assert_eq!(prefix, decoded);
        }
    }

    #[test]
    fn resource_set_contains_and_subtract() {
        let parent = ResourceSet::from_strs(
            "10.0.0.0/8", "2001:db8::/32", "AS64496-AS64511"
        ).unwrap();
        let child = ResourceSet::from_strs(
            "10.1.0.0/16", "2001:db8:1::/48", "AS64500"
        ).unwrap();
        assert!(parent.contains(&child));
        assert!(!child.contains(&parent));
        assert_eq!(parent.union(&child), parent);
        assert!(child.subtract(&parent).is_empty());

        let outside = ResourceSet::from_strs(
            "11.0.0.0/8", "", ""
        ).unwrap();
        assert!(!parent.contains(&outside));
        assert!(!outside.subtract(&parent).is_empty());
    }

    #[test]
    fn resource_set_intersection() {
        let all = ResourceSet::from_strs(
            "0.0.0.0/0", "::/0", "AS0-AS4294967295"
        ).unwrap();
        let child = ResourceSet::from_strs(
            "10.0.0.0/8", "fd00::/8", "AS65000"
        ).unwrap();
        assert_eq!(all.intersection(&child), child);
    }
}
