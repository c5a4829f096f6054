//! The validated payload and its history.
//!
//! The outcome of a validation cycle is a set of [`Payload`] items:
//! validated ROA payloads and BGPsec router keys. This module holds the
//! payload data model, the [`ValidationReport`] the walker fills in, the
//! immutable [`PayloadSnapshot`] served to routers, the
//! [`PayloadDelta`] between consecutive snapshots, and
//! [`SharedHistory`], the versioned store the RTR server reads from and
//! the validation driver writes to.
//!
//! The same payload can be produced under several trust anchors. The
//! report keeps every such provenance; a snapshot deduplicates on the
//! payload itself when serving, retaining the first-seen origin for
//! diagnostics.

use std::{cmp, fmt, ops};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use bytes::Bytes;
use log::info;
use crate::crypto::KeyIdentifier;
use crate::resources::{Addr, Asn, Prefix};
use crate::rtr::server::{PayloadDiff, PayloadSet, PayloadSource, Timing};
use crate::rtr::state::{Serial, State};
use crate::slurm::LocalExceptions;
use crate::tal::TalInfo;


//------------ RouteOrigin ---------------------------------------------------

/// A validated ROA payload: a prefix, a max length, and an origin AS.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RouteOrigin {
    /// The address of the authorized prefix.
    pub addr: IpAddr,

    /// The length of the authorized prefix.
    pub prefix_len: u8,

    /// The maximum length of an announced prefix.
    pub max_len: u8,

    /// The autonomous system authorized to originate the prefix.
    pub asn: Asn,
}

impl RouteOrigin {
    pub fn new(addr: IpAddr, prefix_len: u8, max_len: u8, asn: Asn) -> Self {
        RouteOrigin { addr, prefix_len, max_len, asn }
    }

    pub fn is_v4(self) -> bool {
        self.addr.is_ipv4()
    }

    /// Returns the prefix portion as a resources prefix.
    pub fn prefix(self) -> Prefix {
        Prefix::new(Addr::from(self.addr), self.prefix_len)
    }
}

impl PartialOrd for RouteOrigin {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RouteOrigin {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.addr.cmp(&other.addr)
            .then_with(|| self.prefix_len.cmp(&other.prefix_len))
            .then_with(|| self.max_len.cmp(&other.max_len))
            .then_with(|| self.asn.cmp(&other.asn))
    }
}

impl fmt::Display for RouteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{}/{}-{} => {}",
            self.addr, self.prefix_len, self.max_len, self.asn
        )
    }
}


//------------ RouterKey -----------------------------------------------------

/// A BGPsec router key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RouterKey {
    /// The subject key identifier of the router key.
    pub key_identifier: KeyIdentifier,

    /// The autonomous system authorized to use the key.
    pub asn: Asn,

    /// The key’s subjectPublicKeyInfo in DER encoding.
    pub key_info: Bytes,
}

impl RouterKey {
    pub fn new(
        key_identifier: KeyIdentifier, asn: Asn, key_info: Bytes
    ) -> Self {
        RouterKey { key_identifier, asn, key_info }
    }
}

impl fmt::Display for RouterKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "router key {} => {}", self.key_identifier, self.asn)
    }
}


//------------ Payload -------------------------------------------------------

/// All payload types served via RTR.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Payload {
    /// A route origin authorisation.
    Origin(RouteOrigin),

    /// A BGPsec router key.
    RouterKey(RouterKey),
}

impl Payload {
    /// Returns the origin if the payload is of the origin variant.
    pub fn to_origin(&self) -> Option<RouteOrigin> {
        match *self {
            Payload::Origin(origin) => Some(origin),
            _ => None
        }
    }

    /// Returns the router key if the payload is of that variant.
    pub fn as_router_key(&self) -> Option<&RouterKey> {
        match *self {
            Payload::RouterKey(ref key) => Some(key),
            _ => None
        }
    }
}

impl From<RouteOrigin> for Payload {
    fn from(src: RouteOrigin) -> Self {
        Payload::Origin(src)
    }
}

impl From<RouterKey> for Payload {
    fn from(src: RouterKey) -> Self {
        Payload::RouterKey(src)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Payload::Origin(origin) => origin.fmt(f),
            Payload::RouterKey(key) => key.fmt(f),
        }
    }
}


//------------ Action --------------------------------------------------------

/// What a delta entry does with its payload.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Action {
    /// Add the payload to the data set.
    Announce,

    /// Remove the payload from the data set.
    Withdraw,
}

impl Action {
    /// Creates the action from the flags field of an RTR PDU.
    pub fn from_flags(flags: u8) -> Self {
        if flags & 1 == 1 {
            Action::Announce
        }
        else {
            Action::Withdraw
        }
    }

    /// Converts the action into the flags field of an RTR PDU.
    pub fn into_flags(self) -> u8 {
        match self {
            Action::Announce => 1,
            Action::Withdraw => 0
        }
    }
}


//------------ PayloadOrigin -------------------------------------------------

/// Where a payload item came from.
#[derive(Clone, Debug)]
pub enum PayloadOrigin {
    /// The item was produced under the given trust anchor.
    Tal(Arc<TalInfo>),

    /// The item was locally asserted through a SLURM file.
    Local,
}

impl PayloadOrigin {
    /// Returns the name of the trust anchor if there is one.
    pub fn tal_name(&self) -> Option<&str> {
        match self {
            PayloadOrigin::Tal(info) => Some(info.name()),
            PayloadOrigin::Local => None,
        }
    }
}


//------------ ValidationReport ----------------------------------------------

/// The raw outcome of a validation cycle.
///
/// The walker appends every validated payload item together with the
/// trust anchor it was found under. Nothing is deduplicated here; that
/// happens when the report is turned into a snapshot.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// The collected payload with its provenance.
    payload: Vec<(Payload, Arc<TalInfo>)>,

    /// The number of valid ROAs seen during the cycle.
    valid_roas: u32,

    /// The number of valid router certificates seen during the cycle.
    valid_router_certs: u32,

    /// The number of objects rejected during the cycle.
    rejected: u32,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validated ROA payload item.
    pub fn add_origin(&mut self, origin: RouteOrigin, tal: Arc<TalInfo>) {
        self.payload.push((Payload::Origin(origin), tal));
    }

    /// Adds a validated router key.
    pub fn add_router_key(&mut self, key: RouterKey, tal: Arc<TalInfo>) {
        self.payload.push((Payload::RouterKey(key), tal));
    }

    /// Notes another valid ROA.
    ///
    /// This counts objects, not the payload items they produce: a ROA
    /// authorizing several prefixes is one ROA.
    pub fn note_valid_roa(&mut self) {
        self.valid_roas += 1;
    }

    /// Notes another valid router certificate.
    pub fn note_valid_router_cert(&mut self) {
        self.valid_router_certs += 1;
    }

    /// Notes another rejected object.
    pub fn note_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Returns the number of valid ROAs.
    pub fn valid_roas(&self) -> u32 {
        self.valid_roas
    }

    /// Returns the number of valid router certificates.
    pub fn valid_router_certs(&self) -> u32 {
        self.valid_router_certs
    }

    /// Returns the number of rejected objects.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Returns the number of collected payload items.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Merges another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.payload.extend(other.payload);
        self.valid_roas += other.valid_roas;
        self.valid_router_certs += other.valid_router_certs;
        self.rejected += other.rejected;
    }

    /// Converts the report into a snapshot, applying local exceptions.
    ///
    /// Filtered items are dropped, assertions are added, and the result
    /// is deduplicated on the payload value. The first-seen provenance
    /// wins for duplicates.
    pub fn into_snapshot(
        self, exceptions: &LocalExceptions
    ) -> PayloadSnapshot {
        let mut payload: Vec<_> = self.payload.into_iter().filter_map(
            |(payload, tal)| {
                if exceptions.drop_payload(&payload) {
                    None
                }
                else {
                    Some((payload, PayloadOrigin::Tal(tal)))
                }
            }
        ).collect();
        payload.extend(
            exceptions.assertions().map(|item| {
                (item, PayloadOrigin::Local)
            })
        );
        payload.sort_by(|left, right| left.0.cmp(&right.0));
        payload.dedup_by(|left, right| left.0 == right.0);
        PayloadSnapshot { payload }
    }
}


//------------ PayloadSnapshot -----------------------------------------------

/// An immutable, deduplicated, sorted set of payload.
#[derive(Clone, Debug, Default)]
pub struct PayloadSnapshot {
    /// The payload in ascending order without duplicates.
    payload: Vec<(Payload, PayloadOrigin)>,
}

impl PayloadSnapshot {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns an iterator over the payload.
    pub fn iter(&self) -> impl Iterator<Item = &Payload> {
        self.payload.iter().map(|item| &item.0)
    }

    /// Returns an iterator over payload and provenance.
    pub fn iter_with_origin(
        &self
    ) -> impl Iterator<Item = (&Payload, &PayloadOrigin)> {
        self.payload.iter().map(|item| (&item.0, &item.1))
    }
}


//------------ PayloadDelta --------------------------------------------------

/// The changes between two consecutive snapshots.
///
/// Applying the withdrawals and then the announcements to the older
/// snapshot produces the newer one. The two lists are disjoint by
/// construction.
#[derive(Clone, Debug)]
pub struct PayloadDelta {
    /// The target serial: the serial of the newer snapshot.
    serial: Serial,

    /// The payload added by this delta, in ascending order.
    announce: Vec<Payload>,

    /// The payload removed by this delta, in ascending order.
    withdraw: Vec<Payload>,
}

impl PayloadDelta {
    /// Creates an empty delta with the given target serial.
    pub fn empty(serial: Serial) -> Self {
        PayloadDelta {
            serial,
            announce: Vec::new(),
            withdraw: Vec::new(),
        }
    }

    /// Computes the delta between two snapshots.
    ///
    /// Returns `None` if the payload sets are identical.
    pub fn construct(
        current: &PayloadSnapshot,
        next: &PayloadSnapshot,
        serial: Serial,
    ) -> Option<Self> {
        // Both snapshots are sorted and deduplicated, so a merge pass
        // finds the differences.
        let mut announce = Vec::new();
        let mut withdraw = Vec::new();
        let mut left = current.iter().peekable();
        let mut right = next.iter().peekable();
        loop {
            match (left.peek(), right.peek()) {
                (Some(&old), Some(&new)) => {
                    match old.cmp(new) {
                        cmp::Ordering::Less => {
                            withdraw.push(old.clone());
                            left.next();
                        }
                        cmp::Ordering::Greater => {
                            announce.push(new.clone());
                            right.next();
                        }
                        cmp::Ordering::Equal => {
                            left.next();
                            right.next();
                        }
                    }
                }
                (Some(_), None) => {
                    withdraw.push(left.next().unwrap().clone());
                }
                (None, Some(_)) => {
                    announce.push(right.next().unwrap().clone());
                }
                (None, None) => break,
            }
        }
        if announce.is_empty() && withdraw.is_empty() {
            None
        }
        else {
            Some(PayloadDelta { serial: serial.add(1), announce, withdraw })
        }
    }

    /// Returns the target serial number of the delta.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn announce(&self) -> &[Payload] {
        &self.announce
    }

    pub fn withdraw(&self) -> &[Payload] {
        &self.withdraw
    }

    pub fn is_empty(&self) -> bool {
        self.announce.is_empty() && self.withdraw.is_empty()
    }
}


//------------ SharedHistory -------------------------------------------------

/// A shareable, concurrently readable payload history.
///
/// Many RTR sessions read the history; the validation driver is the
/// sole writer, committing through [`update`][Self::update].
#[derive(Clone, Debug)]
pub struct SharedHistory(Arc<RwLock<PayloadHistory>>);

impl SharedHistory {
    /// Creates a new shared history.
    ///
    /// `keep` is the number of snapshots to retain; timing is handed to
    /// clients in End of Data PDUs.
    pub fn new(keep: usize, timing: Timing) -> Self {
        SharedHistory(Arc::new(RwLock::new(
            PayloadHistory::new(keep, timing)
        )))
    }

    /// Provides read access to the underlying history.
    pub fn read(&self) -> impl ops::Deref<Target = PayloadHistory> + '_ {
        self.0.read().expect("payload history lock poisoned")
    }

    fn write(&self) -> impl ops::DerefMut<Target = PayloadHistory> + '_ {
        self.0.write().expect("payload history lock poisoned")
    }

    /// Installs the outcome of a validation cycle.
    ///
    /// If the snapshot differs from the current one – or is the first
    /// ever – a new serial is allocated and the delta recorded. An
    /// unchanged set keeps the current serial. Returns whether a new
    /// version was installed, i.e. whether clients should be notified.
    pub fn update(&self, snapshot: PayloadSnapshot) -> bool {
        let (current, serial) = {
            let read = self.read();
            (read.current(), read.serial())
        };

        let mut history = self.write();
        match current {
            Some(current) => {
                match PayloadDelta::construct(&current, &snapshot, serial) {
                    Some(delta) => {
                        info!(
                            "New serial {} with {} announced and \
                             {} withdrawn items.",
                            delta.serial(),
                            delta.announce().len(),
                            delta.withdraw().len(),
                        );
                        history.push(snapshot, Some(delta));
                        true
                    }
                    None => false
                }
            }
            None => {
                // The first snapshot ever. It gets serial one and a
                // delta from the implicit empty set so clients at
                // serial zero can update incrementally.
                let delta = PayloadDelta {
                    serial: serial.add(1),
                    announce: snapshot.iter().cloned().collect(),
                    withdraw: Vec::new(),
                };
                history.push(snapshot, Some(delta));
                true
            }
        }
    }
}


//--- PayloadSource

impl PayloadSource for SharedHistory {
    type Set = SnapshotIter;
    type Diff = DeltaIter;

    fn ready(&self) -> bool {
        self.read().is_active()
    }

    fn notify(&self) -> State {
        let read = self.read();
        State::from_parts(read.session(), read.serial())
    }

    fn full(&self) -> (State, Self::Set) {
        let read = self.read();
        (
            State::from_parts(read.session(), read.serial()),
            SnapshotIter::new(read.current().unwrap_or_default()),
        )
    }

    fn diff(&self, state: State) -> Option<(State, Self::Diff)> {
        let read = self.read();
        if read.session() != state.session() {
            return None
        }
        read.delta_since(state.serial()).map(|delta| {
            (
                State::from_parts(read.session(), read.serial()),
                DeltaIter::new(delta),
            )
        })
    }

    fn timing(&self) -> Timing {
        self.read().timing
    }
}


//------------ PayloadHistory ------------------------------------------------

/// The history of validated payload.
#[derive(Clone, Debug)]
pub struct PayloadHistory {
    /// The current snapshot, if a cycle has completed yet.
    current: Option<Arc<PayloadSnapshot>>,

    /// The retained older snapshots, oldest first.
    snapshots: VecDeque<Arc<PayloadSnapshot>>,

    /// The retained deltas, newest in front.
    ///
    /// The front delta’s target serial is the current serial. With
    /// `keep` snapshots retained, at most `keep - 1` deltas connect
    /// them.
    deltas: VecDeque<Arc<PayloadDelta>>,

    /// The serial of the current snapshot.
    serial: Serial,

    /// The RTR session ID.
    session: u16,

    /// The number of snapshots to keep.
    keep: usize,

    /// The timing values handed to RTR clients.
    timing: Timing,
}

impl PayloadHistory {
    fn new(keep: usize, timing: Timing) -> Self {
        PayloadHistory {
            current: None,
            snapshots: VecDeque::new(),
            deltas: VecDeque::new(),
            serial: Serial(0),
            session: State::new().session(),
            keep: cmp::max(keep, 1),
            timing,
        }
    }

    /// Installs a new snapshot and optional delta, evicting old data.
    fn push(
        &mut self, snapshot: PayloadSnapshot, delta: Option<PayloadDelta>
    ) {
        let snapshot = Arc::new(snapshot);
        if let Some(old) = self.current.replace(snapshot.clone()) {
            self.snapshots.push_back(old);
        }
        // The current snapshot also counts against the retention.
        while self.snapshots.len() + 1 > self.keep {
            self.snapshots.pop_front();
        }
        if let Some(delta) = delta {
            self.serial = delta.serial();
            self.deltas.push_front(Arc::new(delta));
            while self.deltas.len() + 1 > self.keep {
                self.deltas.pop_back();
            }
        }
    }

    /// Returns whether the history can serve data yet.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Returns the current snapshot, if there is one.
    pub fn current(&self) -> Option<Arc<PayloadSnapshot>> {
        self.current.clone()
    }

    /// Returns the serial number of the current data set.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Returns the RTR session ID.
    pub fn session(&self) -> u16 {
        self.session
    }

    /// Returns the retained snapshot with the given serial.
    ///
    /// The current snapshot has the current serial, its predecessor one
    /// less, and so on. Serials outside the retained window return
    /// `None`.
    pub fn snapshot(&self, serial: Serial) -> Option<Arc<PayloadSnapshot>> {
        if serial == self.serial {
            return self.current()
        }
        let mut candidate = self.serial;
        for snapshot in self.snapshots.iter().rev() {
            candidate = Serial(candidate.into_u32().wrapping_sub(1));
            if candidate == serial {
                return Some(snapshot.clone())
            }
        }
        None
    }

    /// Returns a delta from the given serial to the current state.
    ///
    /// Returns an empty delta if `serial` is current, a merged delta if
    /// the requested serial is within the retained window, and `None`
    /// if it is not – the client then needs a cache reset.
    pub fn delta_since(&self, serial: Serial) -> Option<Arc<PayloadDelta>> {
        if serial == self.serial {
            return Some(Arc::new(PayloadDelta::empty(serial)))
        }

        // Count how many deltas we need, newest first.
        let mut needed = 0;
        let mut target = serial;
        loop {
            if needed == self.deltas.len() {
                // Ran out of history before reaching the serial. The
                // serial may also be from the future; either way the
                // client needs a reset.
                return None
            }
            target = target.add(1);
            needed += 1;
            if target == self.serial {
                break
            }
        }

        if needed == 1 {
            return Some(self.deltas[0].clone())
        }
        let mut merger = DeltaMerger::new(self.serial);
        for delta in self.deltas.iter().take(needed).rev() {
            merger.merge(delta);
        }
        Some(Arc::new(merger.into_delta()))
    }
}


//------------ DeltaMerger ---------------------------------------------------

/// Merges a sequence of deltas, oldest first, into a combined delta.
///
/// A payload announced and later withdrawn – or the other way around –
/// cancels out, which keeps announcements and withdrawals disjoint.
#[derive(Clone, Debug)]
struct DeltaMerger {
    serial: Serial,
    announce: Vec<Payload>,
    withdraw: Vec<Payload>,
}

impl DeltaMerger {
    fn new(serial: Serial) -> Self {
        DeltaMerger {
            serial,
            announce: Vec::new(),
            withdraw: Vec::new(),
        }
    }

    fn merge(&mut self, delta: &PayloadDelta) {
        for item in delta.announce() {
            if let Some(pos)
                = self.withdraw.iter().position(|x| x == item)
            {
                self.withdraw.remove(pos);
            }
            else if !self.announce.contains(item) {
                self.announce.push(item.clone());
            }
        }
        for item in delta.withdraw() {
            if let Some(pos)
                = self.announce.iter().position(|x| x == item)
            {
                self.announce.remove(pos);
            }
            else if !self.withdraw.contains(item) {
                self.withdraw.push(item.clone());
            }
        }
    }

    fn into_delta(mut self) -> PayloadDelta {
        self.announce.sort();
        self.withdraw.sort();
        PayloadDelta {
            serial: self.serial,
            announce: self.announce,
            withdraw: self.withdraw,
        }
    }
}


//------------ SnapshotIter --------------------------------------------------

/// An iterator over the payload of a shared snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotIter {
    snapshot: Arc<PayloadSnapshot>,
    pos: usize,
}

impl SnapshotIter {
    fn new(snapshot: Arc<PayloadSnapshot>) -> Self {
        SnapshotIter { snapshot, pos: 0 }
    }
}

impl PayloadSet for SnapshotIter {
    fn next(&mut self) -> Option<&Payload> {
        let res = self.snapshot.payload.get(self.pos)?;
        self.pos += 1;
        Some(&res.0)
    }
}


//------------ DeltaIter -----------------------------------------------------

/// An iterator over the entries of a shared delta.
///
/// Withdrawals are yielded before announcements; clients apply them in
/// that order.
#[derive(Clone, Debug)]
pub struct DeltaIter {
    delta: Arc<PayloadDelta>,
    pos: usize,
}

impl DeltaIter {
    fn new(delta: Arc<PayloadDelta>) -> Self {
        DeltaIter { delta, pos: 0 }
    }
}

impl PayloadDiff for DeltaIter {
    fn next(&mut self) -> Option<(&Payload, Action)> {
        let withdraw_len = self.delta.withdraw.len();
        if self.pos < withdraw_len {
            let res = &self.delta.withdraw[self.pos];
            self.pos += 1;
            Some((res, Action::Withdraw))
        }
        else {
            let res = self.delta.announce.get(self.pos - withdraw_len)?;
            self.pos += 1;
            Some((res, Action::Announce))
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use super::*;

    fn origin(addr: [u8; 4], len: u8, max: u8, asn: u32) -> RouteOrigin {
        RouteOrigin::new(
            IpAddr::from(Ipv4Addr::from(addr)), len, max, asn.into()
        )
    }

    fn report(origins: &[RouteOrigin]) -> ValidationReport {
        let tal = TalInfo::from_name("test".into()).into_arc();
        let mut res = ValidationReport::new();
        for &item in origins {
            res.add_origin(item, tal.clone());
        }
        res
    }

    fn snapshot(origins: &[RouteOrigin]) -> PayloadSnapshot {
        report(origins).into_snapshot(&LocalExceptions::default())
    }

    #[test]
    fn report_counters_merge() {
        let mut left = ValidationReport::new();
        left.note_valid_roa();
        left.note_valid_roa();
        left.note_rejected();
        let mut right = ValidationReport::new();
        right.note_valid_router_cert();
        right.note_rejected();
        left.merge(right);
        assert_eq!(left.valid_roas(), 2);
        assert_eq!(left.valid_router_certs(), 1);
        assert_eq!(left.rejected(), 2);
    }

    #[test]
    fn snapshot_dedups_payload() {
        let item = origin([10, 0, 0, 0], 24, 24, 64500);
        let other_tal = TalInfo::from_name("other".into()).into_arc();
        let mut report = report(&[item]);
        report.add_origin(item, other_tal);
        let snapshot = report.into_snapshot(&LocalExceptions::default());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.iter_with_origin().next().unwrap().1.tal_name(),
            Some("test")
        );
    }

    #[test]
    fn delta_construct_and_apply() {
        let a = origin([10, 0, 0, 0], 24, 24, 64500);
        let b = origin([10, 0, 1, 0], 24, 24, 64501);
        let c = origin([10, 0, 2, 0], 24, 26, 64502);

        let old = snapshot(&[a, b]);
        let new = snapshot(&[b, c]);
        let delta = PayloadDelta::construct(
            &old, &new, Serial(4)
        ).unwrap();
        assert_eq!(delta.serial(), Serial(5));
        assert_eq!(delta.announce(), &[Payload::Origin(c)]);
        assert_eq!(delta.withdraw(), &[Payload::Origin(a)]);

        // Applying withdrawals then announcements to the old set
        // produces the new set.
        let mut applied: Vec<Payload> = old.iter().cloned().collect();
        applied.retain(|item| !delta.withdraw().contains(item));
        applied.extend(delta.announce().iter().cloned());
        applied.sort();
        assert_eq!(applied, new.iter().cloned().collect::<Vec<_>>());

        // Announcements and withdrawals are disjoint.
        assert!(
            delta.announce().iter()
                .all(|item| !delta.withdraw().contains(item))
        );

        // Identical sets produce no delta.
        assert!(PayloadDelta::construct(&old, &old, Serial(4)).is_none());
    }

    #[test]
    fn history_serial_allocation() {
        let history = SharedHistory::new(2, Timing::default());
        assert!(!history.ready());

        // The first snapshot, even an empty one, gets serial 1.
        assert!(history.update(snapshot(&[])));
        assert_eq!(history.read().serial(), Serial(1));
        assert!(history.ready());

        // An unchanged set keeps the serial.
        assert!(!history.update(snapshot(&[])));
        assert_eq!(history.read().serial(), Serial(1));

        // A changed set bumps it.
        let a = origin([10, 0, 0, 0], 24, 24, 64500);
        assert!(history.update(snapshot(&[a])));
        assert_eq!(history.read().serial(), Serial(2));
    }

    #[test]
    fn history_delta_and_reset() {
        // Retention of two snapshots means one delta.
        let history = SharedHistory::new(2, Timing::default());
        let a = origin([10, 0, 0, 0], 24, 24, 64500);
        let b = origin([10, 0, 1, 0], 24, 24, 64501);

        history.update(snapshot(&[]));      // serial 1
        history.update(snapshot(&[a]));     // serial 2
        history.update(snapshot(&[a, b])); // serial 3

        let read = history.read();
        assert_eq!(read.serial(), Serial(3));

        // Current serial: empty delta.
        let delta = read.delta_since(Serial(3)).unwrap();
        assert!(delta.is_empty());

        // One behind: the stored delta.
        let delta = read.delta_since(Serial(2)).unwrap();
        assert_eq!(delta.announce(), &[Payload::Origin(b)]);

        // Behind the window: cache reset.
        assert!(read.delta_since(Serial(1)).is_none());

        // From the future: cache reset.
        assert!(read.delta_since(Serial(7)).is_none());
    }

    #[test]
    fn history_merges_deltas() {
        let history = SharedHistory::new(4, Timing::default());
        let a = origin([10, 0, 0, 0], 24, 24, 64500);
        let b = origin([10, 0, 1, 0], 24, 24, 64501);

        history.update(snapshot(&[]));      // serial 1
        history.update(snapshot(&[a]));     // serial 2: +a
        history.update(snapshot(&[a, b])); // serial 3: +b
        history.update(snapshot(&[b]));     // serial 4: -a

        let read = history.read();
        // From serial 1 the merged delta announces b only: a was
        // announced in 2 and withdrawn in 4, which cancels out.
        let delta = read.delta_since(Serial(1)).unwrap();
        assert_eq!(delta.serial(), Serial(4));
        assert_eq!(delta.announce(), &[Payload::Origin(b)]);
        assert!(delta.withdraw().is_empty());
    }

    #[test]
    fn snapshot_lookup() {
        let history = SharedHistory::new(3, Timing::default());
        let a = origin([10, 0, 0, 0], 24, 24, 64500);

        history.update(snapshot(&[]));     // serial 1
        history.update(snapshot(&[a]));    // serial 2

        let read = history.read();
        assert_eq!(read.snapshot(Serial(2)).unwrap().len(), 1);
        assert_eq!(read.snapshot(Serial(1)).unwrap().len(), 0);
        assert!(read.snapshot(Serial(7)).is_none());
    }
}
