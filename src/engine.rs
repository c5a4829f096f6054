//! The validation engine.
//!
//! A validation cycle walks the certificate tree of every configured
//! trust anchor depth first. For each CA the walker fetches the
//! publication point, validates the manifest and the CRL, and then
//! processes the manifest entries in listed order: child CA
//! certificates are validated and descended into, ROAs and router
//! certificates contribute payload, everything else is checked and
//! skipped.
//!
//! Errors follow the scoped rejection policy: a broken object – or a
//! broken subtree – is logged and dropped while its siblings continue
//! to be processed. Only a failure of the trust anchor itself or of its
//! manifest aborts the whole trust anchor for this cycle.
//!
//! The walker keeps a single stack of frames, each the validated
//! certificate with its resolved resources. The stack doubles as the
//! loop breaker: a certificate whose key identifier is already on the
//! stack is rejected.

use futures_util::future::{join_all, BoxFuture};
use log::{debug, info, warn};
use crate::cert::{Cert, ResourceCert};
use crate::crl::Crl;
use crate::crypto::KeyIdentifier;
use crate::manifest::{Manifest, ManifestContent};
use crate::oid;
use crate::payload::{RouteOrigin, RouterKey, ValidationReport};
use crate::roa::Roa;
use crate::rsync;
use crate::sigobj::SignedObject;
use crate::tal::Tal;
use crate::uri;
use crate::x509::{Time, ValidationError};


//------------ Engine --------------------------------------------------------

/// The validation engine.
///
/// One value lives for the lifetime of the process; every call to
/// [`run`][Self::run] performs a complete validation cycle over all
/// trust anchors and produces a fresh report.
pub struct Engine {
    /// The local repository cache.
    cache: rsync::Cache,

    /// The trust anchor locators to start from.
    tals: Vec<Tal>,

    /// Whether stale manifests and CRLs reject their CA.
    strict: bool,

    /// Whether to parse Ghostbusters records for diagnostics.
    parse_gbr: bool,
}

impl Engine {
    pub fn new(
        cache: rsync::Cache,
        tals: Vec<Tal>,
        strict: bool,
        parse_gbr: bool,
    ) -> Self {
        Engine { cache, tals, strict, parse_gbr }
    }

    /// Runs one validation cycle and returns the combined report.
    pub async fn run(&self) -> ValidationReport {
        let repo = self.cache.start();
        let now = Time::now();
        let runs = join_all(self.tals.iter().map(|tal| {
            self.process_tal(&repo, tal, now)
        })).await;
        let mut report = ValidationReport::new();
        for item in runs {
            report.merge(item);
        }
        report
    }

    /// Processes a single trust anchor.
    async fn process_tal(
        &self,
        repo: &rsync::Run<'_>,
        tal: &Tal,
        now: Time,
    ) -> ValidationReport {
        let mut report = ValidationReport::new();
        let ta = match self.load_ta(repo, tal, now).await {
            Some(ta) => ta,
            None => {
                warn!(
                    "{}: no valid trust anchor certificate, \
                     skipping this trust anchor",
                    tal.name()
                );
                return report
            }
        };
        let mut stack = Vec::new();
        stack.push(ta.subject_key_identifier());
        self.process_ca(repo, ta, &mut stack, &mut report, now).await;
        stack.pop();
        debug_assert!(stack.is_empty());
        info!(
            "{}: {} valid ROAs, {} valid router certificates, \
             {} payload items, {} objects rejected.",
            tal.name(), report.valid_roas(), report.valid_router_certs(),
            report.len(), report.rejected()
        );
        report
    }

    /// Fetches and validates the trust anchor certificate of a TAL.
    ///
    /// Tries the TAL’s URIs in order. The certificate must carry the
    /// key the TAL pins, be self-signed, and hold literal, non-empty
    /// resources.
    async fn load_ta(
        &self,
        repo: &rsync::Run<'_>,
        tal: &Tal,
        now: Time,
    ) -> Option<ResourceCert> {
        for uri in tal.uris() {
            let bytes = match repo.load_file(uri).await {
                Some(bytes) => bytes,
                None => continue,
            };
            let cert = match Cert::decode(bytes) {
                Ok(cert) => cert,
                Err(err) => {
                    warn!("{}: failed to decode: {}", uri, err);
                    continue
                }
            };
            if cert.subject_public_key_info() != tal.key_info() {
                warn!(
                    "{}: key does not match TAL {}", uri, tal.name()
                );
                continue
            }
            match cert.validate_ta_at(tal.info().clone(), now) {
                Ok(cert) => return Some(cert),
                Err(err) => {
                    warn!("{}: {}", uri, err);
                    continue
                }
            }
        }
        None
    }

    /// Processes the publication point of a validated CA certificate.
    ///
    /// `cert` is the frame for this level of the walk: the certificate
    /// together with its resolved resources. The SKIs of all frames
    /// currently on the walk are in `stack`.
    fn process_ca<'a>(
        &'a self,
        repo: &'a rsync::Run<'a>,
        cert: ResourceCert,
        stack: &'a mut Vec<KeyIdentifier>,
        report: &'a mut ValidationReport,
        now: Time,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let point = match self.load_point(repo, &cert, now).await {
                Some(point) => point,
                None => {
                    report.note_rejected();
                    return
                }
            };
            self.process_point(
                repo, &cert, point, stack, report, now
            ).await;
        })
    }

    /// Loads and validates the manifest and CRL of a CA.
    async fn load_point(
        &self,
        repo: &rsync::Run<'_>,
        cert: &ResourceCert,
        now: Time,
    ) -> Option<PubPoint> {
        // Presence of the manifest URI was checked during certificate
        // validation.
        let mft_uri = cert.rpki_manifest()?;
        let mft_bytes = match repo.load_file(mft_uri).await {
            Some(bytes) => bytes,
            None => {
                warn!("{}: failed to fetch manifest", mft_uri);
                return None
            }
        };
        let manifest = match Manifest::decode(mft_bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!("{}: failed to decode: {}", mft_uri, err);
                return None
            }
        };

        // The CRL the manifest’s EE certificate points to is the CRL
        // of this publication point.
        let crl_uri = match manifest.cert().crl_uri() {
            Some(uri) => uri.clone(),
            None => {
                warn!("{}: manifest EE without CRL", mft_uri);
                return None
            }
        };
        let crl_path = match repo.file_path(&crl_uri).await {
            Some(path) => path,
            None => {
                warn!("{}: failed to fetch CRL", crl_uri);
                return None
            }
        };
        let crl_bytes = match repo.load_file(&crl_uri).await {
            Some(bytes) => bytes,
            None => {
                warn!("{}: failed to fetch CRL", crl_uri);
                return None
            }
        };
        let crl = match Crl::decode(crl_bytes) {
            Ok(crl) => crl,
            Err(err) => {
                warn!("{}: failed to decode: {}", crl_uri, err);
                return None
            }
        };
        if let Err(err) = crl.verify_signature(
            cert.subject_public_key_info()
        ) {
            warn!("{}: {}", crl_uri, err);
            return None
        }
        if crl.is_stale(now) {
            if self.strict {
                warn!("{}: stale CRL, rejecting", crl_uri);
                return None
            }
            warn!("{}: stale CRL, accepting anyway", crl_uri);
        }

        // Validate the manifest itself, checking its EE certificate
        // against the CRL we just validated.
        let (_ee, content) = match manifest.process(
            cert, now,
            |ee| check_revocation(&crl, ee)
        ) {
            Ok(res) => res,
            Err(err) => {
                warn!("{}: {}", mft_uri, err);
                return None
            }
        };
        if content.is_stale(now) {
            if self.strict {
                warn!("{}: stale manifest, rejecting", mft_uri);
                return None
            }
            warn!("{}: stale manifest, accepting anyway", mft_uri);
        }

        // The CRL must appear on the manifest with a matching hash.
        let crl_file = crl_uri.path().rsplit('/').next().unwrap_or("");
        match content.iter().find(|entry| entry.file() == crl_file) {
            Some(entry) => {
                if let Err(err) = entry.hash().verify_file(&crl_path) {
                    warn!("{}: {}", crl_uri, err);
                    return None
                }
            }
            None => {
                if self.strict {
                    warn!("{}: CRL not listed on manifest", crl_uri);
                    return None
                }
                warn!(
                    "{}: CRL not listed on manifest, accepting anyway",
                    crl_uri
                );
            }
        }

        Some(PubPoint { content, crl, crl_file: crl_file.into() })
    }

    /// Processes the entries of a validated manifest.
    async fn process_point(
        &self,
        repo: &rsync::Run<'_>,
        cert: &ResourceCert,
        point: PubPoint,
        stack: &mut Vec<KeyIdentifier>,
        report: &mut ValidationReport,
        now: Time,
    ) {
        // Presence was checked during certificate validation.
        let base = match cert.ca_repository() {
            Some(uri) => uri.clone(),
            None => return,
        };
        for entry in point.content.iter() {
            if entry.file() == point.crl_file {
                continue
            }
            let uri = base.join(entry.file().as_bytes());
            let path = match repo.file_path(&uri).await {
                Some(path) => path,
                None => {
                    warn!("{}: listed on manifest but missing", uri);
                    report.note_rejected();
                    continue
                }
            };
            // The hash check streams from disk; the file is read whole
            // only after it matched.
            if let Err(err) = entry.hash().verify_file(&path) {
                warn!("{}: {}", uri, err);
                report.note_rejected();
                continue
            }
            let bytes = match repo.load_file(&uri).await {
                Some(bytes) => bytes,
                None => {
                    warn!("{}: listed on manifest but missing", uri);
                    report.note_rejected();
                    continue
                }
            };

            if uri.ends_with(".cer") {
                self.process_cer(
                    repo, cert, &point.crl, &uri, bytes,
                    stack, report, now,
                ).await;
            }
            else if uri.ends_with(".roa") {
                self.process_roa(
                    cert, &point.crl, &uri, bytes, report, now
                );
            }
            else if uri.ends_with(".mft") {
                debug!("{}: ignoring nested manifest entry", uri);
            }
            else if uri.ends_with(".gbr") {
                self.process_gbr(
                    cert, &point.crl, &uri, bytes, report, now
                );
            }
            else if uri.ends_with(".bgpsec") {
                self.process_router_cert(
                    cert, &point.crl, &uri, bytes, report, now
                );
            }
            else {
                debug!("{}: ignoring unknown object type", uri);
            }
        }
    }

    /// Processes a child CA certificate.
    #[allow(clippy::too_many_arguments)]
    async fn process_cer(
        &self,
        repo: &rsync::Run<'_>,
        issuer: &ResourceCert,
        crl: &Crl,
        uri: &uri::Rsync,
        bytes: bytes::Bytes,
        stack: &mut Vec<KeyIdentifier>,
        report: &mut ValidationReport,
        now: Time,
    ) {
        let cert = match Cert::decode(bytes) {
            Ok(cert) => cert,
            Err(err) => {
                warn!("{}: failed to decode: {}", uri, err);
                report.note_rejected();
                return
            }
        };
        if crl.contains(cert.serial_number()) {
            warn!("{}: certificate revoked", uri);
            report.note_rejected();
            return
        }
        let ski = cert.subject_key_identifier();
        if stack.contains(&ski) {
            warn!("{}: certificate loop detected", uri);
            report.note_rejected();
            return
        }
        let child = match cert.validate_ca_at(issuer, now) {
            Ok(child) => child,
            Err(err) => {
                warn!("{}: {}", uri, err);
                report.note_rejected();
                return
            }
        };
        stack.push(ski);
        self.process_ca(repo, child, stack, report, now).await;
        stack.pop();
    }

    /// Processes a ROA.
    fn process_roa(
        &self,
        issuer: &ResourceCert,
        crl: &Crl,
        uri: &uri::Rsync,
        bytes: bytes::Bytes,
        report: &mut ValidationReport,
        now: Time,
    ) {
        let roa = match Roa::decode(bytes) {
            Ok(roa) => roa,
            Err(err) => {
                warn!("{}: failed to decode: {}", uri, err);
                report.note_rejected();
                return
            }
        };
        match roa.process(issuer, now, |ee| check_revocation(crl, ee)) {
            Ok((_ee, content)) => {
                report.note_valid_roa();
                let asn = content.as_id();
                for addr in content.v4_addrs() {
                    report.add_origin(
                        RouteOrigin::new(
                            addr.prefix().to_v4().into(),
                            addr.prefix().addr_len(),
                            addr.resolved_max_length(),
                            asn,
                        ),
                        issuer.tal().clone(),
                    );
                }
                for addr in content.v6_addrs() {
                    report.add_origin(
                        RouteOrigin::new(
                            addr.prefix().to_v6().into(),
                            addr.prefix().addr_len(),
                            addr.resolved_max_length(),
                            asn,
                        ),
                        issuer.tal().clone(),
                    );
                }
            }
            Err(err) => {
                warn!("{}: {}", uri, err);
                report.note_rejected();
            }
        }
    }

    /// Processes a BGPsec router certificate.
    fn process_router_cert(
        &self,
        issuer: &ResourceCert,
        crl: &Crl,
        uri: &uri::Rsync,
        bytes: bytes::Bytes,
        report: &mut ValidationReport,
        now: Time,
    ) {
        let cert = match Cert::decode(bytes) {
            Ok(cert) => cert,
            Err(err) => {
                warn!("{}: failed to decode: {}", uri, err);
                report.note_rejected();
                return
            }
        };
        if crl.contains(cert.serial_number()) {
            warn!("{}: certificate revoked", uri);
            report.note_rejected();
            return
        }
        let cert = match cert.validate_router_at(issuer, now) {
            Ok(cert) => cert,
            Err(err) => {
                warn!("{}: {}", uri, err);
                report.note_rejected();
                return
            }
        };
        report.note_valid_router_cert();
        let ski = cert.subject_key_identifier();
        let key_info = cert.spki_bytes();
        for asn in cert.resources().asn().iter_asns() {
            report.add_router_key(
                RouterKey::new(ski, asn, key_info.clone()),
                issuer.tal().clone(),
            );
        }
    }

    /// Processes a Ghostbusters record.
    ///
    /// Nothing in the record contributes to the data set. By default
    /// the hash-checked entry is simply skipped; with parsing enabled
    /// the envelope is validated so a damaged record does not go
    /// unnoticed.
    fn process_gbr(
        &self,
        issuer: &ResourceCert,
        crl: &Crl,
        uri: &uri::Rsync,
        bytes: bytes::Bytes,
        report: &mut ValidationReport,
        now: Time,
    ) {
        if !self.parse_gbr {
            debug!("{}: skipping Ghostbusters record", uri);
            return
        }
        let obj = match SignedObject::decode_if_type(
            bytes, &oid::CT_GHOSTBUSTERS
        ) {
            Ok(obj) => obj,
            Err(err) => {
                warn!("{}: failed to decode: {}", uri, err);
                report.note_rejected();
                return
            }
        };
        match obj.process(issuer, now, |ee| check_revocation(crl, ee)) {
            Ok(_) => {
                debug!("{}: valid Ghostbusters record", uri);
            }
            Err(err) => {
                warn!("{}: {}", uri, err);
                report.note_rejected();
            }
        }
    }
}


//------------ PubPoint ------------------------------------------------------

/// The validated entry objects of a publication point.
struct PubPoint {
    /// The content of the validated manifest.
    content: ManifestContent,

    /// The validated CRL of the point.
    crl: Crl,

    /// The file name of the CRL, to skip it during entry processing.
    crl_file: String,
}


//------------ Helpers -------------------------------------------------------

/// Checks that a certificate is not on the given CRL.
fn check_revocation(
    crl: &Crl, cert: &Cert
) -> Result<(), ValidationError> {
    if crl.contains(cert.serial_number()) {
        Err(ValidationError::crypto("certificate revoked"))
    }
    else {
        Ok(())
    }
}
