//! Authorization gate.
//!
//! Callers are identified by the DN of their presented certificate and
//! admitted iff that DN appears verbatim in the allowlist published by the
//! identity directory. The allowlist is fetched on the first request and
//! kept for the life of the process; an empty fetch is not kept, so the next
//! request tries again. Requests that queued behind a fetch share its outcome,
//! empty or not.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustls::pki_types::CertificateDer;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::directory::DirectoryClient;
use crate::mtls::UserDn;
use crate::{Error, Result};

/// Outcome of the gate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Caller is listed
    Allowed(UserDn),
    /// Caller is unknown, unidentifiable, or no allowlist is available
    Denied,
}

impl AuthDecision {
    /// Whether the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Allowlist
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot of authorized DNs.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    dns: Arc<HashSet<String>>,
}

impl Allowlist {
    /// Snapshot over the given DNs.
    #[must_use]
    pub fn new(dns: impl IntoIterator<Item = String>) -> Self {
        Self {
            dns: Arc::new(dns.into_iter().collect()),
        }
    }

    /// Exact, case-sensitive membership.
    #[must_use]
    pub fn contains(&self, dn: &str) -> bool {
        self.dns.contains(dn)
    }

    /// Number of distinct DNs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dns.len()
    }

    /// Whether the snapshot holds no DN.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorizer
// ─────────────────────────────────────────────────────────────────────────────

/// Allowlist cache plus the admission decision.
pub struct Authorizer {
    directory: Arc<dyn DirectoryClient>,
    allowlist: OnceCell<Allowlist>,
    /// Held for the duration of one directory fetch.
    fetch_lock: Mutex<()>,
    /// Completed fetches, successful or not.
    attempts: AtomicU64,
}

impl Authorizer {
    /// Gate backed by `directory`.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self {
            directory,
            allowlist: OnceCell::new(),
            fetch_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    /// The cached allowlist, fetching it if none is cached yet.
    ///
    /// Callers that arrive while a fetch is in flight wait for it and take
    /// its outcome instead of fetching again, so a burst of first requests
    /// costs one directory call even when that call comes back empty.
    ///
    /// # Errors
    ///
    /// `Error::Fetch` when the directory yields no DN. Nothing is cached in
    /// that case.
    pub async fn allowlist(&self) -> Result<&Allowlist> {
        if let Some(allowlist) = self.allowlist.get() {
            return Ok(allowlist);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let _guard = self.fetch_lock.lock().await;
        if let Some(allowlist) = self.allowlist.get() {
            return Ok(allowlist);
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            debug!("Reusing empty result of the fetch this request waited on");
            return Err(empty_fetch());
        }

        let dns = self.directory.fetch_allowed_dns().await;
        self.attempts.fetch_add(1, Ordering::Release);
        if dns.is_empty() {
            return Err(empty_fetch());
        }

        let allowlist = Allowlist::new(dns);
        info!(count = allowlist.len(), "Allowlist cached");
        Ok(self.allowlist.get_or_init(|| async { allowlist }).await)
    }

    /// Membership test against the cached snapshot; `false` before the
    /// first successful fetch.
    #[must_use]
    pub fn is_allowed(&self, dn: &str) -> bool {
        self.allowlist.get().is_some_and(|a| a.contains(dn))
    }

    /// Decide on a request presenting `chain` (leaf first).
    pub async fn authorize(&self, chain: &[CertificateDer<'_>]) -> AuthDecision {
        if let Err(e) = self.allowlist().await {
            warn!(error = %e, "Allowlist unavailable");
        }

        let dn = match UserDn::from_chain(chain) {
            Ok(dn) => dn,
            Err(e) => {
                warn!(error = %e, "Unable to identify caller");
                return AuthDecision::Denied;
            }
        };

        if self.is_allowed(dn.as_str()) {
            debug!(dn = %dn, "Caller authorized");
            AuthDecision::Allowed(dn)
        } else {
            warn!(dn = %dn, "Caller DN not in allowlist");
            AuthDecision::Denied
        }
    }
}

fn empty_fetch() -> Error {
    Error::Fetch("directory returned no DNs".to_string())
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("allowlist", &self.allowlist.get().map(Allowlist::len))
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtls::load_certs;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ALICE: &str =
        "/DC=ch/DC=cern/OU=Organic Units/OU=Users/CN=alice/CN=654321/CN=Alice Example";

    struct FakeDirectory {
        calls: AtomicUsize,
        dns: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl FakeDirectory {
        fn new(dns: &[&str]) -> Arc<Self> {
            Self::with_delay(dns, Duration::from_millis(20))
        }

        fn with_delay(dns: &[&str], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                dns: Mutex::new(dns.iter().map(ToString::to_string).collect()),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn publish(&self, dns: &[&str]) {
            *self.dns.lock().unwrap() = dns.iter().map(ToString::to_string).collect();
        }
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn fetch_allowed_dns(&self) -> Vec<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.dns.lock().unwrap().clone()
        }
    }

    fn chain(name: &str) -> Vec<CertificateDer<'static>> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name);
        load_certs(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn allowlist_membership_is_exact() {
        let list = Allowlist::new(vec![ALICE.to_string()]);
        assert!(list.contains(ALICE));
        assert!(!list.contains(&ALICE.to_lowercase()));
        assert!(!list.contains(&ALICE[..ALICE.len() - 1]));
        assert!(!list.contains(&format!("{ALICE}/CN=1786543210")));
        assert!(!list.contains(""));
    }

    #[tokio::test]
    async fn listed_caller_is_allowed() {
        let dir = FakeDirectory::new(&["/CN=someone-else", ALICE]);
        let gate = Authorizer::new(dir.clone());

        let decision = gate.authorize(&chain("usercert.pem")).await;
        let expected = UserDn::from_chain(&chain("usercert.pem")).unwrap();
        assert_eq!(decision.clone(), AuthDecision::Allowed(expected));
        assert!(decision.is_allowed());
        assert!(gate.is_allowed(ALICE));
    }

    #[tokio::test]
    async fn proxy_chain_maps_to_owner_dn() {
        let dir = FakeDirectory::new(&[ALICE]);
        let gate = Authorizer::new(dir);
        let decision = gate.authorize(&chain("x509up_proxy.pem")).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn unlisted_caller_is_denied() {
        let dir = FakeDirectory::new(&["/CN=someone-else"]);
        let gate = Authorizer::new(dir);
        let decision = gate.authorize(&chain("usercert.pem")).await;
        assert_eq!(decision, AuthDecision::Denied);
    }

    #[tokio::test]
    async fn unidentifiable_caller_is_denied() {
        let dir = FakeDirectory::new(&[ALICE]);
        let gate = Authorizer::new(dir);
        assert_eq!(gate.authorize(&[]).await, AuthDecision::Denied);
        let decision = gate.authorize(&chain("reordered.pem")).await;
        assert_eq!(decision, AuthDecision::Denied);
    }

    #[tokio::test]
    async fn allowlist_is_fetched_once_and_kept() {
        let dir = FakeDirectory::new(&[ALICE]);
        let gate = Authorizer::new(dir.clone());

        assert!(gate.authorize(&chain("usercert.pem")).await.is_allowed());
        dir.publish(&["/CN=someone-else"]);
        assert!(gate.authorize(&chain("usercert.pem")).await.is_allowed());
        assert_eq!(gate.allowlist().await.unwrap().len(), 1);
        assert_eq!(dir.calls(), 1);
    }

    #[tokio::test]
    async fn empty_fetch_is_retried() {
        let dir = FakeDirectory::new(&[]);
        let gate = Authorizer::new(dir.clone());

        let decision = gate.authorize(&chain("usercert.pem")).await;
        assert_eq!(decision, AuthDecision::Denied);
        assert!(!gate.is_allowed(ALICE));
        assert_eq!(dir.calls(), 1);

        dir.publish(&[ALICE]);
        assert!(gate.authorize(&chain("usercert.pem")).await.is_allowed());
        assert_eq!(dir.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_share_one_fetch() {
        let dir = FakeDirectory::new(&[ALICE]);
        let gate = Arc::new(Authorizer::new(dir.clone()));
        let leaf = chain("usercert.pem");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let leaf = leaf.clone();
                tokio::spawn(async move { gate.authorize(&leaf).await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_allowed());
        }
        assert_eq!(dir.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_share_one_empty_fetch() {
        let dir = FakeDirectory::with_delay(&[], Duration::from_millis(200));
        let gate = Arc::new(Authorizer::new(dir.clone()));
        let leaf = chain("usercert.pem");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let leaf = leaf.clone();
                tokio::spawn(async move { gate.authorize(&leaf).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), AuthDecision::Denied);
        }
        assert_eq!(dir.calls(), 1);

        dir.publish(&[ALICE]);
        assert!(gate.authorize(&leaf).await.is_allowed());
        assert_eq!(dir.calls(), 2);
    }
}
