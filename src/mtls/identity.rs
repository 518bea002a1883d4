//! Caller identity extraction.
//!
//! Derives the grid-style Distinguished Name of a caller from the certificate
//! chain it presented during the TLS handshake:
//!
//! ```text
//! /DC=ch/DC=cern/OU=Organic Units/OU=Users/CN=alice/CN=654321/CN=Alice Example
//! ```
//!
//! Only the leading certificate of the chain is inspected. Its string-valued
//! subject attributes are taken in the order the subject presents them and the
//! first seven must be `DC, DC, OU, OU, CN, CN, CN`. Proxy certificates append
//! one more CN (the proxy serial) which is ignored, so a proxy and the user
//! certificate it was issued from map to the same DN.

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::{
    OID_DOMAIN_COMPONENT, OID_X509_COMMON_NAME, OID_X509_ORGANIZATIONAL_UNIT,
};
use x509_parser::prelude::FromDer;
use x509_parser::x509::AttributeTypeAndValue;

/// Number of subject attributes that make up a user DN.
pub const DN_COMPONENTS: usize = 7;

/// Attribute layout every user DN must follow.
const DN_LAYOUT: [AttrKind; DN_COMPONENTS] = [
    AttrKind::DomainComponent,
    AttrKind::DomainComponent,
    AttrKind::OrganizationalUnit,
    AttrKind::OrganizationalUnit,
    AttrKind::CommonName,
    AttrKind::CommonName,
    AttrKind::CommonName,
];

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Reasons a peer chain cannot be turned into a [`UserDn`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// The client did not present any certificate.
    #[error("no client certificate presented")]
    NoCertificate,

    /// The leading certificate is not valid DER.
    #[error("failed to parse client certificate: {0}")]
    Parse(String),

    /// Fewer than seven string-valued attributes in the subject.
    #[error("subject needs 7 DN attributes, found {found}")]
    TooFewAttributes {
        /// Number of string-valued attributes present
        found: usize,
    },

    /// An attribute in the first seven has the wrong type.
    #[error("subject attribute {position} is {found}, expected {expected}")]
    UnexpectedAttribute {
        /// Zero-based position within the subject
        position: usize,
        /// Attribute type the DN layout requires at this position
        expected: AttrKind,
        /// Attribute type actually present
        found: AttrKind,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Attribute kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Subject attribute type, as far as DN rendering is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// `DC` (domainComponent, 0.9.2342.19200300.100.1.25)
    DomainComponent,
    /// `OU`
    OrganizationalUnit,
    /// `CN`
    CommonName,
    /// Anything else, e.g. `O` or `C`
    Other,
}

impl AttrKind {
    fn of(attr: &AttributeTypeAndValue<'_>) -> Self {
        let oid = attr.attr_type();
        if *oid == OID_DOMAIN_COMPONENT {
            Self::DomainComponent
        } else if *oid == OID_X509_ORGANIZATIONAL_UNIT {
            Self::OrganizationalUnit
        } else if *oid == OID_X509_COMMON_NAME {
            Self::CommonName
        } else {
            Self::Other
        }
    }

    /// Short label used in the rendered DN.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::DomainComponent => "DC",
            Self::OrganizationalUnit => "OU",
            Self::CommonName => "CN",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Peer chain (request extension)
// ─────────────────────────────────────────────────────────────────────────────

/// Certificate chain presented by the client of a connection.
///
/// Inserted into every request's extensions by the TLS acceptor. An empty
/// chain means the client sent no certificate.
#[derive(Debug, Clone, Default)]
pub struct PeerCertificates(pub Arc<Vec<CertificateDer<'static>>>);

impl PeerCertificates {
    /// Wrap an owned chain.
    #[must_use]
    pub fn new(chain: Vec<CertificateDer<'static>>) -> Self {
        Self(Arc::new(chain))
    }

    /// Borrow the chain, leaf first.
    #[must_use]
    pub fn as_slice(&self) -> &[CertificateDer<'static>] {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User DN
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical caller Distinguished Name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserDn(String);

impl UserDn {
    /// Derive the DN from a peer chain (leaf first).
    ///
    /// # Errors
    ///
    /// Returns a [`DnError`] when the chain is empty, the leaf does not parse,
    /// or its subject does not follow the seven-attribute layout.
    pub fn from_chain(chain: &[CertificateDer<'_>]) -> Result<Self, DnError> {
        let leaf = chain.first().ok_or(DnError::NoCertificate)?;
        Self::from_der(leaf.as_ref())
    }

    /// Derive the DN from a single DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// See [`UserDn::from_chain`].
    pub fn from_der(der: &[u8]) -> Result<Self, DnError> {
        let (_, cert) =
            X509Certificate::from_der(der).map_err(|e| DnError::Parse(e.to_string()))?;

        let attrs: Vec<(AttrKind, &str)> = cert
            .subject()
            .iter_attributes()
            .filter_map(|attr| {
                attr.as_str()
                    .ok()
                    .map(|value| (AttrKind::of(attr), value))
            })
            .collect();

        Self::from_attributes(&attrs)
    }

    /// Render the DN from `(type, value)` pairs in subject order.
    ///
    /// # Errors
    ///
    /// [`DnError::TooFewAttributes`] or [`DnError::UnexpectedAttribute`].
    pub fn from_attributes(attrs: &[(AttrKind, &str)]) -> Result<Self, DnError> {
        if attrs.len() < DN_COMPONENTS {
            return Err(DnError::TooFewAttributes { found: attrs.len() });
        }

        let mut dn = String::new();
        for (position, (expected, (found, value))) in DN_LAYOUT.iter().zip(attrs).enumerate() {
            if expected != found {
                return Err(DnError::UnexpectedAttribute {
                    position,
                    expected: *expected,
                    found: *found,
                });
            }
            dn.push('/');
            dn.push_str(expected.label());
            dn.push('=');
            dn.push_str(value);
        }

        Ok(Self(dn))
    }

    /// The rendered DN string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserDn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtls::cert_manager::load_certs;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    const ALICE: &str =
        "/DC=ch/DC=cern/OU=Organic Units/OU=Users/CN=alice/CN=654321/CN=Alice Example";

    fn fixture(name: &str) -> String {
        format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
    }

    fn make_cert_der(entries: &[(DnType, &str)]) -> Vec<u8> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        for (ty, value) in entries {
            dn.push(ty.clone(), *value);
        }
        params.distinguished_name = dn;
        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().der().to_vec()
    }

    fn grid_attrs() -> Vec<(AttrKind, &'static str)> {
        vec![
            (AttrKind::DomainComponent, "ch"),
            (AttrKind::DomainComponent, "cern"),
            (AttrKind::OrganizationalUnit, "Organic Units"),
            (AttrKind::OrganizationalUnit, "Users"),
            (AttrKind::CommonName, "alice"),
            (AttrKind::CommonName, "654321"),
            (AttrKind::CommonName, "Alice Example"),
        ]
    }

    // ── attribute rendering ───────────────────────────────────────────────────

    #[test]
    fn renders_seven_attributes_in_order() {
        let dn = UserDn::from_attributes(&grid_attrs()).unwrap();
        assert_eq!(dn.as_str(), ALICE);
    }

    #[test]
    fn ignores_attributes_beyond_the_seventh() {
        let mut attrs = grid_attrs();
        attrs.push((AttrKind::CommonName, "1786543210"));
        let dn = UserDn::from_attributes(&attrs).unwrap();
        assert_eq!(dn.as_str(), ALICE);
    }

    #[test]
    fn short_subject_is_a_defined_error() {
        let attrs = grid_attrs();
        for found in 0..DN_COMPONENTS {
            assert_eq!(
                UserDn::from_attributes(&attrs[..found]),
                Err(DnError::TooFewAttributes { found })
            );
        }
    }

    #[test]
    fn wrong_attribute_type_reports_position() {
        let mut attrs = grid_attrs();
        attrs[2] = (AttrKind::Other, "Example Org");
        assert_eq!(
            UserDn::from_attributes(&attrs),
            Err(DnError::UnexpectedAttribute {
                position: 2,
                expected: AttrKind::OrganizationalUnit,
                found: AttrKind::Other,
            })
        );
    }

    // ── DER parsing ───────────────────────────────────────────────────────────

    #[test]
    fn user_certificate_yields_grid_dn() {
        let chain = load_certs(&fixture("usercert.pem")).unwrap();
        let dn = UserDn::from_chain(&chain).unwrap();
        assert_eq!(dn.to_string(), ALICE);
    }

    #[test]
    fn proxy_certificate_maps_to_owner_dn() {
        let chain = load_certs(&fixture("x509up_proxy.pem")).unwrap();
        assert_eq!(chain.len(), 2, "proxy bundle carries the issuing user cert");
        let dn = UserDn::from_chain(&chain).unwrap();
        assert_eq!(dn.as_str(), ALICE);
    }

    #[test]
    fn reordered_subject_is_rejected() {
        let chain = load_certs(&fixture("reordered.pem")).unwrap();
        let err = UserDn::from_chain(&chain).unwrap_err();
        assert!(matches!(
            err,
            DnError::UnexpectedAttribute {
                position: 0,
                expected: AttrKind::DomainComponent,
                found: AttrKind::CommonName,
            }
        ));
    }

    #[test]
    fn plain_service_certificate_has_too_few_attributes() {
        let der = make_cert_der(&[
            (DnType::CommonName, "svc.example.com"),
            (DnType::OrganizationalUnitName, "ops"),
        ]);
        assert_eq!(
            UserDn::from_der(&der),
            Err(DnError::TooFewAttributes { found: 2 })
        );
    }

    #[test]
    fn empty_chain_is_no_certificate() {
        assert_eq!(UserDn::from_chain(&[]), Err(DnError::NoCertificate));
    }

    #[test]
    fn garbage_der_is_parse_error() {
        assert!(matches!(
            UserDn::from_der(b"not a cert"),
            Err(DnError::Parse(_))
        ));
    }

    #[test]
    fn peer_certificates_default_is_empty() {
        assert!(PeerCertificates::default().as_slice().is_empty());
    }
}
