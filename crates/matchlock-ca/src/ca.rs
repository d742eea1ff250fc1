//! The host's per-sandbox certificate authority: one self-signed RSA-2048
//! root, and a lazily-issued, never-evicted cache of per-host leaf certs.

use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose,
};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::error::CaError;
use crate::rsakey::{generate_rsa_keypair, random_serial_number};

const LEAF_BACKDATE: Duration = Duration::minutes(5);
const LEAF_VALIDITY: Duration = Duration::days(365);
const CA_VALIDITY: Duration = Duration::days(365 * 10);

/// A leaf certificate issued for one server name, plus its key and the
/// chain needed to complete a TLS handshake as that server.
#[derive(Clone)]
pub struct LeafCertificate {
    pub cert_pem: String,
    pub cert_der: Vec<u8>,
    pub key_pem: String,
    pub ca_cert_der: Vec<u8>,
}

impl std::fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCertificate")
            .field("cert_der_len", &self.cert_der.len())
            .finish_non_exhaustive()
    }
}

/// Owns the sandbox's MITM root CA and issues per-SNI leaf certificates
/// on demand. The cache never evicts: a sandbox's CA lifetime is bounded
/// by the sandbox itself.
pub struct CaPool {
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
    ca_cert_pem: String,
    ca_cert_der: Vec<u8>,
    cache: DashMap<String, Arc<LeafCertificate>>,
}

impl std::fmt::Debug for CaPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaPool")
            .field("cached_leaves", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl CaPool {
    /// Generate a fresh 2048-bit RSA CA. Each sandbox gets its own root;
    /// nothing is persisted or shared across sandboxes.
    pub fn generate() -> Result<Self, CaError> {
        let ca_key = generate_rsa_keypair()?;

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|err| CaError::CertGeneration(err.to_string()))?;
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.serial_number = Some(random_serial_number());
        params.not_before = OffsetDateTime::now_utc() - LEAF_BACKDATE;
        params.not_after = OffsetDateTime::now_utc() + CA_VALIDITY;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Matchlock Sandbox CA");
        params.distinguished_name = dn;

        let ca_cert = params
            .self_signed(&ca_key)
            .map_err(|err| CaError::CertGeneration(err.to_string()))?;
        let ca_cert_pem = ca_cert.pem();
        let ca_cert_der = ca_cert.der().to_vec();

        Ok(Self {
            ca_cert,
            ca_key,
            ca_cert_pem,
            ca_cert_der,
            cache: DashMap::new(),
        })
    }

    /// The CA certificate, PEM-encoded, for injection into the guest
    /// rootfs's trust store.
    #[must_use]
    pub fn ca_certificate_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// SHA-256 fingerprint of the CA certificate's DER encoding, hex
    /// encoded, for log correlation.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.ca_cert_der);
        hex::encode(digest)
    }

    /// Return the cached leaf certificate for `server_name`, issuing a
    /// fresh one (and caching it, forever) on a miss.
    pub fn get_certificate(&self, server_name: &str) -> Result<Arc<LeafCertificate>, CaError> {
        if let Some(existing) = self.cache.get(server_name) {
            return Ok(existing.clone());
        }

        let leaf = Arc::new(self.issue_leaf(server_name)?);
        self.cache
            .entry(server_name.to_string())
            .or_insert_with(|| leaf.clone());
        debug!(server_name, "issued leaf certificate");
        Ok(leaf)
    }

    fn issue_leaf(&self, server_name: &str) -> Result<LeafCertificate, CaError> {
        let leaf_key = generate_rsa_keypair()?;

        let mut params = CertificateParams::new(vec![server_name.to_string()])
            .map_err(|err| CaError::CertGeneration(err.to_string()))?;
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.serial_number = Some(random_serial_number());
        params.not_before = OffsetDateTime::now_utc() - LEAF_BACKDATE;
        params.not_after = OffsetDateTime::now_utc() + LEAF_VALIDITY;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, server_name);
        params.distinguished_name = dn;

        let cert = params
            .signed_by(&leaf_key, &self.ca_cert, &self.ca_key)
            .map_err(|err| CaError::CertGeneration(err.to_string()))?;

        Ok(LeafCertificate {
            cert_pem: cert.pem(),
            cert_der: cert.der().to_vec(),
            key_pem: leaf_key.serialize_pem(),
            ca_cert_der: self.ca_cert_der.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_caches_leaf_certificates() {
        let pool = CaPool::generate().unwrap();
        let first = pool.get_certificate("api.openai.com").unwrap();
        let second = pool.get_certificate("api.openai.com").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.cert_pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn different_hosts_get_distinct_leaves() {
        let pool = CaPool::generate().unwrap();
        let a = pool.get_certificate("a.example.com").unwrap();
        let b = pool.get_certificate("b.example.com").unwrap();
        assert_ne!(a.cert_der, b.cert_der);
    }

    #[test]
    fn fingerprint_is_stable_and_sha256_sized() {
        let pool = CaPool::generate().unwrap();
        let fp = pool.fingerprint();
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, pool.fingerprint());
    }
}
