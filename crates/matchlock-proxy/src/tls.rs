//! TLS glue: a server config whose certificate resolver asks the
//! sandbox's [`CaPool`] for a leaf per SNI, and a client config used to
//! dial the real upstream once the guest's HTTPS request has been
//! decrypted.

use std::sync::{Arc, OnceLock};

use matchlock_ca::CaPool;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tracing::warn;

use crate::error::ProxyError;

/// rustls 0.23 needs a process-wide default crypto provider installed
/// before any config builder runs; both entry points call this first.
fn ensure_crypto_provider() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolves a TLS server certificate per SNI by asking the sandbox's CA
/// pool to issue (or return a cached) leaf certificate.
pub struct SniResolver {
    ca: Arc<CaPool>,
}

impl SniResolver {
    #[must_use]
    pub fn new(ca: Arc<CaPool>) -> Self {
        Self { ca }
    }
}

impl std::fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniResolver").finish_non_exhaustive()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name()?;
        let leaf = match self.ca.get_certificate(server_name) {
            Ok(leaf) => leaf,
            Err(err) => {
                warn!(server_name, error = %err, "failed to issue MITM leaf certificate");
                return None;
            }
        };

        let leaf_der = CertificateDer::from_pem_slice(leaf.cert_pem.as_bytes()).ok()?;
        let ca_der = CertificateDer::from(leaf.ca_cert_der.clone());
        let key_der = PrivateKeyDer::from_pem_slice(leaf.key_pem.as_bytes()).ok()?;

        let signing_key = match rustls::crypto::ring::sign::any_supported_type(&key_der) {
            Ok(key) => key,
            Err(err) => {
                warn!(server_name, error = %err, "unsupported leaf key type");
                return None;
            }
        };

        Some(Arc::new(CertifiedKey::new(vec![leaf_der, ca_der], signing_key)))
    }
}

/// Builds the TLS server config for the HTTPS accept loop: no client
/// auth, SNI-driven leaf issuance.
#[must_use]
pub fn server_config(ca: Arc<CaPool>) -> Arc<ServerConfig> {
    ensure_crypto_provider();
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver::new(ca)));
    Arc::new(config)
}

static CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// The TLS client config used to dial real upstream hosts, trusting the
/// public web root store. Shared across connections; rustls client
/// configs are immutable and cheap to clone via `Arc`.
pub fn client_config() -> Result<Arc<ClientConfig>, ProxyError> {
    if let Some(cfg) = CLIENT_CONFIG.get() {
        return Ok(Arc::clone(cfg));
    }

    ensure_crypto_provider();
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    );
    Ok(Arc::clone(CLIENT_CONFIG.get_or_init(|| config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_is_memoized() {
        let a = client_config().unwrap();
        let b = client_config().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
