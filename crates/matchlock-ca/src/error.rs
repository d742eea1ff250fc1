use thiserror::Error;

/// Errors raised while generating the CA or issuing a leaf certificate.
#[derive(Debug, Error)]
pub enum CaError {
    #[error("failed to generate RSA key: {0}")]
    KeyGeneration(String),

    #[error("failed to build certificate: {0}")]
    CertGeneration(String),
}
