//! `rcgen` cannot generate RSA keys itself; it can only sign with one we
//! hand it. We generate the key with the `rsa` crate and hand the PKCS#8
//! DER encoding to `rcgen::KeyPair`, which recognizes the RSA algorithm
//! identifier and signs with `PKCS_RSA_SHA256`.

use rsa::pkcs8::EncodePrivateKey;

use crate::error::CaError;

pub(crate) fn generate_rsa_keypair() -> Result<rcgen::KeyPair, CaError> {
    let mut rng = rand::thread_rng();
    let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|err| CaError::KeyGeneration(err.to_string()))?;
    let der = private_key
        .to_pkcs8_der()
        .map_err(|err| CaError::KeyGeneration(err.to_string()))?;
    rcgen::KeyPair::try_from(der.as_bytes()).map_err(|err| CaError::KeyGeneration(err.to_string()))
}

/// A 62-bit serial number drawn from cryptographic randomness, encoded as
/// eight big-endian bytes with the top two bits cleared.
pub(crate) fn random_serial_number() -> rcgen::SerialNumber {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] &= 0x3f;
    rcgen::SerialNumber::from_slice(&bytes)
}
