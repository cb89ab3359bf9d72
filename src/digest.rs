//! Candidate volume key verification against a LUKS2 digest.

use crate::metadata::{DigestType, HashAlgorithm, Luks2Digest};
use crate::{LuksError, decode_base64};
use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Computes the digest of a candidate key with the digest's parameters.
///
/// The output is as long as the digest hash (32 bytes for sha256).
pub fn compute(digest: &Luks2Digest, candidate_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, LuksError> {
    let salt = decode_base64("digest.salt", &digest.salt)?;

    match &digest.digest_type {
        DigestType::Pbkdf2 => {}
        DigestType::Unsupported(name) => return Err(LuksError::UnknownDigestType(name.clone())),
    }

    match &digest.hash {
        HashAlgorithm::Sha256 => {
            let mut output = Zeroizing::new(vec![0u8; crate::SHA256_DIGEST_SIZE]);
            pbkdf2::pbkdf2::<Hmac<Sha256>>(candidate_key, &salt, digest.iterations, &mut output)
                .map_err(|e| LuksError::Kdf(format!("PBKDF2 error: {}", e)))?;
            Ok(output)
        }
        HashAlgorithm::Unsupported(name) => Err(LuksError::UnknownHashAlgorithm {
            field: "digest",
            name: name.clone(),
        }),
    }
}

/// Returns whether the candidate key matches the stored digest.
///
/// A mismatch is not an error: it is how a wrong passphrase shows up.
pub fn verify(digest: &Luks2Digest, candidate_key: &[u8]) -> Result<bool, LuksError> {
    let computed = compute(digest, candidate_key)?;
    let expected = Zeroizing::new(decode_base64("digest.digest", &digest.digest)?);
    Ok(*computed == *expected)
}
