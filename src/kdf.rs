use crate::metadata::{HashAlgorithm, Luks2Kdf};
use crate::{LuksError, decode_base64};
use argon2::{Algorithm, Argon2, Params, Version};
use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Derives a key from a passphrase using the KDF specified in the LUKS2 header.
///
/// The passphrase is taken as raw bytes; embedded NUL bytes are part of it.
pub fn derive_key(kdf: &Luks2Kdf, passphrase: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>, LuksError> {
    match kdf {
        Luks2Kdf::Pbkdf2 {
            hash,
            iterations,
            salt,
        } => {
            let salt_bytes = decode_base64("kdf.salt", salt)?;
            let mut output = Zeroizing::new(vec![0u8; key_size]);
            match hash {
                HashAlgorithm::Sha256 => pbkdf2::pbkdf2::<Hmac<Sha256>>(passphrase, &salt_bytes, *iterations, &mut output)
                    .map_err(|e| LuksError::Kdf(format!("PBKDF2 error: {}", e)))?,
                HashAlgorithm::Unsupported(name) => {
                    return Err(LuksError::UnknownHashAlgorithm {
                        field: "kdf",
                        name: name.clone(),
                    });
                }
            }
            Ok(output)
        }
        Luks2Kdf::Argon2i {
            time,
            memory,
            cpus,
            salt,
        } => argon2(Algorithm::Argon2i, *time, *memory, *cpus, salt, passphrase, key_size),
        Luks2Kdf::Argon2id {
            time,
            memory,
            cpus,
            salt,
        } => argon2(Algorithm::Argon2id, *time, *memory, *cpus, salt, passphrase, key_size),
        Luks2Kdf::Unsupported(name) => Err(LuksError::UnknownKdfType(name.clone())),
    }
}

fn argon2(
    algorithm: Algorithm,
    time: u32,
    memory: u32,
    cpus: u32,
    salt: &str,
    passphrase: &[u8],
    key_size: usize,
) -> Result<Zeroizing<Vec<u8>>, LuksError> {
    let salt_bytes = decode_base64("kdf.salt", salt)?;

    let params = Params::new(memory, time, cpus, Some(key_size))
        .map_err(|e| LuksError::Kdf(format!("Invalid Argon2 params: {}", e)))?;

    let mut output = Zeroizing::new(vec![0u8; key_size]);
    Argon2::new(algorithm, Version::V0x13, params)
        .hash_password_into(passphrase, &salt_bytes, &mut output)
        .map_err(|e| LuksError::Kdf(format!("Argon2 error: {}", e)))?;

    Ok(output)
}
