//! Keyslot area ciphers, built from dm-crypt style specifications.

use crate::LuksError;
use aes::cipher::KeyInit;
use aes::{Aes128, Aes192, Aes256};
use std::fmt;
use std::str::FromStr;
use xts_mode::{Xts128, get_tweak_default};

/// Block ciphers accepted in an encryption specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherName {
    Aes,
}

/// Block cipher modes accepted in an encryption specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Xts,
}

/// A parsed `<cipher>-<mode>-<ivmode>` specification such as `aes-xts-plain64`.
///
/// Only `aes` with `xts` is accepted. The IV mode is kept but not interpreted: the tweak is
/// always the little-endian sector number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionSpec {
    pub cipher: CipherName,
    pub mode: CipherMode,
    pub iv_mode: String,
}

impl FromStr for EncryptionSpec {
    type Err = LuksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        let [cipher, mode, iv_mode] = parts[..] else {
            return Err(LuksError::InvalidEncryptionSpec(s.to_string()));
        };

        let cipher = match cipher {
            "aes" => CipherName::Aes,
            other => return Err(LuksError::UnknownCipher(other.to_string())),
        };
        let mode = match mode {
            "xts" => CipherMode::Xts,
            other => return Err(LuksError::UnknownMode(other.to_string())),
        };

        Ok(EncryptionSpec {
            cipher,
            mode,
            iv_mode: iv_mode.to_string(),
        })
    }
}

impl fmt::Display for EncryptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cipher = match self.cipher {
            CipherName::Aes => "aes",
        };
        let mode = match self.mode {
            CipherMode::Xts => "xts",
        };
        write!(f, "{}-{}-{}", cipher, mode, self.iv_mode)
    }
}

/// A tweakable cipher decrypting independent sectors, the sector number being the tweak.
///
/// The XTS key is split in halves: the first keys the data cipher, the second the tweak cipher.
/// Key schedules are wiped on drop.
pub enum SectorCipher {
    Aes128Xts(Xts128<Aes128>),
    Aes192Xts(Xts128<Aes192>),
    Aes256Xts(Xts128<Aes256>),
}

impl fmt::Debug for SectorCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectorCipher::Aes128Xts(_) => "Aes128Xts",
            SectorCipher::Aes192Xts(_) => "Aes192Xts",
            SectorCipher::Aes256Xts(_) => "Aes256Xts",
        };
        f.debug_tuple(name).finish_non_exhaustive()
    }
}

fn xts<C: KeyInit>(key: &[u8], spec: &str) -> Result<(C, C), LuksError> {
    let (key1, key2) = key.split_at(key.len() / 2);
    let invalid = |_| LuksError::InvalidKeySize {
        cipher: spec.to_string(),
        size: key.len(),
    };
    Ok((C::new_from_slice(key1).map_err(invalid)?, C::new_from_slice(key2).map_err(invalid)?))
}

impl SectorCipher {
    /// Checks that a specification is supported with a key of `key_size` bytes, without
    /// building the cipher.
    pub fn check(spec: &str, key_size: usize) -> Result<(), LuksError> {
        let parsed = EncryptionSpec::from_str(spec)?;
        match (parsed.cipher, parsed.mode, key_size) {
            (CipherName::Aes, CipherMode::Xts, 32 | 48 | 64) => Ok(()),
            (_, _, size) => Err(LuksError::InvalidKeySize {
                cipher: spec.to_string(),
                size,
            }),
        }
    }

    /// Builds the cipher for an encryption specification and key.
    pub fn new(spec: &str, key: &[u8]) -> Result<Self, LuksError> {
        let parsed = EncryptionSpec::from_str(spec)?;
        match (parsed.cipher, parsed.mode, key.len()) {
            (CipherName::Aes, CipherMode::Xts, 32) => {
                let (k1, k2) = xts::<Aes128>(key, spec)?;
                Ok(SectorCipher::Aes128Xts(Xts128::new(k1, k2)))
            }
            (CipherName::Aes, CipherMode::Xts, 48) => {
                let (k1, k2) = xts::<Aes192>(key, spec)?;
                Ok(SectorCipher::Aes192Xts(Xts128::new(k1, k2)))
            }
            (CipherName::Aes, CipherMode::Xts, 64) => {
                let (k1, k2) = xts::<Aes256>(key, spec)?;
                Ok(SectorCipher::Aes256Xts(Xts128::new(k1, k2)))
            }
            (_, _, size) => Err(LuksError::InvalidKeySize {
                cipher: spec.to_string(),
                size,
            }),
        }
    }

    /// Decrypts one sector in place. The sector must be at least 16 bytes.
    pub fn decrypt_sector(&self, sector: &mut [u8], sector_index: u64) {
        let tweak = get_tweak_default(sector_index as u128);
        match self {
            SectorCipher::Aes128Xts(xts) => xts.decrypt_sector(sector, tweak),
            SectorCipher::Aes192Xts(xts) => xts.decrypt_sector(sector, tweak),
            SectorCipher::Aes256Xts(xts) => xts.decrypt_sector(sector, tweak),
        }
    }

    /// Decrypts consecutive sectors in place, numbering them from zero.
    pub fn decrypt_area(&self, area: &mut [u8], sector_size: usize) {
        for (i, sector) in area.chunks_mut(sector_size).enumerate() {
            self.decrypt_sector(sector, i as u64);
        }
    }

    #[cfg(test)]
    pub(crate) fn encrypt_area(&self, area: &mut [u8], sector_size: usize) {
        for (i, sector) in area.chunks_mut(sector_size).enumerate() {
            let tweak = get_tweak_default(i as u128);
            match self {
                SectorCipher::Aes128Xts(xts) => xts.encrypt_sector(sector, tweak),
                SectorCipher::Aes192Xts(xts) => xts.encrypt_sector(sector, tweak),
                SectorCipher::Aes256Xts(xts) => xts.encrypt_sector(sector, tweak),
            }
        }
    }
}
