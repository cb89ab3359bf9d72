//! Unlocking a single keyslot.

use crate::cipher::SectorCipher;
use crate::metadata::{HashAlgorithm, Luks2Area, Luks2Keyslot, Luks2Metadata};
use crate::volume::{self, VolumeInfo};
use crate::{LUKS_SECTOR_SIZE, LUKS_STRIPES, LuksError, af, digest, kdf};
use std::io::{Read, Seek, SeekFrom};
use zeroize::Zeroizing;

/// The result of trying a passphrase against a keyslot.
///
/// A wrong passphrase is an expected outcome, not an error: callers trying several keyslots
/// move on to the next one, while any `LuksError` is fatal.
#[derive(Debug)]
#[must_use]
pub enum UnlockOutcome {
    Unlocked(VolumeInfo),
    WrongPassphrase,
}

impl UnlockOutcome {
    /// Returns the volume if the passphrase matched.
    pub fn into_volume(self) -> Option<VolumeInfo> {
        match self {
            UnlockOutcome::Unlocked(volume) => Some(volume),
            UnlockOutcome::WrongPassphrase => None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, UnlockOutcome::Unlocked(_))
    }
}

/// Recovers the volume key stored in keyslot `index` and verifies it against its digest.
///
/// Every intermediate secret (derived key, decrypted area, merged key, computed digest) is
/// wiped when this returns, whatever the outcome. Only the key inside a returned
/// [`VolumeInfo`] survives.
pub(crate) fn unlock<R: Read + Seek>(
    metadata: &Luks2Metadata,
    reader: &mut R,
    index: u32,
    passphrase: &[u8],
) -> Result<UnlockOutcome, LuksError> {
    let keyslot = metadata.keyslots.get(&index).ok_or(LuksError::KeyslotIndex(index))?;
    let Luks2Keyslot::Luks2 {
        key_size,
        af,
        area,
        kdf,
        ..
    } = keyslot
    else {
        return Err(LuksError::UnsupportedKeyslotType {
            keyslot: index,
            kind: keyslot.kind(),
        });
    };
    let Luks2Area::Raw {
        encryption,
        key_size: area_key_size,
        offset,
        size,
    } = area
    else {
        return Err(LuksError::InvalidHeader(format!("Keyslot {} area is not raw", index)));
    };

    // Validate the layout before paying for the KDF or allocating the area.
    if key_size != area_key_size {
        return Err(LuksError::KeySizeMismatch {
            keyslot: index,
            key_size: *key_size,
            area_key_size: *area_key_size,
        });
    }
    let key_size = *key_size as usize;
    SectorCipher::check(encryption, key_size)?;
    let material_size = key_size as u64 * u64::from(LUKS_STRIPES);
    let sectors = material_size.div_ceil(LUKS_SECTOR_SIZE as u64);
    let read_size = sectors * LUKS_SECTOR_SIZE as u64;
    if size.0 < read_size {
        return Err(LuksError::AreaTooSmall {
            keyslot: index,
            size: size.0,
            required: read_size,
        });
    }
    for (field, value) in [("size", size.0), ("offset", offset.0)] {
        if value % LUKS_SECTOR_SIZE as u64 != 0 {
            return Err(LuksError::Alignment {
                keyslot: index,
                field,
                value,
            });
        }
    }
    if af.stripes != LUKS_STRIPES {
        return Err(LuksError::UnsupportedStripeCount {
            keyslot: index,
            stripes: af.stripes,
        });
    }
    if let HashAlgorithm::Unsupported(name) = &af.hash {
        return Err(LuksError::UnknownHashAlgorithm {
            field: "af",
            name: name.clone(),
        });
    }

    let af_key = kdf::derive_key(kdf, passphrase, key_size)?;
    let cipher = SectorCipher::new(encryption, &af_key)?;

    let mut material = Zeroizing::new(vec![0u8; read_size as usize]);
    reader.seek(SeekFrom::Start(offset.0))?;
    reader.read_exact(&mut material)?;
    cipher.decrypt_area(&mut material, LUKS_SECTOR_SIZE);

    let candidate = af::merge(&material, key_size, af.stripes, &af.hash)?;

    let Some((digest_id, digest)) = metadata.digest_for_keyslot(index) else {
        return Err(LuksError::NoDigest(index));
    };
    if !digest::verify(digest, &candidate)? {
        log::debug!("keyslot {}: passphrase does not match digest {}", index, digest_id);
        return Ok(UnlockOutcome::WrongPassphrase);
    }

    log::debug!("keyslot {}: volume key verified by digest {}", index, digest_id);
    volume::resolve(metadata, index, digest_id, candidate).map(UnlockOutcome::Unlocked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Fixture, MASTER_KEY};
    use serde_json::json;

    fn unlock_slot(fixture: &Fixture, index: u32, passphrase: &[u8]) -> Result<UnlockOutcome, LuksError> {
        let (device, mut image) = fixture.open();
        device.unlock_keyslot(&mut image, index, passphrase)
    }

    #[test]
    fn test_unlock_reference_scenario() {
        let fixture = Fixture::new().with_keyslot(0, b"correct horse", None);
        let volume = unlock_slot(&fixture, 0, b"correct horse").unwrap().into_volume().unwrap();

        assert_eq!(volume.key(), &MASTER_KEY[..]);
        assert_eq!(volume.keyslot, 0);
        assert_eq!(volume.digest_id, 0);
        assert_eq!(volume.storage_offset, 32);
        assert_eq!(volume.storage_size, 256);
        assert_eq!(volume.storage_sector_size, 512);
        assert_eq!(volume.storage_iv_tweak, 0);
        assert_eq!(volume.storage_encryption, "aes-xts-plain64");
    }

    #[test]
    fn test_wrong_passphrase() {
        let fixture = Fixture::new().with_keyslot(0, b"correct horse", None);
        for passphrase in [&b"correct horsf"[..], b"", b"correct horse ", b"correct\0horse"] {
            let outcome = unlock_slot(&fixture, 0, passphrase).unwrap();
            assert!(matches!(outcome, UnlockOutcome::WrongPassphrase));
        }
    }

    #[test]
    fn test_passphrase_with_embedded_nul() {
        let fixture = Fixture::new().with_keyslot(0, b"pass\0word", None);
        assert!(unlock_slot(&fixture, 0, b"pass\0word").unwrap().is_unlocked());
        assert!(!unlock_slot(&fixture, 0, b"pass").unwrap().is_unlocked());
    }

    #[test]
    fn test_index_out_of_range() {
        let fixture = Fixture::new().with_keyslot(0, b"pw", None);
        let err = unlock_slot(&fixture, 1, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::KeyslotIndex(1)));
        let err = unlock_slot(&fixture, u32::MAX, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::KeyslotIndex(u32::MAX)));
    }

    #[test]
    fn test_area_too_small() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["area"]["size"] = json!("131072");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(
            err,
            LuksError::AreaTooSmall {
                keyslot: 0,
                size: 131072,
                required: 256000
            }
        ));
    }

    #[test]
    fn test_area_alignment() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["area"]["size"] = json!("258049");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::Alignment { field: "size", .. }));

        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["area"]["offset"] = json!("32769");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::Alignment { field: "offset", value: 32769, .. }));
    }

    #[test]
    fn test_key_size_mismatch() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["key_size"] = json!(1u64 << 30);
        let err = unlock_slot(&fixture, 0, b"wrong").unwrap_err();
        assert!(matches!(
            err,
            LuksError::KeySizeMismatch {
                keyslot: 0,
                key_size: 1073741824,
                area_key_size: 64
            }
        ));
    }

    #[test]
    fn test_oversized_key_rejected_before_reading_area() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["key_size"] = json!(1u64 << 30);
        fixture.metadata["keyslots"]["0"]["area"]["key_size"] = json!(1u64 << 30);
        fixture.metadata["keyslots"]["0"]["area"]["size"] = json!((4000u64 << 30).to_string());
        let err = unlock_slot(&fixture, 0, b"wrong").unwrap_err();
        assert!(matches!(err, LuksError::InvalidKeySize { size: 1073741824, .. }));
    }

    #[test]
    fn test_unsupported_stripe_count() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["af"]["stripes"] = json!(3999);
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnsupportedStripeCount { keyslot: 0, stripes: 3999 }));
    }

    #[test]
    fn test_unsupported_af_hash() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["af"]["hash"] = json!("sha1");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnknownHashAlgorithm { field: "af", .. }));
    }

    #[test]
    fn test_unsupported_kdf_type() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["kdf"] = json!({ "type": "scrypt", "salt": "c2FsdA==" });
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnknownKdfType(name) if name == "scrypt"));
    }

    #[test]
    fn test_unsupported_area_cipher() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["area"]["encryption"] = json!("serpent-xts-plain64");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnknownCipher(name) if name == "serpent"));

        fixture.metadata["keyslots"]["0"]["area"]["encryption"] = json!("aes-cbc-essiv:sha256");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnknownMode(name) if name == "cbc"));
    }

    #[test]
    fn test_no_digest_for_keyslot() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["digests"]["0"]["keyslots"] = json!([]);
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::NoDigest(0)));
    }

    #[test]
    fn test_malformed_salt_is_not_a_wrong_passphrase() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["0"]["kdf"]["salt"] = json!("not base64!");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::Base64 { .. }));
    }

    #[test]
    fn test_segment_count_checked_after_digest() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["digests"]["0"]["segments"] = json!(["0", "1"]);

        // A wrong passphrase is still reported as such.
        assert!(matches!(unlock_slot(&fixture, 0, b"nope").unwrap(), UnlockOutcome::WrongPassphrase));

        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnsupportedSegmentCount { digest: 0, count: 2 }));
    }

    #[test]
    fn test_dynamic_segment() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["segments"]["0"]["size"] = json!("dynamic");
        let volume = unlock_slot(&fixture, 0, b"pw").unwrap().into_volume().unwrap();
        assert_eq!(volume.storage_size, 0);
        assert_eq!(volume.storage_offset, 32);
    }

    #[test]
    fn test_zero_size_segment() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["segments"]["0"]["size"] = json!("0");
        let err = unlock_slot(&fixture, 0, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::InvalidSegment { segment: 0, .. }));
    }

    #[test]
    fn test_reencrypt_keyslot_is_not_unlockable() {
        let mut fixture = Fixture::new().with_keyslot(0, b"pw", None);
        fixture.metadata["keyslots"]["1"] = json!({
            "type": "reencrypt",
            "mode": "reencrypt",
            "direction": "forward",
            "key_size": 1,
            "area": { "type": "none", "offset": "290816", "size": "4096" }
        });
        let err = unlock_slot(&fixture, 1, b"pw").unwrap_err();
        assert!(matches!(err, LuksError::UnsupportedKeyslotType { keyslot: 1, kind: "reencrypt" }));
    }

    #[test]
    fn test_truncated_device() {
        let fixture = Fixture::new().with_keyslot(0, b"pw", None);
        let (device, image) = fixture.open();
        let mut bytes = image.into_inner();
        bytes.truncate(bytes.len() - 1);
        let err = device
            .unlock_keyslot(&mut std::io::Cursor::new(bytes), 0, b"pw")
            .unwrap_err();
        assert!(matches!(err, LuksError::Io(_)));
    }

    #[test]
    fn test_argon2id_keyslot() {
        let fixture = Fixture::new().with_keyslot_kdf(
            0,
            b"pw",
            None,
            json!({ "type": "argon2id", "time": 1, "memory": 64, "cpus": 1, "salt": "c29tZXNhbHRzb21lc2FsdA==" }),
        );
        let volume = unlock_slot(&fixture, 0, b"pw").unwrap().into_volume().unwrap();
        assert_eq!(volume.key(), &MASTER_KEY[..]);
        assert!(!unlock_slot(&fixture, 0, b"pW").unwrap().is_unlocked());
    }
}
