//! Storage geometry of an unlocked volume.

use crate::LuksError;
use crate::metadata::{Luks2Metadata, Luks2Segment, Luks2SegmentSize};
use std::fmt;
use zeroize::Zeroizing;

/// An unlocked volume: the master key and where the encrypted data lives.
///
/// Offsets and sizes are in units of `storage_sector_size`. A `storage_size` of 0 comes from a
/// `dynamic` segment, which extends to the end of the device; resolving it against the device
/// size is left to the caller.
pub struct VolumeInfo {
    key: Zeroizing<Vec<u8>>,
    /// The keyslot whose passphrase unlocked the key.
    pub keyslot: u32,
    pub digest_id: u32,
    pub storage_size: u64,
    pub storage_offset: u64,
    pub storage_encryption: String,
    pub storage_iv_tweak: u64,
    pub storage_sector_size: u64,
}

impl VolumeInfo {
    /// The volume master key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Takes ownership of the master key. It is wiped when the returned buffer is dropped.
    pub fn into_key(self) -> Zeroizing<Vec<u8>> {
        self.key
    }
}

impl fmt::Debug for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeInfo")
            .field("key", &format_args!("<{} bytes redacted>", self.key.len()))
            .field("keyslot", &self.keyslot)
            .field("digest_id", &self.digest_id)
            .field("storage_size", &self.storage_size)
            .field("storage_offset", &self.storage_offset)
            .field("storage_encryption", &self.storage_encryption)
            .field("storage_iv_tweak", &self.storage_iv_tweak)
            .field("storage_sector_size", &self.storage_sector_size)
            .finish()
    }
}

/// Maps a verified key to the geometry of the single segment its digest references.
pub(crate) fn resolve(
    metadata: &Luks2Metadata,
    keyslot: u32,
    digest_id: u32,
    key: Zeroizing<Vec<u8>>,
) -> Result<VolumeInfo, LuksError> {
    let digest = metadata
        .digests
        .get(&digest_id)
        .ok_or(LuksError::NoDigest(keyslot))?;

    let [segment_id] = digest.segments[..] else {
        return Err(LuksError::UnsupportedSegmentCount {
            digest: digest_id,
            count: digest.segments.len(),
        });
    };

    let segment = metadata
        .segments
        .get(&segment_id)
        .ok_or(LuksError::MissingSegment(segment_id))?;
    let invalid = |reason: &str| LuksError::InvalidSegment {
        segment: segment_id,
        reason: reason.to_string(),
    };

    let Luks2Segment::Crypt {
        offset,
        iv_tweak,
        size,
        encryption,
        sector_size,
        ..
    } = segment
    else {
        return Err(invalid("segment is not encrypted"));
    };

    let storage_size = match size {
        Luks2SegmentSize::Dynamic => 0,
        Luks2SegmentSize::U64(0) => return Err(invalid("size is 0")),
        Luks2SegmentSize::U64(size) => *size,
    };
    if !sector_size.is_power_of_two() {
        return Err(invalid(&format!("sector size {} is not a power of two", sector_size)));
    }
    let sector_size = u64::from(*sector_size);

    log::trace!(
        "keyslot {} maps to segment {}: offset {} bytes, size {} bytes, sector size {}",
        keyslot,
        segment_id,
        offset.0,
        storage_size,
        sector_size
    );

    Ok(VolumeInfo {
        key,
        keyslot,
        digest_id,
        storage_size: storage_size / sector_size,
        storage_offset: offset.0 / sector_size,
        storage_encryption: encryption.clone(),
        storage_iv_tweak: iv_tweak.0,
        storage_sector_size: sector_size,
    })
}
