//! Passphrase unlocking for LUKS2 volumes.
//!
//! The crate reads the LUKS2 on-disk header directly (binary superblock, checksum and JSON
//! metadata) and recovers the volume master key from a passphrase: key derivation, keyslot area
//! decryption with AES-XTS, anti-forensic merge and digest verification. No external disk
//! encryption library is involved.
//!
//! ```no_run
//! use luks2_unlock::{Luks2Device, UnlockOutcome};
//! use std::fs::File;
//!
//! let mut file = File::open("/dev/sdb1")?;
//! let device = Luks2Device::open(&mut file)?;
//! match device.unlock_any(&mut file, b"correct horse")? {
//!     UnlockOutcome::Unlocked(volume) => println!("unlocked {} via keyslot {}", device.uuid(), volume.keyslot),
//!     UnlockOutcome::WrongPassphrase => println!("no keyslot matches"),
//! }
//! # Ok::<(), luks2_unlock::LuksError>(())
//! ```

use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;

pub mod af;
pub mod cipher;
pub mod device;
pub mod digest;
pub mod header;
pub mod kdf;
pub mod keyslot;
pub mod metadata;
pub mod volume;

#[cfg(test)]
mod fixture;

pub use cipher::{EncryptionSpec, SectorCipher};
pub use device::Luks2Device;
pub use header::{Luks2Header, LuksUuid};
pub use keyslot::UnlockOutcome;
pub use metadata::{
    DigestType, HashAlgorithm, Luks2Af, Luks2Area, Luks2Config, Luks2Digest, Luks2Kdf, Luks2Keyslot,
    Luks2KeyslotPriority, Luks2Metadata, Luks2Segment, Luks2SegmentSize, Luks2Token, Luks2U64,
};
pub use volume::VolumeInfo;

/// The magic signature for LUKS devices: "LUKS\xBA\xBE".
pub const LUKS_MAGIC: [u8; 6] = *b"LUKS\xBA\xBE";

/// Size of the LUKS magic signature in bytes.
pub const LUKS_MAGIC_SIZE: usize = 6;
/// Size of the LUKS version field in bytes.
pub const LUKS_VERSION_SIZE: usize = 2;

/// Size of the LUKS2 label field in bytes.
pub const LUKS2_LABEL_SIZE: usize = 48;
/// Size of the LUKS2 checksum algorithm field in bytes.
pub const LUKS2_CHECKSUM_ALG_SIZE: usize = 32;
/// Size of the LUKS2 salt field in bytes.
pub const LUKS2_SALT_SIZE: usize = 64;
/// Size of the LUKS2 uuid field in bytes.
pub const LUKS2_UUID_SIZE: usize = 40;
/// Size of the LUKS2 subsystem field in bytes.
pub const LUKS2_SUBSYSTEM_SIZE: usize = 48;
/// Size of the reserved padding between the header offset and the checksum.
pub const LUKS2_PADDING_SIZE: usize = 184;
/// Size of the LUKS2 checksum field in bytes.
pub const LUKS2_CHECKSUM_SIZE: usize = 64;

/// The size of a SHA-256 digest in bytes.
pub const SHA256_DIGEST_SIZE: usize = 32;

/// The offset in bytes of the checksum algorithm name.
pub const LUKS2_CHECKSUM_ALG_OFFSET: usize = 72;
/// The offset in bytes where the LUKS2 checksum field begins.
pub const LUKS2_CHECKSUM_OFFSET: usize = 448;
/// The size of the LUKS2 binary header area in bytes. The JSON area starts right after it.
pub const LUKS2_BINARY_HEADER_SIZE: usize = 4096;

/// Smallest header (binary header plus JSON area) allowed by the format.
pub const LUKS2_MIN_HEADER_SIZE: u64 = 16384;
/// Largest header (binary header plus JSON area) allowed by the format.
pub const LUKS2_MAX_HEADER_SIZE: u64 = 4194304;

/// The only anti-forensic stripe count in use.
pub const LUKS_STRIPES: u32 = 4000;
/// Sector size used for keyslot area encryption, independent of the data segment sector size.
pub const LUKS_SECTOR_SIZE: usize = 512;

#[derive(Error, Debug)]
pub enum LuksError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid LUKS magic: {0:?}")]
    InvalidMagic([u8; LUKS_MAGIC_SIZE]),
    #[error("Unsupported LUKS version: {0}")]
    UnsupportedVersion(u16),
    #[error("Invalid LUKS2 header size: {0}")]
    InvalidHeaderSize(u64),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid LUKS2 header: {0}")]
    InvalidHeader(String),
    #[error("Checksum verification failed: expected {expected}, got {actual}")]
    InvalidChecksum { expected: String, actual: String },
    #[error("Unknown header checksum algorithm: {0}")]
    UnknownChecksumAlgorithm(String),
    #[error("Unknown {field} hash algorithm: {name}")]
    UnknownHashAlgorithm { field: &'static str, name: String },
    #[error("Unknown kdf type: {0}")]
    UnknownKdfType(String),
    #[error("Unknown digest type: {0}")]
    UnknownDigestType(String),
    #[error("Unknown cipher: {0}")]
    UnknownCipher(String),
    #[error("Unknown encryption mode: {0}")]
    UnknownMode(String),
    #[error("Unexpected encryption format: {0}")]
    InvalidEncryptionSpec(String),
    #[error("Unsupported key size {size} for {cipher}")]
    InvalidKeySize { cipher: String, size: usize },
    #[error("{field} base64 parsing failed: {source}")]
    Base64 {
        field: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("Key derivation failed: {0}")]
    Kdf(String),
    #[error("Keyslot {keyslot} key size {key_size} does not match its area key size {area_key_size}")]
    KeySizeMismatch { keyslot: u32, key_size: u32, area_key_size: u32 },
    #[error("Keyslot {0} is out of range of available slots")]
    KeyslotIndex(u32),
    #[error("Keyslot {keyslot} of type {kind} cannot be unlocked with a passphrase")]
    UnsupportedKeyslotType { keyslot: u32, kind: &'static str },
    #[error("Keyslot {keyslot} area size too small, given {size} expected at least {required}")]
    AreaTooSmall { keyslot: u32, size: u64, required: u64 },
    #[error("Keyslot {keyslot} area {field} {value} is not aligned to {sector} bytes", sector = LUKS_SECTOR_SIZE)]
    Alignment {
        keyslot: u32,
        field: &'static str,
        value: u64,
    },
    #[error("Keyslot {keyslot} uses {stripes} AF stripes, only {supported} are supported", supported = LUKS_STRIPES)]
    UnsupportedStripeCount { keyslot: u32, stripes: u32 },
    #[error("No digest is found for keyslot {0}")]
    NoDigest(u32),
    #[error("Digest {digest} must reference exactly 1 segment, got {count}")]
    UnsupportedSegmentCount { digest: u32, count: usize },
    #[error("Segment {0} referenced by a digest does not exist")]
    MissingSegment(u32),
    #[error("Invalid segment {segment}: {reason}")]
    InvalidSegment { segment: u32, reason: String },
}

/// Decodes a base64 field from the JSON metadata, naming the field on failure.
pub(crate) fn decode_base64(field: impl Into<String>, value: &str) -> Result<Vec<u8>, LuksError> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|source| LuksError::Base64 {
            field: field.into(),
            source,
        })
}
