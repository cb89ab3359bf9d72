//! The LUKS2 binary header and its checksum.
//!
//! Layout of the fixed part (all integers big-endian):
//!
//! | offset | size | field              |
//! |--------|------|--------------------|
//! | 0      | 6    | magic              |
//! | 6      | 2    | version            |
//! | 8      | 8    | hdr_size           |
//! | 16     | 8    | seqid              |
//! | 24     | 48   | label              |
//! | 72     | 32   | checksum algorithm |
//! | 104    | 64   | salt               |
//! | 168    | 40   | uuid               |
//! | 208    | 48   | subsystem          |
//! | 256    | 8    | hdr_offset         |
//! | 264    | 184  | padding            |
//! | 448    | 64   | checksum           |
//!
//! The checksum covers the whole `hdr_size` region (binary header and JSON area) with the
//! checksum field itself taken as zeroes.

use crate::metadata::HashAlgorithm;
use crate::{
    LUKS_MAGIC, LUKS_MAGIC_SIZE, LUKS2_CHECKSUM_ALG_OFFSET, LUKS2_CHECKSUM_ALG_SIZE, LUKS2_CHECKSUM_OFFSET,
    LUKS2_CHECKSUM_SIZE, LUKS2_LABEL_SIZE, LUKS2_MAX_HEADER_SIZE, LUKS2_MIN_HEADER_SIZE, LUKS2_PADDING_SIZE,
    LUKS2_SALT_SIZE, LUKS2_SUBSYSTEM_SIZE, LUKS2_UUID_SIZE, LuksError,
};
use byteorder::{BigEndian, ReadBytesExt};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::str::FromStr;

/// A LUKS device UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuksUuid(String);

impl LuksUuid {
    /// Returns the UUID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LuksUuid {
    type Err = LuksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_matches('\0');
        if s.is_empty() {
            return Err(LuksError::InvalidHeader("UUID is empty".to_string()));
        }
        if s.len() >= LUKS2_UUID_SIZE {
            return Err(LuksError::InvalidHeader(format!(
                "UUID too long: {} (max {})",
                s.len(),
                LUKS2_UUID_SIZE - 1
            )));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(LuksError::InvalidHeader(format!(
                "UUID contains invalid characters: {}",
                s
            )));
        }
        Ok(LuksUuid(s.to_string()))
    }
}

impl fmt::Display for LuksUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for LuksUuid {
    fn eq(&self, other: &&str) -> bool {
        &self.0 == *other
    }
}

/// The decoded binary header. Immutable once read.
#[derive(Debug, Clone)]
pub struct Luks2Header {
    pub version: u16,
    pub hdr_size: u64,
    pub seqid: u64,
    pub label: String,
    pub checksum_alg: HashAlgorithm,
    pub salt: [u8; LUKS2_SALT_SIZE],
    pub uuid: LuksUuid,
    pub subsystem: String,
    /// Byte offset of this header on the device. The primary header is at 0.
    pub hdr_offset: u64,
    pub checksum: [u8; LUKS2_CHECKSUM_SIZE],
}

fn read_cstr<R: Read>(reader: &mut R, len: usize) -> Result<String, LuksError> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

impl Luks2Header {
    /// Reads the start of the superblock and returns the validated header size.
    ///
    /// The size must be a power of two between 16 KiB and 4 MiB. Nothing past the fixed
    /// fields is read.
    pub fn read_size<R: Read + Seek>(reader: &mut R) -> Result<u64, LuksError> {
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; LUKS_MAGIC_SIZE];
        reader.read_exact(&mut magic)?;
        if magic != LUKS_MAGIC {
            return Err(LuksError::InvalidMagic(magic));
        }

        let version = reader.read_u16::<BigEndian>()?;
        if version != 2 {
            return Err(LuksError::UnsupportedVersion(version));
        }

        let hdr_size = reader.read_u64::<BigEndian>()?;
        if !hdr_size.is_power_of_two() || !(LUKS2_MIN_HEADER_SIZE..=LUKS2_MAX_HEADER_SIZE).contains(&hdr_size) {
            return Err(LuksError::InvalidHeaderSize(hdr_size));
        }
        Ok(hdr_size)
    }

    /// Reads the full `hdr_size` region starting at offset 0.
    pub fn read_region<R: Read + Seek>(reader: &mut R, hdr_size: u64) -> Result<Vec<u8>, LuksError> {
        let mut region = vec![0u8; hdr_size as usize];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut region)?;
        Ok(region)
    }

    /// Checks the stored checksum of a header region.
    ///
    /// The region is not modified: the hash is fed the bytes before the checksum field, 64 zero
    /// bytes, then the rest of the region.
    pub fn verify_checksum(region: &[u8]) -> Result<(), LuksError> {
        let alg = read_cstr(
            &mut &region[LUKS2_CHECKSUM_ALG_OFFSET..LUKS2_CHECKSUM_ALG_OFFSET + LUKS2_CHECKSUM_ALG_SIZE],
            LUKS2_CHECKSUM_ALG_SIZE,
        )?;
        let stored = &region[LUKS2_CHECKSUM_OFFSET..LUKS2_CHECKSUM_OFFSET + LUKS2_CHECKSUM_SIZE];

        let calculated = match HashAlgorithm::from(alg.as_str()) {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(&region[..LUKS2_CHECKSUM_OFFSET]);
                hasher.update([0u8; LUKS2_CHECKSUM_SIZE]);
                hasher.update(&region[LUKS2_CHECKSUM_OFFSET + LUKS2_CHECKSUM_SIZE..]);
                hasher.finalize().to_vec()
            }
            HashAlgorithm::Unsupported(name) => return Err(LuksError::UnknownChecksumAlgorithm(name)),
        };

        // The checksum field is 64 bytes, zero padded past the digest size.
        let expected = &stored[..calculated.len()];
        if calculated != expected {
            return Err(LuksError::InvalidChecksum {
                expected: hex::encode(expected),
                actual: hex::encode(&calculated),
            });
        }
        Ok(())
    }

    /// Decodes the fixed fields of a header region, field by field.
    pub fn parse(region: &[u8]) -> Result<Self, LuksError> {
        let mut cursor = Cursor::new(region);

        let mut magic = [0u8; LUKS_MAGIC_SIZE];
        cursor.read_exact(&mut magic)?;
        if magic != LUKS_MAGIC {
            return Err(LuksError::InvalidMagic(magic));
        }
        let version = cursor.read_u16::<BigEndian>()?;
        let hdr_size = cursor.read_u64::<BigEndian>()?;
        let seqid = cursor.read_u64::<BigEndian>()?;
        let label = read_cstr(&mut cursor, LUKS2_LABEL_SIZE)?;
        let checksum_alg = HashAlgorithm::from(read_cstr(&mut cursor, LUKS2_CHECKSUM_ALG_SIZE)?.as_str());

        let mut salt = [0u8; LUKS2_SALT_SIZE];
        cursor.read_exact(&mut salt)?;

        let uuid = LuksUuid::from_str(&read_cstr(&mut cursor, LUKS2_UUID_SIZE)?)?;
        let subsystem = read_cstr(&mut cursor, LUKS2_SUBSYSTEM_SIZE)?;

        let hdr_offset = cursor.read_u64::<BigEndian>()?;

        cursor.seek(SeekFrom::Current(LUKS2_PADDING_SIZE as i64))?;
        let mut checksum = [0u8; LUKS2_CHECKSUM_SIZE];
        cursor.read_exact(&mut checksum)?;

        Ok(Luks2Header {
            version,
            hdr_size,
            seqid,
            label,
            checksum_alg,
            salt,
            uuid,
            subsystem,
            hdr_offset,
            checksum,
        })
    }
}
