//! Serde model of the LUKS2 JSON metadata area.

use crate::{LuksError, SHA256_DIGEST_SIZE};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A 64-bit unsigned integer that is represented as a decimal string in JSON.
///
/// This is necessary because JSON's standard number type is a double-precision floating point
/// value (IEEE 754), which cannot accurately represent the full range of 64-bit integers
/// without losing precision. By encoding large integers as strings, LUKS2 ensures that
/// values like offsets and sizes remain exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Luks2U64(pub u64);

impl<'de> Deserialize<'de> for Luks2U64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Luks2U64).map_err(de::Error::custom)
    }
}

/// Hash algorithms named in the metadata.
///
/// Only `sha256` is accepted anywhere a hash is used (header checksum, PBKDF2, AF diffusion,
/// digests). Any other name is kept verbatim so it can be reported, never guessed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Unsupported(String),
}

impl HashAlgorithm {
    /// Output size in bytes, `None` for unsupported algorithms.
    pub fn digest_size(&self) -> Option<usize> {
        match self {
            HashAlgorithm::Sha256 => Some(SHA256_DIGEST_SIZE),
            HashAlgorithm::Unsupported(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Unsupported(name) => name,
        }
    }
}

impl From<&str> for HashAlgorithm {
    fn from(name: &str) -> Self {
        match name {
            "sha256" => HashAlgorithm::Sha256,
            other => HashAlgorithm::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HashAlgorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(HashAlgorithm::from(s.as_str()))
    }
}

/// Digest types. LUKS2 defines `pbkdf2` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestType {
    Pbkdf2,
    Unsupported(String),
}

impl<'de> Deserialize<'de> for DigestType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "pbkdf2" => DigestType::Pbkdf2,
            _ => DigestType::Unsupported(s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Luks2AfType {
    Luks1,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Luks2Af {
    #[serde(rename = "type")]
    pub af_type: Luks2AfType,
    pub stripes: u32,
    pub hash: HashAlgorithm,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Luks2Area {
    Raw {
        /// The area encryption algorithm, in dm-crypt notation (e.g. "aes-xts-plain64").
        encryption: String,
        key_size: u32,
        offset: Luks2U64,
        size: Luks2U64,
    },
    None {
        offset: Luks2U64,
        size: Luks2U64,
    },
    Journal {
        offset: Luks2U64,
        size: Luks2U64,
    },
    Checksum {
        offset: Luks2U64,
        size: Luks2U64,
        hash: HashAlgorithm,
        sector_size: u32,
    },
    Datashift {
        offset: Luks2U64,
        size: Luks2U64,
        shift_size: Luks2U64,
    },
    DatashiftJournal {
        offset: Luks2U64,
        size: Luks2U64,
        shift_size: Luks2U64,
    },
    DatashiftChecksum {
        offset: Luks2U64,
        size: Luks2U64,
        hash: HashAlgorithm,
        sector_size: u32,
        shift_size: Luks2U64,
    },
}

/// Key derivation parameters of a keyslot.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Luks2Kdf {
    Argon2i {
        time: u32,
        /// Memory cost in KiB.
        memory: u32,
        cpus: u32,
        salt: String,
    },
    Argon2id {
        time: u32,
        memory: u32,
        cpus: u32,
        salt: String,
    },
    Pbkdf2 {
        hash: HashAlgorithm,
        iterations: u32,
        salt: String,
    },
    /// A kdf type outside the whitelist. Rejected at derivation time.
    #[serde(skip)]
    Unsupported(String),
}

/// The priority of a LUKS2 keyslot.
///
/// Accepted in JSON as an integer or a decimal string; the empty string means normal. Any other
/// value parses as `Ignore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Luks2KeyslotPriority {
    /// The keyslot should be ignored except if explicitly stated
    Ignore = 0,
    /// Normal priority.
    Normal = 1,
    /// High priority.
    High = 2,
}

impl TryFrom<i64> for Luks2KeyslotPriority {
    type Error = String;
    fn try_from(val: i64) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(Luks2KeyslotPriority::Ignore),
            1 => Ok(Luks2KeyslotPriority::Normal),
            2 => Ok(Luks2KeyslotPriority::High),
            _ => Err(format!("Unsupported keyslot priority: {}", val)),
        }
    }
}

impl<'de> Deserialize<'de> for Luks2KeyslotPriority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        let priority = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self::try_from(n),
            Raw::Text(s) if s.is_empty() => Ok(Luks2KeyslotPriority::Normal),
            Raw::Text(s) => match s.parse::<i64>() {
                Ok(n) => Self::try_from(n),
                Err(_) => Err(format!("Unsupported keyslot priority: {:?}", s)),
            },
        };
        // A keyslot with a priority we do not know is never tried, but the rest of the
        // metadata stays usable.
        Ok(priority.unwrap_or_else(|e| {
            log::debug!("{}, keyslot ignored", e);
            Luks2KeyslotPriority::Ignore
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Luks2ReencryptMode {
    Reencrypt,
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Luks2ReencryptDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Luks2Keyslot {
    Luks2 {
        /// Size of the volume key stored in this keyslot.
        key_size: u32,
        priority: Option<Luks2KeyslotPriority>,
        af: Luks2Af,
        area: Luks2Area,
        #[serde(deserialize_with = "deserialize_kdf")]
        kdf: Luks2Kdf,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
    /// Online reencryption bookkeeping. Holds no volume key.
    Reencrypt {
        mode: Luks2ReencryptMode,
        direction: Luks2ReencryptDirection,
        priority: Option<Luks2KeyslotPriority>,
        area: Luks2Area,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
}

impl Luks2Keyslot {
    /// Validates the keyslot
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Luks2Keyslot::Luks2 { area, .. } => {
                if !matches!(area, Luks2Area::Raw { .. }) {
                    return Err("LUKS2 keyslot must have area type 'raw'".to_string());
                }
            }
            Luks2Keyslot::Reencrypt { area, .. } => {
                if matches!(area, Luks2Area::Raw { .. }) {
                    return Err("Reencrypt keyslot cannot have area type 'raw'".to_string());
                }
            }
        }
        Ok(())
    }

    /// The effective priority; a missing priority is normal.
    pub fn priority(&self) -> Luks2KeyslotPriority {
        match self {
            Luks2Keyslot::Luks2 { priority, .. } | Luks2Keyslot::Reencrypt { priority, .. } => {
                priority.unwrap_or(Luks2KeyslotPriority::Normal)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Luks2Keyslot::Luks2 { .. } => "luks2",
            Luks2Keyslot::Reencrypt { .. } => "reencrypt",
        }
    }
}

/// A token, kept for inspection. Token based unlocking is not supported.
#[derive(Debug, Clone, Deserialize)]
pub struct Luks2Token {
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub keyslots: Vec<u32>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Luks2SegmentSize {
    U64(u64),
    Dynamic,
}

impl<'de> Deserialize<'de> for Luks2SegmentSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "dynamic" {
            Ok(Luks2SegmentSize::Dynamic)
        } else {
            s.parse::<u64>()
                .map(Luks2SegmentSize::U64)
                .map_err(de::Error::custom)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Luks2Segment {
    Crypt {
        offset: Luks2U64,
        iv_tweak: Luks2U64,
        size: Luks2SegmentSize,
        /// The segment encryption algorithm in dm-crypt notation (e.g. "aes-xts-plain64").
        encryption: String,
        sector_size: u32,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
    /// Plaintext segment, only present while a device is being encrypted or decrypted.
    Linear {
        offset: Luks2U64,
        size: Luks2SegmentSize,
        #[serde(flatten)]
        extra: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Luks2Digest {
    #[serde(rename = "type")]
    pub digest_type: DigestType,
    #[serde(deserialize_with = "deserialize_ids")]
    pub keyslots: Vec<u32>,
    #[serde(deserialize_with = "deserialize_ids")]
    pub segments: Vec<u32>,
    pub hash: HashAlgorithm,
    pub iterations: u32,
    pub salt: String,
    pub digest: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Luks2Requirements {
    #[serde(default)]
    pub mandatory: Vec<String>,
}

/// The `config` object. Absent in some metadata, in which case every field is empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Luks2Config {
    pub json_size: Luks2U64,
    pub keyslots_size: Luks2U64,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub requirements: Luks2Requirements,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Parses a tagged object whose tag is in `known`; any other tag becomes `unsupported(tag)`.
fn tagged_or_unsupported<'de, D, T>(
    deserializer: D,
    known: &[&str],
    unsupported: fn(String) -> T,
) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let tag = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| de::Error::missing_field("type"))?;
    if known.contains(&tag) {
        serde_json::from_value(value).map_err(de::Error::custom)
    } else {
        Ok(unsupported(tag.to_string()))
    }
}

fn deserialize_kdf<'de, D>(deserializer: D) -> Result<Luks2Kdf, D::Error>
where
    D: Deserializer<'de>,
{
    tagged_or_unsupported(deserializer, &["argon2i", "argon2id", "pbkdf2"], Luks2Kdf::Unsupported)
}

/// Keyslot and segment references are decimal strings in JSON.
fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids: Vec<String> = Vec::deserialize(deserializer)?;
    ids.iter()
        .map(|id| {
            id.parse::<u32>()
                .map_err(|_| de::Error::custom(format!("Invalid object reference: {:?}", id)))
        })
        .collect()
}

fn deserialize_and_validate_keyslots<'de, D>(deserializer: D) -> Result<BTreeMap<u32, Luks2Keyslot>, D::Error>
where
    D: Deserializer<'de>,
{
    let keyslots: BTreeMap<u32, Luks2Keyslot> = BTreeMap::deserialize(deserializer)?;
    for (id, slot) in &keyslots {
        slot.validate()
            .map_err(|e| de::Error::custom(format!("Validation failed for keyslot {}: {}", id, e)))?;
    }
    Ok(keyslots)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Luks2Metadata {
    #[serde(deserialize_with = "deserialize_and_validate_keyslots")]
    pub keyslots: BTreeMap<u32, Luks2Keyslot>,
    #[serde(default)]
    pub tokens: BTreeMap<u32, Luks2Token>,
    pub segments: BTreeMap<u32, Luks2Segment>,
    pub digests: BTreeMap<u32, Luks2Digest>,
    #[serde(default)]
    pub config: Luks2Config,
}

impl Luks2Metadata {
    /// Parses the JSON area of a header. The document ends at the first NUL byte.
    pub fn from_json_area(area: &[u8]) -> Result<Self, LuksError> {
        let end = area.iter().position(|&b| b == 0).unwrap_or(area.len());
        Ok(serde_json::from_slice(&area[..end])?)
    }

    /// Returns the first digest, in id order, bound to the given keyslot.
    pub fn digest_for_keyslot(&self, keyslot: u32) -> Option<(u32, &Luks2Digest)> {
        self.digests
            .iter()
            .find(|(_, digest)| digest.keyslots.contains(&keyslot))
            .map(|(id, digest)| (*id, digest))
    }
}
