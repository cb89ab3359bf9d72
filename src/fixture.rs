//! In-memory LUKS2 images for tests.
//!
//! Keyslots are written the way cryptsetup writes them: the master key is AF split with random
//! stripes, then encrypted with a key derived from the passphrase. The JSON metadata stays a
//! `serde_json::Value` so tests can corrupt any field before the image is built.

use crate::cipher::SectorCipher;
use crate::device::Luks2Device;
use crate::header::tests::build_region;
use crate::metadata::{Luks2Digest, Luks2Kdf};
use crate::{LUKS_SECTOR_SIZE, LUKS_STRIPES, af, digest, kdf};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use serde_json::{Value, json};
use std::io::Cursor;

pub(crate) const HEADER_SIZE: u64 = 16384;
pub(crate) const KEYSLOTS_OFFSET: u64 = 32768;
pub(crate) const AREA_SIZE: u64 = 258048;

pub(crate) const MASTER_KEY: [u8; 64] = {
    let mut key = [0u8; 64];
    let mut i = 0;
    while i < key.len() {
        key[i] = (i as u8).wrapping_mul(37).wrapping_add(11);
        i += 1;
    }
    key
};

pub(crate) struct Fixture {
    pub(crate) metadata: Value,
    /// Encrypted keyslot material and its byte offset in the image.
    areas: Vec<(u64, Vec<u8>)>,
}

impl Fixture {
    /// An image with one 512-byte sector segment at 16 KiB and a digest of [`MASTER_KEY`] bound
    /// to no keyslot yet.
    pub(crate) fn new() -> Self {
        let digest_json = json!({
            "type": "pbkdf2",
            "keyslots": [],
            "segments": ["0"],
            "hash": "sha256",
            "iterations": 1000,
            "salt": general_purpose::STANDARD.encode([0xd1u8; 32]),
            "digest": ""
        });
        let parsed: Luks2Digest = serde_json::from_value(digest_json.clone()).unwrap();
        let stored = digest::compute(&parsed, &MASTER_KEY).unwrap();

        let mut metadata = json!({
            "keyslots": {},
            "tokens": {},
            "segments": {
                "0": {
                    "type": "crypt",
                    "offset": "16384",
                    "size": "131072",
                    "iv_tweak": "0",
                    "encryption": "aes-xts-plain64",
                    "sector_size": 512
                }
            },
            "digests": { "0": digest_json },
            "config": { "json_size": "12288", "keyslots_size": "4161536" }
        });
        metadata["digests"]["0"]["digest"] = json!(general_purpose::STANDARD.encode(&*stored));

        Fixture {
            metadata,
            areas: Vec::new(),
        }
    }

    /// Adds a PBKDF2 keyslot (4 iterations) holding [`MASTER_KEY`].
    pub(crate) fn with_keyslot(self, index: u32, passphrase: &[u8], priority: Option<Value>) -> Self {
        let salt = general_purpose::STANDARD.encode([index as u8; 32]);
        let kdf = json!({ "type": "pbkdf2", "hash": "sha256", "iterations": 4, "salt": salt });
        self.with_keyslot_kdf(index, passphrase, priority, kdf)
    }

    pub(crate) fn with_keyslot_kdf(mut self, index: u32, passphrase: &[u8], priority: Option<Value>, kdf: Value) -> Self {
        let key_size = MASTER_KEY.len();
        let offset = KEYSLOTS_OFFSET + u64::from(index) * AREA_SIZE;

        let parsed: Luks2Kdf = serde_json::from_value(kdf.clone()).unwrap();
        let af_key = kdf::derive_key(&parsed, passphrase, key_size).unwrap();

        let mut random_stripes = vec![0u8; key_size * (LUKS_STRIPES as usize - 1)];
        rand::thread_rng().fill_bytes(&mut random_stripes);
        let mut material = af::split(&MASTER_KEY, LUKS_STRIPES, random_stripes);
        let padded = material.len().div_ceil(LUKS_SECTOR_SIZE) * LUKS_SECTOR_SIZE;
        material.resize(padded, 0);

        SectorCipher::new("aes-xts-plain64", &af_key)
            .unwrap()
            .encrypt_area(&mut material, LUKS_SECTOR_SIZE);
        self.areas.push((offset, material));

        let mut keyslot = json!({
            "type": "luks2",
            "key_size": key_size,
            "af": { "type": "luks1", "stripes": LUKS_STRIPES, "hash": "sha256" },
            "area": {
                "type": "raw",
                "encryption": "aes-xts-plain64",
                "key_size": key_size,
                "offset": offset.to_string(),
                "size": AREA_SIZE.to_string()
            },
            "kdf": kdf
        });
        if let Some(priority) = priority {
            keyslot["priority"] = priority;
        }
        self.metadata["keyslots"][index.to_string()] = keyslot;
        self.metadata["digests"]["0"]["keyslots"]
            .as_array_mut()
            .unwrap()
            .push(json!(index.to_string()));
        self
    }

    /// Serializes the metadata into a checksummed header followed by the keyslot areas.
    pub(crate) fn image(&self) -> Vec<u8> {
        let json = serde_json::to_vec(&self.metadata).unwrap();
        let mut image = build_region(HEADER_SIZE, "sha256", &json);

        let end = self
            .areas
            .iter()
            .map(|(offset, data)| *offset as usize + data.len())
            .max()
            .unwrap_or(image.len());
        image.resize(end.max(image.len()), 0);
        for (offset, data) in &self.areas {
            let start = *offset as usize;
            image[start..start + data.len()].copy_from_slice(data);
        }
        image
    }

    pub(crate) fn open(&self) -> (Luks2Device, Cursor<Vec<u8>>) {
        let mut image = Cursor::new(self.image());
        let device = Luks2Device::open(&mut image).unwrap();
        (device, image)
    }
}
