//! Anti-forensic information splitting, as used by LUKS keyslots.
//!
//! A key of `block_size` bytes is stored as `stripes` blocks. All but the last block are
//! random; the last is the key XORed with a diffused running accumulator of the others. Losing
//! any single stripe makes the key unrecoverable.

use crate::LuksError;
use crate::metadata::HashAlgorithm;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Merges anti-forensic stripes to retrieve the original data.
///
/// `data` must hold at least `stripes` consecutive blocks of `block_size` bytes; anything past
/// that (sector padding) is ignored.
pub fn merge(
    data: &[u8],
    block_size: usize,
    stripes: u32,
    hash: &HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, LuksError> {
    check_layout(data.len(), block_size, stripes)?;
    match hash {
        HashAlgorithm::Sha256 => Ok(merge_with::<Sha256>(data, block_size, stripes)),
        HashAlgorithm::Unsupported(name) => Err(LuksError::UnknownHashAlgorithm {
            field: "af",
            name: name.clone(),
        }),
    }
}

fn check_layout(len: usize, block_size: usize, stripes: u32) -> Result<(), LuksError> {
    if stripes == 0 || block_size == 0 {
        return Err(LuksError::InvalidHeader(format!(
            "AF layout of {} stripes of {} bytes is empty",
            stripes, block_size
        )));
    }
    if len < block_size * stripes as usize {
        return Err(LuksError::InvalidHeader(format!(
            "AF data size {} is too small for {} stripes of {} bytes",
            len, stripes, block_size
        )));
    }
    Ok(())
}

fn merge_with<D: Digest>(data: &[u8], block_size: usize, stripes: u32) -> Zeroizing<Vec<u8>> {
    let mut bufblock = Zeroizing::new(vec![0u8; block_size]);

    for stripe in data.chunks_exact(block_size).take(stripes as usize - 1) {
        xor_into(&mut bufblock, stripe);
        diffuse::<D>(&mut bufblock);
    }

    let last_stripe_start = (stripes as usize - 1) * block_size;
    xor_into(&mut bufblock, &data[last_stripe_start..last_stripe_start + block_size]);
    bufblock
}

/// Splits the original data into anti-forensic stripes.
///
/// This is the inverse of [`merge`]. Only the test image builder writes keyslots.
#[cfg(test)]
pub(crate) fn split(data: &[u8], stripes: u32, mut random_stripes: Vec<u8>) -> Vec<u8> {
    let block_size = data.len();
    assert_eq!(random_stripes.len(), block_size * (stripes as usize - 1));

    let mut bufblock = vec![0u8; block_size];
    for stripe in random_stripes.chunks_exact(block_size) {
        xor_into(&mut bufblock, stripe);
        diffuse::<Sha256>(&mut bufblock);
    }

    xor_into(&mut bufblock, data);
    random_stripes.extend_from_slice(&bufblock);
    random_stripes
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= *s;
    }
}

/// Replaces each digest-sized chunk `i` of `block` with `H(be32(i) || chunk)`, truncating the
/// hash for a short trailing chunk.
fn diffuse<D: Digest>(block: &mut [u8]) {
    let hash_len = <D as Digest>::output_size();
    for (i, chunk) in block.chunks_mut(hash_len).enumerate() {
        let mut hasher = D::new();
        hasher.update((i as u32).to_be_bytes());
        hasher.update(&*chunk);
        let hash = hasher.finalize();
        let len = chunk.len();
        chunk.copy_from_slice(&hash[..len]);
    }
}
