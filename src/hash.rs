//! Name hashing and hash encodings used by Cryptomatte.
//!
//! Object names are hashed with MurmurHash3 (x86, 32-bit, seed 0) and the
//! resulting bits are stored in image channels as `f32`. The exponent field is
//! nudged out of the denormal/Inf/NaN range so every id survives float
//! filtering. This must stay bit-compatible with every other Cryptomatte
//! encoder or manifests stop resolving.

use crate::foundation::error::{DecryptError, DecryptResult};

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

const EXPONENT_SHIFT: u32 = 23;
const EXPONENT_MASK: u32 = 0xff;

/// A Cryptomatte id as stored in an id channel.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CryptoHash(pub f32);

impl CryptoHash {
    pub fn from_bits(bits: u32) -> Self {
        Self(f32::from_bits(bits))
    }

    pub fn bits(self) -> u32 {
        self.0.to_bits()
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// IEEE-754 biased exponent field.
    pub fn exponent(self) -> u32 {
        (self.bits() >> EXPONENT_SHIFT) & EXPONENT_MASK
    }
}

impl std::fmt::Display for CryptoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.bits())
    }
}

/// Reference MurmurHash3 x86 32-bit.
pub fn murmur3_32(bytes: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let mut blocks = bytes.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k |= u32::from(b) << (8 * i);
        }
        h ^= mix_k(k);
    }

    h ^= bytes.len() as u32;
    fmix32(h)
}

fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Hash an object name into its Cryptomatte id.
pub fn hash_name(name: &str) -> CryptoHash {
    let mut bits = murmur3_32(name.as_bytes(), 0);
    let exp = (bits >> EXPONENT_SHIFT) & EXPONENT_MASK;
    if exp == 0 || exp == EXPONENT_MASK {
        bits ^= 1 << EXPONENT_SHIFT;
    }
    CryptoHash::from_bits(bits)
}

/// Lowercase, zero-padded 8 digit hex of the hash bits.
pub fn hash_to_hex(hash: CryptoHash) -> String {
    format!("{:08x}", hash.bits())
}

/// Parse 1 to 8 hex digits into a hash.
pub fn hex_to_hash(hex: &str) -> DecryptResult<CryptoHash> {
    let trimmed = hex.trim();
    if trimmed.is_empty() || trimmed.len() > 8 {
        return Err(DecryptError::malformed_hash(format!(
            "'{hex}' must have 1 to 8 hex digits"
        )));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecryptError::malformed_hash(format!(
            "'{hex}' is not hexadecimal"
        )));
    }
    let bits = u32::from_str_radix(trimmed, 16)
        .map_err(|e| DecryptError::malformed_hash(format!("'{hex}': {e}")))?;
    Ok(CryptoHash::from_bits(bits))
}

/// Seven hex digit key used to tag a layer's metadata entries.
pub fn layer_hash(layer_name: &str) -> String {
    let mut hex = hash_to_hex(hash_name(layer_name));
    hex.truncate(7);
    hex
}

/// Stable "clown" colour for a hash. Red is always zero.
pub fn hash_to_preview_color(hash: CryptoHash) -> [f32; 3] {
    let bits = hash.bits();
    let max = f64::from(u32::MAX);
    let g = f64::from(bits.wrapping_shl(8)) / max;
    let b = f64::from(bits.wrapping_shl(16)) / max;
    [0.0, g as f32, b as f32]
}
