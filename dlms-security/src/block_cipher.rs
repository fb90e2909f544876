//! AES-128 forward block transform
//!
//! Table-driven Rijndael with a 128-bit key: the key schedule expands the
//! key into 11 round keys, the nine full rounds fuse SubBytes, ShiftRows and
//! MixColumns into four 256-entry word tables, and the last round uses the
//! plain S-box.
//!
//! Every DLMS use of AES runs the cipher forward (CTR keystream, GHASH
//! subkey, HLS challenge transform, key derivation, key wrap), so there is no
//! inverse cipher and no inverse key schedule.

use crate::error::{SecurityResult, check_length};
use std::fmt;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes
pub const KEY_SIZE: usize = 16;

const ROUNDS: usize = 10;

/// Expanded round keys, one big-endian word per column
pub type KeySchedule = [u32; 4 * (ROUNDS + 1)];

#[rustfmt::skip]
const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// Round constants for the key schedule, already in the top byte
const RCON: [u32; ROUNDS] = [
    0x0100_0000, 0x0200_0000, 0x0400_0000, 0x0800_0000, 0x1000_0000,
    0x2000_0000, 0x4000_0000, 0x8000_0000, 0x1b00_0000, 0x3600_0000,
];

/// Multiplication by x in GF(2^8)
const fn xtime(b: u8) -> u8 {
    if b & 0x80 != 0 {
        (b << 1) ^ 0x1b
    } else {
        b << 1
    }
}

/// T0[x] = (02·S[x], S[x], S[x], 03·S[x]); T1..T3 are byte rotations of T0.
const fn build_round_table(rotation: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let s = SBOX[i];
        let s2 = xtime(s);
        let s3 = s2 ^ s;
        let word = ((s2 as u32) << 24) | ((s as u32) << 16) | ((s as u32) << 8) | s3 as u32;
        table[i] = word.rotate_right(rotation);
        i += 1;
    }
    table
}

static T0: [u32; 256] = build_round_table(0);
static T1: [u32; 256] = build_round_table(8);
static T2: [u32; 256] = build_round_table(16);
static T3: [u32; 256] = build_round_table(24);

#[inline]
fn sub_word(word: u32) -> u32 {
    (SBOX[(word >> 24) as usize] as u32) << 24
        | (SBOX[((word >> 16) & 0xff) as usize] as u32) << 16
        | (SBOX[((word >> 8) & 0xff) as usize] as u32) << 8
        | SBOX[(word & 0xff) as usize] as u32
}

#[inline]
fn round(t: [u32; 4], rk: &[u32]) -> [u32; 4] {
    let mut out = [0u32; 4];
    for c in 0..4 {
        out[c] = T0[(t[c] >> 24) as usize]
            ^ T1[((t[(c + 1) % 4] >> 16) & 0xff) as usize]
            ^ T2[((t[(c + 2) % 4] >> 8) & 0xff) as usize]
            ^ T3[(t[(c + 3) % 4] & 0xff) as usize]
            ^ rk[c];
    }
    out
}

#[inline]
fn final_round(t: [u32; 4], rk: &[u32]) -> [u32; 4] {
    let mut out = [0u32; 4];
    for c in 0..4 {
        out[c] = ((SBOX[(t[c] >> 24) as usize] as u32) << 24
            | (SBOX[((t[(c + 1) % 4] >> 16) & 0xff) as usize] as u32) << 16
            | (SBOX[((t[(c + 2) % 4] >> 8) & 0xff) as usize] as u32) << 8
            | SBOX[(t[(c + 3) % 4] & 0xff) as usize] as u32)
            ^ rk[c];
    }
    out
}

/// AES-128 block cipher, encryption direction only
#[derive(Clone)]
pub struct AesBlockCipher {
    round_keys: KeySchedule,
}

impl AesBlockCipher {
    /// Expand a 128-bit key
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            round_keys: Self::expand_key(key),
        }
    }

    /// Expand a key given as a slice
    ///
    /// # Errors
    /// Returns `InvalidKeyLength` if the key is not 16 bytes
    pub fn from_slice(key: &[u8]) -> SecurityResult<Self> {
        check_length("block cipher key", KEY_SIZE, key)?;
        let mut buf = [0u8; KEY_SIZE];
        buf.copy_from_slice(key);
        Ok(Self::new(&buf))
    }

    /// Standard Rijndael key expansion for Nk = 4
    pub fn expand_key(key: &[u8; KEY_SIZE]) -> KeySchedule {
        let mut w: KeySchedule = [0; 4 * (ROUNDS + 1)];
        for (i, chunk) in key.chunks_exact(4).enumerate() {
            w[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        for i in 4..w.len() {
            let mut temp = w[i - 1];
            if i % 4 == 0 {
                temp = sub_word(temp.rotate_left(8)) ^ RCON[i / 4 - 1];
            }
            w[i] = w[i - 4] ^ temp;
        }
        w
    }

    /// Expanded round keys
    pub fn key_schedule(&self) -> &KeySchedule {
        &self.round_keys
    }

    /// Encrypt a single block
    pub fn encrypt_block(&self, input: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let rk = &self.round_keys;
        let mut state = [0u32; 4];
        for (c, chunk) in input.chunks_exact(4).enumerate() {
            state[c] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ rk[c];
        }

        for r in 1..ROUNDS {
            state = round(state, &rk[4 * r..4 * r + 4]);
        }
        let state = final_round(state, &rk[4 * ROUNDS..]);

        let mut out = [0u8; BLOCK_SIZE];
        for (c, word) in state.iter().enumerate() {
            out[4 * c..4 * c + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Encrypt a block in place
    pub fn encrypt_block_in_place(&self, block: &mut [u8; BLOCK_SIZE]) {
        *block = self.encrypt_block(block);
    }
}

impl fmt::Debug for AesBlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesBlockCipher").finish_non_exhaustive()
    }
}
