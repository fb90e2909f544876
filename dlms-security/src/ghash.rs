//! GHASH over GF(2^128)
//!
//! Multiplication by the hash subkey `H` is accelerated with Shoup's 4-bit
//! window: 32 tables of 16 entries, where table `2i` holds the multiples of
//! `H·x^(8i+4)` selected by the low nibble of byte `i` and table `2i+1` the
//! multiples of `H·x^(8i)` selected by its high nibble. A product is then
//! 32 table lookups and XORs instead of 128 conditional shifts.
//!
//! Field elements use GCM's reflected bit order: bit 0 of byte 0 (the MSB) is
//! the coefficient of x^0. The reduction polynomial is
//! x^128 + x^7 + x^2 + x + 1.

use crate::block_cipher::{AesBlockCipher, BLOCK_SIZE};
use std::fmt;

type Element = [u32; 4];

/// Multiply by x: shift right one bit, reduce if a bit fell off
#[inline]
fn multiply_p(x: &mut Element) {
    let lsb = x[3] & 1;
    x[3] = (x[3] >> 1) | (x[2] << 31);
    x[2] = (x[2] >> 1) | (x[1] << 31);
    x[1] = (x[1] >> 1) | (x[0] << 31);
    x[0] >>= 1;
    if lsb != 0 {
        x[0] ^= 0xe100_0000;
    }
}

#[inline]
fn multiply_p8(x: &mut Element) {
    for _ in 0..8 {
        multiply_p(x);
    }
}

#[inline]
fn xor_into(target: &mut Element, other: &Element) {
    for (t, o) in target.iter_mut().zip(other) {
        *t ^= o;
    }
}

fn to_element(block: &[u8; BLOCK_SIZE]) -> Element {
    let mut e = [0u32; 4];
    for (i, chunk) in block.chunks_exact(4).enumerate() {
        e[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    e
}

/// Precomputed multiplication tables for one hash subkey
#[derive(Clone)]
pub struct GhashTables {
    m: Box<[[Element; 16]; 32]>,
}

impl GhashTables {
    /// Build the tables for hash subkey `h`
    pub fn new(h: &[u8; BLOCK_SIZE]) -> Self {
        let mut m = Box::new([[[0u32; 4]; 16]; 32]);

        m[1][8] = to_element(h);
        for j in [4, 2, 1] {
            let mut tmp = m[1][j + j];
            multiply_p(&mut tmp);
            m[1][j] = tmp;
        }
        let mut tmp = m[1][1];
        multiply_p(&mut tmp);
        m[0][8] = tmp;
        for j in [4, 2, 1] {
            let mut tmp = m[0][j + j];
            multiply_p(&mut tmp);
            m[0][j] = tmp;
        }

        for i in 0..32 {
            if i > 1 {
                for j in [8, 4, 2, 1] {
                    let mut tmp = m[i - 2][j];
                    multiply_p8(&mut tmp);
                    m[i][j] = tmp;
                }
            }
            let mut j = 2;
            while j < 16 {
                for k in 1..j {
                    let mut tmp = m[i][j];
                    xor_into(&mut tmp, &m[i][k]);
                    m[i][j + k] = tmp;
                }
                j += j;
            }
        }

        Self { m }
    }

    /// Derive `H = E_K(0^128)` from the block cipher and build its tables
    pub fn from_cipher(cipher: &AesBlockCipher) -> Self {
        Self::new(&cipher.encrypt_block(&[0u8; BLOCK_SIZE]))
    }

    /// `x = x · H`
    pub fn multiply_h(&self, x: &mut [u8; BLOCK_SIZE]) {
        let mut z = [0u32; 4];
        for i in (0..BLOCK_SIZE).rev() {
            xor_into(&mut z, &self.m[i + i][(x[i] & 0x0f) as usize]);
            xor_into(&mut z, &self.m[i + i + 1][(x[i] >> 4) as usize]);
        }
        for (i, word) in z.iter().enumerate() {
            x[4 * i..4 * i + 4].copy_from_slice(&word.to_be_bytes());
        }
    }

    /// Fold one block into the accumulator: `S = (S ⊕ block) · H`
    pub fn fold_block(&self, state: &mut [u8; BLOCK_SIZE], block: &[u8]) {
        for (s, b) in state.iter_mut().zip(block) {
            *s ^= b;
        }
        self.multiply_h(state);
    }

    /// Fold arbitrary-length data, zero-padding the last partial block
    pub fn update(&self, state: &mut [u8; BLOCK_SIZE], data: &[u8]) {
        for chunk in data.chunks(BLOCK_SIZE) {
            self.fold_block(state, chunk);
        }
    }

    /// GHASH of `data` from a zero accumulator
    pub fn ghash(&self, data: &[u8]) -> [u8; BLOCK_SIZE] {
        let mut state = [0u8; BLOCK_SIZE];
        self.update(&mut state, data);
        state
    }
}

impl fmt::Debug for GhashTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhashTables").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, RngCore};

    /// Bit-serial multiplication, NIST SP 800-38D Algorithm 1
    fn gf_mul(x: u128, y: u128) -> u128 {
        const R: u128 = 0xe1 << 120;
        let mut z = 0u128;
        let mut v = y;
        for i in 0..128 {
            if (x >> (127 - i)) & 1 == 1 {
                z ^= v;
            }
            v = if v & 1 == 1 { (v >> 1) ^ R } else { v >> 1 };
        }
        z
    }

    fn reference_ghash(h: &[u8; 16], data: &[u8]) -> [u8; 16] {
        let h = u128::from_be_bytes(*h);
        let mut y = 0u128;
        for chunk in data.chunks(16) {
            let mut block = [0u8; 16];
            block[..chunk.len()].copy_from_slice(chunk);
            y = gf_mul(y ^ u128::from_be_bytes(block), h);
        }
        y.to_be_bytes()
    }

    #[test]
    fn test_multiply_by_one() {
        // x^0 is the MSB of the first byte
        let mut one = [0u8; 16];
        one[0] = 0x80;
        let h = [0x5a; 16];
        let tables = GhashTables::new(&h);
        tables.multiply_h(&mut one);
        assert_eq!(one, h);
    }

    #[test]
    fn test_empty_input_is_zero() {
        let tables = GhashTables::new(&[0x11; 16]);
        assert_eq!(tables.ghash(&[]), [0u8; 16]);
    }

    #[test]
    fn test_nist_gcm_test_case_2_hash() {
        // GCM spec test case 2: K = 0, P = 0^128, C = 0388dace60b6a392f328c2b971b2fe78
        let tables = GhashTables::from_cipher(&AesBlockCipher::new(&[0u8; 16]));
        let mut input = vec![
            0x03, 0x88, 0xda, 0xce, 0x60, 0xb6, 0xa3, 0x92, 0xf3, 0x28, 0xc2, 0xb9, 0x71, 0xb2,
            0xfe, 0x78,
        ];
        let mut lengths = [0u8; 16];
        lengths[15] = 0x80;
        input.extend_from_slice(&lengths);
        assert_eq!(
            tables.ghash(&input),
            [
                0xf3, 0x8c, 0xbb, 0x1a, 0xd6, 0x92, 0x23, 0xdc, 0xc3, 0x45, 0x7a, 0xe5, 0xb6, 0xb0,
                0xf8, 0x85
            ]
        );
    }

    #[test]
    fn test_tables_match_bit_serial_reference() {
        let mut rng = rand::thread_rng();
        let mut h = [0u8; 16];
        rng.fill_bytes(&mut h);
        let mut tables = GhashTables::new(&h);

        for round in 0..10_000 {
            if round % 500 == 0 {
                rng.fill_bytes(&mut h);
                tables = GhashTables::new(&h);
            }
            let len = rng.gen_range(0..80);
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);
            assert_eq!(tables.ghash(&data), reference_ghash(&h, &data), "length {}", len);
        }
    }

    #[test]
    fn test_update_is_incremental_on_block_boundaries() {
        let tables = GhashTables::new(&[0x3c; 16]);
        let data: Vec<u8> = (0u8..48).collect();
        let mut state = [0u8; 16];
        tables.update(&mut state, &data[..16]);
        tables.update(&mut state, &data[16..]);
        assert_eq!(state, tables.ghash(&data));
    }
}
