// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! AES-256 in IGE mode, the block chaining MTProto envelopes are
//! ciphered with.
//!
//! IGE whitens every block twice: with the previous ciphertext block
//! before the block cipher runs, and with the previous plaintext block
//! after it. The two halves of the 32-byte IV seed those chains.
use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

const BLOCK_LEN: usize = 16;

fn xor_assign(block: &mut [u8; BLOCK_LEN], mask: &[u8; BLOCK_LEN]) {
    for (byte, mask) in block.iter_mut().zip(mask) {
        *byte ^= mask;
    }
}

/// Encrypts the plaintext with AES-256 in IGE mode.
///
/// Panics if the plaintext is not padded to the block size.
pub fn ige_encrypt(plaintext: &[u8], key: &[u8; 32], iv: &[u8; 32]) -> Vec<u8> {
    assert!(plaintext.len() % BLOCK_LEN == 0);
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher: [u8; BLOCK_LEN] = iv[..BLOCK_LEN].try_into().unwrap();
    let mut prev_plain: [u8; BLOCK_LEN] = iv[BLOCK_LEN..].try_into().unwrap();

    let mut ciphertext = Vec::with_capacity(plaintext.len());
    for block in plaintext.chunks_exact(BLOCK_LEN) {
        let mut current: [u8; BLOCK_LEN] = block.try_into().unwrap();
        xor_assign(&mut current, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut current));
        xor_assign(&mut current, &prev_plain);

        prev_cipher = current;
        prev_plain.copy_from_slice(block);
        ciphertext.extend_from_slice(&current);
    }

    ciphertext
}

/// Inverse of [`ige_encrypt`].
///
/// Panics if the ciphertext is not padded to the block size.
pub fn ige_decrypt(ciphertext: &[u8], key: &[u8; 32], iv: &[u8; 32]) -> Vec<u8> {
    assert!(ciphertext.len() % BLOCK_LEN == 0);
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher: [u8; BLOCK_LEN] = iv[..BLOCK_LEN].try_into().unwrap();
    let mut prev_plain: [u8; BLOCK_LEN] = iv[BLOCK_LEN..].try_into().unwrap();

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    for block in ciphertext.chunks_exact(BLOCK_LEN) {
        let mut current: [u8; BLOCK_LEN] = block.try_into().unwrap();
        xor_assign(&mut current, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut current));
        xor_assign(&mut current, &prev_cipher);

        prev_cipher.copy_from_slice(block);
        prev_plain = current;
        plaintext.extend_from_slice(&current);
    }

    plaintext
}
