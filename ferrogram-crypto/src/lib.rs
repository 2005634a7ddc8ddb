// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![deny(unsafe_code)]

//! Cryptographic primitives for the MTProto 2.0 encrypted envelope:
//! AES-IGE, the message-key derivation, and the AES key and initialization
//! vector schedule, parameterized over the direction of the message so both
//! client-side and server-side envelopes can be produced (the latter is what
//! the test suites of higher layers use to forge inbound traffic).
pub mod aes;
mod auth_key;

pub use auth_key::AuthKey;
use getrandom::getrandom;
use std::fmt;

/// Digest of the concatenation of `parts` with SHA-1.
pub(crate) fn sha1(parts: &[&[u8]]) -> [u8; 20] {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Digest of the concatenation of `parts` with SHA-256.
pub(crate) fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The ciphertext is either too small or not padded correctly.
    InvalidBuffer,

    /// The peer used the ID of a different authorization key.
    AuthKeyMismatch,

    /// The key of the message did not match our expectations.
    MessageKeyMismatch,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Error::AuthKeyMismatch => write!(f, "peer authkey mismatches with ours"),
            Error::MessageKeyMismatch => write!(f, "peer msgkey mismatches with ours"),
        }
    }
}

/// Which side produced a message. Key derivation depends on the direction
/// the data travels in, so the decrypting end must name the *encrypting*
/// side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    // "where x = 0 for messages from client to server and x = 8 for those from server to client."
    fn x(&self) -> usize {
        match *self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }
}

/// Calculate the key based on Telegram [guidelines for MTProto 2],
/// returning the pair `(key, iv)` for use in AES-IGE mode.
///
/// [guidelines for MTProto 2]: https://core.telegram.org/mtproto/description#defining-aes-key-and-initialization-vector
pub fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();

    // sha256_a = SHA256 (msg_key + substr (auth_key, x, 36));
    let sha256_a = sha256(&[&msg_key[..], &auth_key.data[x..x + 36]]);

    // sha256_b = SHA256 (substr (auth_key, 40+x, 36) + msg_key);
    let sha256_b = sha256(&[&auth_key.data[40 + x..40 + x + 36], &msg_key[..]]);

    // aes_key = substr (sha256_a, 0, 8) + substr (sha256_b, 8, 16) + substr (sha256_a, 24, 8);
    let aes_key = {
        let mut buffer = [0; 32];
        buffer[0..8].copy_from_slice(&sha256_a[0..8]);
        buffer[8..8 + 16].copy_from_slice(&sha256_b[8..8 + 16]);
        buffer[24..24 + 8].copy_from_slice(&sha256_a[24..24 + 8]);
        buffer
    };

    // aes_iv = substr (sha256_b, 0, 8) + substr (sha256_a, 8, 16) + substr (sha256_b, 24, 8);
    let aes_iv = {
        let mut buffer = [0; 32];
        buffer[0..8].copy_from_slice(&sha256_b[0..8]);
        buffer[8..8 + 16].copy_from_slice(&sha256_a[8..8 + 16]);
        buffer[24..24 + 8].copy_from_slice(&sha256_b[24..24 + 8]);
        buffer
    };

    (aes_key, aes_iv)
}

/// Determines the padding length needed for a plaintext of a certain length,
/// according to the following citation:
///
/// > Note that MTProto 2.0 requires from 12 to 1024 bytes of padding
/// > [...] the resulting message length be divisible by 16 bytes
fn determine_padding_v2_length(len: usize) -> usize {
    16 + (16 - (len % 16))
}

// Inner body of `encrypt_data`, separated for testing purposes.
fn do_encrypt_data(
    plaintext: &[u8],
    auth_key: &AuthKey,
    random_padding: &[u8; 32],
    side: Side,
) -> Vec<u8> {
    let x = side.x();

    let padding_len = determine_padding_v2_length(plaintext.len());
    let mut padded = Vec::with_capacity(plaintext.len() + padding_len);
    padded.extend_from_slice(plaintext);
    padded.extend(random_padding.iter().take(padding_len));

    // msg_key_large = SHA256 (substr (auth_key, 88+x, 32) + plaintext + random_padding);
    let msg_key_large = sha256(&[&auth_key.data[88 + x..88 + x + 32], &padded[..]]);

    // msg_key = substr (msg_key_large, 8, 16);
    let msg_key = {
        let mut buffer = [0; 16];
        buffer.copy_from_slice(&msg_key_large[8..8 + 16]);
        buffer
    };

    let (key, iv) = calc_key(auth_key, &msg_key, side);
    let ciphertext = aes::ige_encrypt(&padded, &key, &iv);

    let mut envelope = Vec::with_capacity(auth_key.key_id.len() + msg_key.len() + ciphertext.len());
    envelope.extend_from_slice(&auth_key.key_id);
    envelope.extend_from_slice(&msg_key);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// This function implements the [MTProto 2.0 algorithm] for computing
/// `aes_key` and `aes_iv` from `auth_key` and `msg_key`, and produces the
/// full envelope `auth_key_id || msg_key || ciphertext`.
///
/// [MTProto 2.0 algorithm]: https://core.telegram.org/mtproto/description#defining-aes-key-and-initialization-vector
pub fn encrypt_data(plaintext: &[u8], auth_key: &AuthKey, side: Side) -> Vec<u8> {
    let random_padding = {
        let mut rnd = [0; 32];
        getrandom(&mut rnd).expect("failed to generate a secure padding");
        rnd
    };

    do_encrypt_data(plaintext, auth_key, &random_padding, side)
}

/// This function is the inverse of [`encrypt_data`]. `side` names the end
/// that *encrypted* the envelope.
///
/// Both the envelope's authorization key ID and its message key are
/// validated against the local key.
pub fn decrypt_data(ciphertext: &[u8], auth_key: &AuthKey, side: Side) -> Result<Vec<u8>, Error> {
    let x = side.x();

    if ciphertext.len() < 24 || (ciphertext.len() - 24) % 16 != 0 {
        return Err(Error::InvalidBuffer);
    }

    let key_id = &ciphertext[..8];
    if auth_key.key_id != *key_id {
        return Err(Error::AuthKeyMismatch);
    }

    let msg_key = {
        let mut buffer = [0; 16];
        buffer.copy_from_slice(&ciphertext[8..8 + 16]);
        buffer
    };

    let (key, iv) = calc_key(auth_key, &msg_key, side);
    let plaintext = aes::ige_decrypt(&ciphertext[24..], &key, &iv);

    // https://core.telegram.org/mtproto/security_guidelines#mtproto-encrypted-messages
    let our_key = sha256(&[&auth_key.data[88 + x..88 + x + 32], &plaintext[..]]);

    if msg_key != our_key[8..8 + 16] {
        return Err(Error::MessageKeyMismatch);
    }

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_auth_key() -> AuthKey {
        let mut buffer = [0u8; 256];
        buffer
            .iter_mut()
            .enumerate()
            .for_each(|(i, x)| *x = (i as u8).wrapping_mul(7).wrapping_add(13));

        AuthKey::from_bytes(buffer)
    }

    fn get_test_msg_key() -> [u8; 16] {
        let mut buffer = [0u8; 16];
        buffer
            .iter_mut()
            .enumerate()
            .for_each(|(i, x)| *x = (i as u8).wrapping_mul(11).wrapping_add(5));

        buffer
    }

    #[test]
    fn calc_client_key() {
        let auth_key = get_test_auth_key();
        let msg_key = get_test_msg_key();
        let expected = (
            [
                74, 63, 159, 207, 253, 114, 30, 167, 125, 227, 225, 134, 166, 238, 75, 16, 23, 146,
                202, 24, 123, 100, 83, 169, 191, 54, 246, 243, 90, 89, 180, 162,
            ],
            [
                220, 53, 146, 46, 69, 199, 243, 196, 153, 132, 8, 50, 151, 71, 152, 226, 118, 158,
                47, 132, 81, 104, 166, 236, 242, 241, 63, 7, 62, 253, 15, 85,
            ],
        );
        assert_eq!(calc_key(&auth_key, &msg_key, Side::Client), expected);
    }

    #[test]
    fn calc_server_key() {
        let auth_key = get_test_auth_key();
        let msg_key = get_test_msg_key();
        let expected = (
            [
                154, 74, 179, 24, 25, 90, 218, 139, 10, 99, 171, 15, 94, 19, 189, 157, 66, 41, 24,
                96, 128, 4, 153, 246, 51, 224, 139, 109, 219, 114, 129, 105,
            ],
            [
                3, 0, 86, 119, 198, 42, 0, 88, 103, 73, 142, 81, 233, 95, 200, 90, 228, 192, 203,
                7, 76, 247, 36, 15, 238, 50, 71, 8, 126, 111, 161, 121,
            ],
        );
        assert_eq!(calc_key(&auth_key, &msg_key, Side::Server), expected);
    }

    #[test]
    fn encrypt_client_data() {
        let plaintext = b"Profound secrets travel in sixteen byte blocks!";
        let auth_key = get_test_auth_key();
        let random_padding = {
            let mut buffer = [0u8; 32];
            buffer
                .iter_mut()
                .enumerate()
                .for_each(|(i, x)| *x = (i as u8).wrapping_mul(5).wrapping_add(2));
            buffer
        };
        let expected = vec![
            229, 94, 208, 113, 225, 91, 117, 119, 191, 114, 166, 120, 136, 20, 73, 184, 211, 216,
            217, 68, 29, 19, 200, 89, 118, 70, 132, 39, 100, 232, 112, 65, 24, 200, 187, 249, 185,
            38, 144, 98, 11, 64, 67, 118, 123, 119, 111, 30, 74, 78, 50, 150, 31, 149, 144, 170, 5,
            101, 3, 227, 130, 226, 52, 99, 222, 86, 113, 187, 147, 107, 181, 201, 100, 52, 37, 154,
            2, 33, 1, 243, 225, 70, 231, 169, 25, 22, 100, 129,
        ];

        assert_eq!(
            do_encrypt_data(plaintext, &auth_key, &random_padding, Side::Client),
            expected
        );
    }

    #[test]
    fn decrypt_server_data() {
        // An envelope produced on the server side of the same key, carrying
        // the standard `salt || session_id || msg_id || seq || len || body`
        // plaintext followed by its padding.
        let ciphertext = vec![
            229, 94, 208, 113, 225, 91, 117, 119, 1, 54, 172, 92, 123, 154, 15, 169, 198, 176, 5,
            123, 52, 161, 175, 147, 97, 72, 129, 6, 150, 115, 74, 197, 86, 33, 126, 142, 155, 103,
            197, 77, 171, 78, 27, 239, 159, 4, 126, 0, 80, 178, 243, 241, 57, 192, 251, 84, 132, 5,
            222, 173, 184, 244, 37, 141, 161, 170, 129, 221, 66, 129, 30, 115, 79, 76, 29, 5, 32,
            213, 173, 99, 21, 231, 167, 47, 21, 28, 122, 105, 72, 134, 155, 203, 77, 77, 170, 143,
            51, 53, 157, 255, 251, 30, 50, 141, 55, 133, 134, 27, 159, 120, 63, 159, 199, 79, 101,
            178, 106, 128, 138, 93,
        ];
        let expected = vec![
            221, 68, 204, 51, 187, 34, 170, 17, 8, 7, 6, 5, 4, 3, 2, 1, 1, 0, 0, 0, 108, 125, 142,
            95, 3, 0, 0, 0, 44, 0, 0, 0, 97, 32, 115, 101, 114, 118, 101, 114, 32, 97, 110, 115,
            119, 101, 114, 32, 116, 104, 97, 116, 32, 116, 104, 101, 32, 99, 108, 105, 101, 110,
            116, 32, 109, 117, 115, 116, 32, 114, 101, 99, 111, 118, 101, 114, 4, 13, 22, 31, 40,
            49, 58, 67, 76, 85, 94, 103, 112, 121, 130, 139, 148, 157, 166, 175,
        ];

        let plaintext = decrypt_data(&ciphertext, &get_test_auth_key(), Side::Server).unwrap();
        assert_eq!(plaintext, expected);
        // the length field delimits the body from the trailing padding
        assert_eq!(
            &plaintext[32..32 + 44],
            b"a server answer that the client must recover"
        );
    }

    #[test]
    fn decrypt_rejects_foreign_key_id() {
        let auth_key = get_test_auth_key();
        let envelope = encrypt_data(b"data", &auth_key, Side::Server);
        let other_key = AuthKey::from_bytes([0; 256]);
        assert_eq!(
            decrypt_data(&envelope, &other_key, Side::Server),
            Err(Error::AuthKeyMismatch)
        );
    }

    #[test]
    fn decrypt_rejects_tampered_msg_key() {
        let auth_key = get_test_auth_key();
        let mut envelope = encrypt_data(b"data", &auth_key, Side::Server);
        envelope[8] ^= 0xff;
        assert_eq!(
            decrypt_data(&envelope, &auth_key, Side::Server),
            Err(Error::MessageKeyMismatch)
        );
    }

    #[test]
    fn round_trip_both_sides() {
        let auth_key = get_test_auth_key();
        for side in [Side::Client, Side::Server] {
            let envelope = encrypt_data(b"round and round", &auth_key, side);
            let plaintext = decrypt_data(&envelope, &auth_key, side).unwrap();
            assert_eq!(&plaintext[..15], b"round and round");
        }
    }
}
