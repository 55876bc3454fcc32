//! Legacy triple-block-cipher credential encoder.
//!
//! The portal login endpoints still run the historical JavaScript encoder:
//! a DES-style 64-bit block cipher applied three times per block, once under
//! each of three fixed single-character keys, over `user + pass + token`.
//! The final short block is zero-padded to 8 bytes and every block is
//! emitted as 16 lowercase hex digits. The tables and bit ordering below are
//! fixed by the remote endpoint and must not be altered.

use super::CipherError;

/// The three single-character keys applied in order to every block.
const CREDENTIAL_KEYS: [u8; 3] = [b'1', b'2', b'3'];

const BLOCK_BYTES: usize = 8;
const ROUNDS: usize = 16;

// Initial permutation.
const IP: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4, 62, 54, 46, 38, 30, 22, 14, 6,
    64, 56, 48, 40, 32, 24, 16, 8, 57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

// Final permutation (inverse of IP).
const FP: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31, 38, 6, 46, 14, 54, 22, 62, 30,
    37, 5, 45, 13, 53, 21, 61, 29, 36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27,
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

// Expansion of the 32-bit half block to 48 bits.
const E: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9, 8, 9, 10, 11, 12, 13, 12, 13, 14, 15, 16, 17, 16, 17, 18,
    19, 20, 21, 20, 21, 22, 23, 24, 25, 24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

// Permutation applied after the S-boxes.
const P: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10, 2, 8, 24, 14, 32, 27, 3, 9, 19,
    13, 30, 6, 22, 11, 4, 25,
];

// Key schedule: 64-bit key to 56 bits.
const PC1: [u8; 56] = [
    57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18, 10, 2, 59, 51, 43, 35, 27, 19, 11, 3,
    60, 52, 44, 36, 63, 55, 47, 39, 31, 23, 15, 7, 62, 54, 46, 38, 30, 22, 14, 6, 61, 53, 45, 37,
    29, 21, 13, 5, 28, 20, 12, 4,
];

// Key schedule: 56 bits to the 48-bit round subkey.
const PC2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10, 23, 19, 12, 4, 26, 8, 16, 7, 27, 20, 13, 2, 41,
    52, 31, 37, 47, 55, 30, 40, 51, 45, 33, 48, 44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

// Per-round left-rotation amounts for the key halves.
const SHIFTS: [u32; ROUNDS] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

// The eight substitution boxes, each indexed by row * 16 + column.
const SBOXES: [[u8; 64]; 8] = [
    [
        14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7, 0, 15, 7, 4, 14, 2, 13, 1, 10, 6,
        12, 11, 9, 5, 3, 8, 4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0, 15, 12, 8, 2, 4,
        9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13,
    ],
    [
        15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10, 3, 13, 4, 7, 15, 2, 8, 14, 12, 0, 1,
        10, 6, 9, 11, 5, 0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15, 13, 8, 10, 1, 3,
        15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9,
    ],
    [
        10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8, 13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5,
        14, 12, 11, 15, 1, 13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7, 1, 10, 13, 0, 6,
        9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12,
    ],
    [
        7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15, 13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2,
        12, 1, 10, 14, 9, 10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4, 3, 15, 0, 6, 10,
        1, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14,
    ],
    [
        2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9, 14, 11, 2, 12, 4, 7, 13, 1, 5, 0,
        15, 10, 3, 9, 8, 6, 4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14, 11, 8, 12, 7, 1,
        14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3,
    ],
    [
        12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11, 10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13,
        14, 0, 11, 3, 8, 9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6, 4, 3, 2, 12, 9, 5,
        15, 10, 11, 14, 1, 7, 6, 0, 8, 13,
    ],
    [
        4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1, 13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5,
        12, 2, 15, 8, 6, 1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2, 6, 11, 13, 8, 1, 4,
        10, 7, 9, 5, 0, 15, 14, 2, 3, 12,
    ],
    [
        13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7, 1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6,
        11, 0, 14, 9, 2, 7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8, 2, 1, 14, 7, 4, 10,
        8, 13, 15, 12, 9, 0, 3, 5, 6, 11,
    ],
];

/// Applies a 1-indexed-from-MSB bit permutation table to a `width`-bit value.
fn permute(value: u64, width: u32, table: &[u8]) -> u64 {
    let mut out = 0_u64;
    for &position in table {
        out <<= 1;
        out |= (value >> (width - u32::from(position))) & 1;
    }
    out
}

/// Derives the 16 round subkeys from a 64-bit key.
fn subkeys(key: u64) -> [u64; ROUNDS] {
    let permuted = permute(key, 64, &PC1);
    let mut c = (permuted >> 28) & 0x0fff_ffff;
    let mut d = permuted & 0x0fff_ffff;

    let mut keys = [0_u64; ROUNDS];
    for (round, subkey) in keys.iter_mut().enumerate() {
        let shift = SHIFTS[round];
        c = ((c << shift) | (c >> (28 - shift))) & 0x0fff_ffff;
        d = ((d << shift) | (d >> (28 - shift))) & 0x0fff_ffff;
        *subkey = permute((c << 28) | d, 56, &PC2);
    }
    keys
}

/// The round function: expand, mix with the subkey, substitute, permute.
fn feistel(half: u32, subkey: u64) -> u32 {
    let expanded = permute(u64::from(half), 32, &E);
    let mixed = expanded ^ subkey;

    let mut substituted = 0_u32;
    for (box_index, sbox) in SBOXES.iter().enumerate() {
        let group = (mixed >> (42 - 6 * box_index)) & 0x3f;
        let row = ((group & 0x20) >> 4) | (group & 1);
        let column = (group >> 1) & 0x0f;
        substituted = (substituted << 4) | u32::from(sbox[(row * 16 + column) as usize]);
    }

    let permuted = permute(u64::from(substituted), 32, &P);
    // permute output of a 32-entry table fits in 32 bits
    permuted as u32
}

/// Encrypts one 64-bit block under a precomputed subkey schedule.
fn encrypt_block(block: u64, keys: &[u64; ROUNDS]) -> u64 {
    let permuted = permute(block, 64, &IP);
    let mut left = (permuted >> 32) as u32;
    let mut right = permuted as u32;

    for &subkey in keys {
        let next_right = left ^ feistel(right, subkey);
        left = right;
        right = next_right;
    }

    // The halves are swapped before the final permutation.
    let preoutput = (u64::from(right) << 32) | u64::from(left);
    permute(preoutput, 64, &FP)
}

/// Decrypts one 64-bit block (subkeys applied in reverse order).
fn decrypt_block(block: u64, keys: &[u64; ROUNDS]) -> u64 {
    let mut reversed = *keys;
    reversed.reverse();
    encrypt_block(block, &reversed)
}

/// Derives the 64-bit key block for a single-character key: the character
/// byte followed by zero padding.
fn char_key(key: u8) -> u64 {
    u64::from(key) << 56
}

/// Encodes a login payload the way the legacy endpoint expects.
///
/// The concatenation `user + pass + token` is split into 8-byte blocks
/// (final block zero-padded), each block is encrypted sequentially under the
/// three fixed single-character keys, and the blocks are concatenated as
/// lowercase hex. Deterministic: the same input always yields the same
/// output.
#[must_use]
pub fn encode_credentials(user: &str, pass: &str, token: &str) -> String {
    let mut data = String::with_capacity(user.len() + pass.len() + token.len());
    data.push_str(user);
    data.push_str(pass);
    data.push_str(token);

    let schedules = CREDENTIAL_KEYS.map(|key| subkeys(char_key(key)));

    let bytes = data.as_bytes();
    let mut out = String::with_capacity(bytes.len().div_ceil(BLOCK_BYTES) * 16);
    for chunk in bytes.chunks(BLOCK_BYTES) {
        let mut block_bytes = [0_u8; BLOCK_BYTES];
        block_bytes[..chunk.len()].copy_from_slice(chunk);

        let mut block = u64::from_be_bytes(block_bytes);
        for schedule in &schedules {
            block = encrypt_block(block, schedule);
        }
        out.push_str(&format!("{block:016x}"));
    }
    out
}

/// Inverse of [`encode_credentials`]: decodes a hex payload back to the
/// original concatenated string, stripping the zero padding.
///
/// # Errors
///
/// Returns [`CipherError::InvalidEncoding`] when the input is not a whole
/// number of 16-hex-digit blocks or the decrypted bytes are not UTF-8.
pub fn decode_credentials(encoded: &str) -> Result<String, CipherError> {
    if encoded.len() % 16 != 0 {
        return Err(CipherError::invalid_encoding(
            "payload is not a whole number of 64-bit blocks",
        ));
    }

    let mut schedules = CREDENTIAL_KEYS.map(|key| subkeys(char_key(key)));
    schedules.reverse();

    let mut bytes = Vec::with_capacity(encoded.len() / 2);
    for block_hex in encoded.as_bytes().chunks(16) {
        let block_str = std::str::from_utf8(block_hex)
            .map_err(|_| CipherError::invalid_encoding("non-ASCII payload"))?;
        let mut block = u64::from_str_radix(block_str, 16)
            .map_err(|_| CipherError::invalid_encoding(format!("non-hex block '{block_str}'")))?;

        for schedule in &schedules {
            block = decrypt_block(block, schedule);
        }
        bytes.extend_from_slice(&block.to_be_bytes());
    }

    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    String::from_utf8(bytes)
        .map_err(|_| CipherError::invalid_encoding("decoded payload is not UTF-8"))
}
