use std::fmt;
use std::num::NonZeroU32;

use hmac::{Hmac, Mac};
use ring::digest as ring_digest;
use ring::hmac as ring_hmac;
use ring::pbkdf2 as ring_pbkdf2;
use sha3::{Digest, Sha3_512};

use crate::model::ScramBlock;

/// The hash functions SCRAM is offered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScramHash {
    Sha1,
    Sha256,
    Sha512,
    Sha3_512,
}

impl ScramHash {
    /// Every supported hash, strongest last.
    pub const ALL: [ScramHash; 4] = [
        ScramHash::Sha1,
        ScramHash::Sha256,
        ScramHash::Sha512,
        ScramHash::Sha3_512,
    ];

    /// The SASL mechanism name without the `-PLUS` suffix.
    pub fn mechanism(self) -> &'static str {
        match self {
            ScramHash::Sha1 => "SCRAM-SHA-1",
            ScramHash::Sha256 => "SCRAM-SHA-256",
            ScramHash::Sha512 => "SCRAM-SHA-512",
            ScramHash::Sha3_512 => "SCRAM-SHA3-512",
        }
    }

    /// The `-PLUS` variant of the mechanism name, used when channel binding is active.
    pub fn plus_mechanism(self) -> &'static str {
        match self {
            ScramHash::Sha1 => "SCRAM-SHA-1-PLUS",
            ScramHash::Sha256 => "SCRAM-SHA-256-PLUS",
            ScramHash::Sha512 => "SCRAM-SHA-512-PLUS",
            ScramHash::Sha3_512 => "SCRAM-SHA3-512-PLUS",
        }
    }

    /// Length of the PBKDF2 output stored for this hash.
    ///
    /// SHA3-512 records use SHA-512's digest size. Both are 64 bytes, but the stored length is
    /// pinned to SHA-512 so existing records keep verifying.
    pub fn key_len(self) -> usize {
        match self {
            ScramHash::Sha1 => ring_digest::SHA1_OUTPUT_LEN,
            ScramHash::Sha256 => ring_digest::SHA256_OUTPUT_LEN,
            ScramHash::Sha512 | ScramHash::Sha3_512 => ring_digest::SHA512_OUTPUT_LEN,
        }
    }

    /// Returns the base64url digest stored for this hash.
    pub fn stored_digest(self, scram: &ScramBlock) -> &str {
        match self {
            ScramHash::Sha1 => &scram.sha1,
            ScramHash::Sha256 => &scram.sha256,
            ScramHash::Sha512 => &scram.sha512,
            ScramHash::Sha3_512 => &scram.sha3_512,
        }
    }

    fn ring_hmac(self) -> Option<ring_hmac::Algorithm> {
        match self {
            ScramHash::Sha1 => Some(ring_hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY),
            ScramHash::Sha256 => Some(ring_hmac::HMAC_SHA256),
            ScramHash::Sha512 => Some(ring_hmac::HMAC_SHA512),
            ScramHash::Sha3_512 => None,
        }
    }

    fn ring_pbkdf2(self) -> Option<ring_pbkdf2::Algorithm> {
        match self {
            ScramHash::Sha1 => Some(ring_pbkdf2::PBKDF2_HMAC_SHA1),
            ScramHash::Sha256 => Some(ring_pbkdf2::PBKDF2_HMAC_SHA256),
            ScramHash::Sha512 => Some(ring_pbkdf2::PBKDF2_HMAC_SHA512),
            ScramHash::Sha3_512 => None,
        }
    }

    fn ring_digest(self) -> Option<&'static ring_digest::Algorithm> {
        match self {
            ScramHash::Sha1 => Some(&ring_digest::SHA1_FOR_LEGACY_USE_ONLY),
            ScramHash::Sha256 => Some(&ring_digest::SHA256),
            ScramHash::Sha512 => Some(&ring_digest::SHA512),
            ScramHash::Sha3_512 => None,
        }
    }
}

impl fmt::Display for ScramHash {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.mechanism())
    }
}

/// Hashes a password with the given salt and number of iterations. The vault stores the result
/// and clients derive the same value from the salt and iteration count the server announces.
pub fn hash_password(
    hash: ScramHash,
    password: &[u8],
    salt: &[u8],
    iterations: NonZeroU32,
) -> Vec<u8> {
    let mut salted_password = vec![0u8; hash.key_len()];
    match hash.ring_pbkdf2() {
        Some(algorithm) => {
            ring_pbkdf2::derive(algorithm, iterations, salt, password, &mut salted_password)
        }
        None => {
            pbkdf2::pbkdf2_hmac::<Sha3_512>(password, salt, iterations.get(), &mut salted_password)
        }
    }
    salted_password
}

/// HMAC over the concatenation of `parts`.
pub fn hmac(hash: ScramHash, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    match hash.ring_hmac() {
        Some(algorithm) => {
            let key = ring_hmac::Key::new(algorithm, key);
            let mut context = ring_hmac::Context::with_key(&key);
            for part in parts {
                context.update(part);
            }
            context.sign().as_ref().to_vec()
        }
        None => {
            let mut mac = <Hmac<Sha3_512> as Mac>::new_from_slice(key)
                .expect("HMAC accepts keys of any length");
            for part in parts {
                Mac::update(&mut mac, part);
            }
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Plain digest of `data`.
pub fn digest(hash: ScramHash, data: &[u8]) -> Vec<u8> {
    match hash.ring_digest() {
        Some(algorithm) => ring_digest::digest(algorithm, data).as_ref().to_vec(),
        None => Sha3_512::digest(data).to_vec(),
    }
}

/// Finds the client proof and server signature based on the salted password and the three
/// messages making up the SCRAM auth message.
pub fn find_proofs(
    hash: ScramHash,
    client_first_bare: &str,
    server_first: &str,
    client_final_without_proof: &str,
    salted_password: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let auth_message = [
        client_first_bare.as_bytes(),
        b",",
        server_first.as_bytes(),
        b",",
        client_final_without_proof.as_bytes(),
    ];

    let client_key = hmac(hash, salted_password, &[&b"Client Key"[..]]);
    let server_key = hmac(hash, salted_password, &[&b"Server Key"[..]]);
    let stored_key = digest(hash, &client_key);
    let client_signature = hmac(hash, &stored_key, &auth_message);
    let server_signature = hmac(hash, &server_key, &auth_message);

    let client_proof = client_key
        .iter()
        .zip(client_signature.iter())
        .map(|(k, s)| k ^ s)
        .collect();
    (client_proof, server_signature)
}

/// Compares two byte strings without short-circuiting on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
