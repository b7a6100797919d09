//! Scheme-prefixed password hashing and verification (spec §4.13).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::{Rng, RngCore};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

const MIN_SALT_LEN: usize = 8;

/// Characters for a server-generated password (spec §4.10's PasswordModify
/// fallback when `newPasswd` is absent). Excludes visually-confusable
/// characters (`0`/`O`, `1`/`l`/`I`) since a generated password is read
/// back to a human over a response value.
const GENERATED_PASSWORD_CHARS: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// A fresh, cryptographically random password (spec §9: never
/// deterministic, same as salt generation above).
pub fn generate(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| GENERATED_PASSWORD_CHARS[rng.gen_range(0..GENERATED_PASSWORD_CHARS.len())] as char)
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Cleartext,
    Sha,
    Sha256,
    Sha512,
    Ssha,
    Ssha256,
    Ssha512,
}

impl Scheme {
    fn prefix(self) -> &'static str {
        match self {
            Scheme::Cleartext => "{CLEARTEXT}",
            Scheme::Sha => "{SHA}",
            Scheme::Sha256 => "{SHA256}",
            Scheme::Sha512 => "{SHA512}",
            Scheme::Ssha => "{SSHA}",
            Scheme::Ssha256 => "{SSHA256}",
            Scheme::Ssha512 => "{SSHA512}",
        }
    }

    fn is_salted(self) -> bool {
        matches!(self, Scheme::Ssha | Scheme::Ssha256 | Scheme::Ssha512)
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Scheme::Cleartext => data.to_vec(),
            Scheme::Sha | Scheme::Ssha => Sha1::digest(data).to_vec(),
            Scheme::Sha256 | Scheme::Ssha256 => Sha256::digest(data).to_vec(),
            Scheme::Sha512 | Scheme::Ssha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn from_prefix(s: &str) -> Option<(Scheme, &str)> {
        for scheme in [
            Scheme::Cleartext,
            Scheme::Ssha512,
            Scheme::Ssha256,
            Scheme::Ssha,
            Scheme::Sha512,
            Scheme::Sha256,
            Scheme::Sha,
        ] {
            if let Some(rest) = s.strip_prefix(scheme.prefix()) {
                return Some((scheme, rest));
            }
        }
        None
    }
}

/// Hash `password` using `scheme`. Salt, when the scheme is salted, is
/// generated from `rand`'s thread-local CSPRNG (spec §9's resolved open
/// question: every new hash uses a cryptographically secure random salt of
/// at least [`MIN_SALT_LEN`] bytes — a deterministic salt, as some legacy
/// code paths used, is a defect).
pub fn hash(password: &str, scheme: Scheme) -> String {
    if scheme.is_salted() {
        let mut salt = vec![0u8; MIN_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut data = password.as_bytes().to_vec();
        data.extend_from_slice(&salt);
        let mut digest = scheme.digest(&data);
        digest.extend_from_slice(&salt);
        format!("{}{}", scheme.prefix(), BASE64.encode(digest))
    } else if scheme == Scheme::Cleartext {
        format!("{}{}", scheme.prefix(), password)
    } else {
        let digest = scheme.digest(password.as_bytes());
        format!("{}{}", scheme.prefix(), BASE64.encode(digest))
    }
}

/// Verify `candidate` against a stored, scheme-prefixed hash. All byte
/// comparisons are constant-time (spec §4.13); no prefix is treated as
/// legacy cleartext.
pub fn verify(stored: &str, candidate: &str) -> bool {
    let Some((scheme, encoded)) = Scheme::from_prefix(stored) else {
        return bool::from(stored.as_bytes().ct_eq(candidate.as_bytes()));
    };
    if scheme == Scheme::Cleartext {
        return bool::from(encoded.as_bytes().ct_eq(candidate.as_bytes()));
    }
    let Ok(raw) = BASE64.decode(encoded) else {
        return false;
    };
    let digest_len = match scheme {
        Scheme::Sha | Scheme::Ssha => 20,
        Scheme::Sha256 | Scheme::Ssha256 => 32,
        Scheme::Sha512 | Scheme::Ssha512 => 64,
        Scheme::Cleartext => unreachable!(),
    };
    if scheme.is_salted() {
        if raw.len() <= digest_len {
            return false;
        }
        let (digest, salt) = raw.split_at(digest_len);
        let mut data = candidate.as_bytes().to_vec();
        data.extend_from_slice(salt);
        let computed = scheme.digest(&data);
        bool::from(computed.ct_eq(digest))
    } else {
        let computed = scheme.digest(candidate.as_bytes());
        bool::from(computed.ct_eq(&raw))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_every_scheme() {
        for scheme in [
            Scheme::Cleartext,
            Scheme::Sha,
            Scheme::Sha256,
            Scheme::Sha512,
            Scheme::Ssha,
            Scheme::Ssha256,
            Scheme::Ssha512,
        ] {
            let stored = hash("hunter2", scheme);
            assert!(verify(&stored, "hunter2"), "{scheme:?} failed to verify");
            assert!(!verify(&stored, "wrong"), "{scheme:?} accepted wrong password");
        }
    }

    #[test]
    fn salted_hashes_differ_each_time() {
        let a = hash("hunter2", Scheme::Ssha256);
        let b = hash("hunter2", Scheme::Ssha256);
        assert_ne!(a, b);
    }

    #[test]
    fn unprefixed_is_legacy_cleartext() {
        assert!(verify("hunter2", "hunter2"));
        assert!(!verify("hunter2", "wrong"));
    }
}
