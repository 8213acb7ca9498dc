//! Login challenges and challenge-response derivation.
//!
//! FRITZ!OS advertises the derivation scheme through the challenge format:
//! a `2$` prefix selects the iterated PBKDF2 scheme, anything else is the
//! legacy MD5 scheme kept for firmwares without PBKDF2 support.

use sha2::Sha256;

use crate::session::SessionError;

/// Challenge prefix that selects the PBKDF2 scheme.
const PBKDF2_PREFIX: &str = "2$";

/// Login state reported by the device before authentication.
#[derive(Debug, Clone)]
pub struct LoginState {
    /// Raw challenge text; its format selects the derivation scheme.
    pub challenge: String,
    /// Mandatory wait in seconds before the next login attempt is accepted.
    pub block_time: u64,
}

impl LoginState {
    /// Whether the device advertised the iterated PBKDF2 scheme.
    pub fn is_pbkdf2(&self) -> bool {
        self.challenge.starts_with(PBKDF2_PREFIX)
    }
}

/// A classified login challenge.
///
/// Produced by [`Challenge::parse`]; [`Challenge::respond`] computes the
/// response string that is submitted back to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// Two-round PBKDF2-HMAC-SHA256 challenge:
    /// `2$<iterations1>$<salt1>$<iterations2>$<salt2>` with hex-encoded salts.
    Pbkdf2 {
        iterations1: u32,
        salt1: Vec<u8>,
        iterations2: u32,
        salt2: Vec<u8>,
        /// Original hex text of `salt2`, echoed verbatim in the response.
        salt2_hex: String,
    },
    /// Legacy MD5 challenge, opaque text.
    Md5(String),
}

impl Challenge {
    /// Classify and parse a raw challenge string.
    ///
    /// A `2$` prefix makes the five-field PBKDF2 format mandatory; a
    /// malformed PBKDF2 challenge is an error, never a fallback to MD5.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        if raw.is_empty() {
            return Err(SessionError::ChallengeFormat("empty challenge".into()));
        }
        if !raw.starts_with(PBKDF2_PREFIX) {
            return Ok(Challenge::Md5(raw.to_string()));
        }

        let parts: Vec<&str> = raw.split('$').collect();
        if parts.len() != 5 {
            return Err(SessionError::ChallengeFormat(format!(
                "expected 5 '$'-separated fields, got {}",
                parts.len()
            )));
        }

        Ok(Challenge::Pbkdf2 {
            iterations1: parse_iterations(parts[1])?,
            salt1: parse_salt(parts[2])?,
            iterations2: parse_iterations(parts[3])?,
            salt2: parse_salt(parts[4])?,
            salt2_hex: parts[4].to_string(),
        })
    }

    /// Compute the response for this challenge with the given password.
    pub fn respond(&self, password: &str) -> String {
        match self {
            Challenge::Pbkdf2 {
                iterations1,
                salt1,
                iterations2,
                salt2,
                salt2_hex,
            } => {
                // Hash twice: once with the static salt, once with the
                // per-login salt.
                let mut hash1 = [0u8; 32];
                pbkdf2::pbkdf2_hmac::<Sha256>(
                    password.as_bytes(),
                    salt1,
                    *iterations1,
                    &mut hash1,
                );
                let mut hash2 = [0u8; 32];
                pbkdf2::pbkdf2_hmac::<Sha256>(&hash1, salt2, *iterations2, &mut hash2);
                format!("{salt2_hex}${}", hex::encode(hash2))
            }
            Challenge::Md5(challenge) => {
                // The legacy scheme hashes "<challenge>-<password>" encoded
                // as UTF-16LE, without a byte-order mark.
                let text = format!("{challenge}-{password}");
                let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
                format!("{challenge}-{:x}", md5::compute(bytes))
            }
        }
    }
}

fn parse_iterations(field: &str) -> Result<u32, SessionError> {
    field
        .parse()
        .map_err(|_| SessionError::ChallengeFormat(format!("invalid iteration count {field:?}")))
}

fn parse_salt(field: &str) -> Result<Vec<u8>, SessionError> {
    hex::decode(field)
        .map_err(|_| SessionError::ChallengeFormat(format!("invalid hex salt {field:?}")))
}
