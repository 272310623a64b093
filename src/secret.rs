//! Opaque secrets for the browser flow: random strings, PKCE pairs and CSRF state.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Largest multiple of the alphabet size that fits in a byte. Bytes at or above it are
// rejected so every symbol is equally likely.
const REJECTION_BOUND: u8 = 248;

const CSRF_STATE_LENGTH: usize = 32;
const PKCE_VERIFIER_LENGTH: usize = 96;

/// The operating system's randomness source could not supply bytes.
#[derive(Debug, thiserror::Error)]
#[error("secure randomness source unavailable: {0}")]
pub struct EntropyUnavailable(String);

/// Generate a string of exactly `length` alphanumeric characters from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`EntropyUnavailable`] if the OS randomness source fails. There is no fallback to a
/// weaker generator.
pub fn generate(length: usize) -> Result<String, EntropyUnavailable> {
    let mut output = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while output.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|error| EntropyUnavailable(error.to_string()))?;
        output.extend(
            buf.iter()
                .filter(|byte| **byte < REJECTION_BOUND)
                .map(|byte| char::from(ALPHABET[usize::from(*byte) % ALPHABET.len()]))
                .take(length - output.len()),
        );
    }

    Ok(output)
}

/// A PKCE verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// The only challenge method this crate produces.
    pub const METHOD: &'static str = "S256";

    /// Generate a fresh 96 character verifier and its challenge.
    ///
    /// # Errors
    ///
    /// Fails if the OS randomness source is unavailable.
    pub fn generate() -> Result<Self, EntropyUnavailable> {
        generate(PKCE_VERIFIER_LENGTH).map(Self::from_verifier)
    }

    /// Derive the challenge for a known verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    /// The secret verifier, sent only with the code exchange.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// `base64url_nopad(sha256(verifier))`, sent with the authorization redirect.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

/// Anti-CSRF `state` value echoed back by the provider on the callback.
#[derive(Clone)]
pub struct CsrfState(String);

impl CsrfState {
    /// Generate a fresh 32 character state value.
    ///
    /// # Errors
    ///
    /// Fails if the OS randomness source is unavailable.
    pub fn generate() -> Result<Self, EntropyUnavailable> {
        generate(CSRF_STATE_LENGTH).map(Self)
    }

    /// The value to place in the authorization URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact, constant-time comparison against the state received on the callback.
    #[must_use]
    pub fn matches(&self, received: &str) -> bool {
        self.0.as_bytes().ct_eq(received.as_bytes()).into()
    }
}

impl fmt::Debug for CsrfState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CsrfState").field(&"<redacted>").finish()
    }
}
