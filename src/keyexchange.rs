//! # Key Exchange
//!
//! Diffie-Hellman key agreement between one client and the server. Each
//! connection runs the exchange once and derives its own shared secret with
//! the server; secrets are never shared across a pair.
//!
//! Public values travel as decimal ASCII lines, server's value first.
//!
//! ## SECURITY WARNING
//!
//! The default modulus is a 64-bit safe prime, adequate for development and
//! tests only. Production deployments must configure a safe prime of
//! hundreds of bits via [`DhParams::from_hex`]; the magnitude is a
//! deployment parameter, not a protocol detail.

use num_bigint::{BigUint, RandBigInt};

/// Hex digits of the default modulus, a 64-bit safe prime.
const DEFAULT_PRIME_HEX: &str = "FFFFFFFEFFFFEE37";

/// Default generator for the multiplicative group.
const DEFAULT_GENERATOR: u64 = 2;

/// Error type for key-exchange failures. Any of these fails the connection
/// attempt outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeError {
    /// The peer's public value was not a decimal integer.
    MalformedPeerValue,
    /// The configured prime or generator is unusable.
    InvalidParameters,
}

impl std::fmt::Display for KeyExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyExchangeError::MalformedPeerValue => {
                write!(f, "peer public value is not a decimal integer")
            }
            KeyExchangeError::InvalidParameters => {
                write!(f, "invalid Diffie-Hellman parameters")
            }
        }
    }
}

impl std::error::Error for KeyExchangeError {}

/// Group parameters for the exchange. Both endpoints of a deployment must
/// agree on these out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    pub prime: BigUint,
    pub generator: BigUint,
}

impl Default for DhParams {
    fn default() -> Self {
        Self {
            prime: BigUint::parse_bytes(DEFAULT_PRIME_HEX.as_bytes(), 16)
                .expect("default prime is valid hex"),
            generator: BigUint::from(DEFAULT_GENERATOR),
        }
    }
}

impl DhParams {
    /// Build parameters from a hex-encoded prime and a small generator.
    ///
    /// Rejects primes too small to hold any private exponent and the
    /// degenerate generators 0 and 1.
    pub fn from_hex(prime_hex: &str, generator: u64) -> Result<Self, KeyExchangeError> {
        let prime = BigUint::parse_bytes(prime_hex.as_bytes(), 16)
            .ok_or(KeyExchangeError::InvalidParameters)?;
        if prime < BigUint::from(5u8) || generator < 2 {
            return Err(KeyExchangeError::InvalidParameters);
        }
        Ok(Self {
            prime,
            generator: BigUint::from(generator),
        })
    }
}

/// One endpoint's ephemeral keypair for a single connection.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private: BigUint,
    pub public: BigUint,
}

/// Generate a keypair: private drawn uniformly from `[2, p-2]`,
/// `public = g^private mod p`.
pub fn generate_keypair(params: &DhParams) -> Keypair {
    let mut rng = rand::thread_rng();
    let low = BigUint::from(2u8);
    // gen_biguint_range is exclusive at the top, so p-1 yields [2, p-2].
    let high = &params.prime - 1u32;
    let private = rng.gen_biguint_range(&low, &high);
    let public = params.generator.modpow(&private, &params.prime);
    Keypair { private, public }
}

/// Derive the shared secret from our private value and the peer's public
/// value: `peer_public^private mod p`.
pub fn derive_shared(params: &DhParams, private: &BigUint, peer_public: &BigUint) -> BigUint {
    peer_public.modpow(private, &params.prime)
}

/// Parse a peer's public value off the wire (decimal ASCII).
pub fn parse_public(line: &str) -> Result<BigUint, KeyExchangeError> {
    line.trim()
        .parse::<BigUint>()
        .map_err(|_| KeyExchangeError::MalformedPeerValue)
}
