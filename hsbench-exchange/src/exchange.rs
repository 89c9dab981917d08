use std::hint::black_box;

use hsbench_core::runner::Operation;
use hsbench_core::{Failure, Outcome};
use rand::rngs::StdRng;
use hkdf::Hkdf;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::profile::{Algorithm, Handshake, HybridConfig, Profile};

/// Probability that an injected failure hits a single iteration.
pub const FAILURE_PROBABILITY: f64 = 0.1;

const HYBRID_SALT: &[u8] = b"hsbench-hybrid";
const HYBRID_INFO: &[u8] = b"hsbench-hybrid-secret";

/// Deterministic, non-cryptographic stand-in for a key exchange.
///
/// Every attempt runs exactly one iteration of the profile's handshake, whatever the profile
/// requested.
#[derive(Debug, Clone)]
pub struct MockExchange {
    template: Handshake,
}

impl MockExchange {
    pub fn new(template: Handshake) -> Self {
        Self { template }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(profile.key_exchange.clone())
    }

    pub fn template(&self) -> &Handshake {
        &self.template
    }
}

impl Operation for MockExchange {
    type Input = Handshake;

    fn prepare(&self) -> Result<Handshake, Failure> {
        let handshake = Handshake {
            iterations: 1,
            ..self.template.clone()
        };
        handshake
            .validate()
            .map_err(|err| Failure::setup(err.to_string()))?;
        Ok(handshake)
    }

    fn execute(&self, input: Handshake) -> Outcome {
        run_handshake(&input)
    }
}

/// Runs every iteration of `handshake`; fails if any iteration was rejected.
pub fn run_handshake(handshake: &Handshake) -> Outcome {
    let mut rng = StdRng::seed_from_u64(handshake.seed);
    let mut rejected = 0u32;

    for index in 0..handshake.iterations {
        match &handshake.hybrid {
            None => {
                black_box(derive_secret(handshake.seed, index, handshake.algorithm));
            }
            Some(hybrid) => {
                black_box(derive_hybrid_secret(handshake.seed, index, hybrid)?);
            }
        }
        if handshake.failure_injection && rng.gen_bool(FAILURE_PROBABILITY) {
            rejected += 1;
        }
    }

    if rejected > 0 {
        return Err(Failure::rejected(format!(
            "{rejected} of {} iterations rejected",
            handshake.iterations
        )));
    }
    Ok(())
}

pub fn derive_secret(seed: u64, index: u32, algorithm: Algorithm) -> [u8; 32] {
    let mut digest = Sha256::new();
    digest.update(format!("{seed}:{index}:{}", algorithm.as_str()).as_bytes());
    digest.finalize().into()
}

fn derive_hybrid_secret(seed: u64, index: u32, hybrid: &HybridConfig) -> Result<Vec<u8>, Failure> {
    let mut ikm = Vec::with_capacity(32 * hybrid.algorithms.len());
    for algorithm in &hybrid.algorithms {
        ikm.extend_from_slice(&derive_secret(seed, index, *algorithm));
    }
    hkdf_sha256(&ikm, HYBRID_SALT, HYBRID_INFO, hybrid.output_len)
}

/// HKDF-SHA256 (RFC 5869) extract-then-expand of `ikm` into `len` bytes.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, Failure> {
    let mut okm = vec![0u8; len];
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(info, &mut okm)
        .map_err(|err| Failure::invocation(format!("hkdf expand to {len} bytes: {err}")))?;
    Ok(okm)
}
