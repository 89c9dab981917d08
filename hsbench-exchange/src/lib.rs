//! Profiles and the mock key exchange driven by the hsbench harness.

mod exchange;
mod profile;

pub use exchange::{FAILURE_PROBABILITY, MockExchange, derive_secret, hkdf_sha256, run_handshake};
pub use profile::{
    Algorithm, HYBRID_OUTPUT_LEN, Handshake, HybridConfig, MAX_ITERATIONS, MAX_SEED, MOCK_PROVIDER,
    MetadataValue, Mode, Profile, ProfileError, Result, SeedMode,
};
