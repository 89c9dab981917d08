use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hsbench_core::ReportHeader;
use serde::Deserialize;

pub const MAX_ITERATIONS: u32 = 10_000;
pub const MAX_SEED: u64 = u32::MAX as u64;
pub const HYBRID_OUTPUT_LEN: std::ops::RangeInclusive<usize> = 16..=64;

/// The only provider this build knows how to drive.
pub const MOCK_PROVIDER: &str = "mock";

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid profile: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    MockEcdh,
    MockPqcKem,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SeedMode {
    Deterministic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    Single,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HybridConfig {
    pub algorithms: Vec<Algorithm>,
    pub output_len: usize,
}

/// One key exchange as described by a profile. Also the per-attempt input of the mock exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Handshake {
    pub algorithm: Algorithm,
    pub iterations: u32,
    pub seed_mode: SeedMode,
    pub seed: u64,
    pub failure_injection: bool,
    #[serde(default)]
    pub hybrid: Option<HybridConfig>,
}

impl Handshake {
    pub fn mode(&self) -> Mode {
        if self.hybrid.is_some() {
            Mode::Hybrid
        } else {
            Mode::Single
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ITERATIONS).contains(&self.iterations) {
            return Err(invalid(format!(
                "key_exchange.iterations must be between 1 and {MAX_ITERATIONS}, got {}",
                self.iterations
            )));
        }
        if self.seed > MAX_SEED {
            return Err(invalid(format!(
                "key_exchange.seed must be between 0 and {MAX_SEED}, got {}",
                self.seed
            )));
        }
        if let Some(hybrid) = &self.hybrid {
            let [a, b] = hybrid.algorithms.as_slice() else {
                return Err(invalid(format!(
                    "key_exchange.hybrid.algorithms must list exactly 2 algorithms, got {}",
                    hybrid.algorithms.len()
                )));
            };
            if a == b {
                return Err(invalid(format!(
                    "key_exchange.hybrid.algorithms must be distinct, got {a} twice"
                )));
            }
            if !HYBRID_OUTPUT_LEN.contains(&hybrid.output_len) {
                return Err(invalid(format!(
                    "key_exchange.hybrid.output_len must be between {} and {}, got {}",
                    HYBRID_OUTPUT_LEN.start(),
                    HYBRID_OUTPUT_LEN.end(),
                    hybrid.output_len
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileYaml {
    name: String,
    #[serde(default)]
    provider: Option<String>,
    key_exchange: Handshake,
    #[serde(default)]
    metadata: Option<BTreeMap<String, MetadataValue>>,
}

/// A validated benchmark profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub provider: String,
    pub key_exchange: Handshake,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let doc: ProfileYaml = serde_yaml::from_str(raw)?;

        let name = doc.name.trim();
        if name.is_empty() {
            return Err(invalid("name must be a non-empty string"));
        }

        let provider = match doc.provider.as_deref().map(str::trim) {
            None => MOCK_PROVIDER.to_string(),
            Some(MOCK_PROVIDER) => MOCK_PROVIDER.to_string(),
            Some(other) => {
                return Err(invalid(format!(
                    "provider must be '{MOCK_PROVIDER}' if set, got '{other}'"
                )));
            }
        };

        doc.key_exchange.validate()?;

        Ok(Self {
            name: doc.name,
            provider,
            key_exchange: doc.key_exchange,
            metadata: doc.metadata.unwrap_or_default(),
        })
    }

    pub fn mode(&self) -> Mode {
        self.key_exchange.mode()
    }

    pub fn report_header(&self, path: &Path) -> ReportHeader {
        ReportHeader {
            profile_path: path.display().to_string(),
            profile_name: self.name.clone(),
            provider: self.provider.clone(),
            mode: self.mode().to_string(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> ProfileError {
    ProfileError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: mock-ecdh
key_exchange:
  algorithm: mock_ecdh
  iterations: 5
  seed_mode: deterministic
  seed: 42
  failure_injection: false
"#;

    fn parse_err(raw: &str) -> String {
        match Profile::parse(raw) {
            Ok(p) => panic!("expected error, got {p:?}"),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn parses_minimal_profile() {
        let p = Profile::parse(MINIMAL).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(p.name, "mock-ecdh");
        assert_eq!(p.provider, "mock");
        assert_eq!(p.key_exchange.algorithm, Algorithm::MockEcdh);
        assert_eq!(p.key_exchange.iterations, 5);
        assert_eq!(p.key_exchange.seed, 42);
        assert_eq!(p.mode(), Mode::Single);
        assert!(p.metadata.is_empty());
    }

    #[test]
    fn parses_hybrid_and_metadata() {
        let raw = r#"
name: hybrid
provider: mock
key_exchange:
  algorithm: mock_ecdh
  iterations: 1
  seed_mode: deterministic
  seed: 7
  failure_injection: true
  hybrid:
    algorithms: [mock_ecdh, mock_pqc_kem]
    output_len: 32
metadata:
  owner: lab
  tier: 2
  nightly: true
"#;
        let p = Profile::parse(raw).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(p.mode(), Mode::Hybrid);
        assert_eq!(p.mode().to_string(), "hybrid");
        assert_eq!(
            p.metadata.get("owner"),
            Some(&MetadataValue::Str("lab".to_string()))
        );
        assert_eq!(p.metadata.get("tier"), Some(&MetadataValue::Int(2)));
        assert_eq!(p.metadata.get("nightly"), Some(&MetadataValue::Bool(true)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = format!("{MINIMAL}extra: 1\n");
        assert!(parse_err(&raw).contains("unknown field"));
    }

    #[test]
    fn rejects_missing_fields() {
        let raw = "name: x\nkey_exchange:\n  algorithm: mock_ecdh\n";
        assert!(parse_err(raw).contains("missing field"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_err(&MINIMAL.replace("iterations: 5", "iterations: 0")).contains("iterations"));
        assert!(
            parse_err(&MINIMAL.replace("iterations: 5", "iterations: 10001")).contains("iterations")
        );
        assert!(parse_err(&MINIMAL.replace("seed: 42", "seed: 4294967296")).contains("seed"));
        assert!(parse_err(&MINIMAL.replace("mock_ecdh", "x25519")).contains("unknown variant"));
        assert!(
            parse_err(&MINIMAL.replace("deterministic", "random")).contains("unknown variant")
        );
    }

    #[test]
    fn rejects_other_providers_and_blank_names() {
        let raw = MINIMAL.replace("name: mock-ecdh", "name: mock-ecdh\nprovider: liboqs");
        assert!(parse_err(&raw).contains("provider"));

        let raw = MINIMAL.replace("name: mock-ecdh", "name: \"  \"");
        assert!(parse_err(&raw).contains("name"));
    }

    #[test]
    fn rejects_bad_hybrid() {
        let base = format!("{MINIMAL}  hybrid:\n");
        let same = format!("{base}    algorithms: [mock_ecdh, mock_ecdh]\n    output_len: 32\n");
        assert!(parse_err(&same).contains("distinct"));

        let one = format!("{base}    algorithms: [mock_ecdh]\n    output_len: 32\n");
        assert!(parse_err(&one).contains("exactly 2"));

        let long = format!("{base}    algorithms: [mock_ecdh, mock_pqc_kem]\n    output_len: 65\n");
        assert!(parse_err(&long).contains("output_len"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e:#}"));
        let path = dir.path().join("absent.yaml");
        match Profile::load(&path) {
            Err(ProfileError::Read { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn report_header_carries_profile_identity() {
        let p = Profile::parse(MINIMAL).unwrap_or_else(|e| panic!("{e:#}"));
        let header = p.report_header(Path::new("profiles/mock.yaml"));
        assert_eq!(header.profile_path, "profiles/mock.yaml");
        assert_eq!(header.profile_name, "mock-ecdh");
        assert_eq!(header.provider, "mock");
        assert_eq!(header.mode, "single");
    }
}
