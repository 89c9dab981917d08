use sha2::{Digest, Sha256};

/// Length of the hex digest prefix used as an error fingerprint.
pub const MSG_HASH_LEN: usize = 12;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum FailureKind {
    /// Building the per-attempt input failed. No latency is recorded.
    Setup,
    /// The operation returned an error.
    Invocation,
    /// The operation completed but reported an unsuccessful exchange.
    Rejected,
    /// The operation panicked.
    Panic,
    /// Harness orchestration failed outside of any attempt.
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Setup, message)
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Invocation, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }

    /// Converts a caught panic payload into a failure.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(FailureKind::Panic, message)
    }

    pub fn key(&self) -> ErrorKey {
        ErrorKey {
            kind: self.kind,
            msg_hash: msg_hash(&self.message),
        }
    }
}

/// Result of one invocation of the operation under test.
pub type Outcome = std::result::Result<(), Failure>;

/// Identity of an error class in the taxonomy. The raw message is never kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorKey {
    pub kind: FailureKind,
    pub msg_hash: String,
}

pub fn msg_hash(message: &str) -> String {
    let digest = Sha256::digest(message.as_bytes());
    let mut out = hex::encode(digest);
    out.truncate(MSG_HASH_LEN);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_hash_is_sha256_prefix() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb924...
        assert_eq!(msg_hash(""), "e3b0c44298fc");
        assert_eq!(msg_hash("boom").len(), MSG_HASH_LEN);
        assert_ne!(msg_hash("boom"), msg_hash("bang"));
    }

    #[test]
    fn kind_renders_variant_name() {
        assert_eq!(FailureKind::Invocation.to_string(), "Invocation");
        assert_eq!(FailureKind::Internal.as_str(), "Internal");
        assert_eq!("Panic".parse::<FailureKind>(), Ok(FailureKind::Panic));
    }

    #[test]
    fn panic_payloads_are_classified() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        let f = Failure::from_panic(boxed.as_ref());
        assert_eq!(f.kind, FailureKind::Panic);
        assert_eq!(f.message, "static message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(Failure::from_panic(boxed.as_ref()).message, "owned");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(
            Failure::from_panic(boxed.as_ref()).message,
            "non-string panic payload"
        );
    }

    #[test]
    fn key_hashes_message() {
        let f = Failure::invocation("socket closed");
        let key = f.key();
        assert_eq!(key.kind, FailureKind::Invocation);
        assert_eq!(key.msg_hash, msg_hash("socket closed"));
    }
}
