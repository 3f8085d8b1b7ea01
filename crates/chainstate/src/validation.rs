//! Structured validation outcomes for block-level checks.

/// How bad a validation failure is, which decides what the peer logic does
/// with the block and its source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockValidationResult {
    /// Consensus-invalid; the block is rejected outright.
    InvalidConsensus,
    /// The header itself is unacceptable.
    InvalidHeader,
    /// Not provably wrong yet: the check may succeed once headers/blocks
    /// catch up. Callers defer instead of punishing.
    HeaderSync,
}

/// A validation failure with its reject tag; the checker never unwinds, it
/// returns one of these.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationFailure {
    pub result: BlockValidationResult,
    pub reject_reason: &'static str,
    pub debug_message: String,
}

impl ValidationFailure {
    pub fn new(
        result: BlockValidationResult,
        reject_reason: &'static str,
        debug_message: impl Into<String>,
    ) -> Self {
        Self {
            result,
            reject_reason,
            debug_message: debug_message.into(),
        }
    }

    /// Soft failures may clear up after sync; everything else is final.
    pub fn is_transient(&self) -> bool {
        self.result == BlockValidationResult::HeaderSync
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reject_reason, self.debug_message)
    }
}

impl std::error::Error for ValidationFailure {}
