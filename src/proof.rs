// Signed proof chain layered over ledger events, and the resonance weights
// carried in proof metadata.

pub mod chain;
pub mod resonance;

pub use chain::{ImmutableProof, ProofBatch, ProofChain, ProofMetadata, GENESIS_PROOF_HASH};
pub use resonance::{ResonanceConfig, ResonanceContext, ResonanceMetadata, ResonanceTracker, ResonanceWeight};
