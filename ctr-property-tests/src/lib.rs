//! CTR Property-Based Tests
//!
//! Standalone test suite using proptest for the invariants of the byte
//! codec, signature verification, certainty scoring and record merging.
//!
//! # Usage
//!
//! ```bash
//! cargo test -p ctr-property-tests              # Run all property tests
//! cargo test -p ctr-property-tests codec        # Only codec properties
//! PROPTEST_CASES=1000 cargo test -p ctr-property-tests
//! ```
//!
//! # Test Modules
//!
//! - `codec`: write/read round-trip, width masking
//! - `crypto`: determinism, fail-closed decoding
//! - `certainty`: bounds for arbitrary check outcomes and parser inputs
//! - `bsm`: sequencing rules, counter monotonicity lowers certainty
//! - `merge`: collections concatenate in order, span widens, certainty is the minimum

// Re-export for convenience in tests
pub use ctr_adapter_vendors as vendors;
pub use ctr_core as ctr;
