//! TigerStyle Constants
//!
//! Every limit in the crate is named here, with units in the name.

// =============================================================================
// Records
// =============================================================================

/// Primary-key attribute used when a model does not name its own.
pub const PRIMARY_NAME_DEFAULT: &str = "_id";

/// Reserved record attribute holding the inverse side of relationships.
pub const BACKREFS_ATTRIBUTE: &str = "__backrefs";

// =============================================================================
// Key Generation
// =============================================================================

/// Alphabet for generated keys (no `0`, `1`, `l`, `o`).
pub const KEYGEN_ALPHABET: &str = "23456789abcdefghijkmnpqrstuvwxyz";

/// Default number of characters in a generated key.
pub const KEYGEN_LENGTH_DEFAULT: usize = 5;

/// Generated keys draw distinct characters, so length is bounded by the alphabet.
pub const KEYGEN_LENGTH_MAX: usize = 32;

/// Default cap on insert attempts with generated keys.
pub const KEYGEN_ATTEMPTS_MAX_DEFAULT: u32 = 100;

// =============================================================================
// Result Sets
// =============================================================================

/// Records fetched per round trip while streaming a result set.
pub const RESULT_SET_BATCH_SIZE_DEFAULT: u64 = 100;

/// Upper bound on the batch size.
pub const RESULT_SET_BATCH_SIZE_MAX: u64 = 10_000;

// =============================================================================
// Query Translation
// =============================================================================

/// Operator prefix in document-store filters.
pub const DOCUMENT_OPERATOR_PREFIX: &str = "$";

/// Marker prefix on a sort key requesting descending order.
pub const SORT_DESCENDING_PREFIX: char = '-';

// =============================================================================
// Simulation
// =============================================================================

/// Environment variable holding the simulation seed.
pub const DST_SEED_ENV: &str = "DST_SEED";

// Compile-time sanity checks
const _: () = {
    assert!(KEYGEN_LENGTH_DEFAULT > 0);
    assert!(KEYGEN_LENGTH_DEFAULT <= KEYGEN_LENGTH_MAX);
    assert!(KEYGEN_LENGTH_MAX == KEYGEN_ALPHABET.len());
    assert!(RESULT_SET_BATCH_SIZE_DEFAULT <= RESULT_SET_BATCH_SIZE_MAX);
};
