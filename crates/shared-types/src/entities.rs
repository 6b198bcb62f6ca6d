//! Core identifiers and numeric limits shared by every subsystem.

/// Identifier of a registered property (token class).
pub type PropertyId = u32;

/// Identifier of a single unique token within a property.
pub type TokenId = i64;

/// Token amount in base units (1e-8 of a divisible unit).
pub type Amount = i64;

/// Base-chain block height.
pub type BlockHeight = u64;

/// Base-58 address string as supplied by the host node.
///
/// The engine never decodes addresses; it only compares and sorts them, so
/// the opaque string form is authoritative.
pub type Address = String;

/// Base-chain transaction hash.
pub type TxHash = [u8; 32];

/// Base-chain block hash.
pub type BlockHash = [u8; 32];

/// The all-zero hash, used for unset watermarks and genesis parents.
pub const ZERO_HASH: [u8; 32] = [0u8; 32];

/// Genesis token of the main ecosystem (implied, never stored).
pub const PROPERTY_STR: PropertyId = 1;

/// Genesis token of the test ecosystem (implied, never stored).
pub const PROPERTY_TSTR: PropertyId = 2;

/// Base units per whole divisible token.
pub const COIN: Amount = 100_000_000;

/// Largest representable amount. Crowdsale issuance is clamped here.
pub const MAX_INT_8_BYTES: Amount = i64::MAX;

/// Blocks between full state snapshots.
pub const MAX_STATE_HISTORY: u64 = 50;

/// Maximum byte length of property string fields (name, url, ...).
pub const SP_STRING_FIELD_LEN: usize = 256;

/// Seconds per week, for early-bird bonus math.
pub const SECONDS_PER_WEEK: i64 = 604_800;
