//! Port traits of the storage subsystem.

mod outbound;

pub use outbound::{BatchOperation, KeyValueStore};
