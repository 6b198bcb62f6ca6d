//! Ecosystem partitioning of the property id space.
//!
//! Property ids form two disjoint spaces: the main ecosystem starting at 3
//! (1 and 2 are the genesis tokens) and the test ecosystem starting at
//! `0x8000_0003`. A property belongs to the test ecosystem iff its high bit
//! is set. Orders may only pair properties within one ecosystem.

use crate::entities::PropertyId;
use serde::{Deserialize, Serialize};

/// First allocatable property id of the main ecosystem.
pub const FIRST_MAIN_PROPERTY: PropertyId = 3;

/// First allocatable property id of the test ecosystem.
pub const FIRST_TEST_PROPERTY: PropertyId = 0x8000_0003;

/// Any id at or above this boundary is a test-ecosystem property.
pub const TEST_ECO_BOUNDARY: PropertyId = 0x8000_0000;

/// One of the two disjoint property-id spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    Main,
    Test,
}

impl Ecosystem {
    /// The ecosystem a property id belongs to.
    pub fn of(property: PropertyId) -> Self {
        if property >= TEST_ECO_BOUNDARY {
            Ecosystem::Test
        } else {
            Ecosystem::Main
        }
    }

    /// The first allocatable id of this ecosystem.
    pub fn first_property(self) -> PropertyId {
        match self {
            Ecosystem::Main => FIRST_MAIN_PROPERTY,
            Ecosystem::Test => FIRST_TEST_PROPERTY,
        }
    }
}

/// Whether the property id lies in the test ecosystem.
pub fn is_test_ecosystem_property(property: PropertyId) -> bool {
    property >= TEST_ECO_BOUNDARY
}

/// Whether the property id lies in the main ecosystem (zero excluded).
pub fn is_main_ecosystem_property(property: PropertyId) -> bool {
    property > 0 && property < TEST_ECO_BOUNDARY
}

/// Whether two properties may legally pair on a market.
pub fn same_ecosystem(a: PropertyId, b: PropertyId) -> bool {
    Ecosystem::of(a) == Ecosystem::of(b)
}
