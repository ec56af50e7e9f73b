//! Identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Stable id of a spawned entity (construct) in the world.
    EntityId(u64)
);
id_type!(
    /// Id of an element (part) inside an entity, e.g. its core unit.
    ElementId(u64)
);
id_type!(
    /// Owning faction of regions and spawned entities.
    FactionId(i64)
);
id_type!(
    /// Territory a faction may be bound to.
    TerritoryId(u64)
);
id_type!(
    /// Player (pilot) id.
    PlayerId(u64)
);
