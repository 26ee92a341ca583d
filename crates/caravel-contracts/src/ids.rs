//! Opaque identifiers for the records the runtime touches.
//!
//! Every identifier is a UUIDv4 wrapped in its own newtype so a thread id can
//! never be passed where an action id is expected. All of them serialize as
//! the bare UUID string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Create a new, unique identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of a project, the top-level owner of threads and artifacts.
    ProjectId
);

define_id!(
    /// Identifier of a conversational thread inside a project.
    ThreadId
);

define_id!(
    /// Identifier of a single message posted to a thread.
    MessageId
);

define_id!(
    /// Identifier of a governed action. Assigned once at creation.
    ActionId
);

define_id!(
    /// Identifier of a stored artifact.
    ArtifactId
);
