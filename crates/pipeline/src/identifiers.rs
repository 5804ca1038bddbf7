//! Newtype domain identifiers.
//!
//! Every entity that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging (for
//! example) a [`SpecId`] with an [`ArtifactId`] even though both are UUIDs
//! under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for UUID-wrapped newtypes (internally generated identities).
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies a single pipeline run (one invocation of `Flywheel::run`).
    ///
    /// Generated fresh for every run; propagated through spans and progress
    /// markers so all activity from a single run can be correlated.
    RunId
}

uuid_id! {
    /// Identifies a [`crate::TechSpec`] produced by the plan stage.
    SpecId
}

uuid_id! {
    /// Identifies a [`crate::CodeArtifact`] or [`crate::PolishedArtifact`].
    ArtifactId
}

uuid_id! {
    /// Identifies an [`crate::AuditReport`].
    AuditId
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Names a knowledge partition (e.g. `"adr"`, `"golden"`, `"findings"`).
    ///
    /// Partitions are the unit of retrieval fan-out: a stage queries every
    /// partition listed in its role definition concurrently.
    PartitionName
}

string_id! {
    /// Stable identifier of a retrieved knowledge snippet.
    ///
    /// Used to de-duplicate results when the same document is returned from
    /// more than one partition.
    SnippetId
}
