use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Names that always refer to the implicit main line and can never be used
/// for a real branch.
pub const RESERVED_BRANCH_NAMES: [&str; 2] = ["main", "latest"];

/// Reference to a branch as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum BranchRef {
    /// The implicit main line (stored as a NULL branch id).
    #[default]
    Main,
    Explicit(String),
}

impl BranchRef {
    /// Parses a caller-supplied reference. Empty strings and the reserved
    /// names resolve to main, anything else is treated as a branch id.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || is_reserved_branch_name(raw) {
            BranchRef::Main
        } else {
            BranchRef::Explicit(raw.to_string())
        }
    }

    #[must_use]
    pub fn from_option(id: Option<&str>) -> Self {
        id.map(Self::parse).unwrap_or_default()
    }

    #[must_use]
    pub fn is_main(&self) -> bool {
        matches!(self, BranchRef::Main)
    }

    /// Storage representation: `None` for main.
    #[must_use]
    pub fn branch_id(&self) -> Option<&str> {
        match self {
            BranchRef::Main => None,
            BranchRef::Explicit(id) => Some(id),
        }
    }
}

impl From<Option<String>> for BranchRef {
    fn from(id: Option<String>) -> Self {
        match id {
            Some(id) => BranchRef::Explicit(id),
            None => BranchRef::Main,
        }
    }
}

#[must_use]
pub fn is_reserved_branch_name(name: &str) -> bool {
    RESERVED_BRANCH_NAMES.contains(&name)
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchRef::Main => f.write_str("main"),
            BranchRef::Explicit(id) => f.write_str(id),
        }
    }
}

impl Serialize for BranchRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BranchRef::Main => serializer.serialize_none(),
            BranchRef::Explicit(id) => serializer.serialize_some(id),
        }
    }
}

impl<'de> Deserialize<'de> for BranchRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(BranchRef::from_option(raw.as_deref()))
    }
}
