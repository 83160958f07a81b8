use serde::{Deserialize, Serialize};

/// Identifier type shared by countries, states and cities.
pub type PlaceId = i64;

/// Selected-id value meaning "nothing selected".
///
/// Never a valid place id; top-level rows are also stamped with it as their
/// parent.
pub const NO_SELECTION: PlaceId = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    /// Absent in remote payloads; stamped when the row is cached.
    #[serde(rename = "parentId", default = "no_parent")]
    pub parent_id: PlaceId,
    pub name: String,
}

fn no_parent() -> PlaceId {
    NO_SELECTION
}

impl Place {
    pub fn new(id: PlaceId, parent_id: PlaceId, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
        }
    }

    /// Copy of this place re-parented under `parent_id`.
    pub fn stamped(&self, parent_id: PlaceId) -> Self {
        Self {
            parent_id,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
