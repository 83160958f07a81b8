use serde::{Deserialize, Serialize};

/// One of the three dependent lists, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Country,
    State,
    City,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Country, Level::State, Level::City];

    /// Cache table holding this level's rows.
    pub fn table(&self) -> &'static str {
        match self {
            Level::Country => "countries",
            Level::State => "states",
            Level::City => "cities",
        }
    }

    pub fn parent(&self) -> Option<Level> {
        match self {
            Level::Country => None,
            Level::State => Some(Level::Country),
            Level::City => Some(Level::State),
        }
    }

    pub fn child(&self) -> Option<Level> {
        match self {
            Level::Country => Some(Level::State),
            Level::State => Some(Level::City),
            Level::City => None,
        }
    }

    /// Every level below this one, nearest first.
    pub fn descendants(&self) -> impl Iterator<Item = Level> {
        std::iter::successors(self.child(), |level| level.child())
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_name(name: &str) -> Option<Level> {
        match name.to_ascii_lowercase().as_str() {
            "country" | "countries" => Some(Level::Country),
            "state" | "states" => Some(Level::State),
            "city" | "cities" => Some(Level::City),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Level::Country => "country",
            Level::State => "state",
            Level::City => "city",
        };
        f.write_str(name)
    }
}
