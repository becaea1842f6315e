//! Character roster and the bounded selection a story is built from.

use crate::error::SelectionError;

pub const MAX_SELECTED: usize = 6;

pub const ROSTER: [&str; 10] = [
    "Dogwifhat",
    "Fred",
    "Giga Chad",
    "Kabosu the Shiba Inu",
    "Luce",
    "Maxwell the Tiktok Cat",
    "Moodeng",
    "Peanut the Squirrel",
    "Pesto",
    "Chill guy",
];

/// Resolve `name` against the roster, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<&'static str> {
    ROSTER
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(name.trim()))
}

/// Ordered selection of up to [`MAX_SELECTED`] roster characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterSelection {
    selected: Vec<&'static str>,
}

impl CharacterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from names, in order. Duplicates are ignored.
    pub fn from_names<I, S>(names: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selection = Self::new();
        for name in names {
            selection.select(name.as_ref())?;
        }
        Ok(selection)
    }

    pub fn is_selected(&self, name: &str) -> bool {
        lookup(name).map_or(false, |c| self.selected.contains(&c))
    }

    /// Whether `name` could be added right now.
    pub fn can_select(&self, name: &str) -> bool {
        self.is_selected(name) || self.selected.len() < MAX_SELECTED
    }

    pub fn select(&mut self, name: &str) -> Result<(), SelectionError> {
        let character =
            lookup(name).ok_or_else(|| SelectionError::UnknownCharacter(name.to_string()))?;
        if self.selected.contains(&character) {
            return Ok(());
        }
        if self.selected.len() >= MAX_SELECTED {
            return Err(SelectionError::LimitReached(MAX_SELECTED));
        }
        self.selected.push(character);
        Ok(())
    }

    pub fn deselect(&mut self, name: &str) {
        if let Some(character) = lookup(name) {
            self.selected.retain(|c| *c != character);
        }
    }

    /// Add `name` if absent, remove it if present. Returns whether it is
    /// selected afterwards.
    pub fn toggle(&mut self, name: &str) -> Result<bool, SelectionError> {
        if self.is_selected(name) {
            self.deselect(name);
            Ok(false)
        } else {
            self.select(name)?;
            Ok(true)
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.selected.iter().map(|c| c.to_string()).collect()
    }

    pub fn ensure_not_empty(&self) -> Result<(), SelectionError> {
        if self.is_empty() {
            Err(SelectionError::Empty)
        } else {
            Ok(())
        }
    }
}
