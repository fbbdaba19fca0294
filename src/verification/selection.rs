//! In-progress selection answers
//!
//! A subject works through a few categories before a code is issued. Answers
//! are held here between steps, merged one field at a time, and cleared on
//! verification or departure. There is no expiry: the caller owns the
//! lifetime.

use crate::platform::SubjectId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed selection categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pronoun,
    Continent,
    Age,
    Gaming,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Pronoun,
        Category::Continent,
        Category::Age,
        Category::Gaming,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Pronoun => "pronoun",
            Category::Continent => "continent",
            Category::Age => "age",
            Category::Gaming => "gaming",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown selection category '{}'", s))
    }
}

/// A subject's answers so far. Unanswered categories are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub pronoun: Option<String>,
    pub continent: Option<String>,
    pub age: Option<String>,
    pub gaming: Option<String>,
}

impl SelectionSnapshot {
    pub fn get(&self, category: Category) -> Option<&str> {
        self.slot(category).as_deref()
    }

    fn slot(&self, category: Category) -> &Option<String> {
        match category {
            Category::Pronoun => &self.pronoun,
            Category::Continent => &self.continent,
            Category::Age => &self.age,
            Category::Gaming => &self.gaming,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut Option<String> {
        match category {
            Category::Pronoun => &mut self.pronoun,
            Category::Continent => &mut self.continent,
            Category::Age => &mut self.age,
            Category::Gaming => &mut self.gaming,
        }
    }

    /// True once every category has an answer.
    pub fn is_complete(&self) -> bool {
        Category::ALL.iter().all(|c| self.slot(*c).is_some())
    }
}

/// Per-subject selection store.
#[derive(Debug, Default)]
pub struct SelectionState {
    selections: DashMap<SubjectId, SelectionSnapshot>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current answers, or an empty snapshot.
    pub fn get(&self, subject: &SubjectId) -> SelectionSnapshot {
        self.selections
            .get(subject)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Merge one answer and return the full snapshot.
    pub fn set(
        &self,
        subject: &SubjectId,
        category: Category,
        value: impl Into<String>,
    ) -> SelectionSnapshot {
        let mut entry = self.selections.entry(subject.clone()).or_default();
        *entry.slot_mut(category) = Some(value.into());
        entry.value().clone()
    }

    pub fn clear(&self, subject: &SubjectId) {
        self.selections.remove(subject);
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}
