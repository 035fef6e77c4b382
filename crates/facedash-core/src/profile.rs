//! Per-person profiles stored in `people.json`.
//!
//! The file is an ordered JSON array, read and rewritten wholesale. Names
//! are unique case-insensitively; `add` is the only write path that
//! enforces it.

use crate::fsutil;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("name is required")]
    NameRequired,
    #[error("age must be a positive number")]
    InvalidAge,
    #[error("a user with the name '{0}' already exists")]
    DuplicateName(String),
    #[error("no user named '{0}'")]
    NotFound(String),
    #[error("{0} is not a JSON list of profiles")]
    Malformed(String),
    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("profile io: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        })
    }
}

impl FromStr for Gender {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(ProfileError::UnknownVariant {
                kind: "gender",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NewsCategory {
    Sports,
    Politics,
    Business,
    Science,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 4] = [
        NewsCategory::Sports,
        NewsCategory::Politics,
        NewsCategory::Business,
        NewsCategory::Science,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsCategory::Sports => "Sports",
            NewsCategory::Politics => "Politics",
            NewsCategory::Business => "Business",
            NewsCategory::Science => "Science",
        }
    }
}

impl fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsCategory {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NewsCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProfileError::UnknownVariant {
                kind: "news category",
                value: s.to_string(),
            })
    }
}

/// One person's dashboard profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub age: u32,
    pub gender: Gender,
    #[serde(default)]
    pub news_interest: bool,
    #[serde(default)]
    pub news_categories: Vec<NewsCategory>,
    #[serde(default)]
    pub stock_interest: bool,
    #[serde(default)]
    pub stock_tickers: Vec<String>,
    #[serde(default)]
    pub todo_list: Vec<String>,
}

/// Older intake forms stored the age as the raw text of the entry field.
fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid age '{s}'"))),
    }
}

impl Profile {
    fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Unvalidated registration input.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub age: i64,
    pub gender: Gender,
    pub news_interest: bool,
    pub news_categories: Vec<NewsCategory>,
    pub stock_interest: bool,
    pub stock_tickers: Vec<String>,
    pub todo_list: Vec<String>,
}

impl NewProfile {
    /// Validate field values (everything except uniqueness).
    pub fn validate(self) -> Result<Profile, ProfileError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ProfileError::NameRequired);
        }
        let age = u32::try_from(self.age)
            .ok()
            .filter(|&a| a > 0)
            .ok_or(ProfileError::InvalidAge)?;

        let mut news_categories = Vec::new();
        if self.news_interest {
            for category in self.news_categories {
                if !news_categories.contains(&category) {
                    news_categories.push(category);
                }
            }
        }

        let stock_tickers = if self.stock_interest {
            self.stock_tickers
                .iter()
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        let todo_list = self
            .todo_list
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Profile {
            name,
            age,
            gender: self.gender,
            news_interest: self.news_interest,
            news_categories,
            stock_interest: self.stock_interest,
            stock_tickers,
            todo_list,
        })
    }
}

/// `people.json` on disk.
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every profile. A missing file is an empty list.
    pub fn load(&self) -> Result<Vec<Profile>, ProfileError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }

        let value: serde_json::Value = serde_json::from_slice(&raw)?;
        if !value.is_array() {
            return Err(ProfileError::Malformed(self.path.display().to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Rewrite the whole file with 4-space indentation.
    pub fn save(&self, profiles: &[Profile]) -> Result<(), ProfileError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        profiles.serialize(&mut ser)?;
        fsutil::write_atomic(&self.path, &buf)?;
        Ok(())
    }

    /// Validate and append a new profile, rejecting duplicate names.
    pub fn add(&self, new: NewProfile) -> Result<Profile, ProfileError> {
        let profile = new.validate()?;
        let mut profiles = self.load()?;

        let key = profile.name_key();
        if profiles.iter().any(|p| p.name_key() == key) {
            return Err(ProfileError::DuplicateName(profile.name));
        }

        profiles.push(profile.clone());
        self.save(&profiles)?;
        tracing::info!(name = %profile.name, path = %self.path.display(), "profile saved");
        Ok(profile)
    }

    /// Remove a profile by case-insensitive name.
    pub fn remove(&self, name: &str) -> Result<Profile, ProfileError> {
        let mut profiles = self.load()?;
        let key = name_key(name);
        let idx = profiles
            .iter()
            .position(|p| p.name_key() == key)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        let removed = profiles.remove(idx);
        self.save(&profiles)?;
        tracing::info!(name = %removed.name, "profile removed");
        Ok(removed)
    }
}

/// Case-insensitive lookup by name.
pub fn find_by_name<'a>(profiles: &'a [Profile], name: &str) -> Option<&'a Profile> {
    let key = name_key(name);
    profiles.iter().find(|p| p.name_key() == key)
}

/// The profile to show for `name`: the named one, else the first one.
pub fn resolve_for_display<'a>(profiles: &'a [Profile], name: &str) -> Option<&'a Profile> {
    if let Some(p) = find_by_name(profiles, name) {
        return Some(p);
    }
    let first = profiles.first()?;
    tracing::info!(
        requested = name,
        fallback = %first.name,
        "no profile for current user, using first profile"
    );
    Some(first)
}

/// The most recently registered profile.
pub fn latest(profiles: &[Profile]) -> Option<&Profile> {
    profiles.last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_profile(name: &str) -> NewProfile {
        NewProfile {
            name: name.to_string(),
            age: 30,
            gender: Gender::Other,
            news_interest: false,
            news_categories: vec![],
            stock_interest: false,
            stock_tickers: vec![],
            todo_list: vec![],
        }
    }

    fn store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("people.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_add_and_reload() {
        let (_dir, store) = store();
        let mut p = new_profile("  Ada  ");
        p.stock_interest = true;
        p.stock_tickers = vec![" aapl".into(), "".into(), "msft ".into()];
        p.news_interest = true;
        p.news_categories = vec![NewsCategory::Science, NewsCategory::Science];
        p.todo_list = vec!["water plants".into(), "  ".into()];
        store.add(p).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Ada");
        assert_eq!(loaded[0].stock_tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(loaded[0].news_categories, vec![NewsCategory::Science]);
        assert_eq!(loaded[0].todo_list, vec!["water plants"]);
    }

    #[test]
    fn test_duplicate_name_is_case_insensitive() {
        let (_dir, store) = store();
        store.add(new_profile("Ada")).unwrap();
        let err = store.add(new_profile(" ada ")).unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateName(_)));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            new_profile("   ").validate(),
            Err(ProfileError::NameRequired)
        ));
        let mut p = new_profile("Ada");
        p.age = 0;
        assert!(matches!(p.validate(), Err(ProfileError::InvalidAge)));
        let mut p = new_profile("Ada");
        p.age = -3;
        assert!(matches!(p.validate(), Err(ProfileError::InvalidAge)));
    }

    #[test]
    fn test_interests_gate_lists() {
        let mut p = new_profile("Ada");
        p.news_categories = vec![NewsCategory::Sports];
        p.stock_tickers = vec!["AAPL".into()];
        let profile = p.validate().unwrap();
        assert!(profile.news_categories.is_empty());
        assert!(profile.stock_tickers.is_empty());
    }

    #[test]
    fn test_reads_string_age_from_legacy_file() {
        let (_dir, store) = store();
        std::fs::write(
            store.path(),
            r#"[{"name": "Ada", "age": "36", "gender": "Female",
                 "news_interest": true, "news_categories": ["Business"],
                 "stock_interest": false, "stock_tickers": [], "todo_list": []}]"#,
        )
        .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].age, 36);
        assert_eq!(loaded[0].gender, Gender::Female);
        assert_eq!(loaded[0].news_categories, vec![NewsCategory::Business]);
    }

    #[test]
    fn test_non_list_file_is_an_error() {
        let (_dir, store) = store();
        std::fs::write(store.path(), r#"{"name": "Ada"}"#).unwrap();
        assert!(matches!(store.load(), Err(ProfileError::Malformed(_))));
        assert!(store.add(new_profile("Bob")).is_err());
    }

    #[test]
    fn test_saved_file_uses_four_space_indent() {
        let (_dir, store) = store();
        store.add(new_profile("Ada")).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n    {\n        \"name\": \"Ada\""), "{raw}");
        assert!(raw.contains("\"age\": 30"));
    }

    #[test]
    fn test_lookup_helpers() {
        let (_dir, store) = store();
        store.add(new_profile("Ada")).unwrap();
        store.add(new_profile("Bob")).unwrap();
        let profiles = store.load().unwrap();

        assert_eq!(find_by_name(&profiles, "BOB").unwrap().name, "Bob");
        assert!(find_by_name(&profiles, "eve").is_none());
        assert_eq!(resolve_for_display(&profiles, "eve").unwrap().name, "Ada");
        assert_eq!(resolve_for_display(&profiles, "bob").unwrap().name, "Bob");
        assert!(resolve_for_display(&[], "bob").is_none());
        assert_eq!(latest(&profiles).unwrap().name, "Bob");
    }

    #[test]
    fn test_remove() {
        let (_dir, store) = store();
        store.add(new_profile("Ada")).unwrap();
        store.remove("ADA").unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(matches!(store.remove("ada"), Err(ProfileError::NotFound(_))));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("SCIENCE".parse::<NewsCategory>().unwrap(), NewsCategory::Science);
        assert!("weather".parse::<NewsCategory>().is_err());
    }
}
