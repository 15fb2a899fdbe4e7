use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const MAX_NAME_CHARS: usize = 32;
pub const MAX_INTERESTS: usize = 10;
pub const MAX_INTEREST_CHARS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Who a connection is willing to be paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Male,
    Female,
    Any,
}

impl Preference {
    pub fn accepts(self, gender: Gender) -> bool {
        use Preference::*;
        match self {
            Any => true,
            Male => gender == Gender::Male,
            Female => gender == Gender::Female,
        }
    }
}

/// The `find-match` payload as it arrives off the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileForm {
    pub name: String,
    pub gender: Gender,
    pub looking_for: Preference,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub gender: Gender,
    pub looking_for: Preference,
    pub interests: BTreeSet<String>,
}

/// The part of a profile the partner gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicProfile {
    pub name: String,
    pub gender: Gender,
    pub interests: BTreeSet<String>,
}

impl Profile {
    pub fn parse(ProfileForm { name, gender, looking_for, interests }: ProfileForm) -> Result<Profile, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidProfile("name is required".to_owned()));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(EngineError::InvalidProfile(format!("name is longer than {MAX_NAME_CHARS} characters")));
        }

        let mut tags = BTreeSet::new();
        for tag in interests {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if tag.chars().count() > MAX_INTEREST_CHARS {
                return Err(EngineError::InvalidProfile(format!(
                    "interest {tag:?} is longer than {MAX_INTEREST_CHARS} characters"
                )));
            }
            tags.insert(tag);
        }
        if tags.len() > MAX_INTERESTS {
            return Err(EngineError::InvalidProfile(format!("at most {MAX_INTERESTS} interests are allowed")));
        }

        Ok(Profile {
            name: name.to_owned(),
            gender,
            looking_for,
            interests: tags,
        })
    }

    /// Both sides have to accept each other's gender.
    pub fn compatible_with(&self, other: &Profile) -> bool {
        self.looking_for.accepts(other.gender) && other.looking_for.accepts(self.gender)
    }

    pub fn shared_interests(&self, other: &Profile) -> BTreeSet<String> {
        self.interests.intersection(&other.interests).cloned().collect()
    }

    pub fn score(&self, other: &Profile) -> usize {
        self.interests.intersection(&other.interests).count()
    }

    pub fn public(&self) -> PublicProfile {
        PublicProfile {
            name: self.name.clone(),
            gender: self.gender,
            interests: self.interests.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, interests: &[&str]) -> ProfileForm {
        ProfileForm {
            name: name.to_owned(),
            gender: Gender::Female,
            looking_for: Preference::Any,
            interests: interests.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn interests_are_normalized() {
        let profile = Profile::parse(form("  Ada ", &["Music", " music", "", "Travel "])).unwrap();
        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.interests, BTreeSet::from(["music".to_owned(), "travel".to_owned()]));
    }

    #[test]
    fn rejects_bad_profiles() {
        assert!(matches!(Profile::parse(form("   ", &[])), Err(EngineError::InvalidProfile(_))));
        assert!(Profile::parse(form(&"x".repeat(MAX_NAME_CHARS + 1), &[])).is_err());
        assert!(Profile::parse(form("a", &[&"y".repeat(MAX_INTEREST_CHARS + 1)])).is_err());

        let many: Vec<String> = (0..=MAX_INTERESTS).map(|i| format!("tag{i}")).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(Profile::parse(form("a", &many)).is_err());
    }

    #[test]
    fn unknown_gender_fails_to_deserialize() {
        let raw = r#"{"name":"a","gender":"robot","looking_for":"any"}"#;
        assert!(serde_json::from_str::<ProfileForm>(raw).is_err());
    }
}
