use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of a tag assignment or alias.
///
/// Distinguishes between tags explicitly created by users and those inferred by LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    /// Tag explicitly created or assigned by the user.
    User,
    /// Tag inferred by the language model.
    Llm,
}

impl TagSource {
    /// Returns the string stored in the `source` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Llm => "llm",
        }
    }

    /// Parses a stored `source` column value.
    ///
    /// Anything other than `user` is treated as machine-inferred.
    pub fn from_column(value: &str) -> Self {
        if value.eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Llm
        }
    }

    /// Returns true for user-provided assignments.
    pub fn is_user(self) -> bool {
        matches!(self, Self::User)
    }
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_source_serializes_to_json_correctly() {
        assert_eq!(serde_json::to_string(&TagSource::User).unwrap(), r#""user""#);
        assert_eq!(serde_json::to_string(&TagSource::Llm).unwrap(), r#""llm""#);
    }

    #[test]
    fn test_tag_source_deserialization_fails_on_unknown_variant() {
        let result: Result<TagSource, _> = serde_json::from_str(r#""unknown""#);
        assert!(result.is_err());
    }

    #[test]
    fn from_column_treats_non_user_values_as_llm() {
        assert_eq!(TagSource::from_column("user"), TagSource::User);
        assert_eq!(TagSource::from_column("USER"), TagSource::User);
        assert_eq!(TagSource::from_column("llm"), TagSource::Llm);
        assert_eq!(TagSource::from_column("inferred"), TagSource::Llm);
    }

    #[test]
    fn display_matches_column_value() {
        assert_eq!(format!("{}", TagSource::User), "user");
        assert_eq!(format!("{}", TagSource::Llm), "llm");
    }
}
