use std::fmt;

use serde::Serialize;

use crate::error::CoreError;

const MAX_SLUG_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercases `title` and joins its ASCII alphanumeric runs with `-`.
    pub fn from_title(title: &str) -> Result<Self, CoreError> {
        let mut slug = String::with_capacity(title.len());
        for word in title
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let separator = usize::from(!slug.is_empty());
            if slug.len() + separator + word.len() > MAX_SLUG_LEN {
                // Words are ASCII, so any byte offset is a char boundary.
                if slug.is_empty() {
                    slug.push_str(&word[..MAX_SLUG_LEN].to_ascii_lowercase());
                }
                break;
            }
            if !slug.is_empty() {
                slug.push('-');
            }
            slug.push_str(&word.to_ascii_lowercase());
        }
        if slug.is_empty() {
            return Err(CoreError::InvalidSlug(format!(
                "title {title:?} has no slug characters"
            )));
        }
        Ok(Slug(slug))
    }
}

impl TryFrom<&str> for Slug {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidSlug("empty slug".to_string()));
        }
        if trimmed.len() > MAX_SLUG_LEN {
            return Err(CoreError::InvalidSlug(format!(
                "slug longer than {MAX_SLUG_LEN} bytes"
            )));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(CoreError::InvalidSlug(trimmed.to_string()));
        }
        Ok(Slug(trimmed.to_string()))
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Slug;

    #[test]
    fn slug_trims_surrounding_whitespace() {
        let slug = Slug::try_from("  hello-world ").unwrap();
        assert_eq!(slug.as_str(), "hello-world");
    }

    #[test]
    fn slug_keeps_case() {
        let slug = Slug::try_from("Hello-World_2").unwrap();
        assert_eq!(slug.as_str(), "Hello-World_2");
    }

    #[test]
    fn slug_rejects_spaces_and_punctuation() {
        assert!(Slug::try_from("hello world").is_err());
        assert!(Slug::try_from("hello/world").is_err());
        assert!(Slug::try_from("héllo").is_err());
        assert!(Slug::try_from("   ").is_err());
    }

    #[test]
    fn slug_from_title_joins_words() {
        let slug = Slug::from_title("  Hello, World! Part 2 ").unwrap();
        assert_eq!(slug.as_str(), "hello-world-part-2");
        assert!(Slug::from_title("!!!").is_err());
    }

    #[test]
    fn slug_from_long_title_is_capped() {
        let title = "word ".repeat(100);
        let slug = Slug::from_title(&title).unwrap();
        assert!(slug.as_str().len() <= 200);
        assert!(!slug.as_str().ends_with('-'));
    }

    #[test]
    fn slug_rejects_overlong_input() {
        let raw = "a".repeat(201);
        assert!(Slug::try_from(raw.as_str()).is_err());
    }
}
