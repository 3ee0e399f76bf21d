//! Source identifiers naming one media asset across source, artifact and job state.

use std::fmt;

use serde::{Serialize, Serializer};

/// Errors produced when a requested filename cannot name a source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceIdError {
    #[error("Source identifier is empty")]
    Empty,

    #[error("Source identifier is a relative path component: {value}")]
    RelativeComponent { value: String },

    #[error("Source identifier contains a forbidden character: {value:?}")]
    ForbiddenCharacter { value: String },
}

/// Stable key derived from a source filename.
///
/// Always a single path component, so joining it onto the source or cache
/// directory can never escape that directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    /// Validates a filename taken from a request.
    ///
    /// # Errors
    /// - `SourceIdError::Empty` - The filename is empty
    /// - `SourceIdError::RelativeComponent` - The filename is `.` or `..`
    /// - `SourceIdError::ForbiddenCharacter` - The filename contains a path separator or NUL
    pub fn parse(value: &str) -> Result<Self, SourceIdError> {
        if value.is_empty() {
            return Err(SourceIdError::Empty);
        }
        if value == "." || value == ".." {
            return Err(SourceIdError::RelativeComponent {
                value: value.to_string(),
            });
        }
        if value.contains(['/', '\\', '\0']) {
            return Err(SourceIdError::ForbiddenCharacter {
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the identifier as the original filename.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human readable title: extension dropped, underscores become spaces.
    pub fn display_title(&self) -> String {
        let stem = match self.0.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => self.0.as_str(),
        };
        stem.replace('_', " ")
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SourceId {
    type Err = SourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_plain_filenames() {
        let id = SourceId::parse("The_Matrix (1999).mkv").unwrap();
        assert_eq!(id.as_str(), "The_Matrix (1999).mkv");
        assert_eq!(id.to_string(), "The_Matrix (1999).mkv");
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert_eq!(SourceId::parse(""), Err(SourceIdError::Empty));
        assert!(matches!(
            SourceId::parse(".."),
            Err(SourceIdError::RelativeComponent { .. })
        ));
        assert!(matches!(
            SourceId::parse("../etc/passwd"),
            Err(SourceIdError::ForbiddenCharacter { .. })
        ));
        assert!(matches!(
            SourceId::parse("dir\\movie.mkv"),
            Err(SourceIdError::ForbiddenCharacter { .. })
        ));
    }

    #[test]
    fn test_display_title() {
        let id = SourceId::parse("Blade_Runner_2049.mkv").unwrap();
        assert_eq!(id.display_title(), "Blade Runner 2049");

        let no_ext = SourceId::parse("home_movie").unwrap();
        assert_eq!(no_ext.display_title(), "home movie");

        let dotfile = SourceId::parse(".hidden").unwrap();
        assert_eq!(dotfile.display_title(), ".hidden");
    }
}
