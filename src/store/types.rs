//! type-safe names for the collection store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated collection name.
///
/// Collection names become file names (`<name>.json`), so they are
/// restricted to prevent path traversal and clashes with internal files.
///
/// Valid names:
/// - 1-64 characters
/// - Alphanumeric, underscores, hyphens only
/// - Must start with an ASCII letter (a leading `_` is reserved)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionName(String);

impl CollectionName {
    pub const MAX_LEN: usize = 64;

    /// create a new CollectionName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        let first_char = name.chars().next().ok_or(InvalidNameError::Empty)?;

        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        if first_char == '_' {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        if !first_char.is_ascii_alphabetic() {
            return Err(InvalidNameError::InvalidStart(first_char));
        }

        check_charset(name)
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// file name of the collection inside the data directory
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }

    /// recover a collection name from a data file name, if it is one
    pub(crate) fn from_file_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_suffix(".json")
            .and_then(|stem| Self::new(stem).ok())
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CollectionName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CollectionName> for String {
    fn from(name: CollectionName) -> Self {
        name.0
    }
}

/// A validated record id.
///
/// Usually generated (lowercase ULID), but callers may supply their own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub const MAX_LEN: usize = 128;

    pub fn new(id: impl Into<String>) -> Result<Self, InvalidNameError> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if id.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(id.len()));
        }
        check_charset(&id)?;
        Ok(Self(id))
    }

    /// Generate a new ULID-based record id.
    ///
    /// ULIDs are monotonic time plus 80 random bits, so collisions are
    /// possible in theory but not expected in practice.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecordId {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

fn check_charset(name: &str) -> Result<(), InvalidNameError> {
    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }
    Ok(())
}

/// error type for invalid names (collections, record ids)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}
