use std::fmt;

use rand::Rng;
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

pub const IMAGE_ID_LEN: usize = 12;
pub const IMAGE_ID_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn is_valid_image_id(value: &str) -> bool {
    ImageId::parse(value).is_ok()
}

/// Stable identity of an uploaded image, independent of its position in the
/// stored list.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId(String);

impl ImageId {
    pub fn parse(value: &str) -> Result<Self, ImageIdError> {
        if value.len() != IMAGE_ID_LEN {
            return Err(ImageIdError::InvalidLength {
                expected: IMAGE_ID_LEN,
                found: value.len(),
            });
        }
        for (idx, ch) in value.chars().enumerate() {
            if !IMAGE_ID_ALPHABET.contains(ch) {
                return Err(ImageIdError::InvalidCharacter { ch, index: idx });
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let alphabet = IMAGE_ID_ALPHABET.as_bytes();
        let mut id = String::with_capacity(IMAGE_ID_LEN);
        for _ in 0..IMAGE_ID_LEN {
            let idx = rng.random_range(0..alphabet.len());
            id.push(alphabet[idx] as char);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ImageId {
    type Err = ImageIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ImageId {
    type Error = ImageIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageId> for String {
    fn from(value: ImageId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageIdError {
    InvalidLength { expected: usize, found: usize },
    InvalidCharacter { ch: char, index: usize },
}

impl fmt::Display for ImageIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageIdError::InvalidLength { expected, found } => {
                write!(f, "image id must be {expected} chars, got {found}")
            }
            ImageIdError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at position {index}")
            }
        }
    }
}

impl std::error::Error for ImageIdError {}
