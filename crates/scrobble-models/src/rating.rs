use serde::{Deserialize, Serialize};
use std::fmt;

/// A user rating on the remote service's 1-10 integer scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid rating {0} (must be 1-10)")]
pub struct InvalidRating(pub u8);

impl Rating {
    pub fn new(value: u8) -> Result<Self, InvalidRating> {
        if (1..=10).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidRating(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "Awful",
            2 => "Very bad",
            3 => "Bad",
            4 => "Poor",
            5 => "Average",
            6 => "Fair",
            7 => "Good",
            8 => "Very good",
            9 => "Great",
            _ => "Masterpiece",
        }
    }
}

impl TryFrom<u8> for Rating {
    type Error = InvalidRating;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> u8 {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(11).is_err());
        assert_eq!(Rating::new(8).unwrap().value(), 8);
        assert_eq!(Rating::new(10).unwrap().description(), "Masterpiece");
    }

    #[test]
    fn test_invalid_rating_message() {
        let err = Rating::new(11).unwrap_err();
        assert_eq!(err, InvalidRating(11));
        assert_eq!(err.to_string(), "invalid rating 11 (must be 1-10)");
    }

    #[test]
    fn test_rating_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Rating>("7").is_ok());
        assert!(serde_json::from_str::<Rating>("12").is_err());
    }
}
