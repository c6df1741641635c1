//! Vessel identity types

use crate::error::InputError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

static MMSI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{9}$").expect("Invalid MMSI regex"));

/// Maritime Mobile Service Identity: exactly nine ASCII digits.
///
/// The only way to obtain an `Mmsi` is through validation, so a value of this
/// type can always be sent to the external registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mmsi(String);

impl Mmsi {
    /// Validate and wrap an identifier.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, InputError> {
        let value = value.as_ref().trim();
        if MMSI_PATTERN.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(InputError::InvalidIdentifier {
                value: value.to_string(),
            })
        }
    }

    /// Check an identifier without allocating an `Mmsi`.
    pub fn is_valid(value: &str) -> bool {
        MMSI_PATTERN.is_match(value)
    }

    /// Extract the identifier from a Signal K context such as
    /// `vessels.urn:mrn:imo:mmsi:319139200`.
    pub fn from_context(context: &str) -> Result<Self, InputError> {
        Self::parse(context.rsplit(':').next().unwrap_or(context))
    }

    /// Borrow the digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Mmsi {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Mmsi {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Mmsi> for String {
    fn from(mmsi: Mmsi) -> Self {
        mmsi.0
    }
}

impl AsRef<str> for Mmsi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every nine-digit string is accepted verbatim.
        #[test]
        fn prop_nine_digits_accepted(digits in "[0-9]{9}") {
            let mmsi = Mmsi::parse(&digits).unwrap();
            prop_assert_eq!(mmsi.as_str(), digits.as_str());
        }

        /// Anything that is not exactly nine digits is rejected.
        #[test]
        fn prop_wrong_length_rejected(digits in "[0-9]{0,8}|[0-9]{10,15}") {
            prop_assert!(Mmsi::parse(&digits).is_err());
        }

        #[test]
        fn prop_non_digit_rejected(prefix in "[0-9]{0,8}", bad in "[a-zA-Z_:-]", suffix in "[0-9]{0,8}") {
            let value = format!("{prefix}{bad}{suffix}");
            prop_assert!(!Mmsi::is_valid(&value));
            prop_assert!(Mmsi::parse(&value).is_err());
        }
    }
}
