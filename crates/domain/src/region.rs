//! Region tags — every check is pinned to exactly one worker region.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Default set of regions the fleet runs in. Overridable via config.
pub const DEFAULT_REGIONS: &[&str] = &["us", "eu", "apac", "vps-eu-1"];

/// A region tag such as `us` or `vps-eu-1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Parse and normalize a region tag. Tags are lowercase and limited to
    /// `[a-z0-9-]`; membership in the allowed set is checked at registration.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let tag = raw.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(Error::Config("region tag must not be empty".into()));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::Config(format!(
                "region tag '{raw}' contains invalid characters"
            )));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Region {
    fn default() -> Self {
        Self("us".into())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case() {
        assert_eq!(Region::parse("EU").unwrap().as_str(), "eu");
    }

    #[test]
    fn parse_accepts_hyphenated_tags() {
        assert_eq!(Region::parse("vps-eu-1").unwrap().as_str(), "vps-eu-1");
    }

    #[test]
    fn parse_rejects_empty_and_invalid() {
        assert!(Region::parse("").is_err());
        assert!(Region::parse("us east").is_err());
        assert!(Region::parse("eu_1").is_err());
    }
}
