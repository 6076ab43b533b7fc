//! Canonical in-game server identities
//!
//! Marketplaces spell server names however they like ("Zero", "ZERO",
//! "Knight Online Zero GB"). Everything past the normalizer works with the
//! closed [`ServerId`] set below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One in-game world partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerId {
    Zero,
    Felis,
    Pandora,
    Agartha,
    Dryads,
    Destan,
    Minark,
    Oreads,
}

impl ServerId {
    /// Every known server, in display order
    pub const ALL: [ServerId; 8] = [
        ServerId::Zero,
        ServerId::Felis,
        ServerId::Pandora,
        ServerId::Agartha,
        ServerId::Dryads,
        ServerId::Destan,
        ServerId::Minark,
        ServerId::Oreads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerId::Zero => "ZERO",
            ServerId::Felis => "FELIS",
            ServerId::Pandora => "PANDORA",
            ServerId::Agartha => "AGARTHA",
            ServerId::Dryads => "DRYADS",
            ServerId::Destan => "DESTAN",
            ServerId::Minark => "MINARK",
            ServerId::Oreads => "OREADS",
        }
    }

    /// Case-insensitive lookup of an exact server name (surrounding whitespace ignored)
    pub fn from_name(name: &str) -> Option<ServerId> {
        let trimmed = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|server| server.as_str().eq_ignore_ascii_case(trimmed))
    }

    /// Find the first word of free-form listing text that names a server.
    ///
    /// Tries the whole text first so "zero" and " Zero " resolve without a scan.
    pub fn find_in(text: &str) -> Option<ServerId> {
        if let Some(server) = Self::from_name(text) {
            return Some(server);
        }

        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .find_map(Self::from_name)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("Unknown server: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(ServerId::from_name("zero"), Some(ServerId::Zero));
        assert_eq!(ServerId::from_name("  Pandora "), Some(ServerId::Pandora));
        assert_eq!(ServerId::from_name("OREADS"), Some(ServerId::Oreads));
        assert_eq!(ServerId::from_name("Ares"), None);
    }

    #[test]
    fn test_find_in_listing_title() {
        assert_eq!(
            ServerId::find_in("Knight Online Felis GB"),
            Some(ServerId::Felis)
        );
        assert_eq!(
            ServerId::find_in("Destan GbDestan 10M Teslimat SERVER 3"),
            Some(ServerId::Destan)
        );
        // Substrings inside a longer word do not count
        assert_eq!(ServerId::find_in("Zerowing 10M"), None);
    }

    #[test]
    fn test_serde_uses_uppercase_ids() {
        let json = serde_json::to_string(&ServerId::Agartha).unwrap();
        assert_eq!(json, "\"AGARTHA\"");
        let parsed: ServerId = serde_json::from_str("\"MINARK\"").unwrap();
        assert_eq!(parsed, ServerId::Minark);
    }
}
