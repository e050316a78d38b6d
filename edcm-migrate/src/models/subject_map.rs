//! Subject identity mapping
//!
//! Each source subject id resolves to exactly one target id for the run.
//! How parallel old/new lists of different lengths are paired is chosen
//! explicitly through [`SubjectFallback`].

use edcm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Pairing of a source subject id with its target id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectMapping {
    pub old_id: String,
    pub new_id: String,
}

impl SubjectMapping {
    /// Mapping whose new id defaults to the old id when absent or blank
    pub fn new(old_id: impl Into<String>, new_id: Option<&str>) -> Self {
        let old_id = old_id.into();
        let new_id = new_id
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| old_id.clone());
        Self { old_id, new_id }
    }
}

/// How to pair old/new id lists of different lengths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectFallback {
    /// Pair by position over the old list; a missing new id is the old id.
    /// Surplus new ids are rejected.
    #[default]
    Identity,
    /// Lists must have the same length
    Strict,
    /// Iterate the new list, reusing the first old id when the old list runs
    /// out. Old ids past the end of the new list are not migrated.
    ReuseFirstOld,
}

impl FromStr for SubjectFallback {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "identity" => Ok(Self::Identity),
            "strict" => Ok(Self::Strict),
            "reuse-first-old" => Ok(Self::ReuseFirstOld),
            other => Err(Error::InvalidInput(format!(
                "Unknown subject fallback '{}' (expected identity, strict or reuse-first-old)",
                other
            ))),
        }
    }
}

impl fmt::Display for SubjectFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "identity",
            Self::Strict => "strict",
            Self::ReuseFirstOld => "reuse-first-old",
        })
    }
}

/// Resolved subject mappings for a run, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectMap {
    mappings: Vec<SubjectMapping>,
}

impl SubjectMap {
    /// Parse `OLD1:NEW1,OLD2,OLD3:NEW3`
    ///
    /// Blank entries are ignored; an entry without `:` keeps its id.
    pub fn parse(input: &str) -> Result<Self> {
        let mappings = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(':') {
                Some((old, new)) => SubjectMapping::new(old.trim(), Some(new)),
                None => SubjectMapping::new(part, None),
            })
            .collect::<Vec<_>>();

        if let Some(blank) = mappings.iter().find(|m| m.old_id.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "Subject mapping to '{}' has no source id",
                blank.new_id
            )));
        }

        Self::checked(mappings)
    }

    /// Pair parallel id lists according to `fallback`
    pub fn from_lists(old_ids: &[String], new_ids: &[String], fallback: SubjectFallback) -> Result<Self> {
        match fallback {
            SubjectFallback::Strict => {
                if old_ids.len() != new_ids.len() {
                    return Err(Error::InvalidInput(format!(
                        "Subject lists differ in length: {} old, {} new",
                        old_ids.len(),
                        new_ids.len()
                    )));
                }
                Self::checked(
                    old_ids
                        .iter()
                        .zip(new_ids)
                        .map(|(old, new)| SubjectMapping::new(old.clone(), Some(new)))
                        .collect(),
                )
            }
            SubjectFallback::Identity => {
                if new_ids.len() > old_ids.len() {
                    return Err(Error::InvalidInput(format!(
                        "{} new subject ids have no source subject",
                        new_ids.len() - old_ids.len()
                    )));
                }
                Self::checked(
                    old_ids
                        .iter()
                        .enumerate()
                        .map(|(i, old)| SubjectMapping::new(old.clone(), new_ids.get(i).map(String::as_str)))
                        .collect(),
                )
            }
            SubjectFallback::ReuseFirstOld => {
                let Some(first_old) = old_ids.first() else {
                    return Ok(Self::default());
                };
                if old_ids.len() != new_ids.len() {
                    warn!(
                        old = old_ids.len(),
                        new = new_ids.len(),
                        "Subject lists differ in length, reusing first source id"
                    );
                }
                let mappings = new_ids
                    .iter()
                    .enumerate()
                    .map(|(i, new)| {
                        let old = old_ids.get(i).unwrap_or(first_old);
                        SubjectMapping::new(old.clone(), Some(new))
                    })
                    .collect();
                Ok(Self { mappings })
            }
        }
    }

    /// Reject a source id mapped more than once
    fn checked(mappings: Vec<SubjectMapping>) -> Result<Self> {
        let mut seen = HashSet::new();
        for mapping in &mappings {
            if !seen.insert(mapping.old_id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Source subject '{}' is mapped more than once",
                    mapping.old_id
                )));
            }
        }
        Ok(Self { mappings })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubjectMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Target id for a source id
    pub fn resolve(&self, old_id: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.old_id == old_id)
            .map(|m| m.new_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(map: &SubjectMap) -> Vec<(String, String)> {
        map.iter().map(|m| (m.old_id.clone(), m.new_id.clone())).collect()
    }

    #[test]
    fn test_parse_mapping_string() {
        let map = SubjectMap::parse(" S1:N1, S2 ,,S3: ").unwrap();
        assert_eq!(
            pairs(&map),
            vec![
                ("S1".to_string(), "N1".to_string()),
                ("S2".to_string(), "S2".to_string()),
                ("S3".to_string(), "S3".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_empty_is_empty_map() {
        assert!(SubjectMap::parse("").unwrap().is_empty());
        assert!(SubjectMap::parse(" , ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_duplicate_source() {
        assert!(SubjectMap::parse("S1:N1,S1:N2").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_source() {
        assert!(SubjectMap::parse(":N1").is_err());
    }

    #[test]
    fn test_identity_fallback_shorter_new_list() {
        let map = SubjectMap::from_lists(&ids(&["S1", "S2"]), &ids(&["N1"]), SubjectFallback::Identity).unwrap();
        assert_eq!(
            pairs(&map),
            vec![
                ("S1".to_string(), "N1".to_string()),
                ("S2".to_string(), "S2".to_string()),
            ]
        );
    }

    #[test]
    fn test_identity_fallback_rejects_surplus_new_ids() {
        assert!(SubjectMap::from_lists(&ids(&["S1"]), &ids(&["N1", "N2"]), SubjectFallback::Identity).is_err());
    }

    #[test]
    fn test_strict_rejects_length_mismatch() {
        assert!(SubjectMap::from_lists(&ids(&["S1", "S2"]), &ids(&["N1"]), SubjectFallback::Strict).is_err());
        let map = SubjectMap::from_lists(&ids(&["S1"]), &ids(&["N1"]), SubjectFallback::Strict).unwrap();
        assert_eq!(map.resolve("S1"), Some("N1"));
    }

    #[test]
    fn test_reuse_first_old_legacy_pairing() {
        // Iterates the new list only: S2 is never migrated
        let map = SubjectMap::from_lists(&ids(&["S1", "S2"]), &ids(&["N1"]), SubjectFallback::ReuseFirstOld).unwrap();
        assert_eq!(pairs(&map), vec![("S1".to_string(), "N1".to_string())]);

        // Old list runs out: the first old id is reused for every extra new id
        let map = SubjectMap::from_lists(&ids(&["S1"]), &ids(&["N1", "N2"]), SubjectFallback::ReuseFirstOld).unwrap();
        assert_eq!(
            pairs(&map),
            vec![
                ("S1".to_string(), "N1".to_string()),
                ("S1".to_string(), "N2".to_string()),
            ]
        );
    }

    #[test]
    fn test_fallback_from_str_round_trip() {
        for fallback in [SubjectFallback::Identity, SubjectFallback::Strict, SubjectFallback::ReuseFirstOld] {
            assert_eq!(fallback.to_string().parse::<SubjectFallback>().unwrap(), fallback);
        }
        assert!("first".parse::<SubjectFallback>().is_err());
    }
}
