//! JSON schema types and loaders for the side-band analysis results.
//!
//! Both files are keyed by function name, then block name. Names may carry
//! the printer's sigils (`@` for functions, `%` for values and blocks);
//! [`strip_sigil`] normalises them. `BTreeMap` keeps iteration order
//! deterministic across runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// `tracked_values.json`: function -> block -> tracked value names.
pub type TrackedValuesByName = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Liveness for one block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockLivenessJson {
    #[serde(rename = "in")]
    pub live_in: Vec<String>,
    #[serde(rename = "out")]
    pub live_out: Vec<String>,
}

/// `live_values.json`: function -> block -> { in, out }.
pub type LivenessByName = BTreeMap<String, BTreeMap<String, BlockLivenessJson>>;

pub fn tracked_values_from_str(s: &str) -> Result<TrackedValuesByName, CoreError> {
    Ok(serde_json::from_str(s)?)
}

pub fn tracked_values_from_path(path: impl AsRef<Path>) -> Result<TrackedValuesByName, CoreError> {
    tracked_values_from_str(&std::fs::read_to_string(path)?)
}

pub fn liveness_from_str(s: &str) -> Result<LivenessByName, CoreError> {
    Ok(serde_json::from_str(s)?)
}

pub fn liveness_from_path(path: impl AsRef<Path>) -> Result<LivenessByName, CoreError> {
    liveness_from_str(&std::fs::read_to_string(path)?)
}

/// Strip a leading `%` or `@` printer sigil.
pub fn strip_sigil(name: &str) -> &str {
    name.strip_prefix(['%', '@']).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tracked_values() {
        let json = r#"{ "@lud": { "%for.body": ["%i", "%sum"], "%entry": [] } }"#;
        let map = tracked_values_from_str(json).unwrap();
        let blocks = &map["@lud"];
        assert_eq!(blocks["%for.body"], vec!["%i", "%sum"]);
        assert!(blocks["%entry"].is_empty());
    }

    #[test]
    fn parses_liveness() {
        let json = r#"{ "lud": { "for.body": { "in": ["%i"], "out": ["%i", "%sum"] } } }"#;
        let map = liveness_from_str(json).unwrap();
        let bl = &map["lud"]["for.body"];
        assert_eq!(bl.live_in, vec!["%i"]);
        assert_eq!(bl.live_out.len(), 2);
    }

    #[test]
    fn sigil_stripping() {
        assert_eq!(strip_sigil("%x"), "x");
        assert_eq!(strip_sigil("@main"), "main");
        assert_eq!(strip_sigil("plain"), "plain");
    }
}
