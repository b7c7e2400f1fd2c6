//! Build numbers and best-effort extraction from free text.
//!
//! A [`BuildNumber`] is the only identity a release has: a positive integer that
//! grows with every published build. They turn up embedded in file names
//! (`tool_v12.exe`), commit messages (`Build 128: fix crash`) and marker files
//! (`v42`), so [`resolve_build_number`] runs an ordered list of patterns over the
//! text and returns the first hit.
//!
//! # Pattern priority
//!
//! | # | Pattern | Example | Result |
//! |---|---------|---------|--------|
//! | 1 | `Build <N>` | `Build 128: fix crash` | 128 |
//! | 2 | `version <N>` | `version: v31` | 31 |
//! | 3 | `v<N>` at a token boundary | `tool_v12.exe`, `v7` | 12, 7 |
//! | 4 | the whole text is an integer | `42\n` | 42 |
//!
//! The first pattern that matches wins, and within a pattern the first
//! occurrence wins. Occurrences that are zero or overflow `u64` are skipped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// A positive, totally ordered release identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildNumber(NonZeroU64);

impl BuildNumber {
    /// Create a build number; zero is not a build number.
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// The raw integer value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BuildNumber {
    type Err = String;

    /// Accepts anything [`resolve_build_number`] understands, so `12`, `v12` and
    /// `Build 12` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve_build_number(s).ok_or_else(|| format!("'{s}' does not contain a build number"))
    }
}

const PATTERNS: &[&str] = &[
    r"(?i)\bbuild[\s#:\-]*(\d+)",
    r"(?i)\bversion[\s#:=\-]*v?(\d+)",
    r"(?i)(?:^|[^a-z0-9])v(\d+)",
    r"^\s*(\d+)\s*$",
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

/// Extract the build number from arbitrary text.
///
/// Returns `None` when no pattern produces a positive integer.
///
/// # Examples
///
/// ```rust
/// use binswap::upgrade::build_number::resolve_build_number;
///
/// assert_eq!(resolve_build_number("Build 128: fix crash").map(|b| b.get()), Some(128));
/// assert_eq!(resolve_build_number("v7").map(|b| b.get()), Some(7));
/// assert_eq!(resolve_build_number("no version here"), None);
/// ```
pub fn resolve_build_number(text: &str) -> Option<BuildNumber> {
    patterns().iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().parse::<u64>().ok())
            .find_map(BuildNumber::new)
    })
}
