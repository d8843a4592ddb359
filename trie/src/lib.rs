//! Segment trie for pattern-based routing.
//!
//! Patterns are `/`-separated paths. Storage is exact-path; lookup supports
//! both exact paths and MQTT-style wildcards stored in the trie:
//!
//! - `a/b/c` matches that exact path
//! - `a/+/c` matches any single segment at `+`
//! - `a/#` matches all remaining segments
//!
//! Unlike a plain map, inserting under an already-occupied pattern is an
//! error, which routing muxes rely on to reject duplicate registrations.
//!
//! ```
//! use talkbox_trie::Trie;
//!
//! let mut trie = Trie::new();
//! trie.insert("tts/alloy", 1).unwrap();
//! trie.insert("asr/+", 2).unwrap();
//!
//! assert_eq!(trie.get("tts/alloy"), Some(&1));
//! assert_eq!(trie.get("asr/stream"), Some(&2));
//! assert!(trie.insert("tts/alloy", 3).is_err());
//! ```

use std::collections::HashMap;

use thiserror::Error;

/// Error returned by [`Trie::insert`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    /// A value is already stored under this pattern.
    #[error("trie: pattern already registered: {0}")]
    Duplicate(String),
    /// The pattern is empty or malformed.
    #[error("trie: invalid pattern: {0}")]
    InvalidPattern(String),
}

/// A trie keyed on `/`-separated pattern segments.
#[derive(Debug, Clone)]
pub struct Trie<T> {
    children: HashMap<String, Trie<T>>,
    any_one: Option<Box<Trie<T>>>, // "+"
    any_rest: Option<Box<Trie<T>>>, // "#"
    value: Option<T>,
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Trie<T> {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            any_one: None,
            any_rest: None,
            value: None,
        }
    }

    /// Stores `value` under `pattern`. Fails when the pattern is already
    /// occupied or malformed (`#` must be the final segment).
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<(), TrieError> {
        let segments: Vec<&str> = split_pattern(pattern)?;
        self.insert_at(pattern, &segments, value)
    }

    fn insert_at(&mut self, pattern: &str, segments: &[&str], value: T) -> Result<(), TrieError> {
        let Some((head, rest)) = segments.split_first() else {
            if self.value.is_some() {
                return Err(TrieError::Duplicate(pattern.to_string()));
            }
            self.value = Some(value);
            return Ok(());
        };

        match *head {
            "#" => {
                if !rest.is_empty() {
                    return Err(TrieError::InvalidPattern(pattern.to_string()));
                }
                let node = self.any_rest.get_or_insert_with(|| Box::new(Trie::new()));
                if node.value.is_some() {
                    return Err(TrieError::Duplicate(pattern.to_string()));
                }
                node.value = Some(value);
                Ok(())
            }
            "+" => self
                .any_one
                .get_or_insert_with(|| Box::new(Trie::new()))
                .insert_at(pattern, rest, value),
            seg => self
                .children
                .entry(seg.to_string())
                .or_insert_with(Trie::new)
                .insert_at(pattern, rest, value),
        }
    }

    /// Looks up the value for `path`. Exact segments are preferred over `+`,
    /// which is preferred over `#`.
    pub fn get(&self, path: &str) -> Option<&T> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return None;
        }
        self.get_at(&segments)
    }

    fn get_at(&self, segments: &[&str]) -> Option<&T> {
        let Some((head, rest)) = segments.split_first() else {
            return self.value.as_ref();
        };

        if let Some(child) = self.children.get(*head)
            && let Some(v) = child.get_at(rest)
        {
            return Some(v);
        }
        if let Some(node) = &self.any_one
            && let Some(v) = node.get_at(rest)
        {
            return Some(v);
        }
        self.any_rest.as_ref().and_then(|n| n.value.as_ref())
    }

    /// True when a value is stored under exactly this pattern (no wildcard
    /// resolution).
    pub fn contains_pattern(&self, pattern: &str) -> bool {
        let Ok(segments) = split_pattern(pattern) else {
            return false;
        };
        let mut node = self;
        for seg in segments {
            node = match seg {
                "#" => match &node.any_rest {
                    Some(n) => n,
                    None => return false,
                },
                "+" => match &node.any_one {
                    Some(n) => n,
                    None => return false,
                },
                s => match node.children.get(s) {
                    Some(n) => n,
                    None => return false,
                },
            };
        }
        node.value.is_some()
    }

    /// True when no values are stored.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.any_one.is_none()
            && self.any_rest.is_none()
            && self.children.is_empty()
    }
}

fn split_pattern(pattern: &str) -> Result<Vec<&str>, TrieError> {
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(TrieError::InvalidPattern(pattern.to_string()));
    }
    Ok(segments)
}
