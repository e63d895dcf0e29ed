//! Unique-name generation.
//!
//! A [`Namespace`] hands out names that do not collide with anything already
//! registered in it. The first request for a hint returns the hint itself;
//! later requests append `_0`, `_1`, ... until an unused name is found.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Namespace {
    used: HashSet<String>,
    next_suffix: HashMap<String, u32>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing name so it is never handed out.
    pub fn add(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Returns a fresh name derived from `hint` and reserves it.
    pub fn new_name(&mut self, hint: &str) -> String {
        if self.used.insert(hint.to_string()) {
            return hint.to_string();
        }
        let counter = self.next_suffix.entry(hint.to_string()).or_insert(0);
        loop {
            let candidate = format!("{}_{}", hint, counter);
            *counter += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Namespace {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut ns = Namespace::new();
        for name in iter {
            ns.add(name);
        }
        ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_returns_hint() {
        let mut ns = Namespace::new();
        assert_eq!(ns.new_name("nla"), "nla");
        assert_eq!(ns.new_name("nla"), "nla_0");
        assert_eq!(ns.new_name("nla"), "nla_1");
    }

    #[test]
    fn skips_preexisting_suffixed_names() {
        let mut ns: Namespace = ["data", "data_0"].into_iter().collect();
        assert_eq!(ns.new_name("data"), "data_1");
        assert!(ns.contains("data_1"));
    }
}
