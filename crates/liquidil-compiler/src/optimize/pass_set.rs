//! The optimizer pass-selection DSL: `LIQUIDIL_PASSES` is parsed once
//! into an immutable `PassSet` consulted by `Optimizer::run`.
//!
//! Grammar: `spec := (ε | '*' | part (',' part)*)`; `part := int | '-'
//! int | '*'`. Empty string disables all passes; unset enables all; `*`
//! enables all; `-n` removes pass `n`; `n` adds pass `n`. Evaluated
//! left-to-right, so `"2,-2"` cancels out and `"*,-2,-3"` means "all
//! except 2 and 3".

use std::collections::HashSet;
use std::env;

pub const PASS_COUNT: u32 = 23;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassSet {
    enabled: HashSet<u32>,
}

impl PassSet {
    pub fn all() -> Self {
        Self { enabled: (0..PASS_COUNT).collect() }
    }

    pub fn none() -> Self {
        Self { enabled: HashSet::new() }
    }

    pub fn is_enabled(&self, pass: u32) -> bool {
        self.enabled.contains(&pass)
    }

    /// Parses the DSL described above. An unset variable (`None`) enables
    /// every pass, matching "unset enables all".
    pub fn parse(spec: Option<&str>) -> Self {
        let spec = match spec {
            None => return Self::all(),
            Some(s) => s,
        };
        if spec.is_empty() {
            return Self::none();
        }

        let mut set = Self::none();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part == "*" {
                set = Self::all();
                continue;
            }
            if let Some(rest) = part.strip_prefix('-') {
                if let Ok(n) = rest.parse::<u32>() {
                    set.enabled.remove(&n);
                }
                continue;
            }
            if let Ok(n) = part.parse::<u32>() {
                set.enabled.insert(n);
            }
        }
        set
    }

    /// Reads `LIQUIDIL_PASSES` from the process environment. Initialized
    /// once at process start and treated as immutable thereafter.
    pub fn from_env() -> Self {
        Self::parse(env::var("LIQUIDIL_PASSES").ok().as_deref())
    }

    /// Test-only override helper.
    pub fn scoped_override(spec: &str) -> Self {
        Self::parse(Some(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_enables_all() {
        let set = PassSet::parse(None);
        assert!(set.is_enabled(0));
        assert!(set.is_enabled(22));
    }

    #[test]
    fn empty_disables_all() {
        let set = PassSet::parse(Some(""));
        assert!(!set.is_enabled(0));
    }

    #[test]
    fn star_then_exclusions() {
        let set = PassSet::parse(Some("*,-2,-3"));
        assert!(set.is_enabled(1));
        assert!(!set.is_enabled(2));
        assert!(!set.is_enabled(3));
        assert!(set.is_enabled(4));
    }

    #[test]
    fn order_sensitive_cancellation() {
        let set = PassSet::parse(Some("2,-2"));
        assert!(!set.is_enabled(2));

        let set = PassSet::parse(Some("-2,2"));
        assert!(set.is_enabled(2));
    }
}
