//! Method name filter.
//!
//! Lets a deployment restrict the pass to an allow-list of methods or
//! shield a deny-list from it, by substring match on the method name.

/// How the pattern list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Only methods matching a pattern run the pass.
    Allow,
    /// Methods matching a pattern skip the pass.
    #[default]
    Deny,
}

/// Substring-based method filter.
#[derive(Debug, Clone, Default)]
pub struct MethodFilter {
    patterns: Vec<String>,
    mode: FilterMode,
}

impl MethodFilter {
    /// Filter that lets every method through.
    pub fn accept_all() -> Self {
        MethodFilter::default()
    }

    /// Allow-list filter: only matching methods run the pass.
    pub fn allow(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        MethodFilter {
            patterns: patterns.into_iter().map(Into::into).collect(),
            mode: FilterMode::Allow,
        }
    }

    /// Deny-list filter: matching methods skip the pass.
    pub fn deny(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        MethodFilter {
            patterns: patterns.into_iter().map(Into::into).collect(),
            mode: FilterMode::Deny,
        }
    }

    /// Whether the pass should run on a method with this name.
    pub fn allows(&self, name: &str) -> bool {
        let matched = self.patterns.iter().any(|p| name.contains(p.as_str()));
        match self.mode {
            FilterMode::Allow => matched,
            FilterMode::Deny => !matched,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accepts_everything() {
        let filter = MethodFilter::accept_all();
        assert!(filter.allows("anything"));
        assert!(filter.allows(""));
    }

    #[test]
    fn test_allow_list() {
        let filter = MethodFilter::allow(["hot_loop", "kernel"]);
        assert!(filter.allows("math::hot_loop"));
        assert!(filter.allows("kernel_main"));
        assert!(!filter.allows("cold_path"));
    }

    #[test]
    fn test_deny_list() {
        let filter = MethodFilter::deny(["debug"]);
        assert!(!filter.allows("debug_dump"));
        assert!(filter.allows("steady_state"));
    }
}
