//! Versioned cache generation naming.

/// Prefix shared by every cache generation this interceptor owns.
pub const CACHE_PREFIX: &str = "henry-dashboard-";

/// Version tag baked in at build time.
///
/// Override with `SWGATE_CACHE_VERSION` when compiling; bump it on every deploy.
pub const CACHE_VERSION: &str = match option_env!("SWGATE_CACHE_VERSION") {
    Some(version) => version,
    None => "v2.0.0",
};

/// Resources pre-warmed into the current generation at install.
pub const SEED_URLS: &[&str] = &["/henry-dashboard/assets/henry-avatar.jpg"];

/// One named bucket in the cache store, tagged with a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
    version: String,
    name: String,
}

impl CacheGeneration {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self { version: version.to_string(), name: format!("{prefix}{version}") }
    }

    /// The cache name for this generation (`prefix` + `version`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether `name` identifies this generation. Equality only; any other
    /// name is stale, whatever its prefix.
    pub fn is_current(&self, name: &str) -> bool {
        self.name == name
    }
}

impl Default for CacheGeneration {
    fn default() -> Self {
        Self::new(CACHE_PREFIX, CACHE_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_name() {
        let generation = CacheGeneration::new("henry-dashboard-", "v2.0.0");
        assert_eq!(generation.name(), "henry-dashboard-v2.0.0");
        assert_eq!(generation.version(), "v2.0.0");
    }

    #[test]
    fn test_is_current_exact_match_only() {
        let generation = CacheGeneration::new("henry-dashboard-", "v2.0.0");
        assert!(generation.is_current("henry-dashboard-v2.0.0"));
        assert!(!generation.is_current("henry-dashboard-v1.0.0"));
        assert!(!generation.is_current("henry-dashboard-v2.0.0-beta"));
        assert!(!generation.is_current("other-app-v2.0.0"));
    }

    #[test]
    fn test_default_uses_build_constants() {
        let generation = CacheGeneration::default();
        assert!(generation.name().starts_with(CACHE_PREFIX));
        assert_eq!(generation.version(), CACHE_VERSION);
    }
}
