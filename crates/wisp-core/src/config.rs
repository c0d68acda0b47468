//! Engine configuration.

/// Settings shared by everything rendered in one [`Universe`](crate::Universe).
///
/// # Example
///
/// ```ignore
/// let config = Config::default()
///     .with_warnings(true)
///     .with_debug_markers(true);
/// let universe = Universe::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Emit development-time warnings (implicit re-mounts, missing methods).
    pub warnings: bool,
    /// Surround mount points with comment markers and use comment
    /// placeholders instead of empty text nodes.
    pub debug_markers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warnings: cfg!(debug_assertions),
            debug_markers: false,
        }
    }
}

impl Config {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable development-time warnings.
    pub fn with_warnings(mut self, enabled: bool) -> Self {
        self.warnings = enabled;
        self
    }

    /// Enable or disable debug comment markers.
    pub fn with_debug_markers(mut self, enabled: bool) -> Self {
        self.debug_markers = enabled;
        self
    }
}
