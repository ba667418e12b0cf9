//! Per-state interop configuration.
//!
//! [`InteropConfig`] controls how a [`State`](crate::State) behaves at the host boundary:
//! how reflected userdata react to unknown members, how deep the value stack and the native
//! call chain may grow, and whether host panics are caught at the thunk boundary.
//!
//! Configuration is owned by each state. There is no process-global policy; two states in
//! the same process can use different missing-member policies.
//!
//! # Presets
//!
//! - [`InteropConfig::default()`] - Lenient lookups, generous limits
//! - [`InteropConfig::strict()`] - Unknown members raise errors
//! - [`InteropConfig::constrained()`] - Small limits for sandboxed embedding
//!
//! # Example
//!
//! ```rust
//! use luainterop::{InteropConfig, MissingMemberPolicy, State};
//!
//! let config = InteropConfig::new()
//!     .with_missing_member(MissingMemberPolicy::RaiseError)
//!     .with_max_call_depth(64);
//!
//! let state = State::with_config(config);
//! assert_eq!(state.config().max_call_depth, 64);
//! ```

use bitflags::bitflags;

/// How reflected userdata handle reads and writes of members they do not expose.
///
/// Choosing between the two:
///
/// - Use [`ReturnNil`](Self::ReturnNil) when scripts probe for optional members
/// - Use [`RaiseError`](Self::RaiseError) to surface typos in scripts early
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingMemberPolicy {
    /// Reads of unknown members return nil; rejected writes are ignored.
    #[default]
    ReturnNil,

    /// Reads of unknown members raise `attempt to index <name> on a userdata value`;
    /// writes to unknown or read-only members raise as well.
    RaiseError,
}

bitflags! {
    /// Standard library subsets requested for a state.
    ///
    /// The interop layer does not interpret these flags; they are carried for the embedding
    /// that opens libraries on a state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Libraries: u32 {
        /// Base functions
        const BASE = 1 << 0;
        /// Module loading
        const PACKAGE = 1 << 1;
        /// Coroutines
        const COROUTINE = 1 << 2;
        /// String manipulation
        const STRING = 1 << 3;
        /// UTF-8 support
        const UTF8 = 1 << 4;
        /// Table manipulation
        const TABLE = 1 << 5;
        /// Mathematical functions
        const MATH = 1 << 6;
        /// Input and output
        const IO = 1 << 7;
        /// Operating system facilities
        const OS = 1 << 8;
        /// Debug facilities
        const DEBUG = 1 << 9;
        /// Every library
        const ALL = Self::BASE.bits()
            | Self::PACKAGE.bits()
            | Self::COROUTINE.bits()
            | Self::STRING.bits()
            | Self::UTF8.bits()
            | Self::TABLE.bits()
            | Self::MATH.bits()
            | Self::IO.bits()
            | Self::OS.bits()
            | Self::DEBUG.bits();
    }
}

/// Configuration of a [`State`](crate::State).
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `missing_member` | [`MissingMemberPolicy::ReturnNil`] |
/// | `max_stack_depth` | 1,000,000 slots |
/// | `max_call_depth` | 200 |
/// | `max_conversion_depth` | 64 |
/// | `catch_panics` | true |
/// | `libraries` | [`Libraries::ALL`] |
#[derive(Clone, Debug)]
pub struct InteropConfig {
    /// Policy for unknown members on reflected userdata.
    pub missing_member: MissingMemberPolicy,

    /// Maximum number of slots on the value stack.
    ///
    /// Pushing past this limit fails with
    /// [`Error::StackOverflow`](crate::Error::StackOverflow).
    pub max_stack_depth: usize,

    /// Maximum nesting of native calls.
    ///
    /// Bounds script → host → script recursion.
    pub max_call_depth: usize,

    /// Maximum nesting when converting tables into host maps.
    ///
    /// Protects against self-referencing tables.
    pub max_conversion_depth: usize,

    /// Catch host panics at the thunk boundary and convert them into runtime errors.
    ///
    /// Disabling this lets panics unwind into the host caller of the runtime; only do so in
    /// tests that want the original panic.
    pub catch_panics: bool,

    /// Library subsets requested for this state.
    pub libraries: Libraries,
}

impl Default for InteropConfig {
    fn default() -> Self {
        InteropConfig {
            missing_member: MissingMemberPolicy::ReturnNil,
            max_stack_depth: 1_000_000,
            max_call_depth: 200,
            max_conversion_depth: 64,
            catch_panics: true,
            libraries: Libraries::ALL,
        }
    }
}

impl InteropConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration where unknown members raise errors.
    ///
    /// Every other setting keeps its default.
    pub fn strict() -> Self {
        InteropConfig {
            missing_member: MissingMemberPolicy::RaiseError,
            ..Default::default()
        }
    }

    /// Creates a configuration with small limits for sandboxed embedding.
    ///
    /// - **Stack**: 8,192 slots
    /// - **Calls**: 32 nested native calls
    /// - **Conversion**: 16 nested tables
    /// - **Libraries**: base, string, table and math only
    pub fn constrained() -> Self {
        InteropConfig {
            missing_member: MissingMemberPolicy::RaiseError,
            max_stack_depth: 8_192,
            max_call_depth: 32,
            max_conversion_depth: 16,
            catch_panics: true,
            libraries: Libraries::BASE | Libraries::STRING | Libraries::TABLE | Libraries::MATH,
        }
    }

    /// Sets the missing-member policy.
    ///
    /// # Returns
    ///
    /// Returns `self` for method chaining.
    pub fn with_missing_member(mut self, policy: MissingMemberPolicy) -> Self {
        self.missing_member = policy;
        self
    }

    /// Sets the maximum number of stack slots.
    pub fn with_max_stack_depth(mut self, max: usize) -> Self {
        self.max_stack_depth = max;
        self
    }

    /// Sets the maximum native call nesting.
    pub fn with_max_call_depth(mut self, max: usize) -> Self {
        self.max_call_depth = max;
        self
    }

    /// Sets the maximum table nesting for host conversions.
    pub fn with_max_conversion_depth(mut self, max: usize) -> Self {
        self.max_conversion_depth = max;
        self
    }

    /// Enables or disables catching host panics.
    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Sets the requested library subsets.
    pub fn with_libraries(mut self, libraries: Libraries) -> Self {
        self.libraries = libraries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InteropConfig::default();
        assert_eq!(config.missing_member, MissingMemberPolicy::ReturnNil);
        assert_eq!(config.max_call_depth, 200);
        assert!(config.catch_panics);
        assert!(config.libraries.contains(Libraries::DEBUG));
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            InteropConfig::strict().missing_member,
            MissingMemberPolicy::RaiseError
        );
        let constrained = InteropConfig::constrained();
        assert!(constrained.max_stack_depth < InteropConfig::default().max_stack_depth);
        assert!(!constrained.libraries.contains(Libraries::IO));
    }

    #[test]
    fn test_builder_chain() {
        let config = InteropConfig::new()
            .with_max_stack_depth(16)
            .with_max_conversion_depth(2)
            .with_catch_panics(false)
            .with_libraries(Libraries::BASE);
        assert_eq!(config.max_stack_depth, 16);
        assert_eq!(config.max_conversion_depth, 2);
        assert!(!config.catch_panics);
        assert_eq!(config.libraries, Libraries::BASE);
    }
}
