//! Engine configuration.

/// What a local save does when the payload hash did not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Every save bumps `local_version` and marks the record dirty.
    #[default]
    AlwaysBump,
    /// A save whose content hash equals the stored one is a no-op.
    SkipUnchanged,
}

/// How an incoming state with the same `server_version` as a clean local
/// record is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqualVersionPolicy {
    /// Overwrite the local record again (accept-if-not-newer).
    #[default]
    Reapply,
    /// Reject as already applied.
    Ignore,
}

/// Configuration for a [`crate::SyncEngine`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Behaviour of saves that do not change content.
    pub save_policy: SavePolicy,
    /// Behaviour of equal-version remote states.
    pub equal_version_policy: EqualVersionPolicy,
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the save policy.
    #[must_use]
    pub const fn save_policy(mut self, policy: SavePolicy) -> Self {
        self.save_policy = policy;
        self
    }

    /// Sets the equal-version policy.
    #[must_use]
    pub const fn equal_version_policy(mut self, policy: EqualVersionPolicy) -> Self {
        self.equal_version_policy = policy;
        self
    }
}
