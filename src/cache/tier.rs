//! Tier identity: role, version and the on-storage name derived from them.

use std::fmt;

/// The two cache roles this subsystem owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierRole {
  /// Minimum bootable asset set
  Shell,
  /// Everything mirrored at runtime
  Dynamic,
}

impl TierRole {
  pub const ALL: [TierRole; 2] = [TierRole::Shell, TierRole::Dynamic];

  fn prefix(self) -> &'static str {
    match self {
      TierRole::Shell => "shell-v",
      TierRole::Dynamic => "dynamic-v",
    }
  }

  /// Storage name of this role's tier at `version`.
  pub fn tier_name(self, version: u32) -> String {
    format!("{}{}", self.prefix(), version)
  }

  /// Role owning `name`, if any. Names outside both prefixes belong to
  /// someone else.
  pub fn owning(name: &str) -> Option<TierRole> {
    Self::ALL.into_iter().find(|role| name.starts_with(role.prefix()))
  }
}

impl fmt::Display for TierRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TierRole::Shell => write!(f, "shell"),
      TierRole::Dynamic => write!(f, "dynamic"),
    }
  }
}

/// Version each role's current tier is expected to be at. Bump a version
/// whenever the shell manifest or the caching policy changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierVersions {
  pub shell: u32,
  pub dynamic: u32,
}

impl TierVersions {
  pub fn get(&self, role: TierRole) -> u32 {
    match role {
      TierRole::Shell => self.shell,
      TierRole::Dynamic => self.dynamic,
    }
  }

  pub fn current_name(&self, role: TierRole) -> String {
    role.tier_name(self.get(role))
  }
}

/// Capability to read and write one tier. Only the registry hands these
/// out, so callers never address a tier by a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TierHandle {
  role: TierRole,
  version: u32,
  name: String,
}

impl TierHandle {
  pub(crate) fn new(role: TierRole, version: u32) -> Self {
    Self {
      role,
      version,
      name: role.tier_name(version),
    }
  }

  pub fn role(&self) -> TierRole {
    self.role
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

/// Lifecycle of a role's tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
  Absent,
  Populating,
  Current,
  /// Superseded by a newer version; removed on the next activation
  Stale,
  Evicted,
}
