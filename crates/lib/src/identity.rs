//! Operating-system identities used by the privilege-separated executor.
//!
//! An [`Identity`] names a user and a group, either of which may be left
//! unset to keep the corresponding id unchanged. Names can be fixed strings
//! or resolver functions evaluated each time the identity is used, which
//! lets an identity follow values that are only known once configuration
//! has been loaded.

use std::fmt;
use std::sync::Arc;

use nix::unistd::{Gid, Group, Uid, User};

use crate::executor::ExecutorError;

/// Environment variable set by sudo to the invoking user's name.
pub const SUDO_USER_ENV: &str = "SUDO_USER";

/// Environment variable set by sudo to the invoking user's primary gid.
pub const SUDO_GID_ENV: &str = "SUDO_GID";

type Resolver = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Where a user or group name comes from.
#[derive(Clone)]
pub enum NameSource {
  /// A name known up front.
  Fixed(String),
  /// A name computed when the identity is used. `None` means "do not change".
  Lazy(Resolver),
}

impl NameSource {
  pub fn lazy<F>(resolver: F) -> Self
  where
    F: Fn() -> Option<String> + Send + Sync + 'static,
  {
    NameSource::Lazy(Arc::new(resolver))
  }

  /// Evaluate the source. Empty names count as unset.
  pub fn name(&self) -> Option<String> {
    let name = match self {
      NameSource::Fixed(name) => Some(name.clone()),
      NameSource::Lazy(resolver) => resolver(),
    };
    name.filter(|n| !n.is_empty())
  }
}

impl fmt::Debug for NameSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NameSource::Fixed(name) => write!(f, "Fixed({name:?})"),
      NameSource::Lazy(_) => f.write_str("Lazy(..)"),
    }
  }
}

impl From<&str> for NameSource {
  fn from(name: &str) -> Self {
    NameSource::Fixed(name.to_string())
  }
}

impl From<String> for NameSource {
  fn from(name: String) -> Self {
    NameSource::Fixed(name)
  }
}

/// A (user, group) pair an operation runs as.
#[derive(Debug, Clone, Default)]
pub struct Identity {
  pub user: Option<NameSource>,
  pub group: Option<NameSource>,
}

/// Numeric ids an identity resolved to at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIdentity {
  pub uid: Option<Uid>,
  pub gid: Option<Gid>,
}

impl ResolvedIdentity {
  /// True when running as this identity changes nothing.
  pub fn is_unchanged(&self) -> bool {
    self.uid.is_none() && self.gid.is_none()
  }
}

impl Identity {
  /// The identity that keeps both the current user and group.
  pub fn unchanged() -> Self {
    Self::default()
  }

  pub fn new(user: Option<NameSource>, group: Option<NameSource>) -> Self {
    Self { user, group }
  }

  /// The identity that invoked the program, as recorded by sudo.
  ///
  /// Outside of sudo both halves resolve to "unchanged".
  pub fn invoking_user() -> Self {
    Self {
      user: Some(NameSource::lazy(|| std::env::var(SUDO_USER_ENV).ok())),
      group: Some(NameSource::lazy(invoking_group_name)),
    }
  }

  /// Resolve names to numeric ids.
  ///
  /// # Errors
  ///
  /// Returns [`ExecutorError::IdentityResolution`] when a name is not a
  /// known user or group.
  pub fn resolve(&self) -> Result<ResolvedIdentity, ExecutorError> {
    let uid = match self.user.as_ref().and_then(NameSource::name) {
      Some(name) => Some(lookup_user(&name)?),
      None => None,
    };
    let gid = match self.group.as_ref().and_then(NameSource::name) {
      Some(name) => Some(lookup_group(&name)?),
      None => None,
    };
    Ok(ResolvedIdentity { uid, gid })
  }
}

fn lookup_user(name: &str) -> Result<Uid, ExecutorError> {
  match User::from_name(name) {
    Ok(Some(user)) => Ok(user.uid),
    Ok(None) => Err(ExecutorError::IdentityResolution {
      kind: "user",
      name: name.to_string(),
      reason: "no such user".to_string(),
    }),
    Err(e) => Err(ExecutorError::IdentityResolution {
      kind: "user",
      name: name.to_string(),
      reason: e.to_string(),
    }),
  }
}

fn lookup_group(name: &str) -> Result<Gid, ExecutorError> {
  match Group::from_name(name) {
    Ok(Some(group)) => Ok(group.gid),
    Ok(None) => Err(ExecutorError::IdentityResolution {
      kind: "group",
      name: name.to_string(),
      reason: "no such group".to_string(),
    }),
    Err(e) => Err(ExecutorError::IdentityResolution {
      kind: "group",
      name: name.to_string(),
      reason: e.to_string(),
    }),
  }
}

/// Name of the group whose id sudo recorded, if any.
fn invoking_group_name() -> Option<String> {
  let raw = std::env::var(SUDO_GID_ENV).ok()?;
  let gid = raw.trim().parse::<u32>().ok()?;
  Group::from_gid(Gid::from_raw(gid)).ok().flatten().map(|g| g.name)
}

/// Whether the current process runs with an effective uid of 0.
pub fn is_elevated() -> bool {
  nix::unistd::geteuid().is_root()
}

/// Name of the user the current process runs as, when it has one.
pub fn current_user_name() -> Option<String> {
  User::from_uid(nix::unistd::geteuid()).ok().flatten().map(|u| u.name)
}

/// Name of the group the current process runs as, when it has one.
pub fn current_group_name() -> Option<String> {
  Group::from_gid(nix::unistd::getegid()).ok().flatten().map(|g| g.name)
}
