//! Compare the access-control state of two database instances.
//!
//! A [`Permissions`] snapshot holds the rows of the `user`, `db` and `host` grant tables of one
//! instance. Two snapshots are compared with [`diff_permissions`], which records every
//! [`PermissionMismatch`] into a caller-provided [`ErrorRecorder`], or with
//! [`diff_permissions_to_vec`] which returns the mismatch messages directly.
//!
//! Snapshots can be in any order: entries are matched on their primary key (their identity
//! fields joined with `:`), so the same two snapshots always produce the same diff.
//!
//! [`ErrorRecorder`]: shardctl_concurrency::ErrorRecorder
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod diff;
pub mod entry;
pub mod list;

pub use diff::{
    PermissionMismatch, diff_permission_lists, diff_permissions, diff_permissions_to_vec,
};
pub use entry::{
    DbPermission, Field, HostPermission, PermissionEntry, PermissionKind, UserPermission,
    password_checksum,
};
pub use list::PermissionList;

/// All the permissions of one database instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub user_permissions: Vec<UserPermission>,
    pub db_permissions: Vec<DbPermission>,
    pub host_permissions: Vec<HostPermission>,
}

impl Permissions {
    /// A multi-line report of every permission, see the [`Display`][fmt::Display] impl
    pub fn permissions_string(&self) -> String {
        self.to_string()
    }
}

fn write_section<T: PermissionEntry>(f: &mut fmt::Formatter<'_>, entries: &[T]) -> fmt::Result {
    writeln!(f, "{} Permissions:", T::KIND.title())?;
    for (primary_key, entry) in PermissionList::new(entries).iter() {
        writeln!(f, "  {primary_key}: {entry}")?;
    }
    Ok(())
}

/// Prints the user, db and host permissions in that order, each entry on its own line in
/// primary key order. The output only depends on the set of entries, not on their order.
impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, &self.user_permissions)?;
        write_section(f, &self.db_permissions)?;
        write_section(f, &self.host_permissions)
    }
}
