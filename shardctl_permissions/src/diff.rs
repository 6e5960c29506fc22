//! Find the differences between the permissions of two database instances.

use std::cmp::Ordering;

use shardctl_concurrency::{AllErrorRecorder, ErrorRecorder};

use crate::{
    Permissions,
    entry::{PermissionEntry, PermissionKind},
    list::PermissionList,
};

/// A difference found between two permission sets
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionMismatch {
    #[error("{side} has an extra {kind} {primary_key}")]
    Extra {
        kind: PermissionKind,
        side: String,
        primary_key: String,
    },

    #[error(
        "{left} and {right} disagree on {kind} {primary_key}:\n{left_value}\n differs from:\n{right_value}"
    )]
    Disagree {
        kind: PermissionKind,
        left: String,
        right: String,
        primary_key: String,
        left_value: String,
        right_value: String,
    },
}

impl PermissionMismatch {
    fn extra(kind: PermissionKind, side: &str, primary_key: &str) -> Self {
        Self::Extra {
            kind,
            side: side.to_string(),
            primary_key: primary_key.to_string(),
        }
    }

    /// The primary key the mismatch is about
    pub fn primary_key(&self) -> &str {
        match self {
            Self::Extra { primary_key, .. } | Self::Disagree { primary_key, .. } => primary_key,
        }
    }

    /// The kind of entry the mismatch is about
    pub fn kind(&self) -> PermissionKind {
        match self {
            Self::Extra { kind, .. } | Self::Disagree { kind, .. } => *kind,
        }
    }
}

/// Merge two lists of the same kind, recording a [`PermissionMismatch`] for every key present
/// on one side only and for every shared key whose renderings differ.
///
/// Both lists are in primary key order, which makes this a single pass over each.
pub fn diff_permission_lists<T, R>(
    left_name: &str,
    left: &PermissionList<'_, T>,
    right_name: &str,
    right: &PermissionList<'_, T>,
    recorder: &R,
) where
    T: PermissionEntry,
    R: ErrorRecorder + ?Sized,
{
    let kind = T::KIND;
    let record = |m: PermissionMismatch| recorder.record_error(Box::new(m));

    let mut left_index = 0;
    let mut right_index = 0;
    while left_index < left.len() && right_index < right.len() {
        let lpk = left.primary_key(left_index);
        let rpk = right.primary_key(right_index);

        match lpk.cmp(rpk) {
            Ordering::Less => {
                record(PermissionMismatch::extra(kind, left_name, lpk));
                left_index += 1;
            }
            Ordering::Greater => {
                record(PermissionMismatch::extra(kind, right_name, rpk));
                right_index += 1;
            }
            Ordering::Equal => {
                let (_, left_value) = left.get(left_index);
                let (_, right_value) = right.get(right_index);
                if left_value != right_value {
                    record(PermissionMismatch::Disagree {
                        kind,
                        left: left_name.to_string(),
                        right: right_name.to_string(),
                        primary_key: lpk.to_string(),
                        left_value,
                        right_value,
                    });
                }
                left_index += 1;
                right_index += 1;
            }
        }
    }

    for index in left_index..left.len() {
        record(PermissionMismatch::extra(kind, left_name, left.primary_key(index)));
    }
    for index in right_index..right.len() {
        record(PermissionMismatch::extra(kind, right_name, right.primary_key(index)));
    }
}

/// Record every difference between `left` and `right` into `recorder`.
///
/// User permissions are compared first, then db and host permissions. Within a kind,
/// mismatches are recorded in primary key order. The names are only used in the messages.
pub fn diff_permissions<R>(
    left_name: &str,
    left: &Permissions,
    right_name: &str,
    right: &Permissions,
    recorder: &R,
) where
    R: ErrorRecorder + ?Sized,
{
    diff_permission_lists(
        left_name,
        &PermissionList::new(&left.user_permissions),
        right_name,
        &PermissionList::new(&right.user_permissions),
        recorder,
    );
    diff_permission_lists(
        left_name,
        &PermissionList::new(&left.db_permissions),
        right_name,
        &PermissionList::new(&right.db_permissions),
        recorder,
    );
    diff_permission_lists(
        left_name,
        &PermissionList::new(&left.host_permissions),
        right_name,
        &PermissionList::new(&right.host_permissions),
        recorder,
    );
}

/// Diff two permission sets, returning the mismatch messages, or `None` if they agree.
pub fn diff_permissions_to_vec(
    left_name: &str,
    left: &Permissions,
    right_name: &str,
    right: &Permissions,
) -> Option<Vec<String>> {
    let recorder = AllErrorRecorder::new();
    diff_permissions(left_name, left, right_name, right, &recorder);
    recorder.has_errors().then(|| recorder.error_strings())
}
