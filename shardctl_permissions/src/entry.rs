//! Permission entries built from the rows of the grant tables.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

const HOST_FIELD: &str = "Host";
const USER_FIELD: &str = "User";
const DB_FIELD: &str = "Db";
const PASSWORD_FIELD: &str = "Password";

/// The three kinds of permission held by a database instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionKind {
    User,
    Db,
    Host,
}

impl PermissionKind {
    /// Lower case label used in mismatch messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Db => "db",
            Self::Host => "host",
        }
    }

    /// Capitalized name used as a section header in reports
    pub fn title(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Db => "Db",
            Self::Host => "Host",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Describes one column of a query result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
}

impl Field {
    /// A column called `name`, matched case-sensitively
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Behaviour shared by [`UserPermission`], [`DbPermission`] and [`HostPermission`]
///
/// The [`Display`][fmt::Display] output is the rendering compared between two instances when
/// their primary keys match.
pub trait PermissionEntry: fmt::Display {
    /// Which kind of permission this is
    const KIND: PermissionKind;

    /// The identity fields joined with `:`, used to sort and match entries
    fn primary_key(&self) -> String;
}

const PASSWORD_CRC: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_GO_ISO);

/// Checksum of a password, so passwords can be compared without being kept around.
///
/// CRC-64 with the ISO polynomial, inverted on input and output, so checksums match the ones
/// recorded by other tools that snapshot the grant tables. This is only used to detect drift and
/// is not a security measure. An empty password has a checksum of 0, which is rendered as
/// `NoPassword`.
pub fn password_checksum(password: &str) -> u64 {
    PASSWORD_CRC.checksum(password.as_bytes())
}

fn assert_row_shape<V>(fields: &[Field], values: &[V]) {
    assert_eq!(
        fields.len(),
        values.len(),
        "permission row has {} fields but {} values",
        fields.len(),
        values.len()
    );
}

fn write_privileges(
    f: &mut fmt::Formatter<'_>,
    privileges: &BTreeMap<String, String>,
) -> fmt::Result {
    for (name, value) in privileges {
        write!(f, " {name}({value})")?;
    }
    Ok(())
}

/// A row of the `user` grant table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPermission {
    pub host: String,
    pub user: String,
    pub password_checksum: u64,
    pub privileges: BTreeMap<String, String>,
}

impl UserPermission {
    /// Build a [`UserPermission`] from a result row.
    ///
    /// # Panics
    ///
    /// If `fields` and `values` do not have the same length.
    pub fn new<V: fmt::Display>(fields: &[Field], values: &[V]) -> Self {
        assert_row_shape(fields, values);

        let mut up = Self::default();
        for (field, value) in fields.iter().zip(values) {
            match field.name.as_str() {
                HOST_FIELD => up.host = value.to_string(),
                USER_FIELD => up.user = value.to_string(),
                PASSWORD_FIELD => up.password_checksum = password_checksum(&value.to_string()),
                _ => {
                    up.privileges.insert(field.name.clone(), value.to_string());
                }
            }
        }
        up
    }
}

impl PermissionEntry for UserPermission {
    const KIND: PermissionKind = PermissionKind::User;

    fn primary_key(&self) -> String {
        format!("{}:{}", self.host, self.user)
    }
}

impl fmt::Display for UserPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserPermission ")?;
        if self.password_checksum == 0 {
            f.write_str("NoPassword")?;
        } else {
            write!(f, "PasswordChecksum({})", self.password_checksum)?;
        }
        write_privileges(f, &self.privileges)
    }
}

/// A row of the `db` grant table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbPermission {
    pub host: String,
    pub db: String,
    pub user: String,
    pub privileges: BTreeMap<String, String>,
}

impl DbPermission {
    /// Build a [`DbPermission`] from a result row.
    ///
    /// # Panics
    ///
    /// If `fields` and `values` do not have the same length.
    pub fn new<V: fmt::Display>(fields: &[Field], values: &[V]) -> Self {
        assert_row_shape(fields, values);

        let mut dp = Self::default();
        for (field, value) in fields.iter().zip(values) {
            match field.name.as_str() {
                HOST_FIELD => dp.host = value.to_string(),
                DB_FIELD => dp.db = value.to_string(),
                USER_FIELD => dp.user = value.to_string(),
                _ => {
                    dp.privileges.insert(field.name.clone(), value.to_string());
                }
            }
        }
        dp
    }
}

impl PermissionEntry for DbPermission {
    const KIND: PermissionKind = PermissionKind::Db;

    fn primary_key(&self) -> String {
        format!("{}:{}:{}", self.host, self.db, self.user)
    }
}

impl fmt::Display for DbPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DbPermission")?;
        write_privileges(f, &self.privileges)
    }
}

/// A row of the `host` grant table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPermission {
    pub host: String,
    pub db: String,
    pub privileges: BTreeMap<String, String>,
}

impl HostPermission {
    /// Build a [`HostPermission`] from a result row.
    ///
    /// # Panics
    ///
    /// If `fields` and `values` do not have the same length.
    pub fn new<V: fmt::Display>(fields: &[Field], values: &[V]) -> Self {
        assert_row_shape(fields, values);

        let mut hp = Self::default();
        for (field, value) in fields.iter().zip(values) {
            match field.name.as_str() {
                HOST_FIELD => hp.host = value.to_string(),
                DB_FIELD => hp.db = value.to_string(),
                _ => {
                    hp.privileges.insert(field.name.clone(), value.to_string());
                }
            }
        }
        hp
    }
}

impl PermissionEntry for HostPermission {
    const KIND: PermissionKind = PermissionKind::Host;

    fn primary_key(&self) -> String {
        format!("{}:{}", self.host, self.db)
    }
}

impl fmt::Display for HostPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostPermission")?;
        write_privileges(f, &self.privileges)
    }
}
