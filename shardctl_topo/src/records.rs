//! The records of the serving graph, stored as JSON under one node each.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A record stored whole under a single node of the serving graph
pub trait ServingRecord:
    fmt::Debug + Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
    /// Name used in error messages and logs
    const NAME: &'static str;
}

/// The role of a tablet, which decides what traffic it serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    Master,
    Replica,
    Rdonly,
    Spare,
    Experimental,
    Backup,
    Restore,
    Drained,
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Master => "master",
            Self::Replica => "replica",
            Self::Rdonly => "rdonly",
            Self::Spare => "spare",
            Self::Experimental => "experimental",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Drained => "drained",
        };
        f.write_str(s)
    }
}

/// Type of the column a keyspace is sharded on
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum KeyspaceIdType {
    #[default]
    Unset,
    Uint64,
    Bytes,
}

/// Half-open range `[start, end)` of keyspace ids, hex encoded. An empty bound is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRange {
    pub start: String,
    pub end: String,
}

impl KeyRange {
    /// The range `[start, end)`, either bound empty for unbounded
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether the hex encoded keyspace id `id` falls in this range
    pub fn contains(&self, id: &str) -> bool {
        let id = id.to_ascii_lowercase();
        (self.start.is_empty() || id.as_str() >= self.start.to_ascii_lowercase().as_str())
            && (self.end.is_empty() || id.as_str() < self.end.to_ascii_lowercase().as_str())
    }
}

/// A shard and the keyspace ids it owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardReference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_range: Option<KeyRange>,
}

/// The shards serving one tablet type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspacePartition {
    pub served_type: TabletType,
    #[serde(default)]
    pub shard_references: Vec<ShardReference>,
}

/// Traffic of `tablet_type` is redirected to `keyspace`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedFrom {
    pub tablet_type: TabletType,
    pub keyspace: String,
}

/// Serving descriptor of a keyspace in one cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrvKeyspace {
    pub partitions: Vec<KeyspacePartition>,
    pub sharding_column_name: String,
    pub sharding_column_type: KeyspaceIdType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub served_from: Vec<ServedFrom>,
}

impl SrvKeyspace {
    /// The shards serving `tablet_type`, if any
    pub fn partition(&self, tablet_type: TabletType) -> Option<&KeyspacePartition> {
        self.partitions
            .iter()
            .find(|p| p.served_type == tablet_type)
    }

    /// The keyspace serving `tablet_type` instead of this one, if any
    pub fn served_from(&self, tablet_type: TabletType) -> Option<&str> {
        self.served_from
            .iter()
            .find(|s| s.tablet_type == tablet_type)
            .map(|s| s.keyspace.as_str())
    }
}

impl ServingRecord for SrvKeyspace {
    const NAME: &'static str = "SrvKeyspace";
}

/// Schema routing rules of every keyspace in one cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrvVSchema {
    pub keyspaces: BTreeMap<String, KeyspaceVSchema>,
}

impl SrvVSchema {
    /// The routing rules of keyspace `name`
    pub fn keyspace(&self, name: &str) -> Option<&KeyspaceVSchema> {
        self.keyspaces.get(name)
    }
}

impl ServingRecord for SrvVSchema {
    const NAME: &'static str = "SrvVSchema";
}

/// Routing rules of one keyspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyspaceVSchema {
    pub sharded: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub vindexes: BTreeMap<String, Vindex>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, Table>,
}

/// A function mapping column values to keyspace ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vindex {
    #[serde(rename = "type")]
    pub vindex_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner: String,
}

/// How the rows of a table are routed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub table_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub column_vindexes: Vec<ColumnVindex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<AutoIncrement>,
}

/// Routes on `column` with the vindex called `name`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnVindex {
    pub column: String,
    pub name: String,
}

/// `column` takes its values from `sequence`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoIncrement {
    pub column: String,
    pub sequence: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range() {
        let r = KeyRange::new("40", "80");
        assert!(r.contains("40"));
        assert!(r.contains("7f"));
        assert!(r.contains("7FFF"));
        assert!(!r.contains("80"));
        assert!(!r.contains("3f"));

        let all = KeyRange::default();
        assert!(all.contains(""));
        assert!(all.contains("ff"));
    }

    #[test]
    fn partitions() {
        let ks = SrvKeyspace {
            partitions: vec![KeyspacePartition {
                served_type: TabletType::Replica,
                shard_references: vec![ShardReference {
                    name: "-80".into(),
                    key_range: Some(KeyRange::new("", "80")),
                }],
            }],
            served_from: vec![ServedFrom {
                tablet_type: TabletType::Rdonly,
                keyspace: "source".into(),
            }],
            ..Default::default()
        };

        assert_eq!(
            ks.partition(TabletType::Replica).unwrap().shard_references[0].name,
            "-80"
        );
        assert!(ks.partition(TabletType::Master).is_none());
        assert_eq!(ks.served_from(TabletType::Rdonly), Some("source"));
        assert_eq!(ks.served_from(TabletType::Replica), None);
    }

    #[test]
    fn json_format() {
        let ks: SrvKeyspace = serde_json::from_str(
            r#"{
                "partitions": [
                    {"served_type": "master", "shard_references": [{"name": "0"}]}
                ],
                "sharding_column_name": "user_id",
                "sharding_column_type": "uint64"
            }"#,
        )
        .unwrap();
        assert_eq!(ks.partitions[0].served_type, TabletType::Master);
        assert_eq!(ks.sharding_column_type, KeyspaceIdType::Uint64);
        assert!(ks.served_from.is_empty());

        let vschema: SrvVSchema = serde_json::from_str(
            r#"{"keyspaces": {"user": {
                "sharded": true,
                "vindexes": {"hash": {"type": "hash"}},
                "tables": {"users": {"column_vindexes": [{"column": "id", "name": "hash"}]}}
            }}}"#,
        )
        .unwrap();
        let user = vschema.keyspace("user").unwrap();
        assert!(user.sharded);
        assert_eq!(user.vindexes["hash"].vindex_type, "hash");
        assert_eq!(user.tables["users"].column_vindexes[0].column, "id");

        let json = serde_json::to_string(&user.vindexes["hash"]).unwrap();
        assert_eq!(json, r#"{"type":"hash"}"#);
    }
}
