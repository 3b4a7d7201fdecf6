//! Table layout as far as browsing is concerned.
//!
//! [`TableInfo`] condenses a `DescribeTable` response into the key attributes and the
//! indexes that can currently be queried. Global secondary indexes which are still being
//! created (or deleted) are left out. Local secondary indexes share the table's lifecycle
//! and are always listed.

use aws_sdk_dynamodb::types::{
    GlobalSecondaryIndexDescription, IndexStatus, KeySchemaElement, KeyType,
    LocalSecondaryIndexDescription, Projection, ProjectionType, TableDescription,
};
use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IndexKind {
    #[serde(rename = "GSI")]
    Global,
    #[serde(rename = "LSI")]
    Local,
}

/// Which attributes an index copies from the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionKind {
    All,
    KeysOnly,
    Include,
}

impl ProjectionKind {
    fn from_projection(projection: Option<&Projection>) -> Self {
        match projection.and_then(Projection::projection_type) {
            Some(ProjectionType::KeysOnly) => ProjectionKind::KeysOnly,
            Some(ProjectionType::Include) => ProjectionKind::Include,
            _ => ProjectionKind::All,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    pub kind: IndexKind,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub projection: ProjectionKind,
    /// Non-key attributes copied by an `INCLUDE` projection.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub projected_attributes: Vec<String>,
    /// Only reported for global indexes.
    pub status: Option<String>,
}

impl IndexInfo {
    fn from_global(index: &GlobalSecondaryIndexDescription) -> Self {
        let (partition_key, sort_key) = key_names(index.key_schema());
        IndexInfo {
            name: index.index_name().unwrap_or_default().to_string(),
            kind: IndexKind::Global,
            partition_key,
            sort_key,
            projection: ProjectionKind::from_projection(index.projection()),
            projected_attributes: projected_attributes(index.projection()),
            status: index.index_status().map(|status| status.as_str().to_string()),
        }
    }

    fn from_local(index: &LocalSecondaryIndexDescription) -> Self {
        let (partition_key, sort_key) = key_names(index.key_schema());
        IndexInfo {
            name: index.index_name().unwrap_or_default().to_string(),
            kind: IndexKind::Local,
            partition_key,
            sort_key,
            projection: ProjectionKind::from_projection(index.projection()),
            projected_attributes: projected_attributes(index.projection()),
            status: None,
        }
    }
}

/// Keys and usable indexes of a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    pub status: String,
    pub item_count: u64,
    pub size_bytes: u64,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub indexes: Vec<IndexInfo>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TableInfo {
    pub fn from_description(description: &TableDescription) -> Self {
        let (partition_key, sort_key) = key_names(description.key_schema());

        let global = description
            .global_secondary_indexes()
            .iter()
            .filter(|index| index.index_status() == Some(&IndexStatus::Active))
            .map(IndexInfo::from_global);
        let local = description
            .local_secondary_indexes()
            .iter()
            .map(IndexInfo::from_local);

        TableInfo {
            name: description.table_name().unwrap_or_default().to_string(),
            status: description
                .table_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            item_count: non_negative(description.item_count()),
            size_bytes: non_negative(description.table_size_bytes()),
            partition_key,
            sort_key,
            indexes: global.chain(local).collect(),
            created_at: description
                .creation_date_time()
                .and_then(|created| DateTime::from_timestamp(created.secs(), created.subsec_nanos())),
        }
    }

    /// Returns the key attributes of the table itself or of the named index.
    pub fn key_for(&self, index_name: Option<&str>) -> Option<(&str, Option<&str>)> {
        match index_name {
            None => Some((self.partition_key.as_str(), self.sort_key.as_deref())),
            Some(name) => self
                .indexes
                .iter()
                .find(|index| index.name == name)
                .map(|index| (index.partition_key.as_str(), index.sort_key.as_deref())),
        }
    }

    pub fn index(&self, index_name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|index| index.name == index_name)
    }

    /// The approximate table size in human readable form.
    pub fn display_size(&self) -> String {
        ByteSize::b(self.size_bytes).to_string()
    }
}

fn key_names(key_schema: &[KeySchemaElement]) -> (String, Option<String>) {
    let find = |key_type: KeyType| {
        key_schema
            .iter()
            .find(|element| element.key_type() == &key_type)
            .map(|element| element.attribute_name().to_string())
    };

    (find(KeyType::Hash).unwrap_or_default(), find(KeyType::Range))
}

fn projected_attributes(projection: Option<&Projection>) -> Vec<String> {
    projection
        .map(|projection| projection.non_key_attributes().to_vec())
        .unwrap_or_default()
}

fn non_negative(value: Option<i64>) -> u64 {
    value
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::TableStatus;

    fn key(name: &str, key_type: KeyType) -> KeySchemaElement {
        KeySchemaElement::builder()
            .attribute_name(name)
            .key_type(key_type)
            .build()
            .unwrap()
    }

    fn gsi(name: &str, status: IndexStatus) -> GlobalSecondaryIndexDescription {
        GlobalSecondaryIndexDescription::builder()
            .index_name(name)
            .key_schema(key(&format!("{}_pk", name), KeyType::Hash))
            .projection(
                Projection::builder()
                    .projection_type(ProjectionType::Include)
                    .non_key_attributes("total")
                    .build(),
            )
            .index_status(status)
            .build()
    }

    /// `orders` keyed by `pk`/`sk` with an active GSI `by-status`, a GSI `by-owner` still in
    /// creation and an LSI `by-date`.
    pub(crate) fn orders_description() -> TableDescription {
        TableDescription::builder()
            .table_name("orders")
            .table_status(TableStatus::Active)
            .item_count(42)
            .table_size_bytes(2048)
            .key_schema(key("pk", KeyType::Hash))
            .key_schema(key("sk", KeyType::Range))
            .global_secondary_indexes(gsi("by-status", IndexStatus::Active))
            .global_secondary_indexes(gsi("by-owner", IndexStatus::Creating))
            .local_secondary_indexes(
                LocalSecondaryIndexDescription::builder()
                    .index_name("by-date")
                    .key_schema(key("pk", KeyType::Hash))
                    .key_schema(key("created", KeyType::Range))
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::KeysOnly)
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    #[test]
    fn maps_key_schema_to_partition_and_sort_key() {
        let info = TableInfo::from_description(&orders_description());

        assert_eq!(info.name, "orders");
        assert_eq!(info.status, "ACTIVE");
        assert_eq!(info.item_count, 42);
        assert_eq!(info.size_bytes, 2048);
        assert_eq!(info.partition_key, "pk");
        assert_eq!(info.sort_key.as_deref(), Some("sk"));
        assert_eq!(info.created_at, None);
    }

    #[test]
    fn drops_inactive_global_indexes_and_keeps_local_ones() {
        let info = TableInfo::from_description(&orders_description());

        let names = info
            .indexes
            .iter()
            .map(|index| index.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["by-status", "by-date"]);

        let status = info.index("by-status").unwrap();
        assert_eq!(status.kind, IndexKind::Global);
        assert_eq!(status.partition_key, "by-status_pk");
        assert_eq!(status.sort_key, None);
        assert_eq!(status.projection, ProjectionKind::Include);
        assert_eq!(status.projected_attributes, vec!["total"]);
        assert_eq!(status.status.as_deref(), Some("ACTIVE"));

        let date = info.index("by-date").unwrap();
        assert_eq!(date.kind, IndexKind::Local);
        assert_eq!(date.sort_key.as_deref(), Some("created"));
        assert_eq!(date.projection, ProjectionKind::KeysOnly);
        assert_eq!(date.status, None);
    }

    #[test]
    fn resolves_keys_of_table_and_indexes() {
        let info = TableInfo::from_description(&orders_description());

        assert_eq!(info.key_for(None), Some(("pk", Some("sk"))));
        assert_eq!(info.key_for(Some("by-date")), Some(("pk", Some("created"))));
        assert_eq!(info.key_for(Some("by-status")), Some(("by-status_pk", None)));
        assert_eq!(info.key_for(Some("by-owner")), None);
    }

    #[test]
    fn tolerates_sparse_descriptions() {
        let info = TableInfo::from_description(&TableDescription::builder().build());

        assert_eq!(info.name, "");
        assert_eq!(info.partition_key, "");
        assert_eq!(info.sort_key, None);
        assert!(info.indexes.is_empty());
        assert_eq!(info.item_count, 0);
    }

    #[test]
    fn serializes_index_kinds_in_short_form() {
        let info = TableInfo::from_description(&orders_description());
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["partitionKey"], "pk");
        assert_eq!(json["indexes"][0]["kind"], "GSI");
        assert_eq!(json["indexes"][1]["kind"], "LSI");
        assert_eq!(json["indexes"][1]["projection"], "KEYS_ONLY");
    }
}
