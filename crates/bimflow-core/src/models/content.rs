use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Durable description of one content-addressed blob.
///
/// `content_id` is the lowercase hex SHA-256 of the uploaded bytes, computed
/// while they streamed in. `storage_key` always resolves to a blob with that
/// digest; records are never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub content_id: String,
    pub original_name: String,
    pub size: i64,
    pub content_type: String,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

/// Fields of a record that are known before insertion.
#[derive(Debug, Clone)]
pub struct NewContentRecord {
    pub content_id: String,
    pub original_name: String,
    pub size: i64,
    pub content_type: String,
    pub storage_key: String,
}

impl NewContentRecord {
    pub fn into_record(self, created_at: DateTime<Utc>) -> ContentRecord {
        ContentRecord {
            content_id: self.content_id,
            original_name: self.original_name,
            size: self.size,
            content_type: self.content_type,
            storage_key: self.storage_key,
            created_at,
        }
    }
}

/// MIME type recorded for a design file, derived from its extension.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "ifc" => "application/ifc",
        "dwg" => "application/dwg",
        "rvt" => "application/rvt",
        "step" | "stp" => "application/step",
        "gltf" => "model/gltf+json",
        "glb" => "model/gltf-binary",
        "obj" => "model/obj",
        _ => "application/octet-stream",
    }
}
