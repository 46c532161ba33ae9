use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// The three derived results served for a translated model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Manifest,
    Properties,
    Quantities,
}

impl ResultKind {
    pub const ALL: [ResultKind; 3] = [
        ResultKind::Manifest,
        ResultKind::Properties,
        ResultKind::Quantities,
    ];

    /// Cache namespace for this kind.
    pub fn namespace(&self) -> &'static str {
        match self {
            ResultKind::Manifest => "manifest",
            ResultKind::Properties => "properties",
            ResultKind::Quantities => "quantities",
        }
    }

    /// Cache key `<namespace>:<contentId>`.
    pub fn cache_key(&self, content_id: &str) -> String {
        format!("{}:{}", self.namespace(), content_id)
    }

    /// Pattern matching every cached result of one content item.
    pub fn content_pattern(content_id: &str) -> String {
        format!("*:{}", content_id)
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

impl FromStr for ResultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manifest" => Ok(ResultKind::Manifest),
            "properties" => Ok(ResultKind::Properties),
            "quantities" => Ok(ResultKind::Quantities),
            other => Err(format!("Unknown result kind: {}", other)),
        }
    }
}
