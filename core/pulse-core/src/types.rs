//! Heartbeat record and its activity category.

use serde::{Deserialize, Serialize};

/// Activity classification attached to a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "debugging")]
    Debugging,
    #[serde(rename = "building")]
    Building,
    #[serde(rename = "ai coding")]
    AiCoding,
    #[serde(rename = "code reviewing")]
    CodeReviewing,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Debugging => "debugging",
            Category::Building => "building",
            Category::AiCoding => "ai coding",
            Category::CodeReviewing => "code reviewing",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed activity sample.
///
/// Field names match what the CLI expects on its extra-heartbeats stream and
/// what the bulk API accepts, so the struct serialises as-is for both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub entity: String,
    /// Unix epoch seconds with millisecond fraction.
    pub time: f64,
    pub is_write: bool,
    /// 1-based.
    pub lineno: u32,
    /// 1-based.
    pub cursorpos: u32,
    pub lines_in_file: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_line_changes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_line_changes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_unsaved_entity: Option<bool>,
}
