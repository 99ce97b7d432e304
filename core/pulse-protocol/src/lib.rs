//! Wire types for the host editor boundary.
//!
//! The host writes one [`EditorEvent`] per line (JSON) and reads one
//! [`HostCommand`] per line back. Every event that can lead to a heartbeat
//! carries a snapshot of the active editor at the moment the event fired,
//! since the pipeline has no way to query the editor itself.
//!
//! ```json
//! {"event":"document_saved","editor":{"uri":"file:///a.ts","scheme":"file","file_name":"/a.ts","line_count":12}}
//! ```

use serde::{Deserialize, Serialize};

/// Zero-based cursor position, as editors report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub name: String,
    pub path: String,
}

/// State of the focused text editor when an event fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub uri: String,
    pub scheme: String,
    /// Filesystem path for `file` documents, display name otherwise.
    pub file_name: String,
    pub line_count: u32,
    #[serde(default)]
    pub is_untitled: bool,
    #[serde(default)]
    pub selection: Position,
    #[serde(default)]
    pub workspace_folder: Option<WorkspaceFolder>,
}

/// Identity of a document that is not necessarily the focused one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub uri: String,
    pub scheme: String,
}

/// One fragment of a text-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentChange {
    /// Inserted text (empty for pure deletions).
    #[serde(default)]
    pub text: String,
    /// Length of the replaced range.
    #[serde(default)]
    pub range_length: u32,
}

impl ContentChange {
    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range_length: 0,
        }
    }

    pub fn delete(range_length: u32) -> Self {
        Self {
            text: String::new(),
            range_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Keyboard,
    Mouse,
    Command,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Static facts about the host, sent once after startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub app_name: String,
    pub app_version: String,
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_version: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub machine_name: Option<String>,
    /// Api key configured inside the editor's own settings, if any.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_plugin_name() -> String {
    "pulse".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EditorEvent {
    Initialize(HostInfo),
    SelectionChanged {
        editor: Option<DocumentSnapshot>,
        #[serde(default)]
        kind: SelectionKind,
    },
    ActiveEditorChanged {
        editor: Option<DocumentSnapshot>,
    },
    TabsChanged {
        editor: Option<DocumentSnapshot>,
    },
    DocumentSaved {
        editor: Option<DocumentSnapshot>,
    },
    TextChanged {
        editor: Option<DocumentSnapshot>,
        document: DocumentRef,
        #[serde(default)]
        changes: Vec<ContentChange>,
    },
    NotebookChanged {
        editor: Option<DocumentSnapshot>,
    },
    NotebookSaved {
        editor: Option<DocumentSnapshot>,
    },
    TaskStarted {
        editor: Option<DocumentSnapshot>,
        #[serde(default)]
        is_background: bool,
        #[serde(default)]
        detail: Option<String>,
    },
    TaskEnded {
        editor: Option<DocumentSnapshot>,
    },
    DebugStarted {
        editor: Option<DocumentSnapshot>,
    },
    DebugTerminated {
        editor: Option<DocumentSnapshot>,
    },
    DebugChanged {
        editor: Option<DocumentSnapshot>,
    },
    ApiKeyEntered {
        key: String,
    },
    FetchToday,
    Shutdown,
}

impl EditorEvent {
    /// Active editor snapshot carried by this event, if the event carries one.
    pub fn active_editor(&self) -> Option<&DocumentSnapshot> {
        match self {
            EditorEvent::SelectionChanged { editor, .. }
            | EditorEvent::ActiveEditorChanged { editor }
            | EditorEvent::TabsChanged { editor }
            | EditorEvent::DocumentSaved { editor }
            | EditorEvent::TextChanged { editor, .. }
            | EditorEvent::NotebookChanged { editor }
            | EditorEvent::NotebookSaved { editor }
            | EditorEvent::TaskStarted { editor, .. }
            | EditorEvent::TaskEnded { editor }
            | EditorEvent::DebugStarted { editor }
            | EditorEvent::DebugTerminated { editor }
            | EditorEvent::DebugChanged { editor } => editor.as_ref(),
            EditorEvent::Initialize(_)
            | EditorEvent::ApiKeyEntered { .. }
            | EditorEvent::FetchToday
            | EditorEvent::Shutdown => None,
        }
    }

    /// True for events that describe the editor's own state rather than
    /// instructions to the pipeline.
    pub fn carries_editor(&self) -> bool {
        !matches!(
            self,
            EditorEvent::Initialize(_)
                | EditorEvent::ApiKeyEntered { .. }
                | EditorEvent::FetchToday
                | EditorEvent::Shutdown
        )
    }
}

/// Instructions for the host's presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    SetStatus { text: String, tooltip: String },
    PromptApiKey { initial: bool },
}

/// Parses one line of host input. Blank lines yield `Ok(None)`.
pub fn parse_event_line(line: &str) -> Result<Option<EditorEvent>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Serialises a command as a single line, without the trailing newline.
pub fn encode_command(command: &HostCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}
