//! URI-scheme rules: which documents count as files, chat panels, or
//! pull-request reviews, and whether the host can generate code with AI.

use pulse_protocol::{DocumentSnapshot, HostInfo};

const IGNORED_SCHEMES: &[&str] = &["output", "debug", "vscode-terminal", "git", "vscode-scm"];

const AI_CHAT_SCHEMES: &[&str] = &[
    "vscode-chat-code-block",
    "vscode-chat-editor",
    "chat-editing-text-model",
    "chat-editing-snapshot-text-model",
];

const PULL_REQUEST_SCHEMES: &[&str] = &["pr", "review", "vscode-pull-request-github"];

const AI_EDITOR_BRANDS: &[&str] = &["cursor", "windsurf", "kiro", "trae", "void"];

const AI_EXTENSIONS: &[&str] = &[
    "github.copilot",
    "github.copilot-chat",
    "continue.continue",
    "codeium.codeium",
    "saoudrizwan.claude-dev",
    "rooveterinaryinc.roo-cline",
    "anthropic.claude-code",
    "sourcegraph.cody-ai",
    "tabnine.tabnine-vscode",
];

/// The entity a heartbeat would be reported against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedFile {
    pub entity: String,
    pub is_unsaved: bool,
}

/// Resolves the reportable entity for a document, or `None` for panels that
/// are not real documents (output, terminals, SCM views).
pub fn focused_file(doc: &DocumentSnapshot) -> Option<FocusedFile> {
    let scheme = doc.scheme.to_ascii_lowercase();
    if IGNORED_SCHEMES.contains(&scheme.as_str()) {
        return None;
    }

    let entity = if scheme == "file" && !doc.file_name.is_empty() {
        doc.file_name.clone()
    } else {
        doc.uri.clone()
    };
    if entity.is_empty() {
        return None;
    }

    Some(FocusedFile {
        entity,
        is_unsaved: doc.is_untitled || scheme == "untitled",
    })
}

pub fn is_ai_chat_surface(scheme: &str) -> bool {
    AI_CHAT_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str())
}

pub fn is_pull_request(scheme: &str) -> bool {
    PULL_REQUEST_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str())
}

/// True when the editor brand or an installed extension can insert AI code.
pub fn has_ai_capabilities(info: &HostInfo) -> bool {
    let app = info.app_name.to_ascii_lowercase();
    if AI_EDITOR_BRANDS.iter().any(|brand| app.contains(brand)) {
        return true;
    }
    info.extensions
        .iter()
        .any(|ext| AI_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_protocol::Position;

    fn doc(scheme: &str, uri: &str, file_name: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            uri: uri.to_string(),
            scheme: scheme.to_string(),
            file_name: file_name.to_string(),
            line_count: 1,
            is_untitled: false,
            selection: Position::default(),
            workspace_folder: None,
        }
    }

    #[test]
    fn test_file_scheme_uses_path() {
        let focused = focused_file(&doc("file", "file:///a.ts", "/a.ts")).unwrap();
        assert_eq!(focused.entity, "/a.ts");
        assert!(!focused.is_unsaved);
    }

    #[test]
    fn test_untitled_uses_uri_and_is_unsaved() {
        let focused = focused_file(&doc("untitled", "untitled:Untitled-1", "Untitled-1")).unwrap();
        assert_eq!(focused.entity, "untitled:Untitled-1");
        assert!(focused.is_unsaved);
    }

    #[test]
    fn test_output_panel_is_ignored() {
        assert!(focused_file(&doc("output", "output:tasks", "tasks")).is_none());
    }

    #[test]
    fn test_chat_and_review_schemes() {
        assert!(is_ai_chat_surface("vscode-chat-code-block"));
        assert!(!is_ai_chat_surface("file"));
        assert!(is_pull_request("PR"));
    }

    #[test]
    fn test_ai_capabilities_by_brand_or_extension() {
        let mut info = HostInfo {
            app_name: "Visual Studio Code".to_string(),
            ..HostInfo::default()
        };
        assert!(!has_ai_capabilities(&info));

        info.extensions.push("GitHub.copilot".to_string());
        assert!(has_ai_capabilities(&info));

        let cursor = HostInfo {
            app_name: "Cursor".to_string(),
            ..HostInfo::default()
        };
        assert!(has_ai_capabilities(&cursor));
    }
}
