use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use super::{optional_usize, required_str, Toolkit};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// The directory document tools read from and write to.
///
/// Shared by every toolkit built for one run. A temporary directory is removed when
/// the last handle is dropped.
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    path: PathBuf,
    _temp: Option<Arc<TempDir>>,
}

impl WorkingDirectory {
    pub fn temporary() -> std::io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("roundtable-").tempdir()?;
        Ok(Self {
            path: temp.path().to_path_buf(),
            _temp: Some(Arc::new(temp)),
        })
    }

    pub fn at(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path, _temp: None })
    }

    /// Use the configured directory, or a fresh temporary one
    pub fn from_setting(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => Self::at(path),
            None => Self::temporary(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a file name inside the directory, rejecting anything that would escape it
    pub fn resolve(&self, file_name: &str) -> AgentResult<PathBuf> {
        let relative = Path::new(file_name);
        let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_)));
        if file_name.is_empty() || escapes {
            return Err(AgentError::InvalidParameters(format!(
                "File name '{}' must be a relative path inside the working directory",
                file_name
            )));
        }
        Ok(self.path.join(relative))
    }

    /// Relative paths of every file written so far, sorted
    pub fn files(&self) -> Vec<String> {
        let mut files = Vec::new();
        collect_files(&self.path, &self.path, &mut files);
        files.sort();
        files
    }

    /// The listing the document agents see before every turn
    pub fn describe(&self) -> String {
        let files = self.files();
        if files.is_empty() {
            return "No files written.".to_string();
        }
        let listing: Vec<String> = files.iter().map(|f| format!(" - {}", f)).collect();
        format!(
            "\nBelow are files your team has written to the directory:\n{}",
            listing.join("\n")
        )
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files);
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.display().to_string());
        }
    }
}

/// Which document tools a toolkit exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentTool {
    CreateOutline,
    ReadDocument,
    WriteDocument,
    EditDocument,
}

impl DocumentTool {
    pub const ALL: [DocumentTool; 4] = [
        DocumentTool::CreateOutline,
        DocumentTool::ReadDocument,
        DocumentTool::WriteDocument,
        DocumentTool::EditDocument,
    ];

    fn definition(&self) -> Tool {
        match self {
            DocumentTool::CreateOutline => Tool::new(
                "create_outline",
                "Create and save an outline.",
                json!({
                    "type": "object",
                    "required": ["points", "file_name"],
                    "properties": {
                        "points": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "List of main points or sections."
                        },
                        "file_name": {
                            "type": "string",
                            "description": "File path to save the outline."
                        }
                    }
                }),
            ),
            DocumentTool::ReadDocument => Tool::new(
                "read_document",
                "Read the specified document.",
                json!({
                    "type": "object",
                    "required": ["file_name"],
                    "properties": {
                        "file_name": {
                            "type": "string",
                            "description": "File path of the document."
                        },
                        "start": {
                            "type": "integer",
                            "default": 0,
                            "description": "The start line. Default is 0"
                        },
                        "end": {
                            "type": "integer",
                            "default": null,
                            "description": "The end line, exclusive. Defaults to the end of the document"
                        }
                    }
                }),
            ),
            DocumentTool::WriteDocument => Tool::new(
                "write_document",
                "Create and save a text document.",
                json!({
                    "type": "object",
                    "required": ["content", "file_name"],
                    "properties": {
                        "content": {
                            "type": "string",
                            "description": "Text content to be written into the document."
                        },
                        "file_name": {
                            "type": "string",
                            "description": "File path to save the document."
                        }
                    }
                }),
            ),
            DocumentTool::EditDocument => Tool::new(
                "edit_document",
                "Edit a document by inserting text at specific line numbers.",
                json!({
                    "type": "object",
                    "required": ["file_name", "inserts"],
                    "properties": {
                        "file_name": {
                            "type": "string",
                            "description": "Path of the document to be edited."
                        },
                        "inserts": {
                            "type": "object",
                            "additionalProperties": {"type": "string"},
                            "description": "Dictionary where key is the line number (1-indexed) and value is the text to be inserted at that line."
                        }
                    }
                }),
            ),
        }
    }
}

pub struct DocumentsToolkit {
    tools: Vec<Tool>,
    dir: WorkingDirectory,
}

impl DocumentsToolkit {
    /// A toolkit with every document tool
    pub fn new(dir: WorkingDirectory) -> Self {
        Self::with_tools(dir, &DocumentTool::ALL)
    }

    /// A toolkit limited to the given tools
    pub fn with_tools(dir: WorkingDirectory, tools: &[DocumentTool]) -> Self {
        Self {
            tools: tools.iter().map(DocumentTool::definition).collect(),
            dir,
        }
    }

    pub fn working_directory(&self) -> &WorkingDirectory {
        &self.dir
    }

    fn create_outline(&self, params: &Value) -> AgentResult<String> {
        let file_name = required_str(params, "file_name")?;
        let points = params
            .get("points")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AgentError::InvalidParameters("Missing 'points' parameter".into()))?;

        let mut outline = String::new();
        for (i, point) in points.iter().enumerate() {
            let point = point.as_str().map(String::from).unwrap_or_else(|| point.to_string());
            outline.push_str(&format!("{}. {}\n", i + 1, point));
        }

        self.write(file_name, &outline)?;
        Ok(format!("Outline saved to {}", file_name))
    }

    fn read_document(&self, params: &Value) -> AgentResult<String> {
        let file_name = required_str(params, "file_name")?;
        let content = self.read(file_name)?;
        let lines: Vec<&str> = content.lines().collect();

        let end = optional_usize(params, "end")?
            .unwrap_or(lines.len())
            .min(lines.len());
        let start = optional_usize(params, "start")?.unwrap_or(0).min(end);

        Ok(lines[start..end].join("\n"))
    }

    fn write_document(&self, params: &Value) -> AgentResult<String> {
        let content = required_str(params, "content")?;
        let file_name = required_str(params, "file_name")?;
        self.write(file_name, content)?;
        Ok(format!("Document saved to {}", file_name))
    }

    fn edit_document(&self, params: &Value) -> AgentResult<String> {
        let file_name = required_str(params, "file_name")?;
        let inserts = params
            .get("inserts")
            .and_then(|v| v.as_object())
            .ok_or_else(|| AgentError::InvalidParameters("Missing 'inserts' parameter".into()))?;

        let mut sorted_inserts = BTreeMap::new();
        for (key, value) in inserts {
            let line_number: i64 = key.trim().parse().map_err(|_| {
                AgentError::InvalidParameters(format!("Line number '{}' is not an integer", key))
            })?;
            let text = value
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| value.to_string());
            sorted_inserts.insert(line_number, text);
        }

        let content = self.read(file_name)?;
        let mut lines: Vec<String> = content.lines().map(String::from).collect();

        for (line_number, text) in sorted_inserts {
            if line_number < 1 || line_number as usize > lines.len() + 1 {
                return Ok(format!("Error: Line number {} is out of range.", line_number));
            }
            lines.insert(line_number as usize - 1, text);
        }

        let mut edited = lines.join("\n");
        edited.push('\n');
        self.write(file_name, &edited)?;
        Ok(format!("Document edited and saved to {}", file_name))
    }

    fn read(&self, file_name: &str) -> AgentResult<String> {
        let path = self.dir.resolve(file_name)?;
        if !path.is_file() {
            return Err(AgentError::InvalidParameters(format!(
                "The file '{}' does not exist",
                file_name
            )));
        }
        fs::read_to_string(&path)
            .map_err(|e| AgentError::ExecutionError(format!("Failed to read file: {}", e)))
    }

    fn write(&self, file_name: &str, content: &str) -> AgentResult<()> {
        let path = self.dir.resolve(file_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AgentError::ExecutionError(format!("Failed to create directory: {}", e))
            })?;
        }
        fs::write(&path, content)
            .map_err(|e| AgentError::ExecutionError(format!("Failed to write file: {}", e)))?;
        tracing::debug!(file = %path.display(), "document written");
        Ok(())
    }
}

#[async_trait]
impl Toolkit for DocumentsToolkit {
    fn name(&self) -> &str {
        "documents"
    }

    fn description(&self) -> &str {
        "Reads and writes the documents of the team's working directory"
    }

    fn instructions(&self) -> &str {
        "Documents live in a working directory shared with your team. \
        Refer to them by file name only. Line numbers in edit_document start at 1."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if !self.tools.iter().any(|t| t.name == tool_call.name) {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }
        let params = &tool_call.arguments;
        let result = match tool_call.name.as_str() {
            "create_outline" => self.create_outline(params),
            "read_document" => self.read_document(params),
            "write_document" => self.write_document(params),
            "edit_document" => self.edit_document(params),
            _ => Err(AgentError::ToolNotFound(tool_call.name.clone())),
        }?;
        Ok(vec![Content::text(result)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolkit() -> DocumentsToolkit {
        DocumentsToolkit::new(WorkingDirectory::temporary().unwrap())
    }

    async fn call(toolkit: &DocumentsToolkit, name: &str, args: Value) -> AgentResult<String> {
        toolkit
            .call(ToolCall::new(name, args))
            .await
            .map(|c| c[0].as_text().unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_create_outline() {
        let toolkit = toolkit();
        let result = call(
            &toolkit,
            "create_outline",
            json!({"points": ["Intro", "Market"], "file_name": "outline.txt"}),
        )
        .await
        .unwrap();
        assert_eq!(result, "Outline saved to outline.txt");

        let written = fs::read_to_string(toolkit.dir.path().join("outline.txt")).unwrap();
        assert_eq!(written, "1. Intro\n2. Market\n");
    }

    #[tokio::test]
    async fn test_read_document_ranges() {
        let toolkit = toolkit();
        call(
            &toolkit,
            "write_document",
            json!({"content": "a\nb\nc\nd", "file_name": "doc.txt"}),
        )
        .await
        .unwrap();

        let all = call(&toolkit, "read_document", json!({"file_name": "doc.txt"}))
            .await
            .unwrap();
        assert_eq!(all, "a\nb\nc\nd");

        let middle = call(
            &toolkit,
            "read_document",
            json!({"file_name": "doc.txt", "start": 1, "end": 3}),
        )
        .await
        .unwrap();
        assert_eq!(middle, "b\nc");

        let past_end = call(
            &toolkit,
            "read_document",
            json!({"file_name": "doc.txt", "start": 10}),
        )
        .await
        .unwrap();
        assert_eq!(past_end, "");
    }

    #[tokio::test]
    async fn test_edit_document_inserts_in_order() {
        let toolkit = toolkit();
        call(
            &toolkit,
            "write_document",
            json!({"content": "one\ntwo\n", "file_name": "doc.txt"}),
        )
        .await
        .unwrap();

        let result = call(
            &toolkit,
            "edit_document",
            json!({"file_name": "doc.txt", "inserts": {"3": "three", "1": "zero"}}),
        )
        .await
        .unwrap();
        assert_eq!(result, "Document edited and saved to doc.txt");

        let written = fs::read_to_string(toolkit.dir.path().join("doc.txt")).unwrap();
        assert_eq!(written, "zero\none\nthree\ntwo\n");
    }

    #[tokio::test]
    async fn test_edit_document_out_of_range_writes_nothing() {
        let toolkit = toolkit();
        call(
            &toolkit,
            "write_document",
            json!({"content": "one\n", "file_name": "doc.txt"}),
        )
        .await
        .unwrap();

        let result = call(
            &toolkit,
            "edit_document",
            json!({"file_name": "doc.txt", "inserts": {"1": "first", "5": "far"}}),
        )
        .await
        .unwrap();
        assert_eq!(result, "Error: Line number 5 is out of range.");

        let written = fs::read_to_string(toolkit.dir.path().join("doc.txt")).unwrap();
        assert_eq!(written, "one\n");
    }

    #[tokio::test]
    async fn test_escaping_paths_are_rejected() {
        let toolkit = toolkit();
        for file_name in ["../secret.txt", "/etc/passwd", ""] {
            let err = call(
                &toolkit,
                "write_document",
                json!({"content": "x", "file_name": file_name}),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AgentError::InvalidParameters(_)));
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let toolkit = toolkit();
        let err = call(&toolkit, "read_document", json!({"file_name": "nope.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_restricted_toolkit() {
        let dir = WorkingDirectory::temporary().unwrap();
        let toolkit = DocumentsToolkit::with_tools(dir, &[DocumentTool::ReadDocument]);
        assert_eq!(toolkit.tools().len(), 1);

        let err = call(
            &toolkit,
            "write_document",
            json!({"content": "x", "file_name": "a.txt"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err, AgentError::ToolNotFound("write_document".into()));
    }

    #[test]
    fn test_describe_files() {
        let dir = WorkingDirectory::temporary().unwrap();
        assert_eq!(dir.describe(), "No files written.");

        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::create_dir(dir.path().join("charts")).unwrap();
        fs::write(dir.path().join("charts").join("a.png"), "a").unwrap();

        let described = dir.describe();
        assert!(described.starts_with("\nBelow are files your team has written to the directory:\n"));
        assert!(described.contains(" - b.txt"));
        assert!(described.contains(&format!(" - {}", Path::new("charts").join("a.png").display())));
    }

    #[test]
    fn test_temporary_directory_is_removed() {
        let dir = WorkingDirectory::temporary().unwrap();
        let path = dir.path().to_path_buf();
        let clone = dir.clone();
        drop(dir);
        assert!(path.exists());
        drop(clone);
        assert!(!path.exists());
    }
}
