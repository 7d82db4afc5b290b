//! Structure-aware code chunking used by the repository analyst.
//!
//! Files are split into a hierarchy of chunks: one file-level chunk per
//! file, plus class- and function-level chunks for structured languages,
//! statement chunks for SQL, header sections for markdown, and fixed-size
//! line windows as a fallback. Chunk identifiers are derived from content
//! hashes so caches survive re-ingestion.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Granularity of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Whole file
    File,
    /// Class / impl / type declaration body
    Class,
    /// Function or method body
    Function,
    /// One SQL statement
    Statement,
    /// One markdown header section
    Section,
    /// Fixed-size line window (fallback)
    Window,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Function => "function",
            Self::Statement => "statement",
            Self::Section => "section",
            Self::Window => "window",
        }
    }
}

/// Language detected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Sql,
    Markdown,
    Json,
    Yaml,
    Unknown,
}

impl Language {
    /// Detect the language of a file from its extension.
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit('.').next().unwrap_or_default().to_lowercase();
        match ext.as_str() {
            "rs" => Self::Rust,
            "py" => Self::Python,
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" => Self::JavaScript,
            "sql" => Self::Sql,
            "md" | "markdown" => Self::Markdown,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Sql => "sql",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Unknown => "unknown",
        }
    }

    /// Whether class/function structure extraction applies.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            Self::Rust | Self::Python | Self::TypeScript | Self::JavaScript
        )
    }
}

/// Structural metadata attached to class and function chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Declared name of the item, when one was parsed
    pub declared_name: Option<String>,
    /// Decorator / attribute lines immediately above the declaration
    pub decorators: Vec<String>,
    /// Whether the declaration is async
    pub is_async: bool,
}

/// A chunk of source content with stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Content-derived identifier, stable across re-ingestion
    pub id: String,
    /// Source file path
    pub file: String,
    /// 1-based start line
    pub start_line: usize,
    /// 1-based end line (inclusive)
    pub end_line: usize,
    /// Parent chunk id (None for file-level chunks)
    pub parent_id: Option<String>,
    /// Child chunk ids
    pub children_ids: Vec<String>,
    /// Detected language
    pub language: Language,
    /// Granularity
    pub kind: ChunkKind,
    /// Structural metadata
    pub metadata: ChunkMetadata,
    /// Full content hash
    pub content_hash: String,
    /// Chunk content
    pub content: String,
}

impl CodeChunk {
    fn new(
        file: &str,
        kind: ChunkKind,
        language: Language,
        start_line: usize,
        end_line: usize,
        content: String,
    ) -> Self {
        let content_hash = hash_hex(&content);
        let id = chunk_id(file, kind, &content_hash);
        Self {
            id,
            file: file.to_string(),
            start_line,
            end_line,
            parent_id: None,
            children_ids: Vec::new(),
            language,
            kind,
            metadata: ChunkMetadata::default(),
            content_hash,
            content,
        }
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Line window size for the fallback strategy
    pub window_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { window_lines: 500 }
    }
}

fn hash_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn chunk_id(file: &str, kind: ChunkKind, content_hash: &str) -> String {
    let digest = Sha256::digest(format!("{file}:{}:{content_hash}", kind.as_str()).as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Split a file into chunks according to its detected language.
///
/// The first chunk is always the file-level chunk; its `children_ids`
/// reference every chunk carved out of it.
pub fn chunk_file(path: &str, content: &str, config: &ChunkingConfig) -> Vec<CodeChunk> {
    let language = Language::from_path(path);
    let lines: Vec<&str> = content.lines().collect();
    let end_line = lines.len().max(1);

    let mut file_chunk = CodeChunk::new(
        path,
        ChunkKind::File,
        language,
        1,
        end_line,
        content.to_string(),
    );

    let mut children = if language.is_structured() {
        structured_chunks(path, language, &lines)
    } else {
        match language {
            Language::Sql => sql_chunks(path, content),
            Language::Markdown => markdown_chunks(path, &lines),
            _ => window_chunks(path, language, &lines, config.window_lines),
        }
    };

    for child in &mut children {
        if child.parent_id.is_none() {
            child.parent_id = Some(file_chunk.id.clone());
        }
    }
    file_chunk.children_ids = children
        .iter()
        .filter(|c| c.parent_id.as_deref() == Some(file_chunk.id.as_str()))
        .map(|c| c.id.clone())
        .collect();

    let mut chunks = vec![file_chunk];
    chunks.extend(children);
    chunks
}

/// A declaration marker found while scanning a structured file.
struct Marker {
    line: usize,
    indent: usize,
    kind: ChunkKind,
    name: Option<String>,
    is_async: bool,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn declaration_marker(language: Language, line: &str, idx: usize) -> Option<Marker> {
    let trimmed = line.trim_start();
    let indent = indent_of(line);
    let mk = |kind, name: Option<String>, is_async| {
        Some(Marker {
            line: idx,
            indent,
            kind,
            name,
            is_async,
        })
    };
    match language {
        Language::Python => {
            if let Some(rest) = trimmed.strip_prefix("class ") {
                return mk(ChunkKind::Class, declared_name(rest), false);
            }
            if let Some(rest) = trimmed.strip_prefix("async def ") {
                return mk(ChunkKind::Function, declared_name(rest), true);
            }
            if let Some(rest) = trimmed.strip_prefix("def ") {
                return mk(ChunkKind::Function, declared_name(rest), false);
            }
            None
        }
        Language::Rust => {
            for prefix in ["impl ", "trait ", "struct ", "enum "] {
                if let Some(rest) = strip_visibility(trimmed).strip_prefix(prefix) {
                    return mk(ChunkKind::Class, declared_name(rest), false);
                }
            }
            let body = strip_visibility(trimmed);
            if let Some(rest) = body.strip_prefix("async fn ") {
                return mk(ChunkKind::Function, declared_name(rest), true);
            }
            if let Some(rest) = body.strip_prefix("fn ") {
                return mk(ChunkKind::Function, declared_name(rest), false);
            }
            None
        }
        Language::TypeScript | Language::JavaScript => {
            if let Some(rest) = trimmed
                .strip_prefix("export class ")
                .or_else(|| trimmed.strip_prefix("class "))
            {
                return mk(ChunkKind::Class, declared_name(rest), false);
            }
            if let Some(rest) = trimmed
                .strip_prefix("export async function ")
                .or_else(|| trimmed.strip_prefix("async function "))
            {
                return mk(ChunkKind::Function, declared_name(rest), true);
            }
            if let Some(rest) = trimmed
                .strip_prefix("export function ")
                .or_else(|| trimmed.strip_prefix("function "))
            {
                return mk(ChunkKind::Function, declared_name(rest), false);
            }
            None
        }
        _ => None,
    }
}

fn strip_visibility(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix("pub(crate) ") {
        rest
    } else if let Some(rest) = line.strip_prefix("pub ") {
        rest
    } else {
        line
    }
}

fn declared_name(rest: &str) -> Option<String> {
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn decorator_lines(language: Language, lines: &[&str], decl_idx: usize) -> Vec<String> {
    let prefix = match language {
        Language::Python => "@",
        Language::Rust => "#[",
        _ => return Vec::new(),
    };
    let mut decorators = Vec::new();
    let mut idx = decl_idx;
    while idx > 0 {
        let above = lines[idx - 1].trim_start();
        if above.starts_with(prefix) {
            decorators.push(above.to_string());
            idx -= 1;
        } else {
            break;
        }
    }
    decorators.reverse();
    decorators
}

/// Extract class- and function-level chunks from a structured file.
///
/// A declaration extends until the next declaration at the same or lower
/// indentation, which is precise enough for pattern extraction without a
/// real parser. Methods nested inside a class become children of the class
/// chunk.
fn structured_chunks(path: &str, language: Language, lines: &[&str]) -> Vec<CodeChunk> {
    let markers: Vec<Marker> = lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| declaration_marker(language, line, idx))
        .collect();

    let mut chunks: Vec<CodeChunk> = Vec::new();
    // (chunk index, indent) of enclosing class declarations, innermost last
    let mut class_stack: Vec<(usize, usize)> = Vec::new();

    for (pos, marker) in markers.iter().enumerate() {
        let end_idx = markers[pos + 1..]
            .iter()
            .find(|m| m.indent <= marker.indent)
            .map_or(lines.len(), |m| m.line);

        let content = lines[marker.line..end_idx].join("\n");
        let mut chunk = CodeChunk::new(
            path,
            marker.kind,
            language,
            marker.line + 1,
            end_idx,
            content,
        );
        chunk.metadata = ChunkMetadata {
            declared_name: marker.name.clone(),
            decorators: decorator_lines(language, lines, marker.line),
            is_async: marker.is_async,
        };

        while let Some(&(_, indent)) = class_stack.last() {
            if marker.indent <= indent {
                class_stack.pop();
            } else {
                break;
            }
        }
        if let Some(&(parent_idx, _)) = class_stack.last() {
            chunk.parent_id = Some(chunks[parent_idx].id.clone());
            let child_id = chunk.id.clone();
            chunks[parent_idx].children_ids.push(child_id);
        }
        if marker.kind == ChunkKind::Class {
            class_stack.push((chunks.len(), marker.indent));
        }
        chunks.push(chunk);
    }
    chunks
}

/// One chunk per `;`-terminated top-level SQL statement.
fn sql_chunks(path: &str, content: &str) -> Vec<CodeChunk> {
    let mut chunks = Vec::new();
    let mut statement = String::new();
    let mut start_line = 1;
    let mut line_no = 1;

    for line in content.lines() {
        if statement.trim().is_empty() {
            start_line = line_no;
        }
        statement.push_str(line);
        statement.push('\n');
        if line.trim_end().ends_with(';') {
            let text = statement.trim().to_string();
            if !text.is_empty() {
                chunks.push(CodeChunk::new(
                    path,
                    ChunkKind::Statement,
                    Language::Sql,
                    start_line,
                    line_no,
                    text,
                ));
            }
            statement.clear();
        }
        line_no += 1;
    }
    chunks
}

/// One chunk per markdown header section.
fn markdown_chunks(path: &str, lines: &[&str]) -> Vec<CodeChunk> {
    let mut boundaries: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_start().starts_with('#'))
        .map(|(idx, _)| idx)
        .collect();
    if boundaries.is_empty() {
        return Vec::new();
    }
    boundaries.push(lines.len());

    let mut chunks = Vec::new();
    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let content = lines[start..end].join("\n");
        let mut chunk = CodeChunk::new(
            path,
            ChunkKind::Section,
            Language::Markdown,
            start + 1,
            end,
            content,
        );
        chunk.metadata.declared_name = lines[start]
            .trim_start_matches(['#', ' '])
            .trim()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .into();
        chunks.push(chunk);
    }
    chunks
}

/// Fixed-size line windows for unstructured content.
fn window_chunks(
    path: &str,
    language: Language,
    lines: &[&str],
    window: usize,
) -> Vec<CodeChunk> {
    if lines.len() <= window {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < lines.len() {
        let end = (start + window).min(lines.len());
        let content = lines[start..end].join("\n");
        chunks.push(CodeChunk::new(
            path,
            ChunkKind::Window,
            language,
            start + 1,
            end,
            content,
        ));
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_path("src/main.rs"), Language::Rust);
        assert_eq!(Language::from_path("app.py"), Language::Python);
        assert_eq!(Language::from_path("schema.sql"), Language::Sql);
        assert_eq!(Language::from_path("README.md"), Language::Markdown);
        assert_eq!(Language::from_path("data.bin"), Language::Unknown);
        assert!(Language::Rust.is_structured());
        assert!(!Language::Sql.is_structured());
    }

    #[test]
    fn test_file_chunk_always_first() {
        let chunks = chunk_file("empty.bin", "", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
        assert_eq!(chunks[0].start_line, 1);
    }

    #[test]
    fn test_python_class_and_methods() {
        let source = "\
@decorator
class Service:
    def sync_method(self):
        return 1

    async def async_method(self):
        return 2

def top_level():
    return 3
";
        let chunks = chunk_file("svc.py", source, &ChunkingConfig::default());
        let file = &chunks[0];
        assert_eq!(file.kind, ChunkKind::File);

        let class = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Class)
            .expect("class chunk");
        assert_eq!(class.metadata.declared_name.as_deref(), Some("Service"));
        assert_eq!(class.metadata.decorators, vec!["@decorator".to_string()]);
        assert_eq!(class.parent_id.as_deref(), Some(file.id.as_str()));
        assert_eq!(class.children_ids.len(), 2);

        let async_fn = chunks
            .iter()
            .find(|c| c.metadata.declared_name.as_deref() == Some("async_method"))
            .expect("async method chunk");
        assert!(async_fn.metadata.is_async);
        assert_eq!(async_fn.parent_id.as_deref(), Some(class.id.as_str()));

        let top = chunks
            .iter()
            .find(|c| c.metadata.declared_name.as_deref() == Some("top_level"))
            .expect("top-level function");
        assert_eq!(top.parent_id.as_deref(), Some(file.id.as_str()));
    }

    #[test]
    fn test_rust_functions_and_attributes() {
        let source = "\
#[derive(Debug)]
pub struct Widget {
    size: u32,
}

pub async fn fetch_widget() -> Widget {
    Widget { size: 1 }
}

fn helper() {}
";
        let chunks = chunk_file("widget.rs", source, &ChunkingConfig::default());
        let class = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Class)
            .expect("struct chunk");
        assert_eq!(class.metadata.declared_name.as_deref(), Some("Widget"));
        assert_eq!(class.metadata.decorators, vec!["#[derive(Debug)]".to_string()]);

        let functions: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Function)
            .collect();
        assert_eq!(functions.len(), 2);
        assert!(functions
            .iter()
            .any(|c| c.metadata.is_async
                && c.metadata.declared_name.as_deref() == Some("fetch_widget")));
    }

    #[test]
    fn test_sql_statement_chunks() {
        let source = "CREATE TABLE t (id INTEGER);\n\nINSERT INTO t\nVALUES (1);\n";
        let chunks = chunk_file("schema.sql", source, &ChunkingConfig::default());
        let statements: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Statement)
            .collect();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].content.starts_with("CREATE TABLE"));
        assert_eq!(statements[1].start_line, 3);
        assert_eq!(statements[1].end_line, 4);
    }

    #[test]
    fn test_markdown_sections() {
        let source = "# Title\nintro\n\n## Usage\nrun it\n\n## License\nMIT\n";
        let chunks = chunk_file("README.md", source, &ChunkingConfig::default());
        let sections: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Section)
            .collect();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].metadata.declared_name.as_deref(), Some("Usage"));
    }

    #[test]
    fn test_window_fallback() {
        let source = (0..1200).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_file("data.log", &source, &ChunkingConfig::default());
        let windows: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Window).collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].line_count(), 500);
        assert_eq!(windows[2].line_count(), 200);
        let file_id = chunks[0].id.clone();
        assert!(windows.iter().all(|w| w.parent_id.as_deref() == Some(file_id.as_str())));
    }

    #[test]
    fn test_small_unstructured_file_has_no_windows() {
        let chunks = chunk_file("notes.txt", "a\nb\nc", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_ids_stable_under_content() {
        let source = "fn stable() {}\n";
        let a = chunk_file("lib.rs", source, &ChunkingConfig::default());
        let b = chunk_file("lib.rs", source, &ChunkingConfig::default());
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[1].id, b[1].id);

        let c = chunk_file("lib.rs", "fn changed() {}\n", &ChunkingConfig::default());
        assert_ne!(a[1].id, c[1].id);
    }
}
