//! Document loading from the local documents directory.

use std::path::Path;

use pulldown_cmark::{Event, Parser, TagEnd};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use ragchat_core::{ContentType, Document, RagError, Result};

/// Page separator emitted by pdf-extract between pages.
const PAGE_BREAK: char = '\x0c';

/// Load every supported file under `dir`, in sorted path order.
///
/// A missing directory yields an empty list. Files that fail to load are
/// logged and skipped.
pub fn load_documents(dir: &Path) -> Vec<Document> {
    info!("Loading documents from: {}", dir.display());

    if !dir.exists() {
        warn!("Documents directory {} does not exist", dir.display());
        return Vec::new();
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !ContentType::from_path(&path.to_string_lossy()).is_supported() {
            continue;
        }

        info!("Loading file: {}", path.display());
        match load_file(path) {
            Ok(docs) => {
                info!("Successfully loaded {} pages from {}", docs.len(), path.display());
                documents.extend(docs);
            }
            Err(e) => error!("Failed to load {}: {}", path.display(), e),
        }
    }

    info!("Total documents loaded: {}", documents.len());
    documents
}

/// Load a single file. PDFs produce one document per non-empty page.
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let source = path.display().to_string();

    match ContentType::from_path(&source) {
        ContentType::Pdf => load_pdf(path, &source),
        ContentType::PlainText => {
            let bytes = std::fs::read(path)?;
            let text = String::from_utf8(bytes)
                .map_err(|e| RagError::load_failed(&source, format!("not valid UTF-8: {}", e)))?;
            Ok(vec![Document::new(&source, &text, ContentType::PlainText)])
        }
        ContentType::Markdown => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| RagError::load_failed(&source, e.to_string()))?;
            Ok(vec![Document::new(
                &source,
                &markdown_to_text(&raw),
                ContentType::Markdown,
            )])
        }
        ContentType::Unknown => Err(RagError::load_failed(&source, "unsupported file type")),
    }
}

fn load_pdf(path: &Path, source: &str) -> Result<Vec<Document>> {
    // pdf-extract panics on some malformed files
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text(path))
        .map_err(|_| RagError::load_failed(source, "PDF parser panicked"))?
        .map_err(|e| RagError::load_failed(source, e.to_string()))?;

    Ok(split_pages(&text)
        .into_iter()
        .map(|(page, content)| {
            Document::new(source, content, ContentType::Pdf)
                .with_metadata("page", serde_json::json!(page))
        })
        .collect())
}

/// Split extracted PDF text on form feeds, keeping 0-based page numbers and
/// dropping blank pages.
fn split_pages(text: &str) -> Vec<(usize, &str)> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .collect()
}

/// Render Markdown to plain text, one block element per paragraph.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote
                | TagEnd::TableRow,
            ) => {
                let trimmed_len = out.trim_end_matches(' ').len();
                out.truncate(trimmed_len);
                if !out.is_empty() && !out.ends_with("\n\n") {
                    out.push_str(if out.ends_with('\n') { "\n" } else { "\n\n" });
                }
            }
            Event::End(TagEnd::TableCell) => out.push(' '),
            _ => {}
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_to_text() {
        let md = "# Title\n\nSome *emphasis* and `code`.\n\n- one\n- two\n\n```\nlet x = 1;\n```\n";
        let text = markdown_to_text(md);

        assert!(text.starts_with("Title\n\nSome emphasis and code."));
        assert!(text.contains("one\n\ntwo"));
        assert!(text.contains("let x = 1;"));
        assert!(!text.contains('#'));
        assert!(!text.contains('*'));
    }

    #[test]
    fn test_split_pages() {
        let pages = split_pages("first page\x0c\x0c  \x0cfourth page");
        assert_eq!(pages, vec![(0, "first page"), (3, "fourth page")]);

        assert_eq!(split_pages("no breaks"), vec![(0, "no breaks")]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let docs = load_documents(&dir.path().join("missing"));
        assert!(docs.is_empty());
    }

    #[test]
    fn test_load_documents_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "bravo").unwrap();
        std::fs::write(dir.path().join("a.md"), "# Alpha\n\nbody").unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), "charlie").unwrap();
        std::fs::write(dir.path().join("ignored.csv"), "x,y").unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0x00]).unwrap();

        let docs = load_documents(dir.path());
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();

        assert_eq!(contents, vec!["Alpha\n\nbody", "bravo", "charlie"]);
        assert_eq!(docs[0].content_type, ContentType::Markdown);
        assert!(docs[1].source_uri.ends_with("b.txt"));
        assert_eq!(docs[1].metadata["source"], docs[1].source_uri.as_str());
    }

    #[test]
    fn test_only_pdf_txt_md_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.markdown"), "# Notes").unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();
        std::fs::write(dir.path().join("kept.md"), "kept").unwrap();

        let docs = load_documents(dir.path());

        assert_eq!(docs.len(), 1);
        assert!(docs[0].source_uri.ends_with("kept.md"));
        assert!(load_file(&dir.path().join("notes.markdown")).is_err());
    }

    #[test]
    fn test_broken_pdf_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = load_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "LOAD_FAILED");
    }
}
