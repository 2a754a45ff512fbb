use std::path::Path;

use anyhow::{Context, Result};

/// Text pulled out of a source file
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    /// Number of pages, for PDFs
    pub page_count: Option<usize>,
}

/// Extract text from a file: PDFs through lopdf, anything else as UTF-8.
pub fn extract_text(path: &Path) -> Result<ExtractedText> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        let pdf_bytes = std::fs::read(path).context("Failed to read PDF file")?;
        return extract_pdf_text(&pdf_bytes);
    }

    let bytes = std::fs::read(path).context("Failed to read file")?;
    let text = String::from_utf8(bytes).context("File is not valid UTF-8 text")?;
    Ok(ExtractedText {
        text,
        page_count: None,
    })
}

/// Extract text from PDF bytes, pages in order, one newline between pages.
pub fn extract_pdf_text(pdf_bytes: &[u8]) -> Result<ExtractedText> {
    let doc = lopdf::Document::load_mem(pdf_bytes).context("Failed to parse PDF")?;

    let mut pages: Vec<u32> = doc.get_pages().keys().cloned().collect();
    pages.sort();
    let page_count = pages.len();

    let mut full_text = String::new();
    for page_num in &pages {
        let page_text = match doc.extract_text(&[*page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(page = page_num, error = %e, "Skipping unreadable page");
                continue;
            }
        };
        full_text.push_str(&page_text);
        if !page_text.ends_with('\n') && !page_text.is_empty() {
            full_text.push('\n');
        }
    }

    tracing::debug!(chars = full_text.len(), page_count, "Extracted PDF text");

    Ok(ExtractedText {
        text: full_text,
        page_count: Some(page_count),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Create a PDF with one page per entry in `page_texts`
    pub(crate) fn create_test_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = format!(
                "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
                text.replace('\\', "\\\\")
                    .replace('(', "\\(")
                    .replace(')', "\\)")
            );
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            page_ids.push(doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }));
        }

        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_texts.len() as i64),
        });

        for page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_extract_pdf_pages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pdf_path = temp_dir.path().join("lecture.PDF");
        std::fs::write(&pdf_path, create_test_pdf(&["Page One", "Page Two"])).unwrap();

        let result = extract_text(&pdf_path).unwrap();

        assert_eq!(result.page_count, Some(2));
        assert!(
            result.text.contains("Page") || result.text.contains("One"),
            "Expected page text, got: '{}'",
            result.text
        );
    }

    #[test]
    fn test_extract_plain_text() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\n\nPhotosynthesis converts light.").unwrap();

        let result = extract_text(&path).unwrap();

        assert_eq!(result.page_count, None);
        assert!(result.text.contains("Photosynthesis"));
    }

    #[test]
    fn test_extract_rejects_binary_text_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("data.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = extract_text(&path).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_extract_invalid_pdf() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("invalid.pdf");
        std::fs::write(&path, b"this is not a valid pdf file").unwrap();

        let err = extract_text(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse PDF"));
    }

    #[test]
    fn test_extract_missing_file() {
        let err = extract_text(Path::new("/nonexistent/path/to/file.pdf")).unwrap_err();
        assert!(err.to_string().contains("Failed to read PDF file"));
    }
}
