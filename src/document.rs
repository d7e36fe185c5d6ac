//! In-memory view of an annual report: one entry per page, each carrying the text of two
//! independent PDF text layers.
//!
//! The plain layer (lopdf) feeds the page classifier; the layout layer (pdf-extract) keeps
//! horizontal spacing, which is what table-row detection needs. Either layer may come back
//! empty for a page, so each falls back on the other.

use crate::error::{FinancialsError, Result};
use crate::utils::fiscal_year_or_default;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// A source of per-page text for a PDF.
pub trait TextLayer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns one string per page, in page order. Pages without text are empty strings.
    fn page_texts(&self, pdf: &[u8]) -> std::result::Result<Vec<String>, String>;
}

/// Layout-preserving extraction via `pdf-extract`.
pub struct LayoutTextLayer;

impl TextLayer for LayoutTextLayer {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn page_texts(&self, pdf: &[u8]) -> std::result::Result<Vec<String>, String> {
        // pdf-extract panics on some malformed font tables instead of returning an error.
        std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(pdf))
            .map_err(|_| "pdf-extract panicked while decoding the document".to_string())?
            .map_err(|e| e.to_string())
    }
}

/// Plain text-layer extraction via `lopdf`.
pub struct PlainTextLayer;

impl TextLayer for PlainTextLayer {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn page_texts(&self, pdf: &[u8]) -> std::result::Result<Vec<String>, String> {
        let doc = lopdf::Document::load_mem(pdf).map_err(|e| e.to_string())?;
        let texts = doc
            .get_pages()
            .keys()
            .map(|page_number| doc.extract_text(&[*page_number]).unwrap_or_default())
            .collect();
        Ok(texts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 0-based position in the document.
    pub index: usize,
    /// Plain text used for classification; empty when neither layer produced anything.
    pub text: String,
    /// Layout-preserving text, when that layer produced any.
    pub layout: Option<String>,
}

impl Page {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        let layout = layout.into();
        self.layout = (!layout.trim().is_empty()).then_some(layout);
        self
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.layout.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    /// Fiscal year the report covers.
    pub year: i32,
    pub pages: Vec<Page>,
}

impl Document {
    /// Reads a PDF from disk with the default text layers. The year is taken from the file
    /// name, falling back to `default_year`.
    pub fn open(path: impl AsRef<Path>, default_year: i32) -> Result<Self> {
        let path = path.as_ref();
        let year = fiscal_year_or_default(path, default_year);
        Self::open_with(path, year, &LayoutTextLayer, &PlainTextLayer)
    }

    pub fn open_with(
        path: &Path,
        year: i32,
        layout_layer: &dyn TextLayer,
        plain_layer: &dyn TextLayer,
    ) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(path, year, &bytes, layout_layer, plain_layer)
    }

    pub fn from_bytes(
        path: &Path,
        year: i32,
        bytes: &[u8],
        layout_layer: &dyn TextLayer,
        plain_layer: &dyn TextLayer,
    ) -> Result<Self> {
        let layout = read_layer(layout_layer, path, bytes);
        let plain = read_layer(plain_layer, path, bytes);

        let (layout, plain) = match (layout, plain) {
            (Err(layout_err), Err(plain_err)) => {
                return Err(FinancialsError::DocumentUnreadable {
                    path: path.display().to_string(),
                    details: format!(
                        "{}: {}; {}: {}",
                        layout_layer.name(),
                        layout_err,
                        plain_layer.name(),
                        plain_err
                    ),
                })
            }
            (layout, plain) => (layout.unwrap_or_default(), plain.unwrap_or_default()),
        };

        let page_count = layout.len().max(plain.len());
        let pages = (0..page_count)
            .map(|index| {
                let layout_text = layout.get(index).cloned().unwrap_or_default();
                let plain_text = plain.get(index).cloned().unwrap_or_default();
                let text = if plain_text.trim().is_empty() {
                    layout_text.clone()
                } else {
                    plain_text
                };
                Page::new(index, text).with_layout(layout_text)
            })
            .collect::<Vec<_>>();

        debug!(
            "Loaded {} pages from {} ({} blank)",
            pages.len(),
            path.display(),
            pages.iter().filter(|p| p.is_blank()).count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            year,
            pages,
        })
    }

    /// Builds a document from text already split into pages.
    pub fn from_pages<S: Into<String>>(
        path: impl Into<PathBuf>,
        year: i32,
        texts: impl IntoIterator<Item = S>,
    ) -> Self {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Page::new(index, text))
            .collect();
        Self {
            path: path.into(),
            year,
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Result<&Page> {
        self.pages
            .get(index)
            .ok_or(FinancialsError::PageOutOfRange {
                index,
                page_count: self.pages.len(),
            })
    }
}

fn read_layer(
    layer: &dyn TextLayer,
    path: &Path,
    bytes: &[u8],
) -> std::result::Result<Vec<String>, String> {
    let result = layer.page_texts(bytes);
    if let Err(e) = &result {
        warn!("{} could not read {}: {}", layer.name(), path.display(), e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLayer(std::result::Result<Vec<&'static str>, &'static str>);

    impl TextLayer for FixedLayer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn page_texts(&self, _pdf: &[u8]) -> std::result::Result<Vec<String>, String> {
            self.0
                .clone()
                .map(|pages| pages.into_iter().map(String::from).collect())
                .map_err(String::from)
        }
    }

    #[test]
    fn test_layers_fill_each_others_gaps() {
        let layout = FixedLayer(Ok(vec!["Revenue    1,000    900", "", "Assets  5"]));
        let plain = FixedLayer(Ok(vec!["Revenue 1,000 900", "Notes 12", ""]));

        let doc = Document::from_bytes(Path::new("X_2023.pdf"), 2023, b"", &layout, &plain)
            .unwrap();

        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.pages[0].text, "Revenue 1,000 900");
        assert_eq!(
            doc.pages[0].layout.as_deref(),
            Some("Revenue    1,000    900")
        );
        assert_eq!(doc.pages[1].layout, None);
        assert_eq!(doc.pages[2].text, "Assets  5");
    }

    #[test]
    fn test_one_failing_layer_is_tolerated() {
        let layout = FixedLayer(Err("bad xref"));
        let plain = FixedLayer(Ok(vec!["Balance Sheet"]));

        let doc =
            Document::from_bytes(Path::new("a.pdf"), 2024, b"", &layout, &plain).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].layout, None);
    }

    #[test]
    fn test_both_layers_failing_is_unreadable() {
        let result = Document::from_bytes(
            Path::new("a.pdf"),
            2024,
            b"",
            &FixedLayer(Err("bad")),
            &FixedLayer(Err("worse")),
        );
        assert!(matches!(
            result,
            Err(FinancialsError::DocumentUnreadable { .. })
        ));
    }

    #[test]
    fn test_page_lookup_is_bounds_checked() {
        let doc = Document::from_pages("a.pdf", 2024, ["one", "two"]);
        assert_eq!(doc.page(1).unwrap().text, "two");
        assert!(matches!(
            doc.page(2),
            Err(FinancialsError::PageOutOfRange {
                index: 2,
                page_count: 2
            })
        ));
    }

    #[test]
    fn test_garbage_bytes_are_unreadable() {
        let result = Document::from_bytes(
            Path::new("junk.pdf"),
            2024,
            b"definitely not a pdf",
            &LayoutTextLayer,
            &PlainTextLayer,
        );
        assert!(result.is_err());
    }
}
