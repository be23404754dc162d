//! Document source abstraction.
//!
//! The pipeline never touches files or format parsers directly: a
//! `DocumentReader` hands it page counts, per-page text layers, rendered
//! page images, and (for word-processor formats) a flat block stream.
//! `InMemoryDocument` is the reference implementation and the workhorse of
//! the test suite.

use std::collections::BTreeMap;

use super::types::ExtractionError;

/// Cell matrix of one table, first row treated as the header.
pub type TableRows = Vec<Vec<String>>;

/// Reference to an image embedded in a page. The pipeline emits these as
/// markdown image links; asset export itself stays with the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub name: String,
    pub alt_text: String,
}

/// A paragraph- or table-level block from a word-processor document.
/// Word formats have no page geometry, so blocks carry no coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum WordBlock {
    Paragraph(String),
    /// Rows of cells, first row treated as the header.
    Table(TableRows),
}

/// Read-side capabilities of an input document.
pub trait DocumentReader: Send + Sync {
    fn page_count(&self) -> u32;

    /// Embedded text layer of a page (1-based). Empty string for pages
    /// with no text layer.
    fn page_text(&self, page: u32) -> Result<String, ExtractionError>;

    /// Rendered image of a page (1-based), for OCR and vision backends.
    fn page_image(&self, page: u32) -> Result<Vec<u8>, ExtractionError>;

    /// Embedded tables of a page (1-based) as cell matrices. Sources
    /// without table detection report none.
    fn page_tables(&self, _page: u32) -> Result<Vec<TableRows>, ExtractionError> {
        Ok(Vec::new())
    }

    /// References to images embedded in a page (1-based). Sources without
    /// image detection report none.
    fn page_images(&self, _page: u32) -> Result<Vec<ImageRef>, ExtractionError> {
        Ok(Vec::new())
    }

    /// Block stream for word-processor documents. Default is unsupported;
    /// only word-format readers override this.
    fn word_blocks(&self) -> Result<Vec<WordBlock>, ExtractionError> {
        Err(ExtractionError::Unsupported(
            "document source has no block stream".to_string(),
        ))
    }
}

/// In-memory document: page texts, page images, and an optional block
/// stream, all provided up front.
#[derive(Debug, Default)]
pub struct InMemoryDocument {
    pages: Vec<String>,
    images: Vec<Vec<u8>>,
    blocks: Option<Vec<WordBlock>>,
    tables: BTreeMap<u32, Vec<TableRows>>,
    image_refs: BTreeMap<u32, Vec<ImageRef>>,
}

impl InMemoryDocument {
    /// Document whose pages carry the given text layers. Page images are
    /// synthesized as placeholder bytes so OCR-path tests work unchanged.
    pub fn from_pages<S: Into<String>>(pages: Vec<S>) -> Self {
        let pages: Vec<String> = pages.into_iter().map(Into::into).collect();
        let images = pages
            .iter()
            .enumerate()
            .map(|(i, _)| format!("page-image-{}", i + 1).into_bytes())
            .collect();
        Self {
            pages,
            images,
            ..Default::default()
        }
    }

    /// Word-style document made of paragraph and table blocks. Reported
    /// as a single page with an empty text layer.
    pub fn from_blocks(blocks: Vec<WordBlock>) -> Self {
        Self {
            pages: vec![String::new()],
            images: vec![Vec::new()],
            blocks: Some(blocks),
            ..Default::default()
        }
    }

    /// Attach embedded tables to a page.
    pub fn with_tables(mut self, page: u32, tables: Vec<TableRows>) -> Self {
        self.tables.insert(page, tables);
        self
    }

    /// Attach embedded image references to a page.
    pub fn with_images(mut self, page: u32, images: Vec<ImageRef>) -> Self {
        self.image_refs.insert(page, images);
        self
    }

    fn check_page(&self, page: u32) -> Result<usize, ExtractionError> {
        let count = self.page_count();
        if page == 0 || page > count {
            return Err(ExtractionError::PageOutOfRange { page, count });
        }
        Ok((page - 1) as usize)
    }
}

impl DocumentReader for InMemoryDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, page: u32) -> Result<String, ExtractionError> {
        let idx = self.check_page(page)?;
        Ok(self.pages[idx].clone())
    }

    fn page_image(&self, page: u32) -> Result<Vec<u8>, ExtractionError> {
        let idx = self.check_page(page)?;
        Ok(self.images[idx].clone())
    }

    fn page_tables(&self, page: u32) -> Result<Vec<TableRows>, ExtractionError> {
        self.check_page(page)?;
        Ok(self.tables.get(&page).cloned().unwrap_or_default())
    }

    fn page_images(&self, page: u32) -> Result<Vec<ImageRef>, ExtractionError> {
        self.check_page(page)?;
        Ok(self.image_refs.get(&page).cloned().unwrap_or_default())
    }

    fn word_blocks(&self) -> Result<Vec<WordBlock>, ExtractionError> {
        match &self.blocks {
            Some(blocks) => Ok(blocks.clone()),
            None => Err(ExtractionError::Unsupported(
                "document source has no block stream".to_string(),
            )),
        }
    }
}
