//! Paragraph-packing chunkers.
//!
//! Paragraphs are separated by a blank line (`\n\n` or `\r\n\r\n`) and packed
//! in order into fragments of at most `max_chars` characters. A paragraph is
//! never split: one longer than the budget becomes its own fragment.

use std::borrow::Cow;

use tracing::debug;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::traits::ChunkStrategy;
use crate::types::{meta_keys, DocumentChunk, Metadata};

pub const DEFAULT_MAX_CHARS: usize = 1000;

/// Joins paragraphs packed into the same fragment.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

const UPLOAD_SOURCE: &str = "upload";
const FORM_FEED: char = '\u{000C}';

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: DEFAULT_MAX_CHARS }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self { max_chars: settings.max_chars }
    }
}

/// Split on blank lines and drop whitespace-only paragraphs. Kept paragraphs
/// are returned verbatim, indentation included.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    };
    normalized
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode uploaded bytes as UTF-8, replacing invalid sequences.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Packed fragment text plus the page its first paragraph came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedChunk {
    pub content: String,
    pub page: usize,
}

#[derive(Default)]
struct Buffer {
    text: String,
    chars: usize,
    page: usize,
}

impl Buffer {
    fn take(&mut self) -> PackedChunk {
        self.chars = 0;
        PackedChunk { content: std::mem::take(&mut self.text), page: self.page }
    }
}

/// Pack `(paragraph, page)` pairs into fragments of at most `max_chars`
/// characters, separator included.
pub fn pack_paragraphs<I, S>(paragraphs: I, max_chars: usize) -> Vec<PackedChunk>
where
    I: IntoIterator<Item = (S, usize)>,
    S: AsRef<str>,
{
    let separator_chars = PARAGRAPH_SEPARATOR.chars().count();
    let mut packed = Vec::new();
    let mut buffer = Buffer::default();

    for (paragraph, page) in paragraphs {
        let paragraph = paragraph.as_ref();
        let chars = paragraph.chars().count();
        if buffer.chars > 0 && buffer.chars + separator_chars + chars > max_chars {
            packed.push(buffer.take());
        }
        if buffer.chars == 0 {
            buffer.page = page;
        } else {
            buffer.text.push_str(PARAGRAPH_SEPARATOR);
            buffer.chars += separator_chars;
        }
        buffer.text.push_str(paragraph);
        buffer.chars += chars;
    }
    if buffer.chars > 0 {
        packed.push(buffer.take());
    }
    packed
}

fn base_metadata(file_name: &str, sequence: usize, content: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(meta_keys::FILE_NAME.into(), file_name.into());
    metadata.insert(meta_keys::CHUNK_INDEX.into(), sequence.into());
    metadata.insert(meta_keys::CONTENT.into(), content.into());
    metadata.insert(meta_keys::SOURCE.into(), UPLOAD_SOURCE.into());
    metadata
}

fn matches_extension(extensions: &[String], extension: &str) -> bool {
    extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
}

/// Plain-text documents.
pub struct TextChunker {
    config: ChunkingConfig,
    extensions: Vec<String>,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config, extensions: vec![".txt".to_string()] }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_text(&self, document_id: &str, file_name: &str, text: &str) -> Vec<DocumentChunk> {
        let paragraphs = split_paragraphs(text).into_iter().map(|p| (p, 1));
        pack_paragraphs(paragraphs, self.config.max_chars)
            .into_iter()
            .enumerate()
            .map(|(sequence, packed)| DocumentChunk {
                id: DocumentChunk::fragment_id(document_id, sequence),
                document_id: document_id.to_string(),
                sequence,
                metadata: base_metadata(file_name, sequence, &packed.content),
                content: packed.content,
            })
            .collect()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl ChunkStrategy for TextChunker {
    fn name(&self) -> &str {
        "text"
    }

    fn can_handle(&self, extension: &str) -> bool {
        matches_extension(&self.extensions, extension)
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn chunk(
        &self,
        document_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Vec<DocumentChunk>> {
        let text = decode_text(bytes);
        let chunks = self.chunk_text(document_id, file_name, &text);
        debug!(file_name, chunks = chunks.len(), "chunked text document");
        Ok(chunks)
    }
}

/// Turns an uploaded file into the plain text of each page, in order.
///
/// Format parsing (PDF and friends) lives outside this crate; implementors
/// wrap whatever extractor the deployment uses.
pub trait PageExtractor: Send + Sync {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

/// Pre-extracted text with pages delimited by form feeds, as written by
/// `pdftotext` and similar tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormFeedPages;

impl PageExtractor for FormFeedPages {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        Ok(decode_text(bytes).split(FORM_FEED).map(str::to_string).collect())
    }
}

/// Page-oriented documents. Chunks like [`TextChunker`] over the paragraphs
/// of all pages and records the 1-based page each fragment starts on.
pub struct PagedChunker<E> {
    config: ChunkingConfig,
    extractor: E,
    extensions: Vec<String>,
}

impl<E: PageExtractor> PagedChunker<E> {
    pub fn new<I, S>(config: ChunkingConfig, extractor: E, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { config, extractor, extensions: extensions.into_iter().map(Into::into).collect() }
    }

    pub fn chunk_pages<S: AsRef<str>>(
        &self,
        document_id: &str,
        file_name: &str,
        pages: &[S],
    ) -> Vec<DocumentChunk> {
        let paragraphs = pages.iter().enumerate().flat_map(|(index, page)| {
            split_paragraphs(page.as_ref()).into_iter().map(move |p| (p, index + 1))
        });
        pack_paragraphs(paragraphs, self.config.max_chars)
            .into_iter()
            .enumerate()
            .map(|(sequence, packed)| {
                let mut metadata = base_metadata(file_name, sequence, &packed.content);
                metadata.insert(meta_keys::PAGE_NUMBER.into(), packed.page.into());
                DocumentChunk {
                    id: DocumentChunk::fragment_id(document_id, sequence),
                    document_id: document_id.to_string(),
                    sequence,
                    content: packed.content,
                    metadata,
                }
            })
            .collect()
    }
}

impl<E: PageExtractor> ChunkStrategy for PagedChunker<E> {
    fn name(&self) -> &str {
        "paged"
    }

    fn can_handle(&self, extension: &str) -> bool {
        matches_extension(&self.extensions, extension)
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn chunk(
        &self,
        document_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Vec<DocumentChunk>> {
        let pages = self.extractor.pages(bytes).map_err(|e| {
            Error::Validation(format!(
                "could not extract pages from {file_name}: {}",
                e.detail()
            ))
        })?;
        let chunks = self.chunk_pages(document_id, file_name, &pages);
        debug!(file_name, pages = pages.len(), chunks = chunks.len(), "chunked paged document");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_crlf_and_blank_runs() {
        let text = "one\r\n\r\ntwo\n\n\n\nthree\n";
        assert_eq!(split_paragraphs(text), vec!["one", "two", "three\n"]);
    }

    #[test]
    fn single_newlines_stay_inside_a_paragraph() {
        let text = "line a\nline b\n\nnext";
        assert_eq!(split_paragraphs(text), vec!["line a\nline b", "next"]);
    }

    #[test]
    fn pack_counts_characters_not_bytes() {
        // 4 chars, 8 bytes each
        let paragraphs = [("éééé", 1), ("éééé", 1)];
        let packed = pack_paragraphs(paragraphs, 10);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].content, "éééé\n\néééé");
    }

    #[test]
    fn oversized_paragraph_flushes_pending_buffer() {
        let big = "x".repeat(50);
        let paragraphs = [("small", 1), (big.as_str(), 2), ("tail", 3)];
        let packed = pack_paragraphs(paragraphs, 20);
        let contents: Vec<_> = packed.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["small", big.as_str(), "tail"]);
        assert_eq!(packed.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
