//! Tantivy schema for the line index: one document per indexed source line.

use std::path::PathBuf;

use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, Value,
    STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::{Index, TantivyDocument};

use crate::error::Result;

/// Tokenizer registered on every opened index for `line_content`.
pub const LINE_TOKENIZER: &str = "line";

pub mod fields {
    pub const PATH: &str = "path";
    pub const LINE_NUMBER: &str = "line_number";
    pub const LINE_CONTENT: &str = "line_content";
    pub const LAST_WRITE: &str = "last_write";
}

/// `path` is indexed verbatim so a file's lines can be deleted by exact term.
/// `line_content` is split on non-alphanumeric characters and lower-cased, with
/// positions kept for phrase queries.
pub fn create_schema() -> Schema {
    let mut builder = Schema::builder();

    let line_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(LINE_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    builder.add_text_field(fields::PATH, STRING | STORED);
    builder.add_u64_field(fields::LINE_NUMBER, NumericOptions::default().set_stored());
    builder.add_text_field(fields::LINE_CONTENT, line_options);
    builder.add_i64_field(fields::LAST_WRITE, NumericOptions::default().set_stored());

    builder.build()
}

/// Register the line tokenizer. The default tokenizer drops tokens longer than
/// 40 bytes, which would make long identifiers unsearchable.
pub fn register_tokenizers(index: &Index) {
    index.tokenizers().register(
        LINE_TOKENIZER,
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
}

/// Resolved field handles.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub path: Field,
    pub line_number: Field,
    pub line_content: Field,
    pub last_write: Field,
}

impl IndexFields {
    pub fn new(schema: &Schema) -> Result<Self> {
        Ok(Self {
            path: schema.get_field(fields::PATH)?,
            line_number: schema.get_field(fields::LINE_NUMBER)?,
            line_content: schema.get_field(fields::LINE_CONTENT)?,
            last_write: schema.get_field(fields::LAST_WRITE)?,
        })
    }

    pub fn line_document(
        &self,
        path: &str,
        line_number: usize,
        line_content: &str,
        last_write: i64,
    ) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.path, path);
        doc.add_u64(self.line_number, line_number as u64);
        doc.add_text(self.line_content, line_content);
        doc.add_i64(self.last_write, last_write);
        doc
    }

    /// Decode a stored document. `None` when a field is missing.
    pub fn stored_line(&self, doc: &TantivyDocument) -> Option<StoredLine> {
        Some(StoredLine {
            path: PathBuf::from(doc.get_first(self.path)?.as_str()?),
            line_number: doc.get_first(self.line_number)?.as_u64()? as usize,
            line_content: doc.get_first(self.line_content)?.as_str()?.to_string(),
            last_write: doc.get_first(self.last_write)?.as_i64()?,
        })
    }
}

/// The stored fields of one line document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLine {
    pub path: PathBuf,
    pub line_number: usize,
    pub line_content: String,
    pub last_write: i64,
}
