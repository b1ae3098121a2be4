pub mod error;
mod structural;

pub use error::ParseError;

use crate::Catalog;

/// Block catalog parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the catalog Markdown into reference blocks.
    pub fn parse(&self) -> Result<Catalog, Vec<ParseError>> {
        self.parse_with_warnings().map(|(catalog, _)| catalog)
    }

    /// Like `parse`, also returning warnings about ignored content. On
    /// failure the list holds the errors first, then the warnings.
    pub fn parse_with_warnings(&self) -> Result<(Catalog, Vec<ParseError>), Vec<ParseError>> {
        let (blocks, warnings) = structural::parse_blocks(&self.source, self.file_id)?;
        let mut catalog = Catalog::new();
        for block in blocks {
            catalog.blocks.insert(block.name.clone(), block);
        }
        Ok((catalog, warnings))
    }
}
