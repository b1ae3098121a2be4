pub mod block;
pub mod error;
pub mod parser;
pub mod template;
pub mod value;

use indexmap::IndexMap;

pub use crate::block::Block;
pub use crate::block::annotation::TypeName;
pub use crate::block::call::Call;
pub use crate::error::{BlockError, SignaturePart, TemplateError};
pub use crate::template::Template;
pub use crate::value::ParamValue;

/// A catalog of reference blocks, loaded from one or more catalog files.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Reference blocks keyed by name, in declaration order.
    pub blocks: IndexMap<String, Block>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Register a block. Names are unique within a catalog.
    pub fn insert(&mut self, block: Block) -> Result<(), BlockError> {
        if self.blocks.contains_key(&block.name) {
            return Err(BlockError::DuplicateBlock { name: block.name });
        }
        self.blocks.insert(block.name.clone(), block);
        Ok(())
    }

    /// Merge another catalog (e.g. a second catalog file) into this one.
    pub fn extend(&mut self, other: Catalog) -> Result<(), BlockError> {
        for (_, block) in other.blocks {
            self.insert(block)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(|s| s.as_str())
    }
}
