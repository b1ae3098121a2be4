use std::collections::BTreeSet;

use indexmap::IndexMap;
use studygen::{Block, BlockError, SignaturePart, TypeName};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Combine bound blocks into one composite block.
///
/// Every input must already carry its call-site bindings. `requested` lists
/// the composite's outputs; a `None` type is resolved from the block that
/// produces the name.
pub fn merge(
    blocks: &[Block],
    name: &str,
    doc: &str,
    requested: &IndexMap<String, Option<TypeName>>,
) -> EngineResult<Block> {
    let parameters = merge_parameters(blocks)?;
    let outputs = resolve_outputs(blocks, name, requested)?;
    let imports = merge_imports(blocks)?;
    let dependencies = merge_dependencies(blocks);
    let calls = blocks.iter().map(Block::call).collect();

    debug!(
        block = name,
        inputs = blocks.len(),
        parameters = parameters.len(),
        outputs = outputs.len(),
        "merged composite block"
    );

    Ok(Block::composite(name, parameters, outputs, calls)
        .with_doc(doc)
        .with_imports(imports)
        .with_dependencies(dependencies))
}

/// Union of every block's bound arguments, in first-seen order.
///
/// A name bound with two different types is a signature conflict. Names
/// produced by a block are then dropped, unless the same block also takes
/// them (in-place).
pub fn merge_parameters(blocks: &[Block]) -> EngineResult<IndexMap<String, TypeName>> {
    let mut union: IndexMap<String, TypeName> = IndexMap::new();

    for block in blocks {
        for (name, ty) in block.arguments() {
            match union.get(name) {
                Some(existing) if existing != ty => {
                    return Err(EngineError::SignatureConflict {
                        parameter: name.clone(),
                        first: existing.to_string(),
                        second: ty.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    union.insert(name.clone(), ty.clone());
                }
            }
        }
    }

    for block in blocks {
        for output in block.outputs().keys() {
            if !block.is_in_place(output) {
                union.shift_remove(output);
            }
        }
    }

    Ok(union)
}

/// Type every requested output from the block that produces it: a bound
/// output first, then an in-place argument.
pub fn resolve_outputs(
    blocks: &[Block],
    composite: &str,
    requested: &IndexMap<String, Option<TypeName>>,
) -> EngineResult<IndexMap<String, TypeName>> {
    let mut resolved = IndexMap::with_capacity(requested.len());

    for (name, wanted) in requested {
        let found = blocks
            .iter()
            .find_map(|b| b.outputs().get(name))
            .or_else(|| {
                blocks
                    .iter()
                    .filter(|b| b.is_in_place(name))
                    .find_map(|b| b.argument_type(name))
            })
            .ok_or_else(|| EngineError::UnreachableOutput {
                block: composite.to_string(),
                output: name.clone(),
            })?;

        if let Some(wanted) = wanted {
            if wanted != found {
                return Err(BlockError::TypeMismatch {
                    block: composite.to_string(),
                    part: SignaturePart::Output,
                    name: name.clone(),
                    expected: found.to_string(),
                    found: wanted.to_string(),
                }
                .into());
            }
        }
        resolved.insert(name.clone(), found.clone());
    }

    Ok(resolved)
}

/// Union of import statements. A module key must map to the same statement
/// everywhere.
pub fn merge_imports<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
) -> EngineResult<IndexMap<String, String>> {
    let mut imports: IndexMap<String, String> = IndexMap::new();
    for block in blocks {
        for (module, statement) in &block.imports {
            match imports.get(module) {
                Some(existing) if existing != statement => {
                    return Err(EngineError::ImportConflict {
                        module: module.clone(),
                        first: existing.clone(),
                        second: statement.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    imports.insert(module.clone(), statement.clone());
                }
            }
        }
    }
    Ok(imports)
}

/// Every input block plus what each of them depends on.
pub fn merge_dependencies(blocks: &[Block]) -> BTreeSet<String> {
    let mut dependencies = BTreeSet::new();
    for block in blocks {
        dependencies.insert(block.name.clone());
        dependencies.extend(block.dependencies.iter().cloned());
    }
    dependencies
}
