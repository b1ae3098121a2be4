use indexmap::IndexMap;
use studygen::{Block, Catalog, ParamValue, TypeName};
use tracing::{debug, info};

use crate::documents::{Configuration, Invocation, NewBlockSpec, TargetSpec, script_block_name};
use crate::error::{EngineError, EngineResult};
use crate::merge::{merge, merge_imports};

/// Name of the composite block every target is merged into.
pub const MAIN_BLOCK: &str = "main";

/// Blocks needed to build one generation target, in the order they were
/// pulled in.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    blocks: IndexMap<String, Block>,
}

impl Registry {
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

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    fn insert(&mut self, block: Block) -> EngineResult<()> {
        if self.blocks.contains_key(&block.name) {
            return Err(EngineError::DuplicateDefinition { block: block.name });
        }
        self.blocks.insert(block.name.clone(), block);
        Ok(())
    }

    /// Pull a catalog block and, transitively, every catalog block it
    /// depends on. Dependencies missing from the catalog are left for
    /// `check_dependencies` to report.
    fn pull(&mut self, catalog: &Catalog, name: &str, target: &str) -> EngineResult<()> {
        let mut pending = vec![name.to_string()];
        let mut first = true;
        while let Some(name) = pending.pop() {
            if self.contains(&name) {
                first = false;
                continue;
            }
            let block = match catalog.get(&name) {
                Some(block) => block,
                None if first => {
                    return Err(EngineError::UnknownBlock {
                        block: name,
                        target: target.to_string(),
                    });
                }
                None => continue,
            };
            first = false;
            debug!(generation = target, block = %name, "pulled block");
            pending.extend(block.dependencies.iter().rev().cloned());
            self.blocks.insert(name, block.clone());
        }
        Ok(())
    }

    /// Every dependency of every block must be present, or be one of the
    /// target's own new blocks.
    fn check_dependencies(&self, new_blocks: &IndexMap<String, NewBlockSpec>) -> EngineResult<()> {
        for block in self.blocks.values() {
            for dependency in &block.dependencies {
                if !self.contains(dependency) && !new_blocks.contains_key(dependency) {
                    return Err(EngineError::MissingDependency {
                        block: block.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The registered block for a script key, bound as the invocation says.
    fn bind(
        &self,
        key: &str,
        invocation: Option<&Invocation>,
        target: &str,
    ) -> EngineResult<Block> {
        let name = script_block_name(key);
        let mut block = self
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownBlock {
                block: name.to_string(),
                target: target.to_string(),
            })?;
        if let Some(invocation) = invocation {
            if let Some(args) = &invocation.args {
                block = block.with_argument_names(args.as_slice())?;
            }
            if let Some(output) = &invocation.output {
                block = block.with_output_names(output.as_slice())?;
            }
        }
        Ok(block)
    }

    fn bind_script(
        &self,
        script: &IndexMap<String, Option<Invocation>>,
        target: &str,
    ) -> EngineResult<Vec<Block>> {
        script
            .iter()
            .map(|(key, invocation)| self.bind(key, invocation.as_ref(), target))
            .collect()
    }
}

/// A generation target resolved once and rendered per scan combination.
#[derive(Debug, Clone)]
pub struct PreparedTarget {
    pub name: String,
    /// Reference blocks and composite new blocks, without `main`.
    pub registry: Registry,
    pub main: Block,
    /// Imports of every registered block, conflict-checked.
    pub imports: IndexMap<String, String>,
}

/// Resolve a target: pull its blocks, check dependencies, build its new
/// blocks in declaration order, then merge its script into `main`.
pub fn resolve_target(catalog: &Catalog, name: &str, spec: &TargetSpec) -> EngineResult<PreparedTarget> {
    let mut registry = Registry::default();

    for key in spec.script.keys() {
        let block = script_block_name(key);
        if !spec.new_blocks.contains_key(block) {
            registry.pull(catalog, block, name)?;
        }
    }
    for new_block in spec.new_blocks.values() {
        for key in new_block.script.keys() {
            let block = script_block_name(key);
            if !spec.new_blocks.contains_key(block) {
                registry.pull(catalog, block, name)?;
            }
        }
    }

    registry.check_dependencies(&spec.new_blocks)?;
    let imports = merge_imports(registry.blocks())?;

    for (block_name, new_block) in &spec.new_blocks {
        if registry.contains(block_name) {
            return Err(EngineError::DuplicateDefinition {
                block: block_name.clone(),
            });
        }
        let inputs = registry.bind_script(&new_block.script, name)?;
        let requested = requested_outputs(new_block.output.as_deref());
        let doc = new_block.docstring.as_deref().unwrap_or_default();
        let mut composite = merge(&inputs, block_name, doc, &requested)?;
        if let Some(order) = &new_block.params {
            composite = composite.with_parameter_order(order.as_slice())?;
        }
        registry.insert(composite)?;
    }

    if registry.contains(MAIN_BLOCK) {
        return Err(EngineError::DuplicateDefinition {
            block: MAIN_BLOCK.to_string(),
        });
    }
    let inputs = registry.bind_script(&spec.script, name)?;
    let requested = requested_outputs(spec.output.as_deref());
    let main = merge(&inputs, MAIN_BLOCK, "", &requested)?;

    debug!(
        generation = name,
        blocks = registry.len(),
        parameters = main.parameters().len(),
        "resolved target"
    );

    Ok(PreparedTarget {
        name: name.to_string(),
        registry,
        main,
        imports,
    })
}

fn requested_outputs(names: Option<&[String]>) -> IndexMap<String, Option<TypeName>> {
    names
        .unwrap_or_default()
        .iter()
        .map(|name| (name.clone(), None))
        .collect()
}

/// Literal value of every `main` parameter. A scan value takes precedence
/// over the configured one.
pub fn materialize_parameters(
    main: &Block,
    configuration: &Configuration,
    overrides: &IndexMap<String, ParamValue>,
) -> EngineResult<IndexMap<String, ParamValue>> {
    let mut values = IndexMap::with_capacity(main.parameters().len());
    for parameter in main.parameters().keys() {
        let configured = configuration.lookup(parameter);
        let value = match (configured, overrides.get(parameter)) {
            (Some(configured), Some(scanned)) => {
                info!(
                    parameter = %parameter,
                    configured = %configured,
                    scanned = %scanned,
                    "parameter is both configured and scanned, using the scanned value"
                );
                scanned.clone()
            }
            (None, Some(scanned)) => scanned.clone(),
            (Some(configured), None) => configured,
            (None, None) => {
                return Err(EngineError::MissingParameter {
                    parameter: parameter.clone(),
                });
            }
        };
        values.insert(parameter.clone(), value);
    }
    Ok(values)
}
