pub mod annotation;
pub mod call;

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;

use crate::block::annotation::{TypeName, parse_return_annotation};
use crate::block::call::Call;
use crate::error::{BlockError, SignaturePart};

/// The source of a block, with its declaration line and doc comment removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Verbatim source text at column zero. Self-contained: it carries its
    /// own return statement.
    Source(String),
    /// Call-and-assign statements of a composite block, in call order.
    /// The renderer appends the return statement.
    Calls(Vec<Call>),
}

/// A named, composable unit of generated code.
///
/// The signature is fixed at construction. Renaming (`with_argument_names`,
/// `with_output_names`, ...) consumes the block and returns the renamed one;
/// it can change names, never types or counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Unique name within a registry; also the emitted function name.
    pub name: String,
    /// Doc comment, without quoting.
    pub doc: String,
    /// Names of blocks that must be emitted alongside this one.
    pub dependencies: BTreeSet<String>,
    /// Module key → import statement.
    pub imports: IndexMap<String, String>,
    /// Declared parameters, in call order.
    parameters: IndexMap<String, TypeName>,
    /// Declared outputs, in return order.
    outputs: IndexMap<String, TypeName>,
    /// Call-site binding, positionally matched to `parameters`.
    arguments: Vec<(String, TypeName)>,
    body: Body,
}

impl Block {
    /// Create a reference block. Output names are synthesized from the block
    /// name: `output_<name>` for one output, `output_<i>_<name>` for several.
    pub fn new(
        name: impl Into<String>,
        parameters: IndexMap<String, TypeName>,
        output_types: Vec<TypeName>,
        body: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let outputs = synthesize_output_names(&name, output_types);
        Self::from_parts(name, parameters, outputs, Body::Source(body.into()))
    }

    /// Create a reference block from a return annotation such as `float`,
    /// `None` or `tuple[float, int]`.
    pub fn reference(
        name: impl Into<String>,
        parameters: IndexMap<String, TypeName>,
        returns: &str,
        body: impl Into<String>,
    ) -> Result<Self, BlockError> {
        let name = name.into();
        let output_types =
            parse_return_annotation(returns).map_err(|reason| BlockError::InvalidAnnotation {
                block: name.clone(),
                annotation: returns.to_string(),
                reason,
            })?;
        Ok(Self::new(name, parameters, output_types, body))
    }

    /// Create a composite block whose body is a sequence of calls.
    pub fn composite(
        name: impl Into<String>,
        parameters: IndexMap<String, TypeName>,
        outputs: IndexMap<String, TypeName>,
        calls: Vec<Call>,
    ) -> Self {
        Self::from_parts(name.into(), parameters, outputs, Body::Calls(calls))
    }

    fn from_parts(
        name: String,
        parameters: IndexMap<String, TypeName>,
        outputs: IndexMap<String, TypeName>,
        body: Body,
    ) -> Self {
        let arguments = identity_arguments(&parameters);
        Block {
            name,
            doc: String::new(),
            dependencies: BTreeSet::new(),
            imports: IndexMap::new(),
            parameters,
            outputs,
            arguments,
            body,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn with_import(mut self, module: impl Into<String>, statement: impl Into<String>) -> Self {
        self.imports.insert(module.into(), statement.into());
        self
    }

    pub fn with_imports(mut self, imports: IndexMap<String, String>) -> Self {
        self.imports.extend(imports);
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn parameters(&self) -> &IndexMap<String, TypeName> {
        &self.parameters
    }

    pub fn outputs(&self) -> &IndexMap<String, TypeName> {
        &self.outputs
    }

    pub fn arguments(&self) -> &[(String, TypeName)] {
        &self.arguments
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.keys().map(|s| s.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.keys().map(|s| s.as_str()).collect()
    }

    pub fn argument_names(&self) -> Vec<&str> {
        self.arguments.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Type of a bound argument name, if this block takes it.
    pub fn argument_type(&self, name: &str) -> Option<&TypeName> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, ty)| ty)
    }

    /// True if `name` is both taken and returned by this block.
    pub fn is_in_place(&self, name: &str) -> bool {
        self.outputs.contains_key(name) && self.argument_type(name).is_some()
    }

    /// The call-and-assign statement invoking this block with its current
    /// bindings.
    pub fn call(&self) -> Call {
        Call {
            function: self.name.clone(),
            arguments: self.arguments.iter().map(|(name, _)| name.clone()).collect(),
            outputs: self.outputs.keys().cloned().collect(),
        }
    }

    /// Bind call-site arguments. Count and positional types must match the
    /// declared parameters.
    pub fn with_arguments(mut self, arguments: Vec<(String, TypeName)>) -> Result<Self, BlockError> {
        self.check_arity(SignaturePart::Argument, self.parameters.len(), arguments.len())?;
        for ((name, found), expected) in arguments.iter().zip(self.parameters.values()) {
            if found != expected {
                return Err(BlockError::TypeMismatch {
                    block: self.name.clone(),
                    part: SignaturePart::Argument,
                    name: name.clone(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        self.arguments = arguments;
        Ok(self)
    }

    /// Bind call-site argument names; types come from the declared parameters.
    pub fn with_argument_names<S: AsRef<str>>(self, names: &[S]) -> Result<Self, BlockError> {
        self.check_arity(SignaturePart::Argument, self.parameters.len(), names.len())?;
        let arguments = names
            .iter()
            .zip(self.parameters.values())
            .map(|(name, ty)| (name.as_ref().to_string(), ty.clone()))
            .collect();
        self.with_arguments(arguments)
    }

    /// Rename outputs. Count and positional types must match.
    pub fn with_outputs(mut self, outputs: Vec<(String, TypeName)>) -> Result<Self, BlockError> {
        self.check_arity(SignaturePart::Output, self.outputs.len(), outputs.len())?;
        let mut renamed = IndexMap::with_capacity(outputs.len());
        for ((name, found), expected) in outputs.into_iter().zip(self.outputs.values()) {
            if &found != expected {
                return Err(BlockError::TypeMismatch {
                    block: self.name.clone(),
                    part: SignaturePart::Output,
                    name,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
            if renamed.contains_key(&name) {
                return Err(BlockError::DuplicateOutput {
                    block: self.name.clone(),
                    name,
                });
            }
            renamed.insert(name, found);
        }
        self.outputs = renamed;
        Ok(self)
    }

    /// Rename outputs, keeping their types.
    pub fn with_output_names<S: AsRef<str>>(self, names: &[S]) -> Result<Self, BlockError> {
        self.check_arity(SignaturePart::Output, self.outputs.len(), names.len())?;
        let outputs = names
            .iter()
            .zip(self.outputs.values())
            .map(|(name, ty)| (name.as_ref().to_string(), ty.clone()))
            .collect();
        self.with_outputs(outputs)
    }

    /// Reorder the declared parameters. `order` must name exactly the current
    /// parameters. Arguments are re-bound to the parameter names.
    pub fn with_parameter_order<S: AsRef<str>>(mut self, order: &[S]) -> Result<Self, BlockError> {
        let requested: HashSet<&str> = order.iter().map(|s| s.as_ref()).collect();
        for name in order {
            if !self.parameters.contains_key(name.as_ref()) {
                return Err(BlockError::ParameterMismatch {
                    block: self.name.clone(),
                    parameter: name.as_ref().to_string(),
                    reason: "is listed but not taken by the merged block".into(),
                });
            }
        }
        if let Some(extra) = self.parameters.keys().find(|p| !requested.contains(p.as_str())) {
            return Err(BlockError::ParameterMismatch {
                block: self.name.clone(),
                parameter: extra.clone(),
                reason: "is taken by the merged block but not listed".into(),
            });
        }

        let mut reordered = IndexMap::with_capacity(self.parameters.len());
        for name in order {
            if let Some((key, ty)) = self.parameters.get_key_value(name.as_ref()) {
                reordered.insert(key.clone(), ty.clone());
            }
        }
        self.arguments = identity_arguments(&reordered);
        self.parameters = reordered;
        Ok(self)
    }

    fn check_arity(&self, part: SignaturePart, expected: usize, found: usize) -> Result<(), BlockError> {
        if expected == found {
            Ok(())
        } else {
            Err(BlockError::ArityMismatch {
                block: self.name.clone(),
                part,
                expected,
                found,
            })
        }
    }
}

fn synthesize_output_names(block: &str, types: Vec<TypeName>) -> IndexMap<String, TypeName> {
    if types.len() == 1 {
        return types
            .into_iter()
            .map(|ty| (format!("output_{}", block), ty))
            .collect();
    }
    types
        .into_iter()
        .enumerate()
        .map(|(idx, ty)| (format!("output_{}_{}", idx, block), ty))
        .collect()
}

fn identity_arguments(parameters: &IndexMap<String, TypeName>) -> Vec<(String, TypeName)> {
    parameters
        .iter()
        .map(|(name, ty)| (name.clone(), ty.clone()))
        .collect()
}
