use std::collections::BTreeSet;
use std::ops::Range;

use indexmap::IndexMap;
use pulldown_cmark::{Event, HeadingLevel, Parser as CmarkParser, Tag, TagEnd};
use tracing::debug;

use crate::block::Block;
use crate::block::annotation::{TypeName, parse_return_annotation};
use crate::parser::error::ParseError;

const METADATA_KEYS: &str = "params, returns, outputs, import, depends";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse catalog Markdown into reference blocks, one per level-1 heading,
/// plus warnings about ignored content.
pub fn parse_blocks(
    source: &str,
    file_id: usize,
) -> Result<(Vec<Block>, Vec<ParseError>), Vec<ParseError>> {
    let parser = CmarkParser::new(source);
    let events: Vec<(Event<'_>, Range<usize>)> = parser.into_offset_iter().collect();

    let mut state = ParseState::new(file_id);
    state.process_events(&events);
    state.finalize()
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct ParseState {
    file_id: usize,
    /// Block currently being described.
    current: Option<BlockBuilder>,
    /// Completed blocks, in declaration order.
    blocks: Vec<Block>,
    /// Heading span of every block name seen so far.
    seen: IndexMap<String, Range<usize>>,
    errors: Vec<ParseError>,
    /// Content that is ignored but probably not meant to be.
    warnings: Vec<ParseError>,
}

struct BlockBuilder {
    name: String,
    span: Range<usize>,
    doc: Vec<String>,
    parameters: IndexMap<String, TypeName>,
    returns: Option<(String, Range<usize>)>,
    outputs: Option<(Vec<(String, Option<TypeName>)>, Range<usize>)>,
    imports: IndexMap<String, String>,
    dependencies: BTreeSet<String>,
    body: Option<String>,
}

/// One `- key: `code` `code`` line of block metadata.
struct MetadataItem {
    label: String,
    code_spans: Vec<String>,
    span: Range<usize>,
}

impl BlockBuilder {
    fn new(name: String, span: Range<usize>) -> Self {
        BlockBuilder {
            name,
            span,
            doc: Vec::new(),
            parameters: IndexMap::new(),
            returns: None,
            outputs: None,
            imports: IndexMap::new(),
            dependencies: BTreeSet::new(),
            body: None,
        }
    }

    fn into_block(self, file_id: usize) -> Result<Block, ParseError> {
        let Some(body) = self.body else {
            return Err(ParseError::error(
                format!("block '{}' has no code body", self.name),
                self.span,
                file_id,
            )
            .with_note("add a fenced code block holding the block's source"));
        };

        let output_types = match &self.returns {
            Some((annotation, span)) => parse_return_annotation(annotation).map_err(|reason| {
                ParseError::error(
                    format!("invalid return annotation '{}': {}", annotation, reason),
                    span.clone(),
                    file_id,
                )
            })?,
            None => Vec::new(),
        };

        let mut block = Block::new(self.name, self.parameters, output_types, body)
            .with_doc(self.doc.join("\n\n"))
            .with_imports(self.imports)
            .with_dependencies(self.dependencies);

        if let Some((outputs, span)) = self.outputs {
            let declared: Vec<TypeName> = block.outputs().values().cloned().collect();
            let typed = outputs
                .into_iter()
                .enumerate()
                .map(|(idx, (name, ty))| {
                    // Only reached without a declared type when the counts differ,
                    // which `with_outputs` rejects first.
                    let ty = ty
                        .or_else(|| declared.get(idx).cloned())
                        .unwrap_or_else(|| TypeName::new("object"));
                    (name, ty)
                })
                .collect();
            block = block
                .with_outputs(typed)
                .map_err(|err| ParseError::error(err.to_string(), span, file_id))?;
        }

        Ok(block)
    }
}

impl ParseState {
    fn new(file_id: usize) -> Self {
        ParseState {
            file_id,
            current: None,
            blocks: Vec::new(),
            seen: IndexMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn process_events(&mut self, events: &[(Event<'_>, Range<usize>)]) {
        let mut i = 0;

        while i < events.len() {
            let (ref ev, ref range) = events[i];

            match ev {
                Event::Start(Tag::Heading { level, .. }) => {
                    i += 1;
                    let name = normalize_block_name(&collect_heading_text(events, &mut i));

                    if *level != HeadingLevel::H1 {
                        self.errors.push(
                            ParseError::error(
                                format!("heading '{}' does not define a block", name),
                                range.clone(),
                                self.file_id,
                            )
                            .with_note("catalogs are flat: every block starts with a level-1 heading"),
                        );
                        continue;
                    }

                    self.close_block();
                    self.open_block(name, range.clone());
                }

                // Paragraphs = doc comment
                Event::Start(Tag::Paragraph) => {
                    i += 1;
                    let text =
                        collect_inline_text(events, &mut i, |e| matches!(e, TagEnd::Paragraph));
                    match self.current.as_mut() {
                        Some(builder) => builder.doc.push(text),
                        None => self.warnings.push(ParseError::warning(
                            "text before the first block heading is ignored",
                            range.clone(),
                            self.file_id,
                        )),
                    }
                }

                // Lists = signature metadata
                Event::Start(Tag::List(_)) => {
                    i += 1;
                    for item in collect_metadata_items(events, &mut i) {
                        self.process_metadata_item(item);
                    }
                }

                // First code block = body
                Event::Start(Tag::CodeBlock(_)) => {
                    i += 1;
                    let content = collect_text_until(events, &mut i, |e| {
                        matches!(e, TagEnd::CodeBlock)
                    });
                    let body = content.trim_end_matches('\n').to_string();
                    match self.current.as_mut() {
                        Some(builder) if builder.body.is_none() => builder.body = Some(body),
                        Some(builder) => self.warnings.push(
                            ParseError::warning(
                                format!("block '{}' has more than one code block", builder.name),
                                range.clone(),
                                self.file_id,
                            )
                            .with_note("only the first code block is the body"),
                        ),
                        None => self.warnings.push(ParseError::warning(
                            "code block before the first block heading is ignored",
                            range.clone(),
                            self.file_id,
                        )),
                    }
                }

                _ => {
                    i += 1;
                }
            }
        }
    }

    fn open_block(&mut self, name: String, span: Range<usize>) {
        if !is_identifier(&name) {
            self.errors.push(ParseError::error(
                format!("block name '{}' is not a valid identifier", name),
                span.clone(),
                self.file_id,
            ));
        }
        if let Some(first) = self.seen.get(&name) {
            self.errors.push(
                ParseError::error(
                    format!("block '{}' is defined more than once", name),
                    span.clone(),
                    self.file_id,
                )
                .with_note(format!("first defined at byte {}", first.start)),
            );
        } else {
            self.seen.insert(name.clone(), span.clone());
        }
        self.current = Some(BlockBuilder::new(name, span));
    }

    fn close_block(&mut self) {
        let Some(builder) = self.current.take() else {
            return;
        };
        match builder.into_block(self.file_id) {
            Ok(block) => self.blocks.push(block),
            Err(err) => self.errors.push(err),
        }
    }

    fn process_metadata_item(&mut self, item: MetadataItem) {
        let file_id = self.file_id;
        let Some(builder) = self.current.as_mut() else {
            self.warnings.push(ParseError::warning(
                "list before the first block heading is ignored",
                item.span,
                file_id,
            ));
            return;
        };

        let Some((key, _)) = item.label.split_once(':') else {
            self.errors.push(
                ParseError::error("metadata item must start with 'key:'", item.span, file_id)
                    .with_note(format!("known keys: {}", METADATA_KEYS)),
            );
            return;
        };
        let key = key.trim().to_lowercase();
        let span = item.span;

        match key.as_str() {
            "params" | "parameters" => {
                for code in &item.code_spans {
                    match split_typed_name(code) {
                        Some((name, Some(ty))) => {
                            if builder.parameters.contains_key(&name) {
                                self.errors.push(ParseError::error(
                                    format!("parameter '{}' is declared twice", name),
                                    span.clone(),
                                    file_id,
                                ));
                            } else {
                                builder.parameters.insert(name, ty);
                            }
                        }
                        _ => self.errors.push(
                            ParseError::error(
                                format!("malformed parameter `{}`", code),
                                span.clone(),
                                file_id,
                            )
                            .with_note("parameters are written `name: type`"),
                        ),
                    }
                }
            }
            "returns" | "return" => {
                if item.code_spans.len() != 1 {
                    self.errors.push(ParseError::error(
                        "'returns' takes exactly one code span with the return annotation",
                        span,
                        file_id,
                    ));
                } else if builder.returns.is_some() {
                    self.errors.push(ParseError::error(
                        format!("block '{}' declares its return annotation twice", builder.name),
                        span,
                        file_id,
                    ));
                } else {
                    builder.returns = Some((item.code_spans[0].clone(), span));
                }
            }
            "outputs" => {
                let mut outputs = Vec::new();
                for code in &item.code_spans {
                    match split_typed_name(code) {
                        Some(named) => outputs.push(named),
                        None => self.errors.push(ParseError::error(
                            format!("malformed output name `{}`", code),
                            span.clone(),
                            file_id,
                        )),
                    }
                }
                builder.outputs = Some((outputs, span));
            }
            "import" | "imports" => {
                let [module, statement] = item.code_spans.as_slice() else {
                    self.errors.push(
                        ParseError::error(
                            "'import' takes a module key and an import statement",
                            span,
                            file_id,
                        )
                        .with_note("e.g. - import: `np` `import numpy as np`"),
                    );
                    return;
                };
                match builder.imports.get(module) {
                    Some(existing) if existing != statement => {
                        self.errors.push(ParseError::error(
                            format!(
                                "module '{}' is imported as both `{}` and `{}`",
                                module, existing, statement
                            ),
                            span,
                            file_id,
                        ));
                    }
                    _ => {
                        builder.imports.insert(module.clone(), statement.clone());
                    }
                }
            }
            "depends" | "dependencies" | "deps" => {
                builder
                    .dependencies
                    .extend(item.code_spans.iter().map(|s| s.trim().to_string()));
            }
            other => {
                self.errors.push(
                    ParseError::error(format!("unknown metadata key '{}'", other), span, file_id)
                        .with_note(format!("known keys: {}", METADATA_KEYS)),
                );
            }
        }
    }

    fn finalize(mut self) -> Result<(Vec<Block>, Vec<ParseError>), Vec<ParseError>> {
        self.close_block();
        debug!(
            blocks = self.blocks.len(),
            errors = self.errors.len(),
            warnings = self.warnings.len(),
            "parsed catalog"
        );

        if self.errors.is_empty() {
            Ok((self.blocks, self.warnings))
        } else {
            self.errors.extend(self.warnings);
            Err(self.errors)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Collect the items of a list (the `Start(List)` event already consumed).
/// Text and code spans of nested lists belong to the enclosing item.
fn collect_metadata_items(events: &[(Event<'_>, Range<usize>)], i: &mut usize) -> Vec<MetadataItem> {
    let mut items = Vec::new();
    let mut current: Option<MetadataItem> = None;
    let mut depth = 0u32;

    while *i < events.len() {
        let (ref ev, ref range) = events[*i];
        *i += 1;
        match ev {
            Event::Start(Tag::List(_)) => depth += 1,
            Event::End(TagEnd::List(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Start(Tag::Item) if depth == 0 => {
                current = Some(MetadataItem {
                    label: String::new(),
                    code_spans: Vec::new(),
                    span: range.clone(),
                });
            }
            Event::End(TagEnd::Item) if depth == 0 => {
                if let Some(item) = current.take() {
                    items.push(item);
                }
            }
            Event::Text(s) => {
                if let Some(item) = current.as_mut() {
                    if item.code_spans.is_empty() {
                        item.label.push_str(s);
                    }
                }
            }
            Event::Code(s) => {
                if let Some(item) = current.as_mut() {
                    item.code_spans.push(s.to_string());
                }
            }
            _ => {}
        }
    }

    items
}

/// Collect heading text (all Text events until End(Heading)).
fn collect_heading_text(events: &[(Event<'_>, Range<usize>)], i: &mut usize) -> String {
    let mut name = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(TagEnd::Heading(_)) => {
                *i += 1;
                break;
            }
            Event::Text(s) | Event::Code(s) => {
                name.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    name
}

/// Collect paragraph text, keeping code spans in backticks and line breaks.
fn collect_inline_text(
    events: &[(Event<'_>, Range<usize>)],
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        *i += 1;
        match ev {
            Event::End(tag_end) if is_end(tag_end) => break,
            Event::Text(s) => text.push_str(s),
            Event::Code(s) => {
                text.push('`');
                text.push_str(s);
                text.push('`');
            }
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }
    text
}

/// Collect all text content until a matching End tag.
fn collect_text_until(
    events: &[(Event<'_>, Range<usize>)],
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}

/// Split `name: type` (type optional). Returns None for an empty or
/// non-identifier name, or an empty type after a colon.
fn split_typed_name(code: &str) -> Option<(String, Option<TypeName>)> {
    let (name, ty) = match code.split_once(':') {
        Some((name, ty)) => {
            let ty = ty.trim();
            if ty.is_empty() {
                return None;
            }
            (name.trim(), Some(TypeName::new(ty)))
        }
        None => (code.trim(), None),
    };
    is_identifier(name).then(|| (name.to_string(), ty))
}

/// Normalize block name: strip leading/trailing whitespace, collapse interior whitespace.
fn normalize_block_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}
