use indexmap::IndexMap;
use studygen::block::Body;
use studygen::{Block, ParamValue, Template, TypeName};

use crate::error::EngineResult;
use crate::registry::PreparedTarget;

/// Template used when no other is given.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default_template.txt");

const INDENT: &str = "    ";

/// Function definition text of a block.
pub fn render_block(block: &Block) -> String {
    let mut out = declaration(block);
    out.push('\n');

    if !block.doc.is_empty() {
        let text = escape_docstring(&block.doc);
        let doc = if text.contains('\n') {
            format!("\"\"\"{}\n\"\"\"", text)
        } else {
            format!("\"\"\"{}\"\"\"", text)
        };
        out.push_str(&indent(&doc));
        out.push('\n');
    }

    let body = match block.body() {
        Body::Source(source) => source.clone(),
        Body::Calls(calls) => {
            let mut lines: Vec<String> = calls.iter().map(|call| call.to_string()).collect();
            if !block.outputs().is_empty() {
                lines.push(format!("return {}", block.output_names().join(", ")));
            }
            lines.join("\n")
        }
    };
    if body.trim().is_empty() {
        out.push_str(INDENT);
        out.push_str("pass");
    } else {
        out.push_str(&indent(&body));
    }
    out.push('\n');
    out
}

/// `def name(p: T, ...) -> summary:`
pub fn declaration(block: &Block) -> String {
    let parameters: Vec<String> = block
        .parameters()
        .iter()
        .map(|(name, ty)| format!("{}: {}", name, ty))
        .collect();
    format!(
        "def {}({}) -> {}:",
        block.name,
        parameters.join(", "),
        output_summary(block.outputs())
    )
}

/// `None` without outputs, the type itself for one, a tuple otherwise.
pub fn output_summary(outputs: &IndexMap<String, TypeName>) -> String {
    match outputs.len() {
        0 => "None".to_string(),
        1 => outputs.values().map(|ty| ty.to_string()).collect(),
        _ => {
            let types: Vec<&str> = outputs.values().map(TypeName::as_str).collect();
            format!("tuple[{}]", types.join(", "))
        }
    }
}

pub fn render_imports(imports: &IndexMap<String, String>) -> String {
    imports.values().cloned().collect::<Vec<_>>().join("\n")
}

/// One assignment per `main` parameter, in parameter order.
pub fn render_parameters(values: &IndexMap<String, ParamValue>) -> String {
    let mut out = String::from("# Declare parameters\n");
    for (name, value) in values {
        out.push_str(&format!("{} = {}\n", name, value.literal()));
    }
    out
}

/// `main(p1, p2, ...)`, passing each declared parameter by its name.
pub fn render_main_call(main: &Block) -> String {
    format!("{}({})", main.name, main.parameter_names().join(", "))
}

/// Fill the template with the rendered pieces of a prepared target.
pub fn render_artifact(
    template: &Template,
    target: &PreparedTarget,
    values: &IndexMap<String, ParamValue>,
) -> EngineResult<String> {
    let blocks: Vec<String> = target.registry.blocks().map(render_block).collect();

    let mut fields = IndexMap::new();
    fields.insert("imports", render_imports(&target.imports));
    fields.insert("parameters", render_parameters(values));
    fields.insert("blocks", blocks.join("\n\n"));
    fields.insert("main", render_block(&target.main));
    fields.insert("main_call", render_main_call(&target.main));

    Ok(template.render(&fields)?)
}

/// Keep a doc comment inside its triple quotes.
fn escape_docstring(doc: &str) -> String {
    doc.replace('\\', "\\\\").replace('"', "\\\"")
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use studygen::Call;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, TypeName> {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), TypeName::new(t)))
            .collect()
    }

    #[test]
    fn reference_block_is_verbatim() {
        let block = Block::reference("add", params(&[("a", "float"), ("b", "float")]), "float", "c = a + b\nreturn c")
            .unwrap()
            .with_doc("Add two numbers.");
        assert_eq!(
            render_block(&block),
            "def add(a: float, b: float) -> float:\n    \"\"\"Add two numbers.\"\"\"\n    c = a + b\n    return c\n"
        );
    }

    #[test]
    fn composite_gets_a_return_line() {
        let calls = vec![Call {
            function: "split".into(),
            arguments: vec!["x".into()],
            outputs: vec!["lo".into(), "hi".into()],
        }];
        let block = Block::composite("halves", params(&[("x", "float")]), params(&[("lo", "float"), ("hi", "int")]), calls)
            .with_doc("First line.\nSecond line.");
        assert_eq!(
            render_block(&block),
            "def halves(x: float) -> tuple[float, int]:\n    \"\"\"First line.\n    Second line.\n    \"\"\"\n    lo, hi = split(x)\n    return lo, hi\n"
        );
    }

    #[test]
    fn quotes_in_docs_cannot_close_the_docstring() {
        let block = Block::reference("f", IndexMap::new(), "None", "pass")
            .unwrap()
            .with_doc(r#"Use """ for docs, or "quotes""#);
        assert_eq!(
            render_block(&block),
            "def f() -> None:\n    \"\"\"Use \\\"\\\"\\\" for docs, or \\\"quotes\\\"\"\"\"\n    pass\n"
        );
        assert_eq!(escape_docstring(r"a\b"), r"a\\b");
    }

    #[test]
    fn empty_body_passes() {
        let block = Block::composite("main", IndexMap::new(), IndexMap::new(), Vec::new());
        assert_eq!(render_block(&block), "def main() -> None:\n    pass\n");
        assert_eq!(render_main_call(&block), "main()");
    }

    #[test]
    fn parameters_are_literals() {
        let mut values = IndexMap::new();
        values.insert("q".to_string(), ParamValue::Float(60.0));
        values.insert("name".to_string(), ParamValue::from("b1"));
        assert_eq!(render_parameters(&values), "# Declare parameters\nq = 60.0\nname = \"b1\"\n");
    }

    #[test]
    fn default_template_uses_every_field() {
        let template = Template::parse(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(
            template.fields(),
            ["imports", "blocks", "main", "parameters", "main_call"]
        );
    }
}
