use std::fmt;

/// A declared type, kept as the annotation text of the generated language.
///
/// Whitespace is normalized so `tuple[float,int]` and `tuple[float, int]`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(annotation: impl AsRef<str>) -> Self {
        let compact: String = annotation
            .as_ref()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        TypeName(compact.replace(',', ", "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        TypeName::new(s)
    }
}

/// Split a return annotation into its output types.
///
/// `None` or an empty annotation yields no outputs, `tuple[A, B]` yields one
/// type per component, anything else is a single output.
pub fn parse_return_annotation(annotation: &str) -> Result<Vec<TypeName>, String> {
    let trimmed = annotation.trim();
    check_brackets(trimmed)?;

    if trimmed.is_empty() || trimmed == "None" {
        return Ok(Vec::new());
    }

    let inner = ["tuple[", "Tuple["]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix(']'));

    let Some(inner) = inner else {
        return Ok(vec![TypeName::new(trimmed)]);
    };

    let components = split_top_level(inner);
    if components.iter().any(|c| c.is_empty()) {
        return Err("tuple annotation has an empty component".into());
    }
    if components.iter().any(|c| *c == "...") {
        return Err("variadic tuples have no fixed output count".into());
    }
    Ok(components.into_iter().map(TypeName::new).collect())
}

/// Split on commas that are not nested inside brackets.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn check_brackets(text: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    for c in text.chars() {
        match c {
            '[' | '(' => stack.push(c),
            ']' => {
                if stack.pop() != Some('[') {
                    return Err("unbalanced ']'".into());
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return Err("unbalanced ')'".into());
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        Ok(())
    } else {
        Err("unclosed bracket".into())
    }
}
