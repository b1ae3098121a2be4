use indexmap::IndexMap;

use crate::error::TemplateError;

/// An artifact template: literal text with `{{ field }}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text content.
    Literal(String),
    /// A named field substituted at render time.
    Field(String),
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                parts.push(TemplatePart::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + open))?;
            let field = after_open[..close].trim();
            if field.is_empty() {
                return Err(TemplateError::EmptyPlaceholder(offset + open));
            }
            parts.push(TemplatePart::Field(field.to_string()));

            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Literal(rest.to_string()));
        }

        Ok(Template { parts })
    }

    /// Names of all fields referenced by the template, in order of first use.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for part in &self.parts {
            if let TemplatePart::Field(name) = part {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }

    /// Substitute every field. A field without a value is an error; values
    /// the template never mentions are ignored.
    pub fn render(&self, values: &IndexMap<&str, String>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Field(name) => {
                    let value = values
                        .get(name.as_str())
                        .ok_or_else(|| TemplateError::UnknownField(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
