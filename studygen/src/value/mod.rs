use std::fmt;

use indexmap::IndexMap;

/// A literal parameter value, from the configuration document or a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Map(IndexMap<String, ParamValue>),
}

impl ParamValue {
    /// The value as a literal of the generated language.
    pub fn literal(&self) -> String {
        self.to_string()
    }

    /// The value as it appears in a scan directory name: like the literal,
    /// but strings are left unquoted.
    pub fn path_segment(&self) -> String {
        match self {
            ParamValue::Str(s) => s.clone(),
            other => other.literal(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Bool(true) => write!(f, "True"),
            ParamValue::Bool(false) => write!(f, "False"),
            ParamValue::Int(n) => write!(f, "{}", n),
            ParamValue::Float(x) => f.write_str(&format_float(*x)),
            ParamValue::Str(s) => write!(f, "\"{}\"", escape(s)),
            ParamValue::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ParamValue::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", escape(key), value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Floats always carry a decimal point or exponent so they read back as
/// floats: `60.0`, not `60`.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "float(\"nan\")".into();
    }
    if x.is_infinite() {
        return if x > 0.0 {
            "float(\"inf\")".into()
        } else {
            "-float(\"inf\")".into()
        };
    }
    if x == x.trunc() {
        if x.abs() < 1e16 {
            format!("{:.1}", x)
        } else {
            format!("{:e}", x)
        }
    } else {
        format!("{}", x)
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_keep_their_decimal_point() {
        assert_eq!(ParamValue::Float(60.0).literal(), "60.0");
        assert_eq!(ParamValue::Float(62.318).literal(), "62.318");
        assert_eq!(ParamValue::Float(-0.5).literal(), "-0.5");
        assert_eq!(ParamValue::Float(1e20).literal(), "1e20");
    }

    #[test]
    fn strings_are_quoted_only_as_literals() {
        let v = ParamValue::from("lhc \"b1\"");
        assert_eq!(v.literal(), "\"lhc \\\"b1\\\"\"");
        assert_eq!(ParamValue::from("b1").path_segment(), "b1");
    }

    #[test]
    fn containers() {
        let mut map = IndexMap::new();
        map.insert("lhcb1".to_string(), ParamValue::Float(62.31));
        map.insert("lhcb2".to_string(), ParamValue::Float(62.31));
        assert_eq!(
            ParamValue::Map(map).literal(),
            "{\"lhcb1\": 62.31, \"lhcb2\": 62.31}"
        );
        let list = ParamValue::List(vec![ParamValue::Int(1), ParamValue::Bool(true), ParamValue::None]);
        assert_eq!(list.literal(), "[1, True, None]");
    }
}
