use std::fmt;

/// A call-and-assign statement inside a composite block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Name of the invoked block.
    pub function: String,
    /// Call-site argument names, in parameter order.
    pub arguments: Vec<String>,
    /// Names the results are bound to. Empty for a bare call.
    pub outputs: Vec<String>,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.outputs.is_empty() {
            write!(f, "{} = ", self.outputs.join(", "))?;
        }
        write!(f, "{}({})", self.function, self.arguments.join(", "))
    }
}
