//! Helper functions defined at global scope.

use crate::code::Code;
use std::fmt;

/// A GLSL function with a fixed body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Function {
    return_type: String,
    name: String,
    parameters: Vec<(String, String)>,
    body: String,
}

impl Function {
    /// Creates a function with the given return type, name and parameters
    /// given as `(type, name)` pairs. The body is built by the given closure
    /// and indented one level.
    pub fn new(
        return_type: impl Into<String>,
        name: impl Into<String>,
        parameters: &[(&str, &str)],
        build_body: impl FnOnce(&mut Code<'_>),
    ) -> Self {
        let mut body = String::new();
        build_body(&mut Code::new(&mut body, 1));
        Self {
            return_type: return_type.into(),
            name: name.into(),
            parameters: parameters
                .iter()
                .map(|&(ty, name)| (ty.to_string(), name.to_string()))
                .collect(),
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self
            .parameters
            .iter()
            .map(|(ty, name)| format!("{} {}", ty, name))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "{} {}({})", self.return_type, self.name, parameters)?;
        writeln!(f, "{{")?;
        f.write_str(&self.body)?;
        write!(f, "}}")
    }
}
