use std::fmt;

use tern_types::Name;

/// IR construction and registry failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// A node or function violates a structural invariant.
    #[error("malformed `{func}`: {message}")]
    Malformed { func: Name, message: String },

    /// Call-site arguments do not fit the callee's parameter list.
    #[error("cannot call `{func}`: {message}")]
    ArgumentBinding { func: Name, message: String },

    /// A registry key was registered twice.
    #[error("`{name}` version {version} is already registered")]
    DuplicateVersion { name: Name, version: u32 },

    /// An untyped function name was registered twice.
    #[error("function `{0}` is already defined")]
    DuplicateFunction(Name),
}

impl IrError {
    pub fn malformed(func: Name, message: impl Into<String>) -> Self {
        IrError::Malformed {
            func,
            message: message.into(),
        }
    }

    pub fn binding(func: Name, message: impl Into<String>) -> Self {
        IrError::ArgumentBinding {
            func,
            message: message.into(),
        }
    }

    /// Version collisions and malformed nodes are compiler defects. Bad
    /// call arguments and redefined names are errors in the program.
    pub fn is_internal(&self) -> bool {
        matches!(self, IrError::Malformed { .. } | IrError::DuplicateVersion { .. })
    }
}

/// Internal compiler error with the context needed to diagnose it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ice {
    pub pass: &'static str,
    pub message: String,
    /// Rendering of the offending node.
    pub node: Option<String>,
    /// Variable types in scope, rendered.
    pub type_env: Vec<(Name, String)>,
}

impl Ice {
    pub fn new(pass: &'static str, message: impl Into<String>) -> Self {
        Ice {
            pass,
            message: message.into(),
            node: None,
            type_env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: impl fmt::Display) -> Self {
        self.node = Some(node.to_string());
        self
    }

    #[must_use]
    pub fn with_type_env(mut self, env: impl IntoIterator<Item = (Name, String)>) -> Self {
        self.type_env = env.into_iter().collect();
        self.type_env.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }
}

impl fmt::Display for Ice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal error in {}: {}", self.pass, self.message)?;
        if let Some(node) = &self.node {
            write!(f, "\n  node: {node}")?;
        }
        if !self.type_env.is_empty() {
            f.write_str("\n  types:")?;
            for (name, ty) in &self.type_env {
                write!(f, "\n    {name}: {ty}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Ice {}
