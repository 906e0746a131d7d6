//! Formal parameter lists and call-site argument binding.

use rustc_hash::FxHashSet;
use tern_types::Name;

use crate::{Expr, IrError};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

/// A function's parameter list.
///
/// Slots are bound in order: captured `nonlocals` first, then `positional`
/// names, then the optional variadic `starargs` slot which receives a tuple
/// of any surplus positional values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FormalArgs {
    pub nonlocals: Vec<Name>,
    pub positional: Vec<Name>,
    /// Default values for trailing positional parameters.
    pub defaults: Vec<(Name, Expr)>,
    pub starargs: Option<Name>,
}

/// Arguments at a call site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ActualArgs {
    pub positional: Vec<Expr>,
    pub keywords: Vec<(Name, Expr)>,
    /// A tuple splatted into the positional list.
    pub starargs: Option<Box<Expr>>,
}

/// How one formal slot was filled.
#[derive(Clone, Debug, PartialEq)]
pub enum Bound<T> {
    Value(T),
    Default(Expr),
    Packed(Vec<T>),
}

impl FormalArgs {
    pub fn positional(names: &[&str]) -> Self {
        FormalArgs {
            positional: names.iter().map(|n| Name::intern(n)).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default(mut self, name: &str, value: Expr) -> Self {
        self.defaults.push((Name::intern(name), value));
        self
    }

    #[must_use]
    pub fn with_starargs(mut self, name: &str) -> Self {
        self.starargs = Some(Name::intern(name));
        self
    }

    #[must_use]
    pub fn with_nonlocals(mut self, names: &[&str]) -> Self {
        self.nonlocals = names.iter().map(|n| Name::intern(n)).collect();
        self
    }

    /// Every bound name, in slot order.
    pub fn names(&self) -> impl Iterator<Item = Name> + '_ {
        self.nonlocals
            .iter()
            .chain(&self.positional)
            .copied()
            .chain(self.starargs)
    }

    /// Number of slots `bind` produces.
    pub fn arity(&self) -> usize {
        self.nonlocals.len() + self.positional.len() + usize::from(self.starargs.is_some())
    }

    pub fn default_for(&self, name: Name) -> Option<&Expr> {
        self.defaults
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, e)| e)
    }

    /// Check names are unique and defaults cover a suffix of `positional`.
    pub fn validate(&self, func: Name) -> Result<(), IrError> {
        let mut seen = FxHashSet::default();
        for name in self.names() {
            if !seen.insert(name) {
                return Err(IrError::malformed(
                    func,
                    format!("duplicate parameter `{name}`"),
                ));
            }
        }
        let first_default = self.positional.len() - self.defaults.len().min(self.positional.len());
        for (name, _) in &self.defaults {
            match self.positional.iter().position(|p| p == name) {
                Some(pos) if pos >= first_default => {}
                Some(_) => {
                    return Err(IrError::malformed(
                        func,
                        format!("parameter `{name}` with default precedes one without"),
                    ))
                }
                None => {
                    return Err(IrError::malformed(
                        func,
                        format!("default for unknown parameter `{name}`"),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Bind call-site values to slots.
    ///
    /// `partial` values (closure-captured arguments) are consumed before the
    /// call's own positional values.
    pub fn bind<T>(
        &self,
        func: Name,
        partial: Vec<T>,
        positional: Vec<T>,
        keywords: Vec<(Name, T)>,
    ) -> Result<Vec<Bound<T>>, IrError> {
        let slot_names: Vec<Name> = self
            .nonlocals
            .iter()
            .chain(&self.positional)
            .copied()
            .collect();
        let mut slots: Vec<Option<T>> = slot_names.iter().map(|_| None).collect();
        let mut extra = Vec::new();

        for (i, value) in partial.into_iter().chain(positional).enumerate() {
            match slots.get_mut(i) {
                Some(slot) => *slot = Some(value),
                None if self.starargs.is_some() => extra.push(value),
                None => {
                    return Err(IrError::binding(
                        func,
                        format!("takes {} positional arguments", slot_names.len()),
                    ))
                }
            }
        }

        for (name, value) in keywords {
            let Some(pos) = self.positional.iter().position(|&p| p == name) else {
                return Err(IrError::binding(
                    func,
                    format!("unexpected keyword argument `{name}`"),
                ));
            };
            let slot = &mut slots[self.nonlocals.len() + pos];
            if slot.is_some() {
                return Err(IrError::binding(
                    func,
                    format!("multiple values for argument `{name}`"),
                ));
            }
            *slot = Some(value);
        }

        let mut bound = Vec::with_capacity(self.arity());
        for (name, slot) in slot_names.into_iter().zip(slots) {
            match (slot, self.default_for(name)) {
                (Some(value), _) => bound.push(Bound::Value(value)),
                (None, Some(default)) => bound.push(Bound::Default(default.clone())),
                (None, None) => {
                    return Err(IrError::binding(
                        func,
                        format!("missing argument `{name}`"),
                    ))
                }
            }
        }
        if self.starargs.is_some() {
            bound.push(Bound::Packed(extra));
        }
        Ok(bound)
    }
}

impl ActualArgs {
    pub fn positional(values: Vec<Expr>) -> Self {
        ActualArgs {
            positional: values,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_keyword(mut self, name: &str, value: Expr) -> Self {
        self.keywords.push((Name::intern(name), value));
        self
    }

    #[must_use]
    pub fn with_starargs(mut self, value: Expr) -> Self {
        self.starargs = Some(Box::new(value));
        self
    }

    /// All argument expressions: positional, keywords, then the splat.
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.positional
            .iter()
            .chain(self.keywords.iter().map(|(_, e)| e))
            .chain(self.starargs.as_deref())
    }

    /// True when only positional arguments are present.
    pub fn is_positional_only(&self) -> bool {
        self.keywords.is_empty() && self.starargs.is_none()
    }
}
