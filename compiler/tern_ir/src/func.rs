//! Untyped and typed function definitions.

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};
use tern_types::{Idx, Name};

use crate::{Block, FormalArgs, IrError};

/// Variable types of a function.
pub type TypeEnv = FxHashMap<Name, Idx>;

/// A polymorphic function as produced by the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fn {
    pub name: Name,
    pub args: FormalArgs,
    pub body: Block,
}

impl Fn {
    pub fn new(name: impl Into<Name>, args: FormalArgs, body: Block) -> Result<Self, IrError> {
        let name = name.into();
        if name.as_str().is_empty() {
            return Err(IrError::malformed(name, "function name is empty"));
        }
        args.validate(name)?;
        Ok(Fn { name, args, body })
    }

    /// Captured variables, bound from closure partial arguments.
    pub fn nonlocals(&self) -> &[Name] {
        &self.args.nonlocals
    }
}

bitflags! {
    /// Transformations applied to a typed function.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TransformFlags: u8 {
        /// Loops were split into tiles.
        const HAS_TILES = 1 << 0;
        /// Work is partitioned across `NumCores` workers.
        const PARALLEL = 1 << 1;
        /// Composite values were lowered to explicit storage.
        const LOWERED = 1 << 2;
    }
}

/// A monomorphic, fully typed function.
///
/// `(name, version)` identifies it in the registry. Rewrites produce a new
/// `TypedFn` with a higher version rather than mutating this one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedFn {
    pub name: Name,
    pub arg_names: Vec<Name>,
    pub body: Block,
    pub input_types: Vec<Idx>,
    pub return_type: Idx,
    pub type_env: TypeEnv,
    pub version: u32,
    pub flags: TransformFlags,
    pub num_tiles: u32,
    /// Pass that produced this version.
    pub last_transform: Option<&'static str>,
}

impl TypedFn {
    /// Build a version-0 function, checking argument names against types.
    pub fn new(
        name: Name,
        arg_names: Vec<Name>,
        body: Block,
        input_types: Vec<Idx>,
        return_type: Idx,
        type_env: TypeEnv,
    ) -> Result<Self, IrError> {
        let func = TypedFn {
            name,
            arg_names,
            body,
            input_types,
            return_type,
            type_env,
            version: 0,
            flags: TransformFlags::empty(),
            num_tiles: 0,
            last_transform: None,
        };
        func.validate()?;
        Ok(func)
    }

    pub fn validate(&self) -> Result<(), IrError> {
        if self.name.as_str().is_empty() {
            return Err(IrError::malformed(self.name, "function name is empty"));
        }
        if self.arg_names.len() != self.input_types.len() {
            return Err(IrError::malformed(
                self.name,
                format!(
                    "{} argument names but {} input types",
                    self.arg_names.len(),
                    self.input_types.len()
                ),
            ));
        }
        let mut seen = FxHashSet::default();
        for (&arg, &ty) in self.arg_names.iter().zip(&self.input_types) {
            if !seen.insert(arg) {
                return Err(IrError::malformed(
                    self.name,
                    format!("duplicate argument `{arg}`"),
                ));
            }
            if self.type_env.get(&arg) != Some(&ty) {
                return Err(IrError::malformed(
                    self.name,
                    format!("argument `{arg}` disagrees with the type environment"),
                ));
            }
        }
        Ok(())
    }

    /// A copy to be registered as `version`, stamped with `pass`.
    ///
    /// Callers take `version` from [`Registry::next_version`](crate::Registry::next_version)
    /// while holding the compile lock; `self` need not be the latest version.
    #[must_use]
    pub fn next_version(&self, version: u32, body: Block, type_env: TypeEnv, pass: &'static str) -> Self {
        TypedFn {
            body,
            type_env,
            version,
            last_transform: Some(pass),
            ..self.clone()
        }
    }

    pub fn is_lowered(&self) -> bool {
        self.flags.contains(TransformFlags::LOWERED)
    }

    pub fn var_type(&self, name: Name) -> Option<Idx> {
        self.type_env.get(&name).copied()
    }
}
