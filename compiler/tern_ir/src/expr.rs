//! Expression nodes.

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use tern_types::{Idx, Name};

use crate::ActualArgs;

/// A literal value.
#[derive(Copy, Clone, Debug)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    None,
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::None, ConstValue::None) => true,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Bool(b) => b.hash(state),
            ConstValue::Int(i) => i.hash(state),
            ConstValue::Float(f) => f.to_bits().hash(state),
            ConstValue::None => {}
        }
    }
}

impl ConstValue {
    /// Type a literal gets when nothing else constrains it.
    pub fn default_type(self) -> Idx {
        match self {
            ConstValue::Bool(_) => Idx::BOOL,
            ConstValue::Int(_) => Idx::INT64,
            ConstValue::Float(_) => Idx::FLOAT64,
            ConstValue::None => Idx::NONE,
        }
    }
}

/// Primitive operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Negative,
    Maximum,
    Minimum,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    LogicalAnd,
    LogicalOr,
    LogicalNot,
}

impl Prim {
    pub const fn name(self) -> &'static str {
        match self {
            Prim::Add => "add",
            Prim::Subtract => "subtract",
            Prim::Multiply => "multiply",
            Prim::Divide => "divide",
            Prim::Modulo => "mod",
            Prim::Negative => "negative",
            Prim::Maximum => "maximum",
            Prim::Minimum => "minimum",
            Prim::Equal => "equal",
            Prim::NotEqual => "not_equal",
            Prim::Greater => "greater",
            Prim::GreaterEqual => "greater_equal",
            Prim::Less => "less",
            Prim::LessEqual => "less_equal",
            Prim::LogicalAnd => "logical_and",
            Prim::LogicalOr => "logical_or",
            Prim::LogicalNot => "logical_not",
        }
    }

    pub const fn arity(self) -> usize {
        match self {
            Prim::Negative | Prim::LogicalNot => 1,
            _ => 2,
        }
    }

    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Prim::Equal
                | Prim::NotEqual
                | Prim::Greater
                | Prim::GreaterEqual
                | Prim::Less
                | Prim::LessEqual
        )
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Prim::LogicalAnd | Prim::LogicalOr | Prim::LogicalNot)
    }

    pub const fn is_arithmetic(self) -> bool {
        !self.is_comparison() && !self.is_logical()
    }
}

/// An expression node with its (optional until inference) type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Option<Idx>,
}

/// Expression variants.
///
/// `Struct`, `Alloc`, `TupleProj` and `ClosureField` only appear after
/// lowering; `Cast` and `NumCores` may appear anywhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Const(ConstValue),
    Var(Name),
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    Attribute {
        value: Box<Expr>,
        name: Name,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        start: Box<Expr>,
        stop: Box<Expr>,
        step: Box<Expr>,
    },
    /// `target` names the specialized callee once inference has run.
    Call {
        callee: Box<Expr>,
        args: ActualArgs,
        target: Option<Name>,
    },
    Prim {
        op: Prim,
        args: Vec<Expr>,
    },
    Closure {
        func: Name,
        args: Vec<Expr>,
    },
    FnRef(Name),
    Struct(Vec<Expr>),
    Alloc {
        elem: Idx,
        count: Box<Expr>,
    },
    TupleProj {
        tuple: Box<Expr>,
        index: u32,
    },
    ClosureField {
        closure: Box<Expr>,
        index: u32,
    },
    /// Conversion to `Expr::ty`.
    Cast(Box<Expr>),
    NumCores,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, ty: None }
    }

    pub fn typed(kind: ExprKind, ty: Idx) -> Self {
        Expr { kind, ty: Some(ty) }
    }

    #[must_use]
    pub fn with_ty(mut self, ty: Idx) -> Self {
        self.ty = Some(ty);
        self
    }

    // ── Builders ──

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Const(ConstValue::Int(value)))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::Const(ConstValue::Float(value)))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Const(ConstValue::Bool(value)))
    }

    pub fn none() -> Self {
        Self::new(ExprKind::Const(ConstValue::None))
    }

    pub fn var(name: impl Into<Name>) -> Self {
        Self::new(ExprKind::Var(name.into()))
    }

    pub fn tuple(elems: Vec<Expr>) -> Self {
        Self::new(ExprKind::Tuple(elems))
    }

    pub fn array(elems: Vec<Expr>) -> Self {
        Self::new(ExprKind::Array(elems))
    }

    pub fn attr(value: Expr, name: impl Into<Name>) -> Self {
        Self::new(ExprKind::Attribute {
            value: Box::new(value),
            name: name.into(),
        })
    }

    pub fn index(value: Expr, index: Expr) -> Self {
        Self::new(ExprKind::Index {
            value: Box::new(value),
            index: Box::new(index),
        })
    }

    pub fn slice(start: Expr, stop: Expr, step: Expr) -> Self {
        Self::new(ExprKind::Slice {
            start: Box::new(start),
            stop: Box::new(stop),
            step: Box::new(step),
        })
    }

    pub fn call(callee: Expr, args: ActualArgs) -> Self {
        Self::new(ExprKind::Call {
            callee: Box::new(callee),
            args,
            target: None,
        })
    }

    pub fn prim(op: Prim, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Prim { op, args })
    }

    pub fn closure(func: impl Into<Name>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Closure {
            func: func.into(),
            args,
        })
    }

    pub fn fn_ref(name: impl Into<Name>) -> Self {
        Self::new(ExprKind::FnRef(name.into()))
    }

    pub fn cast(value: Expr, ty: Idx) -> Self {
        Self::typed(ExprKind::Cast(Box::new(value)), ty)
    }

    pub fn alloc(elem: Idx, count: Expr) -> Self {
        Self::new(ExprKind::Alloc {
            elem,
            count: Box::new(count),
        })
    }

    pub fn num_cores() -> Self {
        Self::new(ExprKind::NumCores)
    }

    // ── Queries ──

    /// The variable name, if this is a `Var`.
    pub fn as_var(&self) -> Option<Name> {
        match self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    /// The literal, if this is a `Const`.
    pub fn as_const(&self) -> Option<ConstValue> {
        match self.kind {
            ExprKind::Const(value) => Some(value),
            _ => None,
        }
    }

    /// Short variant name for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Const(_) => "Const",
            ExprKind::Var(_) => "Var",
            ExprKind::Tuple(_) => "Tuple",
            ExprKind::Array(_) => "Array",
            ExprKind::Attribute { .. } => "Attribute",
            ExprKind::Index { .. } => "Index",
            ExprKind::Slice { .. } => "Slice",
            ExprKind::Call { .. } => "Call",
            ExprKind::Prim { .. } => "PrimCall",
            ExprKind::Closure { .. } => "Closure",
            ExprKind::FnRef(_) => "FnRef",
            ExprKind::Struct(_) => "Struct",
            ExprKind::Alloc { .. } => "Alloc",
            ExprKind::TupleProj { .. } => "TupleProj",
            ExprKind::ClosureField { .. } => "ClosureField",
            ExprKind::Cast(_) => "Cast",
            ExprKind::NumCores => "NumCores",
        }
    }

    /// Immediate child expressions in evaluation order.
    pub fn children(&self) -> SmallVec<[&Expr; 4]> {
        match &self.kind {
            ExprKind::Const(_) | ExprKind::Var(_) | ExprKind::FnRef(_) | ExprKind::NumCores => {
                SmallVec::new()
            }
            ExprKind::Tuple(elems)
            | ExprKind::Array(elems)
            | ExprKind::Struct(elems)
            | ExprKind::Prim { args: elems, .. }
            | ExprKind::Closure { args: elems, .. } => elems.iter().collect(),
            ExprKind::Attribute { value, .. } => smallvec::smallvec![&**value],
            ExprKind::Index { value, index } => smallvec::smallvec![&**value, &**index],
            ExprKind::Slice { start, stop, step } => {
                smallvec::smallvec![&**start, &**stop, &**step]
            }
            ExprKind::Call { callee, args, .. } => {
                let mut children: SmallVec<[&Expr; 4]> = smallvec::smallvec![&**callee];
                children.extend(args.exprs());
                children
            }
            ExprKind::Alloc { count, .. } => smallvec::smallvec![&**count],
            ExprKind::TupleProj { tuple: inner, .. }
            | ExprKind::ClosureField { closure: inner, .. }
            | ExprKind::Cast(inner) => smallvec::smallvec![&**inner],
        }
    }

    /// Visit this expression and all descendants, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        crate::ensure_sufficient_stack(|| {
            f(self);
            for child in self.children() {
                child.walk(&mut *f);
            }
        });
    }
}
