//! Statement nodes.

use tern_types::Name;

use crate::Expr;

pub type Block = Vec<Stmt>;

/// Reconciles a variable at a control-flow join.
///
/// For `If`, `left` is the value flowing out of the true branch and `right`
/// the one from the false branch. For `While`, `left` is the value entering
/// the loop and `right` the value at the end of the body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Phi {
    pub target: Name,
    pub left: Expr,
    pub right: Expr,
}

impl Phi {
    pub fn new(target: impl Into<Name>, left: Expr, right: Expr) -> Self {
        Phi {
            target: target.into(),
            left,
            right,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    RunExpr(Expr),
    Return(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Block,
        merge: Vec<Phi>,
    },
    While {
        cond: Expr,
        body: Block,
        merge: Vec<Phi>,
    },
}

impl Stmt {
    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Stmt::Assign { lhs, rhs }
    }

    pub fn run(value: Expr) -> Self {
        Stmt::RunExpr(value)
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return(value)
    }

    pub fn if_(cond: Expr, then_block: Block, else_block: Block, merge: Vec<Phi>) -> Self {
        Stmt::If {
            cond,
            then_block,
            else_block,
            merge,
        }
    }

    pub fn while_(cond: Expr, body: Block, merge: Vec<Phi>) -> Self {
        Stmt::While { cond, body, merge }
    }

    /// Expressions owned directly by this statement (not nested blocks).
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Assign { lhs, rhs } => vec![lhs, rhs],
            Stmt::RunExpr(value) | Stmt::Return(value) => vec![value],
            Stmt::If { cond, merge, .. } | Stmt::While { cond, merge, .. } => {
                let mut exprs = vec![cond];
                for phi in merge {
                    exprs.push(&phi.left);
                    exprs.push(&phi.right);
                }
                exprs
            }
        }
    }

    /// Nested blocks, in source order.
    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            Stmt::If {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Stmt::While { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }
}

/// Visit every statement in `block`, nested ones included, parents first.
pub fn walk_stmts<'a>(block: &'a [Stmt], f: &mut impl FnMut(&'a Stmt)) {
    for stmt in block {
        f(stmt);
        crate::ensure_sufficient_stack(|| {
            for nested in stmt.blocks() {
                walk_stmts(nested, &mut *f);
            }
        });
    }
}

/// Visit every expression in `block`, nested ones included.
pub fn walk_exprs<'a>(block: &'a [Stmt], f: &mut impl FnMut(&'a Expr)) {
    walk_stmts(block, &mut |stmt| {
        for expr in stmt.exprs() {
            expr.walk(&mut *f);
        }
    });
}
