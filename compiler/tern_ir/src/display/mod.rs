//! Textual rendering of IR for diagnostics and debug logs.

use std::fmt::{self, Write as _};

use tern_types::TypePool;

use crate::{ActualArgs, ConstValue, Expr, ExprKind, Fn, Stmt, TypedFn};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::Float(x) => write!(f, "{x:?}"),
            ConstValue::None => f.write_str("None"),
        }
    }
}

fn comma_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ActualArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        comma_list(f, &self.positional)?;
        let mut first = self.positional.is_empty();
        for (name, value) in &self.keywords {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        if let Some(star) = &self.starargs {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "*{star}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Const(value) => write!(f, "{value}"),
            ExprKind::Var(name) => write!(f, "{name}"),
            ExprKind::Tuple(elems) => {
                f.write_str("(")?;
                comma_list(f, elems)?;
                if elems.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            ExprKind::Array(elems) => {
                f.write_str("[")?;
                comma_list(f, elems)?;
                f.write_str("]")
            }
            ExprKind::Attribute { value, name } => write!(f, "{value}.{name}"),
            ExprKind::Index { value, index } => write!(f, "{value}[{index}]"),
            ExprKind::Slice { start, stop, step } => write!(f, "slice({start}, {stop}, {step})"),
            ExprKind::Call {
                callee,
                args,
                target,
            } => match target {
                Some(target) => write!(f, "{target}({args})"),
                None => write!(f, "{callee}({args})"),
            },
            ExprKind::Prim { op, args } => {
                write!(f, "prim:{}(", op.name())?;
                comma_list(f, args)?;
                f.write_str(")")
            }
            ExprKind::Closure { func, args } => {
                write!(f, "closure({func}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                f.write_str(")")
            }
            ExprKind::FnRef(name) => write!(f, "&{name}"),
            ExprKind::Struct(fields) => {
                f.write_str("struct{")?;
                comma_list(f, fields)?;
                f.write_str("}")
            }
            ExprKind::Alloc { elem, count } => write!(f, "alloc<{elem}>({count})"),
            ExprKind::TupleProj { tuple, index } => write!(f, "{tuple}.{index}"),
            ExprKind::ClosureField { closure, index } => write!(f, "{closure}.$field{index}"),
            ExprKind::Cast(value) => match self.ty {
                Some(ty) => write!(f, "cast<{ty}>({value})"),
                None => write!(f, "cast({value})"),
            },
            ExprKind::NumCores => f.write_str("num_cores()"),
        }
    }
}

struct Printer<'a> {
    out: String,
    indent: usize,
    pool: Option<&'a TypePool>,
}

impl Printer<'_> {
    fn line(&mut self, text: fmt::Arguments<'_>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        let _ = self.out.write_fmt(text);
        self.out.push('\n');
    }

    fn block(&mut self, block: &[Stmt]) {
        self.indent += 1;
        if block.is_empty() {
            self.line(format_args!("pass"));
        }
        for stmt in block {
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        crate::ensure_sufficient_stack(|| match stmt {
            Stmt::Assign { lhs, rhs } => self.line(format_args!("{lhs} = {rhs}")),
            Stmt::RunExpr(value) => self.line(format_args!("{value}")),
            Stmt::Return(value) => self.line(format_args!("return {value}")),
            Stmt::If {
                cond,
                then_block,
                else_block,
                merge,
            } => {
                self.line(format_args!("if {cond}:"));
                self.block(then_block);
                self.line(format_args!("else:"));
                self.block(else_block);
                for phi in merge {
                    self.line(format_args!(
                        "{} <- phi({}, {})",
                        phi.target, phi.left, phi.right
                    ));
                }
            }
            Stmt::While { cond, body, merge } => {
                for phi in merge {
                    self.line(format_args!(
                        "{} <- phi({}, {})",
                        phi.target, phi.left, phi.right
                    ));
                }
                self.line(format_args!("while {cond}:"));
                self.block(body);
            }
        });
    }

    fn ty(&self, ty: tern_types::Idx) -> String {
        match self.pool {
            Some(pool) => pool.render(ty),
            None => ty.to_string(),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer {
            out: String::new(),
            indent: 0,
            pool: None,
        };
        printer.stmt(self);
        f.write_str(printer.out.trim_end())
    }
}

impl fmt::Display for Fn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer {
            out: String::new(),
            indent: 0,
            pool: None,
        };
        let params: Vec<String> = self
            .args
            .names()
            .map(|name| match self.args.default_for(name) {
                Some(default) => format!("{name}={default}"),
                None if Some(name) == self.args.starargs => format!("*{name}"),
                None => name.to_string(),
            })
            .collect();
        printer.line(format_args!("def {}({}):", self.name, params.join(", ")));
        printer.block(&self.body);
        f.write_str(printer.out.trim_end())
    }
}

/// Renders a typed function with full type names.
pub struct FnDisplay<'a> {
    func: &'a TypedFn,
    pool: &'a TypePool,
}

impl TypedFn {
    pub fn display<'a>(&'a self, pool: &'a TypePool) -> FnDisplay<'a> {
        FnDisplay { func: self, pool }
    }
}

impl fmt::Display for FnDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer {
            out: String::new(),
            indent: 0,
            pool: Some(self.pool),
        };
        let params: Vec<String> = self
            .func
            .arg_names
            .iter()
            .zip(&self.func.input_types)
            .map(|(name, &ty)| format!("{name}: {}", printer.ty(ty)))
            .collect();
        let ret = printer.ty(self.func.return_type);
        printer.line(format_args!(
            "def {}#{}({}) -> {ret}:",
            self.func.name,
            self.func.version,
            params.join(", ")
        ));
        printer.block(&self.func.body);
        f.write_str(printer.out.trim_end())
    }
}
