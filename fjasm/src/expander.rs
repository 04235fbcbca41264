//! Recursively inlines macro invocations into a flat stream of primitive
//! operations, substituting parameters/locals/externs/globals by tree copy
//! rather than string rewriting (see module doc in `lib.rs`).

use crate::ast::{BinOp, Expr, MacroDef, Pos, Program, Stmt};
use crate::error::AssembleError;
use crate::parser::eval_bin;
use std::collections::HashMap;

/// The flat, label-qualified operation stream the resolver consumes.
/// `WordFlip` has already been lowered away by the time expansion finishes.
#[derive(Clone, Debug)]
pub enum PrimitiveOp {
    Label(String, Pos),
    FlipJump(Expr, Expr, Pos),
    Segment(Expr, Pos),
    Reserve(Expr, Pos),
}

struct Expander<'a> {
    macros: &'a HashMap<(String, usize), MacroDef>,
    consts: &'a HashMap<String, i64>,
    word_size: u32,
    call_stack: Vec<(String, usize)>,
    counter: u64,
    out: Vec<PrimitiveOp>,
}

pub fn expand(
    program: &Program,
    consts: &HashMap<String, i64>,
    word_size: u32,
) -> Result<Vec<PrimitiveOp>, AssembleError> {
    let mut ex = Expander {
        macros: &program.macros,
        consts,
        word_size,
        call_stack: Vec::new(),
        counter: 0,
        out: Vec::new(),
    };
    let mut env = HashMap::new();
    ex.expand_body(&program.root, &mut env)?;
    Ok(ex.out)
}

impl<'a> Expander<'a> {
    fn fresh(&mut self, base: &str) -> String {
        self.counter += 1;
        format!("__{}#{}", base, self.counter)
    }

    fn expand_body(
        &mut self,
        body: &[Stmt],
        env: &mut HashMap<String, Expr>,
    ) -> Result<(), AssembleError> {
        for stmt in body {
            self.expand_stmt(stmt, env)?;
        }
        Ok(())
    }

    fn expand_stmt(
        &mut self,
        stmt: &Stmt,
        env: &mut HashMap<String, Expr>,
    ) -> Result<(), AssembleError> {
        match stmt {
            Stmt::Label(name, pos) => {
                let qualified = substitute(&Expr::Ident(name.clone()), env);
                match qualified {
                    Expr::Ident(n) => self.out.push(PrimitiveOp::Label(n, *pos)),
                    _ => self.out.push(PrimitiveOp::Label(name.clone(), *pos)),
                }
                Ok(())
            }
            Stmt::ConstAssign(_, _, _) => Ok(()),
            Stmt::Segment(e, pos) => {
                self.out.push(PrimitiveOp::Segment(substitute(e, env), *pos));
                Ok(())
            }
            Stmt::Reserve(e, pos) => {
                self.out.push(PrimitiveOp::Reserve(substitute(e, env), *pos));
                Ok(())
            }
            Stmt::FlipJump(flip, jump, pos) => {
                self.out.push(PrimitiveOp::FlipJump(
                    substitute(flip, env),
                    substitute(jump, env),
                    *pos,
                ));
                Ok(())
            }
            Stmt::WordFlip(dst, value, ret, pos) => {
                let dst = substitute(dst, env);
                let ret = ret
                    .as_ref()
                    .map(|r| substitute(r, env))
                    .unwrap_or(Expr::NextAddress);
                let value_expr = substitute(value, env);
                let value = eval_const(&value_expr, self.consts)
                    .ok_or_else(|| AssembleError::UnresolvedSymbol(*pos, "wflip value".into()))?
                    as u64;
                for bit in 0..self.word_size {
                    if (value >> bit) & 1 == 1 {
                        let flip = add_int(dst.clone(), bit as i64);
                        self.out
                            .push(PrimitiveOp::FlipJump(flip, Expr::NextAddress, *pos));
                    }
                }
                self.out.push(PrimitiveOp::FlipJump(Expr::Int(0), ret, *pos));
                Ok(())
            }
            Stmt::MacroCall(name, args, pos) => {
                let externs = self.expand_call(name, args, env, *pos)?;
                env.extend(externs);
                Ok(())
            }
            Stmt::RepCall(count, induction, macro_name, args, pos) => {
                let count_expr = substitute(count, env);
                let count = eval_const(&count_expr, self.consts)
                    .ok_or_else(|| AssembleError::UnresolvedSymbol(*pos, "rep count".into()))?;
                for i in 0..count {
                    let mut child_env = env.clone();
                    child_env.insert(induction.clone(), Expr::Int(i));
                    let bound_args: Vec<Expr> =
                        args.iter().map(|a| substitute(a, &child_env)).collect();
                    let externs = self.expand_call(macro_name, &bound_args, &child_env, *pos)?;
                    env.extend(externs);
                }
                Ok(())
            }
        }
    }

    /// Expands one macro call and returns the extern-parameter bindings it
    /// produced, so the caller can splice them into its own environment —
    /// an extern is visible to the caller as if declared there, unlike a
    /// local, which stays scoped to the callee's own expansion.
    fn expand_call(
        &mut self,
        name: &str,
        args: &[Expr],
        env: &HashMap<String, Expr>,
        pos: Pos,
    ) -> Result<HashMap<String, Expr>, AssembleError> {
        let key = (name.to_string(), args.len());
        let def = self
            .macros
            .get(&key)
            .ok_or_else(|| AssembleError::UndefinedMacro(pos, name.to_string(), args.len()))?
            .clone();

        if self.call_stack.contains(&key) {
            return Err(AssembleError::MacroRecursion(pos, name.to_string(), args.len()));
        }
        self.call_stack.push(key);

        let mut new_env = HashMap::new();
        for (param, arg) in def.params.params.iter().zip(args) {
            new_env.insert(param.clone(), substitute(arg, env));
        }
        for local in &def.params.locals {
            new_env.insert(local.clone(), Expr::Ident(self.fresh(local)));
        }
        let mut extern_bindings = HashMap::new();
        for ext in &def.params.externs {
            let bound = Expr::Ident(self.fresh(ext));
            new_env.insert(ext.clone(), bound.clone());
            extern_bindings.insert(ext.clone(), bound);
        }
        for global in &def.params.globals {
            new_env.insert(global.clone(), Expr::Ident(format!("__global__.{}", global)));
        }

        let result = self.expand_body(&def.body, &mut new_env);
        self.call_stack.pop();
        result.map(|()| extern_bindings)
    }
}

fn add_int(e: Expr, delta: i64) -> Expr {
    if let Some(v) = e.as_const() {
        Expr::Int(v + delta)
    } else {
        Expr::Bin(BinOp::Add, Box::new(e), Box::new(Expr::Int(delta)))
    }
}

/// Copies `expr`, replacing any leaf [`Expr::Ident`] found in `env`.
fn substitute(expr: &Expr, env: &HashMap<String, Expr>) -> Expr {
    match expr {
        Expr::Int(_) | Expr::Dollar | Expr::NextAddress => expr.clone(),
        Expr::Ident(name) => env.get(name).cloned().unwrap_or_else(|| expr.clone()),
        Expr::Bin(op, l, r) => Expr::Bin(
            *op,
            Box::new(substitute(l, env)),
            Box::new(substitute(r, env)),
        ),
        Expr::Ternary(c, t, f) => Expr::Ternary(
            Box::new(substitute(c, env)),
            Box::new(substitute(t, env)),
            Box::new(substitute(f, env)),
        ),
        Expr::BitLength(e) => Expr::BitLength(Box::new(substitute(e, env))),
    }
}

/// Evaluates an expression that must already be fully constant (only
/// integer leaves and already-known named constants; no labels, no `$`).
fn eval_const(expr: &Expr, consts: &HashMap<String, i64>) -> Option<i64> {
    match expr {
        Expr::Int(v) => Some(*v),
        Expr::Ident(name) => consts.get(name).copied(),
        Expr::Dollar | Expr::NextAddress => None,
        Expr::Bin(op, l, r) => {
            let a = eval_const(l, consts)?;
            let b = eval_const(r, consts)?;
            eval_bin(*op, a, b)
        }
        Expr::Ternary(c, t, f) => {
            let cv = eval_const(c, consts)?;
            if cv != 0 {
                eval_const(t, consts)
            } else {
                eval_const(f, consts)
            }
        }
        Expr::BitLength(e) => {
            let v = eval_const(e, consts)? as u64;
            let mut n = v;
            let mut len = 0i64;
            while n > 0 {
                len += 1;
                n >>= 1;
            }
            Some(len)
        }
    }
}
