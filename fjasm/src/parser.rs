//! Walks the `pest` parse tree into the [`crate::ast`] types, qualifying
//! every label and macro name by the enclosing `ns` stack as it goes.
//!
//! Namespace qualification happens here, lexically, rather than during
//! expansion: a bare name is qualified by the full current namespace path;
//! a name with `d` leading dots is qualified by the path with `d - 1`
//! trailing segments peeled off. Names belonging to a macro's own
//! parameter/local/extern/global lists are left unqualified — the expander
//! substitutes those per call site.

use crate::ast::{BinOp, Expr, MacroDef, Params, Pos, Program, Stmt};
use crate::error::ParseError;
use crate::int_util::process_number;
use matches::debug_assert_matches;
use pest::iterators::Pair;
use pest::Parser;
use std::collections::HashMap;

#[derive(pest_derive::Parser)]
#[grammar = "grammar.pest"]
pub struct FjAsmParser;

const KEYWORDS: &[&str] = &["ns", "def", "rep", "wflip", "segment", "reserve"];

struct Ctx {
    ns_stack: Vec<String>,
    consts: HashMap<String, i64>,
    errors: Vec<ParseError>,
    macros: HashMap<(String, usize), MacroDef>,
}

impl Ctx {
    fn qualify(&self, name: &str, dots: usize, pos: Pos) -> Result<String, ParseError> {
        if dots == 0 {
            return Ok(name.to_string());
        }
        let peel = dots - 1;
        if peel > self.ns_stack.len() {
            return Err(ParseError::ExcessiveLeadingDots(pos));
        }
        let keep = self.ns_stack.len() - peel;
        let mut parts: Vec<&str> = self.ns_stack[..keep].iter().map(String::as_str).collect();
        parts.push(name);
        Ok(parts.join("."))
    }
}

fn line_of(pair: &Pair<Rule>) -> Pos {
    pair.as_span().start_pos().line_col().0 as Pos
}

pub fn parse_program(
    source: &str,
) -> Result<(Program, HashMap<String, i64>), Vec<ParseError>> {
    let mut pairs = match FjAsmParser::parse(Rule::program, source) {
        Ok(p) => p,
        Err(e) => return Err(vec![ParseError::Grammar(e)]),
    };
    let program_pair = pairs.next().unwrap();

    let mut ctx = Ctx {
        ns_stack: Vec::new(),
        consts: HashMap::new(),
        errors: Vec::new(),
        macros: HashMap::new(),
    };

    let mut root = Vec::new();
    for pair in program_pair.into_inner() {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        process_top_stmt(pair, &mut ctx, &mut root);
    }

    if ctx.errors.is_empty() {
        Ok((
            Program {
                macros: ctx.macros,
                root,
            },
            ctx.consts,
        ))
    } else {
        Err(ctx.errors)
    }
}

fn process_top_stmt(pair: Pair<Rule>, ctx: &mut Ctx, out: &mut Vec<Stmt>) {
    let pos = line_of(&pair);
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::namespace => process_namespace(inner, ctx, out),
        Rule::macro_def => process_macro_def(inner, ctx),
        Rule::line_stmt => {
            if let Some(stmt) = process_line_stmt(inner, ctx, pos, None) {
                out.push(stmt);
            }
        }
        _ => unreachable!(),
    }
}

fn process_namespace(pair: Pair<Rule>, ctx: &mut Ctx, out: &mut Vec<Stmt>) {
    debug_assert_matches!(pair.as_rule(), Rule::namespace);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    ctx.ns_stack.push(name);
    for p in inner {
        if p.as_rule() == Rule::top_stmt {
            process_top_stmt(p, ctx, out);
        }
    }
    ctx.ns_stack.pop();
}

fn process_macro_def(pair: Pair<Rule>, ctx: &mut Ctx) {
    debug_assert_matches!(pair.as_rule(), Rule::macro_def);
    let pos = line_of(&pair);
    let mut inner = pair.into_inner();
    let bare_name = inner.next().unwrap().as_str().to_string();

    if KEYWORDS.contains(&bare_name.as_str()) {
        ctx.errors
            .push(ParseError::ReservedMacroName(pos, bare_name));
        return;
    }

    let params_pair = inner.next().unwrap();
    let params = process_params(params_pair, ctx, pos);

    let scope: std::collections::HashSet<&str> = params
        .params
        .iter()
        .chain(params.locals.iter())
        .chain(params.externs.iter())
        .chain(params.globals.iter())
        .map(String::as_str)
        .collect();

    let name = ctx.qualify(&bare_name, 1, pos).unwrap();
    let arity = params.params.len();

    let mut body = Vec::new();
    for p in inner {
        if p.as_rule() == Rule::line_stmt {
            if let Some(stmt) = process_line_stmt(p, ctx, line_of(&p), Some(&scope)) {
                body.push(stmt);
            }
        }
    }

    warn_unused_params(&params, &body, &name, pos);

    let def = MacroDef {
        name: name.clone(),
        params,
        body,
        pos,
    };
    if ctx.macros.insert((name.clone(), arity), def).is_some() {
        ctx.errors.push(ParseError::DuplicateMacro(pos, name));
    }
}

/// Emits a `tracing::warn!` for every declared parameter/local that the
/// macro body never references. Escalating this to a hard error under
/// `AssembleConfig::warnings_as_errors` happens at the call site in
/// `fjasm::lib`, since the parser has no config to consult.
fn warn_unused_params(params: &Params, body: &[Stmt], macro_name: &str, pos: Pos) {
    let mut used = std::collections::HashSet::new();
    for stmt in body {
        collect_used_idents(stmt, &mut used);
    }
    for name in params.params.iter().chain(params.locals.iter()) {
        if !used.contains(name) {
            tracing::warn!(macro_name, param = name.as_str(), line = pos, "unused parameter");
        }
    }
}

fn collect_used_idents(stmt: &Stmt, out: &mut std::collections::HashSet<String>) {
    match stmt {
        Stmt::Label(_, _) => {}
        Stmt::ConstAssign(_, e, _) => collect_expr_idents(e, out),
        Stmt::Segment(e, _) | Stmt::Reserve(e, _) => collect_expr_idents(e, out),
        Stmt::FlipJump(a, b, _) => {
            collect_expr_idents(a, out);
            collect_expr_idents(b, out);
        }
        Stmt::WordFlip(a, b, c, _) => {
            collect_expr_idents(a, out);
            collect_expr_idents(b, out);
            if let Some(c) = c {
                collect_expr_idents(c, out);
            }
        }
        Stmt::MacroCall(_, args, _) => {
            for a in args {
                collect_expr_idents(a, out);
            }
        }
        Stmt::RepCall(count, _, _, args, _) => {
            collect_expr_idents(count, out);
            for a in args {
                collect_expr_idents(a, out);
            }
        }
    }
}

fn collect_expr_idents(expr: &Expr, out: &mut std::collections::HashSet<String>) {
    match expr {
        Expr::Ident(name) => {
            out.insert(name.clone());
        }
        Expr::Bin(_, l, r) => {
            collect_expr_idents(l, out);
            collect_expr_idents(r, out);
        }
        Expr::Ternary(c, t, f) => {
            collect_expr_idents(c, out);
            collect_expr_idents(t, out);
            collect_expr_idents(f, out);
        }
        Expr::BitLength(e) => collect_expr_idents(e, out),
        Expr::Int(_) | Expr::Dollar | Expr::NextAddress => {}
    }
}

fn process_params(pair: Pair<Rule>, ctx: &mut Ctx, pos: Pos) -> Params {
    let mut params = Params::default();
    let mut seen = std::collections::HashSet::new();

    let mut names_of = |list: Pair<Rule>, ctx: &mut Ctx| -> Vec<String> {
        let ident_list = list.into_inner().next().unwrap();
        let names: Vec<String> = ident_list
            .into_inner()
            .map(|id| id.as_str().to_string())
            .collect();
        for n in &names {
            if !seen.insert(n.clone()) {
                ctx.errors.push(ParseError::DuplicateParam(pos, n.clone()));
            }
        }
        names
    };

    for list in pair.into_inner() {
        match list.as_rule() {
            Rule::param_list => params.params = names_of(list, ctx),
            Rule::local_list => params.locals = names_of(list, ctx),
            Rule::global_list => params.globals = names_of(list, ctx),
            Rule::extern_list => params.externs = names_of(list, ctx),
            _ => unreachable!(),
        }
    }
    params
}

fn process_line_stmt(
    pair: Pair<Rule>,
    ctx: &mut Ctx,
    pos: Pos,
    scope: Option<&std::collections::HashSet<&str>>,
) -> Option<Stmt> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::label_decl => {
            let ident_pair = inner.into_inner().next().unwrap();
            let (dots, bare) = split_dots(ident_pair.as_str());
            if let Some(scope) = scope {
                if !scope.contains(bare) && dots == 0 {
                    ctx.errors.push(ParseError::ConflictingLabelClass(
                        pos,
                        bare.to_string(),
                    ));
                }
                if dots == 0 {
                    return Some(Stmt::Label(bare.to_string(), pos));
                }
            }
            match ctx.qualify(bare, dots.max(1), pos) {
                Ok(name) => Some(Stmt::Label(name, pos)),
                Err(e) => {
                    ctx.errors.push(e);
                    None
                }
            }
        }
        Rule::const_assign => {
            let mut it = inner.into_inner();
            let name = it.next().unwrap().as_str().to_string();
            let expr_pair = it.next().unwrap();
            let expr = parse_expr(expr_pair, ctx, pos, scope);
            match expr.as_const() {
                Some(v) => {
                    if ctx.consts.insert(name.clone(), v).is_some() {
                        ctx.errors.push(ParseError::ConstRedeclared(pos, name.clone()));
                    }
                    Some(Stmt::ConstAssign(name, Expr::Int(v), pos))
                }
                None => Some(Stmt::ConstAssign(name, expr, pos)),
            }
        }
        Rule::segment_stmt => {
            let e = parse_expr(inner.into_inner().next().unwrap(), ctx, pos, scope);
            Some(Stmt::Segment(e, pos))
        }
        Rule::reserve_stmt => {
            let e = parse_expr(inner.into_inner().next().unwrap(), ctx, pos, scope);
            Some(Stmt::Reserve(e, pos))
        }
        Rule::wflip_stmt => {
            let mut it = inner.into_inner();
            let dst = parse_expr(it.next().unwrap(), ctx, pos, scope);
            let value = parse_expr(it.next().unwrap(), ctx, pos, scope);
            let ret = it.next().map(|p| parse_expr(p, ctx, pos, scope));
            Some(Stmt::WordFlip(dst, value, ret, pos))
        }
        Rule::rep_stmt => {
            let mut it = inner.into_inner();
            let count = parse_expr(it.next().unwrap(), ctx, pos, scope);
            let induction = it.next().unwrap().as_str().to_string();
            let macro_name = it.next().unwrap().as_str().to_string();

            // The induction variable is bound fresh per iteration by the
            // expander, exactly like a macro param, so `args` must see it
            // as in-scope (left unqualified) rather than namespace-qualified.
            let mut rep_scope: std::collections::HashSet<&str> = scope
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            rep_scope.insert(induction.as_str());

            let mut args = Vec::new();
            if let Some(list) = it.next() {
                for e in list.into_inner() {
                    args.push(parse_expr(e, ctx, pos, Some(&rep_scope)));
                }
            }
            let (dots, bare) = split_dots(&macro_name);
            let qualified = match ctx.qualify(bare, dots.max(1), pos) {
                Ok(n) => n,
                Err(e) => {
                    ctx.errors.push(e);
                    bare.to_string()
                }
            };
            Some(Stmt::RepCall(count, induction, qualified, args, pos))
        }
        Rule::macro_call => {
            let mut it = inner.into_inner();
            let name_pair = it.next().unwrap();
            let (dots, bare) = split_dots(name_pair.as_str());
            let qualified = if scope.map_or(false, |s| s.contains(bare)) && dots == 0 {
                bare.to_string()
            } else {
                match ctx.qualify(bare, dots.max(1), pos) {
                    Ok(n) => n,
                    Err(e) => {
                        ctx.errors.push(e);
                        bare.to_string()
                    }
                }
            };
            let mut args = Vec::new();
            if let Some(list) = it.next() {
                for e in list.into_inner() {
                    args.push(parse_expr(e, ctx, pos, scope));
                }
            }
            Some(Stmt::MacroCall(qualified, args, pos))
        }
        Rule::fj_stmt => {
            let variant = inner.into_inner().next().unwrap();
            let next_addr = next_address_expr();
            let (flip, jump) = match variant.as_rule() {
                Rule::both_stmt => {
                    let mut it = variant.into_inner();
                    let flip = parse_expr(it.next().unwrap(), ctx, pos, scope);
                    let jump = parse_expr(it.next().unwrap(), ctx, pos, scope);
                    (flip, jump)
                }
                Rule::flip_only_stmt => {
                    let flip = parse_expr(variant.into_inner().next().unwrap(), ctx, pos, scope);
                    (flip, next_addr)
                }
                Rule::jump_only_stmt => {
                    let jump = parse_expr(variant.into_inner().next().unwrap(), ctx, pos, scope);
                    (Expr::Int(0), jump)
                }
                Rule::bare_semi_stmt => (Expr::Int(0), next_addr),
                _ => unreachable!(),
            };
            Some(Stmt::FlipJump(flip, jump, pos))
        }
        _ => unreachable!(),
    }
}

fn next_address_expr() -> Expr {
    Expr::NextAddress
}

fn split_dots(s: &str) -> (usize, &str) {
    let dots = s.chars().take_while(|&c| c == '.').count();
    (dots, &s[dots..])
}

fn parse_expr(
    pair: Pair<Rule>,
    ctx: &mut Ctx,
    pos: Pos,
    scope: Option<&std::collections::HashSet<&str>>,
) -> Expr {
    match pair.as_rule() {
        Rule::expr => parse_expr(pair.into_inner().next().unwrap(), ctx, pos, scope),
        Rule::ternary_expr => {
            let mut it = pair.into_inner();
            let cond = parse_expr(it.next().unwrap(), ctx, pos, scope);
            match (it.next(), it.next()) {
                (Some(t), Some(f)) => mk_ternary(
                    cond,
                    parse_expr(t, ctx, pos, scope),
                    parse_expr(f, ctx, pos, scope),
                ),
                _ => cond,
            }
        }
        Rule::or_expr => fold_chain(pair, ctx, pos, scope, BinOp::Or),
        Rule::xor_expr => fold_chain(pair, ctx, pos, scope, BinOp::Xor),
        Rule::and_expr => fold_chain(pair, ctx, pos, scope, BinOp::And),
        Rule::cmp_expr => {
            let mut it = pair.into_inner();
            let left = parse_expr(it.next().unwrap(), ctx, pos, scope);
            match (it.next(), it.next()) {
                (Some(op), Some(right)) => {
                    let op = match op.as_str() {
                        "<=" => BinOp::Le,
                        ">=" => BinOp::Ge,
                        "<" => BinOp::Lt,
                        ">" => BinOp::Gt,
                        _ => unreachable!(),
                    };
                    mk_bin(op, left, parse_expr(right, ctx, pos, scope))
                }
                _ => left,
            }
        }
        Rule::eq_expr => fold_op_chain(pair, ctx, pos, scope, |s| match s {
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            _ => unreachable!(),
        }),
        Rule::shift_expr => fold_op_chain(pair, ctx, pos, scope, |s| match s {
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            _ => unreachable!(),
        }),
        Rule::add_expr => fold_op_chain(pair, ctx, pos, scope, |s| match s {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            _ => unreachable!(),
        }),
        Rule::mul_expr => fold_op_chain(pair, ctx, pos, scope, |s| match s {
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            _ => unreachable!(),
        }),
        Rule::unary_expr => {
            let inner = pair.into_inner().next().unwrap();
            match inner.as_rule() {
                Rule::unary_expr => {
                    mk_bitlength(parse_expr(inner, ctx, pos, scope))
                }
                Rule::atom => parse_expr(inner, ctx, pos, scope),
                _ => unreachable!(),
            }
        }
        Rule::atom => {
            let inner = pair.into_inner().next().unwrap();
            match inner.as_rule() {
                Rule::number => match process_number(inner, pos) {
                    Ok(v) => Expr::Int(v),
                    Err(e) => {
                        ctx.errors.push(e);
                        Expr::Int(0)
                    }
                },
                Rule::dollar => Expr::Dollar,
                Rule::dotted_ident => {
                    let (dots, bare) = split_dots(inner.as_str());
                    if dots == 0 {
                        if let Some(&v) = ctx.consts.get(bare) {
                            return Expr::Int(v);
                        }
                        if scope.map_or(false, |s| s.contains(bare)) {
                            return Expr::Ident(bare.to_string());
                        }
                    }
                    match ctx.qualify(bare, dots.max(1), pos) {
                        Ok(name) => {
                            if let Some(&v) = ctx.consts.get(&name) {
                                Expr::Int(v)
                            } else {
                                Expr::Ident(name)
                            }
                        }
                        Err(e) => {
                            ctx.errors.push(e);
                            Expr::Int(0)
                        }
                    }
                }
                Rule::expr => parse_expr(inner, ctx, pos, scope),
                _ => unreachable!(),
            }
        }
        other => unreachable!("unexpected rule in expression position: {:?}", other),
    }
}

fn fold_chain(
    pair: Pair<Rule>,
    ctx: &mut Ctx,
    pos: Pos,
    scope: Option<&std::collections::HashSet<&str>>,
    op: BinOp,
) -> Expr {
    let mut it = pair.into_inner();
    let mut acc = parse_expr(it.next().unwrap(), ctx, pos, scope);
    for p in it {
        acc = mk_bin(op, acc, parse_expr(p, ctx, pos, scope));
    }
    acc
}

fn fold_op_chain(
    pair: Pair<Rule>,
    ctx: &mut Ctx,
    pos: Pos,
    scope: Option<&std::collections::HashSet<&str>>,
    classify: impl Fn(&str) -> BinOp,
) -> Expr {
    let mut it = pair.into_inner();
    let mut acc = parse_expr(it.next().unwrap(), ctx, pos, scope);
    while let Some(op_pair) = it.next() {
        let op = classify(op_pair.as_str());
        let rhs = parse_expr(it.next().unwrap(), ctx, pos, scope);
        acc = mk_bin(op, acc, rhs);
    }
    acc
}

fn mk_bin(op: BinOp, l: Expr, r: Expr) -> Expr {
    if let (Some(a), Some(b)) = (l.as_const(), r.as_const()) {
        if let Some(v) = eval_bin(op, a, b) {
            return Expr::Int(v);
        }
    }
    Expr::Bin(op, Box::new(l), Box::new(r))
}

fn mk_ternary(c: Expr, t: Expr, f: Expr) -> Expr {
    if let Some(cv) = c.as_const() {
        return if cv != 0 { t } else { f };
    }
    Expr::Ternary(Box::new(c), Box::new(t), Box::new(f))
}

fn mk_bitlength(e: Expr) -> Expr {
    if let Some(v) = e.as_const() {
        return Expr::Int(bit_length(v));
    }
    Expr::BitLength(Box::new(e))
}

fn bit_length(v: i64) -> i64 {
    let mut n = v as u64;
    let mut len = 0i64;
    while n > 0 {
        len += 1;
        n >>= 1;
    }
    len
}

/// Evaluates a fully-constant binary operation. Returns `None` only when
/// the operator result is itself ill-defined (division/modulo by zero),
/// deferring the error to wherever this expression is ultimately resolved.
pub fn eval_bin(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::And => a & b,
        BinOp::Lt => (a < b) as i64,
        BinOp::Gt => (a > b) as i64,
        BinOp::Le => (a <= b) as i64,
        BinOp::Ge => (a >= b) as i64,
        BinOp::Eq => (a == b) as i64,
        BinOp::Ne => (a != b) as i64,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a.wrapping_shr(b as u32),
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
    })
}
