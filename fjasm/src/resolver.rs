//! Single linear pass over the expanded operation stream: assigns each
//! operation a bit-address, builds the label map, and collects residual
//! expressions for the emitter to evaluate once every label is known.

use crate::ast::{BinOp, Expr, Pos};
use crate::error::AssembleError;
use crate::expander::PrimitiveOp;
use crate::parser::eval_bin;
use std::collections::HashMap;

struct SegmentBuilder {
    start_word: u64,
    data_start: u64,
}

pub struct ResolvedSegment {
    pub segment_start: u64,
    pub segment_length: u64,
    pub data_start: u64,
    pub data_length: u64,
}

/// A data word whose final value depends on labels not yet known at the
/// point it was emitted.
struct Residual {
    word_index: u64,
    ip: u64,
    expr: Expr,
    pos: Pos,
}

pub struct Resolved {
    pub segments: Vec<ResolvedSegment>,
    pub data: Vec<u64>,
}

pub fn resolve(
    ops: &[PrimitiveOp],
    consts: &HashMap<String, i64>,
    word_size: u32,
) -> Result<Resolved, AssembleError> {
    let w = word_size as u64;
    let mut cursor: u64 = 0;
    let mut labels: HashMap<String, u64> = HashMap::new();
    let mut segments = Vec::new();
    let mut data: Vec<Option<u64>> = Vec::new();
    let mut residuals: Vec<Residual> = Vec::new();
    let mut current: Option<SegmentBuilder> = Some(SegmentBuilder {
        start_word: 0,
        data_start: 0,
    });

    // Pass 1: assign addresses, bind labels, stage residual expressions.
    for op in ops {
        match op {
            PrimitiveOp::Label(name, pos) => {
                if labels.insert(name.clone(), cursor).is_some() {
                    return Err(AssembleError::DuplicateLabel(*pos, name.clone()));
                }
            }
            PrimitiveOp::Segment(expr, pos) => {
                let start_word = eval_known(expr, &labels, consts, cursor / w)
                    .ok_or_else(|| AssembleError::UnresolvedSymbol(*pos, "segment".into()))?
                    as u64;
                close_segment(&mut current, &mut segments, cursor, w, &data)?;
                cursor = start_word * w;
                current = Some(SegmentBuilder {
                    start_word,
                    data_start: data.len() as u64,
                });
            }
            PrimitiveOp::Reserve(expr, pos) => {
                let bits = eval_known(expr, &labels, consts, cursor / w)
                    .ok_or_else(|| AssembleError::UnresolvedSymbol(*pos, "reserve".into()))?
                    as u64;
                cursor += bits;
            }
            PrimitiveOp::FlipJump(flip, jump, pos) => {
                let ip = cursor;
                data.push(None);
                residuals.push(Residual {
                    word_index: data.len() as u64 - 1,
                    ip,
                    expr: flip.clone(),
                    pos: *pos,
                });
                data.push(None);
                residuals.push(Residual {
                    word_index: data.len() as u64 - 1,
                    ip,
                    expr: jump.clone(),
                    pos: *pos,
                });
                cursor += 2 * w;
            }
        }
    }
    close_segment(&mut current, &mut segments, cursor, w, &data)?;

    // Pass 2: every label is known; evaluate residual expressions.
    for r in residuals {
        let value = eval_full(&r.expr, &labels, consts, r.ip, r.ip + 2 * w)
            .ok_or_else(|| AssembleError::UnresolvedSymbol(r.pos, describe(&r.expr)))?;
        data[r.word_index as usize] = Some((value as u64) & mask(word_size));
    }

    let data: Vec<u64> = data.into_iter().map(|d| d.unwrap_or(0)).collect();
    Ok(Resolved { segments, data })
}

fn mask(word_size: u32) -> u64 {
    if word_size >= 64 {
        u64::MAX
    } else {
        (1u64 << word_size) - 1
    }
}

/// Closes the in-progress segment (if any), checking its address range
/// against every segment already closed before appending it.
fn close_segment(
    current: &mut Option<SegmentBuilder>,
    segments: &mut Vec<ResolvedSegment>,
    cursor: u64,
    w: u64,
    data: &[Option<u64>],
) -> Result<(), AssembleError> {
    if let Some(seg) = current.take() {
        let segment_length = (cursor / w).saturating_sub(seg.start_word);
        let data_length = data.len() as u64 - seg.data_start;
        let segment_length = segment_length.max(data_length);
        let end = seg.start_word + segment_length;

        for existing in segments.iter() {
            let existing_end = existing.segment_start + existing.segment_length;
            if seg.start_word < existing_end && existing.segment_start < end {
                return Err(AssembleError::SegmentOverlap(
                    existing.segment_start,
                    existing_end,
                    seg.start_word,
                    end,
                ));
            }
        }

        segments.push(ResolvedSegment {
            segment_start: seg.start_word,
            segment_length,
            data_start: seg.data_start,
            data_length,
        });
    }
    Ok(())
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        _ => "expression".to_string(),
    }
}

/// Evaluates an expression that may reference labels already bound and
/// named constants, but not `$`/`next address` (used for `segment`/
/// `reserve`, which must be known before the cursor advances any further).
fn eval_known(
    expr: &Expr,
    labels: &HashMap<String, u64>,
    consts: &HashMap<String, i64>,
    _cursor_words: u64,
) -> Option<i64> {
    eval(expr, labels, consts, None, None)
}

/// Evaluates an expression with `$` and the default next-instruction
/// address both bound (used for flip-jump operand words in pass 2, once
/// every label is known).
fn eval_full(
    expr: &Expr,
    labels: &HashMap<String, u64>,
    consts: &HashMap<String, i64>,
    ip: u64,
    next: u64,
) -> Option<i64> {
    eval(expr, labels, consts, Some(ip), Some(next))
}

fn eval(
    expr: &Expr,
    labels: &HashMap<String, u64>,
    consts: &HashMap<String, i64>,
    dollar: Option<u64>,
    next: Option<u64>,
) -> Option<i64> {
    match expr {
        Expr::Int(v) => Some(*v),
        Expr::Dollar => dollar.map(|v| v as i64),
        Expr::NextAddress => next.map(|v| v as i64),
        Expr::Ident(name) => labels
            .get(name)
            .map(|&v| v as i64)
            .or_else(|| consts.get(name).copied()),
        Expr::Bin(op, l, r) => {
            let a = eval(l, labels, consts, dollar, next)?;
            let b = eval(r, labels, consts, dollar, next)?;
            eval_bin_checked(*op, a, b)
        }
        Expr::Ternary(c, t, f) => {
            let cv = eval(c, labels, consts, dollar, next)?;
            if cv != 0 {
                eval(t, labels, consts, dollar, next)
            } else {
                eval(f, labels, consts, dollar, next)
            }
        }
        Expr::BitLength(e) => {
            let v = eval(e, labels, consts, dollar, next)? as u64;
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

fn eval_bin_checked(op: BinOp, a: i64, b: i64) -> Option<i64> {
    eval_bin(op, a, b)
}
