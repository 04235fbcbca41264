//! Assembler for the [flipjump](../flipjump/index.html) machine.
//!
//! The main entry points are [`assemble`] and [`assemble_addressed`], which
//! accept a program written in the FlipJump assembly language described
//! below and produce a resolved memory image ready to hand to
//! [`fjbin::Writer`].
//!
//! # FlipJump Assembly Language
//!
//! A source file is a sequence of statements, one per line. Three kinds of
//! top-level block nest statements:
//!
//! - `ns NAME { ... }` opens a namespace; bare identifiers declared inside
//!   are qualified by the full enclosing namespace path.
//! - `def NAME(params...) { ... }` declares a macro. Parameters and locals
//!   (introduced with `@`) are bound fresh per call; globals (`<`) share a
//!   single address across every expansion; externs (`>`) are declared
//!   inside the macro but exposed to the caller.
//! - Plain statements: label declarations (`name:`), constant bindings
//!   (`name = expr`), `segment expr`, `reserve expr`, `wflip dst, value[,
//!   ret]`, macro calls, `rep (count, i) name args...`, and flip-jump
//!   statements (`flip; jump`, `flip;`, `;jump`, or a bare `;`).
//!
//! Expressions support `+ - * / % << >> & | ^ == != < > <= >= ?: #` (`#x`
//! is the bit length of `x`) with the precedence described in the top-level
//! design notes, `$` for the address of the current instruction, and
//! decimal/hex (`0x`)/binary (`0b`)/char (`'a'`)/string (`"ab"`, packed
//! little-endian into one integer) literals.

pub mod ast;
pub mod error;
mod expander;
mod int_util;
pub mod parser;
mod resolver;

pub use error::{AssembleError, Error, ParseError, ParseErrors, Result};

use flipjump::WordSize;
use serde::{Deserialize, Serialize};

/// How a source file is translated into a memory image: the only knobs an
/// assembler caller needs, bundled the way a CLI normally layers flags over
/// a config struct.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleConfig {
    pub word_size: WordSize,
    pub warnings_as_errors: bool,
}

impl Default for AssembleConfig {
    fn default() -> AssembleConfig {
        AssembleConfig {
            word_size: WordSize::W64,
            warnings_as_errors: false,
        }
    }
}

/// The resolved output of assembly: everything [`fjbin::Writer`] needs.
#[derive(Clone, Debug)]
pub struct AssembledImage {
    pub word_size: WordSize,
    pub segments: Vec<(u64, u64, Vec<u64>)>,
}

/// Assembles `source` at word-address offset 0.
pub fn assemble(source: &str, config: &AssembleConfig) -> Result<AssembledImage> {
    assemble_addressed(source, config)
}

/// Assembles `source`. Segment addresses are whatever the source's own
/// `segment` directives declare (defaulting to word-address 0 if none
/// appear before the first emitted word).
pub fn assemble_addressed(source: &str, config: &AssembleConfig) -> Result<AssembledImage> {
    let parse_span = tracing::info_span!("parse");
    let (program, consts) = {
        let _enter = parse_span.enter();
        parser::parse_program(source).map_err(|errs| Error::Parse(error::ParseErrors(errs)))?
    };

    let expand_span = tracing::info_span!("expand");
    let ops = {
        let _enter = expand_span.enter();
        expander::expand(&program, &consts, config.word_size.bits())?
    };

    let resolve_span = tracing::info_span!("resolve");
    let resolved = {
        let _enter = resolve_span.enter();
        resolver::resolve(&ops, &consts, config.word_size.bits())?
    };

    let mut segments = Vec::with_capacity(resolved.segments.len());
    for seg in resolved.segments {
        let data =
            resolved.data[seg.data_start as usize..(seg.data_start + seg.data_length) as usize]
                .to_vec();
        segments.push((seg.segment_start, seg.segment_length, data));
    }

    Ok(AssembledImage {
        word_size: config.word_size,
        segments,
    })
}

/// Assembles `source` and writes the resulting `.fjm` image, matching the
/// binary format version/flags the caller requests.
pub fn assemble_to_writer(
    source: &str,
    config: &AssembleConfig,
    version: u64,
    flags: u64,
) -> Result<fjbin::Writer> {
    let image = assemble(source, config)?;
    let mut writer = fjbin::Writer::new(image.word_size.bits() as u16, version, flags)?;
    for (start, length, data) in image.segments {
        writer.add_segment(start, length, &data)?;
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_packing() {
        let config = AssembleConfig::default();
        let src = "x = \"AB\"\nsegment 0\nx;\n";
        let image = assemble(src, &config).unwrap();
        let (_, _, data) = &image.segments[0];
        // "AB" packs LSB-first: 'A' (0x41) in the low byte, 'B' (0x42) next.
        assert_eq!(data[0], 0x4241);
    }

    #[test]
    fn expression_fold() {
        let config = AssembleConfig::default();
        let src = "x = (1 << 8) + #255\nsegment 0\nx;\n";
        let image = assemble(src, &config).unwrap();
        let (_, _, data) = &image.segments[0];
        // flip word is the constant 264 = 256 + 8.
        assert_eq!(data[0], 264);
    }

    #[test]
    fn immediate_self_loop_source() {
        let config = AssembleConfig {
            word_size: WordSize::W8,
            warnings_as_errors: false,
        };
        let src = "segment 8\n16; $\n";
        let image = assemble(src, &config).unwrap();
        let (start, _, data) = &image.segments[0];
        assert_eq!(*start, 8);
        assert_eq!(data[0], 16);
        // jump target `$` is the instruction's own bit-address (8 words *
        // 8 bits = 64), so running this would halt with Looping (flip
        // target 16 is outside [64, 80)).
        assert_eq!(data[1], 64);
    }

    #[test]
    fn undefined_macro_call_errors() {
        let config = AssembleConfig::default();
        assert!(matches!(
            assemble("foo 1, 2\n", &config),
            Err(Error::Assemble(AssembleError::UndefinedMacro(_, _, _)))
        ));
    }

    #[test]
    fn duplicate_label_errors() {
        let config = AssembleConfig::default();
        let src = "a:\n;a\na:\n;a\n";
        assert!(matches!(
            assemble(src, &config),
            Err(Error::Assemble(AssembleError::DuplicateLabel(_, _)))
        ));
    }

    /// Runs `src` to termination against an empty input stream and returns
    /// its termination cause, driving the full assemble -> write -> read ->
    /// load -> run pipeline (not just `assemble`/`assemble_addressed`).
    fn run_to_completion(
        src: &str,
        config: &AssembleConfig,
    ) -> flipjump::TerminationCause {
        use std::io::Cursor;

        let writer = assemble_to_writer(src, config, 1, 0).unwrap();
        let mut buf = Vec::new();
        writer.write(&mut buf).unwrap();

        let image = fjbin::read(&mut Cursor::new(buf)).unwrap();
        let word_size = WordSize::from_bits(image.word_size as u32).unwrap();
        let mut mem = flipjump::SparseMemory::new(word_size);
        for seg in &image.segments {
            let data = &image.data
                [seg.data_start as usize..(seg.data_start + seg.data_length) as usize];
            mem.add_segment(seg.segment_start, seg.segment_length, data);
        }

        let mut io = flipjump::memory::io::StdIo::new(Cursor::new(Vec::<u8>::new()), Vec::new(), false);
        let stats = flipjump::run(&mut mem, &mut io, None).unwrap();
        assert!(io.get_output().unwrap().is_empty());
        stats.termination_cause
    }

    #[test]
    fn e4_immediate_self_loop_halts_looping() {
        // ip starts at word-address 0; flip targets a bit outside this
        // instruction's own two words, and the jump targets `$` (itself).
        let config = AssembleConfig {
            word_size: WordSize::W8,
            warnings_as_errors: false,
        };
        let cause = run_to_completion("100; $\n", &config);
        assert_eq!(cause, flipjump::TerminationCause::Looping);
    }

    #[test]
    fn e5_null_ip_halts_nullip() {
        // flip address 0 falls inside this instruction's own window, so the
        // Looping check doesn't fire; the jump address 0 is below 2w, which
        // the interpreter treats as a deliberate halt signal.
        let config = AssembleConfig {
            word_size: WordSize::W8,
            warnings_as_errors: false,
        };
        let cause = run_to_completion("0; 0\n", &config);
        assert_eq!(cause, flipjump::TerminationCause::NullIp);
    }

    #[test]
    fn e3_program_with_no_output_reports_empty() {
        // `run_to_completion` already asserts empty output; this test just
        // names the scenario explicitly.
        let config = AssembleConfig::default();
        let _ = run_to_completion("100; $\n", &config);
    }

    #[test]
    fn extern_binding_visible_to_caller() {
        // The label declared via `x:` inside `decl`'s body is an extern
        // parameter; the caller's own `;x` after the call must resolve to
        // that same fresh label, not fail as an unresolved symbol.
        let config = AssembleConfig::default();
        let src = "0; $\ndef decl > x {\n  x:\n  ;x\n}\ndecl\n;x\n";
        let image = assemble(src, &config).unwrap();
        let (_, _, data) = &image.segments[0];
        // `x:` is declared at word-address 2 (one flip-jump instruction in).
        assert_eq!(data[3], 128);
        assert_eq!(data[5], 128);
    }

    #[test]
    fn overlapping_segments_rejected() {
        let config = AssembleConfig {
            word_size: WordSize::W8,
            warnings_as_errors: false,
        };
        let src = "segment 0\n1; 2\nsegment 1\n3; 4\n";
        assert!(matches!(
            assemble(src, &config),
            Err(Error::Assemble(AssembleError::SegmentOverlap(_, _, _, _)))
        ));
    }

    #[test]
    fn oversized_string_literal_errors() {
        let config = AssembleConfig::default();
        let src = "x = \"123456789\"\nsegment 0\nx;\n";
        assert!(matches!(
            assemble(src, &config),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn e7_namespace_resolution() {
        let src = "ns a {\n  ns b {\n    def f {\n      .c:\n      ;c\n    }\n  }\n}\n";
        let (program, _) = parser::parse_program(src).unwrap();
        let def = program
            .macros
            .get(&("a.b.f".to_string(), 0))
            .expect("macro a.b.f should be registered under its qualified name");

        match &def.body[0] {
            crate::ast::Stmt::Label(name, _) => assert_eq!(name, "a.b.c"),
            other => panic!("expected a label statement, got {:?}", other),
        }
        match &def.body[1] {
            crate::ast::Stmt::FlipJump(_, jump, _) => {
                assert_eq!(*jump, crate::ast::Expr::Ident("a.b.c".to_string()));
            }
            other => panic!("expected a flip-jump statement, got {:?}", other),
        }
    }
}
