//! Core runtime for the FlipJump machine: a single-opcode, bit-addressed
//! computer whose only instruction flips one bit, then jumps.
//!
//! A FlipJump program has no registers and no opcode field — every
//! instruction is two words, `(flip_address, jump_address)`, executed in a
//! tight loop by [`interpreter::run`]. This crate owns the word-size model,
//! the sparse bit-addressed [`memory::Memory`], the I/O adapters it is
//! wired to, and the interpreter loop itself. The macro assembler that
//! produces `.fjm` images lives in the sibling `fjasm` crate; the binary
//! format reader/writer lives in `fjbin`.

pub mod breakpoint;
pub mod config;
pub mod constants;
pub mod error;
pub mod interpreter;
pub mod memory;
pub mod word;

pub use config::RunConfig;
pub use error::RuntimeError;
pub use interpreter::{run, step, TerminationCause, TerminationStatistics};
pub use memory::sparse::{GarbageHandling, SparseMemory};
pub use memory::Memory;
pub use word::WordSize;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::io::{BrokenIo, IoDevice, StdIo};
    use std::io::Cursor;

    /// A single instruction that flips `OUT + 1` (emitting output bit `1`)
    /// and then self-loops outside its own operand window, terminating
    /// with `Looping` after exactly one step. End-to-end `cat`/`ncat`
    /// programs assembled from source (scenarios E1/E2) live in `fjasm`.
    #[test]
    fn single_step_emits_output_bit_then_loops() {
        let w = WordSize::W8;
        let bits = w.bits() as u64;
        let mut mem = SparseMemory::new(w);
        mem.add_segment(0, 20, &[]);

        let out = crate::constants::out_address(bits);
        let ip = 64u64;
        mem.write_word(ip, out + 1);
        mem.write_word(ip + bits, ip);

        let mut io = StdIo::new(Cursor::new(Vec::<u8>::new()), Vec::new(), false);
        let mut stats = interpreter::RunStatistics::new();
        match interpreter::step(&mut mem, &mut io, ip, &mut stats).unwrap() {
            interpreter::StepResult::Terminate(TerminationCause::Looping) => {}
            _ => panic!("expected Looping"),
        }
        assert!(io.get_output().is_err());
    }

    #[test]
    fn broken_io_read_always_fails() {
        let mut io = BrokenIo;
        assert!(io.read_bit().is_err());
    }
}
