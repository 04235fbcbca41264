//! The fetch-flip-jump loop.
//!
//! [`step`] is a pure function over explicit state, in the same spirit as a
//! classic `tick(registers, memory, instruction, pc) -> TickResult`
//! interpreter core: it takes a memory, an I/O device, and the current
//! instruction pointer, and returns either the next instruction pointer or
//! a reason execution stopped. [`run`] is the thin driver loop that calls
//! it until termination.

use crate::constants::{in_address, out_address};
use crate::error::RuntimeError;
use crate::memory::io::IoDevice;
use crate::memory::Memory;
use std::time::{Duration, Instant};

/// Why the interpreter stopped, as opposed to a hard [`RuntimeError`].
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TerminationCause {
    /// The instruction jumped to itself without touching its own two
    /// operand words: no further state change is possible.
    Looping,
    /// The instruction jumped into the reserved low-memory zone
    /// (`jump_address < 2w`).
    NullIp,
    /// The input device reported end-of-input.
    Eof,
    /// A breakpoint handler asked execution to stop.
    Breakpoint,
}

impl std::fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            TerminationCause::Looping => "Looping",
            TerminationCause::NullIp => "NullIP",
            TerminationCause::Eof => "EOF",
            TerminationCause::Breakpoint => "Breakpoint",
        };
        write!(f, "{}", s)
    }
}

/// Running counters updated once per executed step.
#[derive(Clone, Debug)]
pub struct RunStatistics {
    pub op_counter: u64,
    pub flip_counter: u64,
    pub jump_counter: u64,
    started_at: Instant,
    paused_for: Duration,
}

impl RunStatistics {
    pub fn new() -> RunStatistics {
        RunStatistics {
            op_counter: 0,
            flip_counter: 0,
            jump_counter: 0,
            started_at: Instant::now(),
            paused_for: Duration::default(),
        }
    }

    fn register_op(&mut self, ip: u64, flip_address: u64, jump_address: u64) {
        self.op_counter += 1;
        if flip_address != ip {
            self.flip_counter += 1;
        }
        if jump_address != ip {
            self.jump_counter += 1;
        }
    }

    /// Wall-clock run time, excluding time spent blocked on input.
    fn run_time(&self) -> Duration {
        self.started_at.elapsed().saturating_sub(self.paused_for)
    }
}

impl Default for RunStatistics {
    fn default() -> RunStatistics {
        RunStatistics::new()
    }
}

/// Final tally presented once the interpreter stops, in place of an
/// exception: the driver decides how to print or act on it.
#[derive(Clone, Debug)]
pub struct TerminationStatistics {
    pub run_time: Duration,
    pub op_counter: u64,
    pub flip_counter: u64,
    pub jump_counter: u64,
    pub termination_cause: TerminationCause,
}

impl std::fmt::Display for TerminationStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let flips_pct = self.flip_counter as f64 / self.op_counter.max(1) as f64 * 100.0;
        let jumps_pct = self.jump_counter as f64 / self.op_counter.max(1) as f64 * 100.0;
        write!(
            f,
            "Finished by {} after {:.3}s ({} ops executed; {:.2}% flips, {:.2}% jumps).",
            self.termination_cause,
            self.run_time.as_secs_f64(),
            self.op_counter,
            flips_pct,
            jumps_pct
        )
    }
}

/// The outcome of one [`step`] call.
pub enum StepResult {
    /// Execution continues at the given instruction pointer.
    Jump(u64),
    /// Execution has stopped.
    Terminate(TerminationCause),
}

/// Executes one fetch-flip-jump cycle at `ip`.
///
/// Mirrors the reference interpreter's ordering precisely: fetch the flip
/// word, check output, check input, flip the bit, fetch the jump word,
/// register statistics, check for `Looping`/`NullIP`, and only then hand
/// back the new `ip`.
pub fn step<M: Memory, D: IoDevice>(
    mem: &mut M,
    io: &mut D,
    ip: u64,
    stats: &mut RunStatistics,
) -> Result<StepResult, RuntimeError> {
    let w = mem.word_size().bits() as u64;

    let flip_address = mem.get_word(ip)?;

    let out = out_address(w);
    if out <= flip_address && flip_address <= out + 1 {
        io.write_bit(flip_address == out + 1);
    }

    let in_addr = in_address(w);
    if ip <= in_addr && in_addr < ip + 2 * w {
        match io.read_bit() {
            Ok(bit) => mem.write_bit(in_addr, bit),
            Err(RuntimeError::EndOfInput) => {
                return Ok(StepResult::Terminate(TerminationCause::Eof))
            }
            Err(other) => return Err(other),
        }
    }

    let current = mem.read_bit(flip_address)?;
    mem.write_bit(flip_address, !current);

    let jump_address = mem.get_word(ip + w)?;
    stats.register_op(ip, flip_address, jump_address);

    if jump_address == ip && !(ip <= flip_address && flip_address < ip + 2 * w) {
        return Ok(StepResult::Terminate(TerminationCause::Looping));
    }
    if jump_address < 2 * w {
        return Ok(StepResult::Terminate(TerminationCause::NullIp));
    }

    Ok(StepResult::Jump(jump_address))
}

/// Runs a loaded image to termination.
///
/// `breakpoint` is checked before every step; when it fires and its
/// handler returns `false`, execution stops immediately with cause
/// [`TerminationCause::Breakpoint`].
pub fn run<M: Memory, D: IoDevice>(
    mem: &mut M,
    io: &mut D,
    mut breakpoint: Option<&mut dyn crate::breakpoint::BreakpointHandler>,
) -> Result<TerminationStatistics, RuntimeError> {
    let mut ip = 0u64;
    let mut stats = RunStatistics::new();

    let span = tracing::info_span!("interpreter_run");
    let _enter = span.enter();

    loop {
        if let Some(handler) = breakpoint.as_deref_mut() {
            if handler.should_break(ip, stats.op_counter) {
                let keep_going = handler.handle(crate::breakpoint::StepView {
                    ip,
                    op_counter: stats.op_counter,
                    memory: mem,
                });
                if !keep_going {
                    return Ok(finish(stats, TerminationCause::Breakpoint));
                }
            }
        }

        tracing::trace!(ip, "step");
        match step(mem, io, ip, &mut stats)? {
            StepResult::Jump(next_ip) => ip = next_ip,
            StepResult::Terminate(cause) => return Ok(finish(stats, cause)),
        }
    }
}

fn finish(stats: RunStatistics, cause: TerminationCause) -> TerminationStatistics {
    TerminationStatistics {
        run_time: stats.run_time(),
        op_counter: stats.op_counter,
        flip_counter: stats.flip_counter,
        jump_counter: stats.jump_counter,
        termination_cause: cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::io::BrokenIo;
    use crate::memory::sparse::SparseMemory;
    use crate::word::WordSize;

    #[test]
    fn e4_immediate_self_loop() {
        // w=8 keeps operand values representable in a single byte; ip must
        // stay word-aligned (a multiple of w).
        let w = WordSize::W8;
        let mut mem = SparseMemory::new(w);
        let ip = 64u64;
        mem.add_segment(0, 20, &[]);
        // flip_address word (outside [ip, ip+2w)) and jump_address word == ip
        mem.write_word(ip, 16);
        mem.write_word(ip + 8, ip);

        let mut io = BrokenIo;
        let mut stats = RunStatistics::new();
        let result = step(&mut mem, &mut io, ip, &mut stats).unwrap();
        match result {
            StepResult::Terminate(TerminationCause::Looping) => {}
            _ => panic!("expected Looping"),
        }
    }

    #[test]
    fn e5_null_ip() {
        let w = WordSize::W8;
        let mut mem = SparseMemory::new(w);
        let ip = 64u64;
        mem.add_segment(0, 20, &[]);
        mem.write_word(ip, 0);
        mem.write_word(ip + 8, 2 * 8 - 1);

        let mut io = BrokenIo;
        let mut stats = RunStatistics::new();
        let result = step(&mut mem, &mut io, ip, &mut stats).unwrap();
        match result {
            StepResult::Terminate(TerminationCause::NullIp) => {}
            _ => panic!("expected NullIP"),
        }
    }
}
