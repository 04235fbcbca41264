//! I/O adapters consumed by the interpreter through reserved bit-addresses.
//!
//! Both directions pack bits LSB-first within each byte, matching the
//! reference runtime's standard-IO device: the first bit read or written
//! for a byte becomes its bit 0.

use crate::error::RuntimeError;
use std::io::{Read, Write};

/// The device the interpreter drives at the reserved `IN`/`OUT`
/// bit-addresses.
pub trait IoDevice {
    /// Pulls one input bit, LSB-first within each consumed byte.
    fn read_bit(&mut self) -> Result<bool, RuntimeError>;

    /// Pushes one output bit, LSB-first within each produced byte.
    fn write_bit(&mut self, bit: bool);

    /// Returns everything written so far.
    ///
    /// # Errors
    /// Fails with [`RuntimeError::IncompleteOutput`] if the number of bits
    /// written is not a multiple of 8.
    fn get_output(&self) -> Result<Vec<u8>, RuntimeError>;
}

/// Reads from `stdin`-like input, writes to `stdout`-like output, LSB-first.
pub struct StdIo<R, W> {
    input: R,
    output: W,
    output_verbose: bool,
    current_input_byte: u8,
    bits_left_in_input_byte: u8,
    current_output_byte: u8,
    bits_written_in_output_byte: u8,
    accumulated_output: Vec<u8>,
}

impl<R: Read, W: Write> StdIo<R, W> {
    pub fn new(input: R, output: W, output_verbose: bool) -> StdIo<R, W> {
        StdIo {
            input,
            output,
            output_verbose,
            current_input_byte: 0,
            bits_left_in_input_byte: 0,
            current_output_byte: 0,
            bits_written_in_output_byte: 0,
            accumulated_output: Vec::new(),
        }
    }
}

impl<R: Read, W: Write> IoDevice for StdIo<R, W> {
    fn read_bit(&mut self) -> Result<bool, RuntimeError> {
        if self.bits_left_in_input_byte == 0 {
            let mut buf = [0u8; 1];
            let n = self.input.read(&mut buf).map_err(|_| RuntimeError::EndOfInput)?;
            if n == 0 {
                return Err(RuntimeError::EndOfInput);
            }
            self.current_input_byte = buf[0];
            self.bits_left_in_input_byte = 8;
        }

        let bit = self.current_input_byte & 1 == 1;
        self.current_input_byte >>= 1;
        self.bits_left_in_input_byte -= 1;
        Ok(bit)
    }

    fn write_bit(&mut self, bit: bool) {
        self.current_output_byte |= (bit as u8) << self.bits_written_in_output_byte;
        self.bits_written_in_output_byte += 1;

        if self.bits_written_in_output_byte == 8 {
            let byte = self.current_output_byte;
            if self.output_verbose {
                let _ = self.output.write_all(&[byte]);
                let _ = self.output.flush();
            }
            self.accumulated_output.push(byte);
            self.current_output_byte = 0;
            self.bits_written_in_output_byte = 0;
        }
    }

    fn get_output(&self) -> Result<Vec<u8>, RuntimeError> {
        if self.bits_written_in_output_byte != 0 {
            return Err(RuntimeError::IncompleteOutput);
        }
        Ok(self.accumulated_output.clone())
    }
}

/// The default device when none is configured: every read fails, every
/// write is discarded. Mirrors the reference runtime's `BrokenIO`.
#[derive(Default)]
pub struct BrokenIo;

impl IoDevice for BrokenIo {
    fn read_bit(&mut self) -> Result<bool, RuntimeError> {
        Err(RuntimeError::EndOfInput)
    }

    fn write_bit(&mut self, _bit: bool) {}

    fn get_output(&self) -> Result<Vec<u8>, RuntimeError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn lsb_first_round_trip() {
        // 'A' = 0x41 = 0b0100_0001, LSB-first bit order: 1,0,0,0,0,0,1,0
        let mut io = StdIo::new(Cursor::new(vec![0x41u8]), Vec::new(), false);
        let mut bits = Vec::new();
        for _ in 0..8 {
            bits.push(io.read_bit().unwrap());
        }
        assert_eq!(
            bits,
            vec![true, false, false, false, false, false, true, false]
        );

        for &b in &bits {
            io.write_bit(b);
        }
        assert_eq!(io.get_output().unwrap(), vec![0x41]);
    }

    #[test]
    fn read_past_eof_errors() {
        let mut io = StdIo::new(Cursor::new(Vec::<u8>::new()), Vec::new(), false);
        assert!(io.read_bit().is_err());
    }

    #[test]
    fn incomplete_output_errors() {
        let mut io = StdIo::new(Cursor::new(Vec::<u8>::new()), Vec::new(), false);
        io.write_bit(true);
        assert!(io.get_output().is_err());
    }
}
