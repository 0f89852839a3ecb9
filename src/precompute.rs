//! Precomputed lookup tables for expensive unary functions.
//!
//! A [`LookupTable`] keys on the top `bits` of the FP32 bit pattern: sign,
//! exponent and the leading `bits - 9` mantissa bits. Every float maps to
//! exactly one entry, so a lookup is a shift and a load with no range checks.
//! The price is memory (`4 << bits` bytes; 64 MiB at 24 bits) and precision
//! (the discarded mantissa bits are truncated, not rounded).
//!
//! Tables can be dumped as Rust source with
//! [`LookupTable::write_rust_source`] so they can be compiled in instead of
//! built at startup.

use std::io::{self, Write};

use crate::error::{KernelError, Result};

pub const MIN_TABLE_BITS: u32 = 8;
pub const MAX_TABLE_BITS: u32 = 24;

/// Table of `f` sampled at every `bits`-bit prefix of the FP32 encoding.
#[derive(Clone, Debug)]
pub struct LookupTable {
    bits: u32,
    shift: u32,
    values: Vec<f32>,
}

impl LookupTable {
    pub fn build(bits: u32, f: impl Fn(f32) -> f32) -> Result<Self> {
        if !(MIN_TABLE_BITS..=MAX_TABLE_BITS).contains(&bits) {
            return Err(KernelError::InvalidTableBits(bits));
        }
        let shift = 32 - bits;
        let len = 1usize << bits;
        let values: Vec<f32> = (0..len as u32)
            .map(|u| f(f32::from_bits(u << shift)))
            .collect();
        tracing::debug!(bits, entries = len, bytes = len * 4, "built lookup table");
        Ok(Self {
            bits,
            shift,
            values,
        })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn lookup(&self, x: f32) -> f32 {
        self.values[(x.to_bits() >> self.shift) as usize]
    }

    pub fn apply(&self, v: &mut [f32]) {
        for x in v.iter_mut() {
            *x = self.lookup(*x);
        }
    }

    /// Emits `pub static NAME: [f32; N] = [...];`.
    pub fn write_rust_source<W: Write>(&self, name: &str, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "// Precomputed {}-bit table `{}`: index = f32 bits >> {}",
            self.bits, name, self.shift
        )?;
        writeln!(
            out,
            "pub static {}: [f32; {}] = [",
            name.to_ascii_uppercase(),
            self.values.len()
        )?;
        for &value in &self.values {
            writeln!(out, "    {},", rust_literal(value))?;
        }
        writeln!(out, "];")
    }
}

fn rust_literal(value: f32) -> String {
    if value.is_nan() {
        "f32::NAN".to_string()
    } else if value == f32::INFINITY {
        "f32::INFINITY".to_string()
    } else if value == f32::NEG_INFINITY {
        "f32::NEG_INFINITY".to_string()
    } else {
        // Debug prints the shortest representation that round-trips.
        format!("{value:?}")
    }
}

/// Table indexed by a small non-negative integer.
#[derive(Clone, Debug)]
pub struct IndexTable {
    values: Vec<f32>,
}

impl IndexTable {
    pub fn build(len: usize, f: impl Fn(u32) -> f32) -> Self {
        let values = (0..len).map(|i| f(i as u32)).collect();
        Self { values }
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<f32> {
        self.values.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
