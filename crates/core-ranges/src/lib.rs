//! Range files: mapping mass-to-charge intervals to named, coloured ion
//! species.
//!
//! Three on-disk dialects are accepted for reading (the RNG, RRNG and ENV
//! formats 3Depict's original range-file reader tolerated); writing always
//! emits one dialect, chosen by the caller.

mod dialect;

use std::fmt;

pub use dialect::Dialect;
use thiserror::Error;

pub const UNRANGED: usize = usize::MAX;

/// An RGBA display colour in `[0,1]` per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Colour {
    fn default() -> Self {
        Colour { r: 1.0, g: 1.0, b: 1.0, a: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ion {
    pub name: String,
    pub colour: Colour,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f32,
    pub hi: f32,
    pub ion: usize,
}

impl Range {
    pub fn contains(&self, v: f32) -> bool {
        v >= self.lo && v <= self.hi
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RangeFileError {
    #[error("range file is malformed at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("range {range_index} references unknown ion {ion_index}")]
    DanglingIonRef { range_index: usize, ion_index: usize },
    #[error("ranges {a} and {b} (both owned by ion set) overlap")]
    OverlappingRanges { a: usize, b: usize },
    #[error("duplicate ion name {0:?}")]
    DuplicateIonName(String),
    #[error("no dialect could parse this file")]
    UnknownDialect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeFile {
    ions: Vec<Ion>,
    ranges: Vec<Range>,
}

impl RangeFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ions(&self) -> &[Ion] {
        &self.ions
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn add_ion(&mut self, ion: Ion) -> Result<usize, RangeFileError> {
        if self.ions.iter().any(|i| i.name == ion.name) {
            return Err(RangeFileError::DuplicateIonName(ion.name));
        }
        self.ions.push(ion);
        Ok(self.ions.len() - 1)
    }

    pub fn add_range(&mut self, range: Range) -> Result<usize, RangeFileError> {
        if range.ion >= self.ions.len() {
            return Err(RangeFileError::DanglingIonRef { range_index: self.ranges.len(), ion_index: range.ion });
        }
        for (i, existing) in self.ranges.iter().enumerate() {
            if range.lo < existing.hi && existing.lo < range.hi {
                return Err(RangeFileError::OverlappingRanges { a: i, b: self.ranges.len() });
            }
        }
        self.ranges.push(range);
        Ok(self.ranges.len() - 1)
    }

    /// Validate the owning invariants: every range references a live ion and
    /// no two ranges overlap. Called after bulk construction (e.g. parsing).
    pub fn validate(&self) -> Result<(), RangeFileError> {
        for (i, r) in self.ranges.iter().enumerate() {
            if r.ion >= self.ions.len() {
                return Err(RangeFileError::DanglingIonRef { range_index: i, ion_index: r.ion });
            }
        }
        for i in 0..self.ranges.len() {
            for j in (i + 1)..self.ranges.len() {
                let (a, b) = (&self.ranges[i], &self.ranges[j]);
                if a.lo < b.hi && b.lo < a.hi {
                    return Err(RangeFileError::OverlappingRanges { a: i, b: j });
                }
            }
        }
        Ok(())
    }

    /// Return the owning ion index for `value`, or `UNRANGED`.
    pub fn ion_id_for_value(&self, value: f32) -> usize {
        self.ranges
            .iter()
            .find(|r| r.contains(value))
            .map(|r| r.ion)
            .unwrap_or(UNRANGED)
    }

    pub fn read(text: &str) -> Result<RangeFile, RangeFileError> {
        for dialect in Dialect::ALL {
            if let Ok(rf) = dialect.try_parse(text) {
                rf.validate()?;
                return Ok(rf);
            }
        }
        Err(RangeFileError::UnknownDialect)
    }

    pub fn write(&self, dialect: Dialect) -> String {
        dialect.write(self)
    }
}

impl fmt::Display for RangeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeFile({} ions, {} ranges)", self.ions.len(), self.ranges.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RangeFile {
        let mut rf = RangeFile::new();
        let h = rf.add_ion(Ion { name: "H".into(), colour: Colour::default() }).unwrap();
        let o = rf.add_ion(Ion { name: "O".into(), colour: Colour { r: 1.0, g: 0.0, b: 0.0, a: 1.0 } }).unwrap();
        rf.add_range(Range { lo: 0.9, hi: 1.1, ion: h }).unwrap();
        rf.add_range(Range { lo: 15.5, hi: 16.5, ion: o }).unwrap();
        rf
    }

    #[test]
    fn lookup_ranged_and_unranged() {
        let rf = sample();
        assert_eq!(rf.ion_id_for_value(1.0), 0);
        assert_eq!(rf.ion_id_for_value(16.0), 1);
        assert_eq!(rf.ion_id_for_value(5.0), UNRANGED);
    }

    #[test]
    fn overlap_rejected() {
        let mut rf = RangeFile::new();
        let h = rf.add_ion(Ion { name: "H".into(), colour: Colour::default() }).unwrap();
        rf.add_range(Range { lo: 0.0, hi: 2.0, ion: h }).unwrap();
        let err = rf.add_range(Range { lo: 1.0, hi: 3.0, ion: h }).unwrap_err();
        assert!(matches!(err, RangeFileError::OverlappingRanges { .. }));
    }

    #[test]
    fn dangling_ion_rejected() {
        let mut rf = RangeFile::new();
        let err = rf.add_range(Range { lo: 0.0, hi: 1.0, ion: 3 }).unwrap_err();
        assert!(matches!(err, RangeFileError::DanglingIonRef { .. }));
    }

    #[test]
    fn duplicate_ion_name_rejected() {
        let mut rf = RangeFile::new();
        rf.add_ion(Ion { name: "H".into(), colour: Colour::default() }).unwrap();
        let err = rf.add_ion(Ion { name: "H".into(), colour: Colour::default() }).unwrap_err();
        assert!(matches!(err, RangeFileError::DuplicateIonName(_)));
    }

    #[test]
    fn round_trip_all_dialects() {
        let rf = sample();
        for dialect in Dialect::ALL {
            let text = rf.write(dialect);
            let reparsed = RangeFile::read(&text).expect("round trip parse");
            assert_eq!(reparsed.ions().len(), rf.ions().len());
            assert_eq!(reparsed.ranges().len(), rf.ranges().len());
            for (a, b) in reparsed.ranges().iter().zip(rf.ranges()) {
                assert!((a.lo - b.lo).abs() < 1e-4);
                assert!((a.hi - b.hi).abs() < 1e-4);
                assert_eq!(a.ion, b.ion);
            }
        }
    }
}
