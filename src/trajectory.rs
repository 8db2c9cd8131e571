//! Trajectory storage and the text dump format.
//!
//! Each stored snapshot is written as one block:
//!
//! ```text
//! ITEM: TIMESTEP
//! <step>
//! ITEM: NUMBER OF ATOMS
//! <count>
//! ITEM: BOX BOUNDS pp pp pp
//! 0 <size>
//! 0 <size>
//! 0 <size>
//! ITEM: ATOMS id x y z
//! <id> <x> <y> <z>
//! ```
//!
//! Atom ids are 1-based and follow the in-collection order of the snapshot.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TIMESTEP_HEADER: &str = "ITEM: TIMESTEP";
const COUNT_HEADER: &str = "ITEM: NUMBER OF ATOMS";
const BOUNDS_HEADER: &str = "ITEM: BOX BOUNDS pp pp pp";
const ATOMS_HEADER: &str = "ITEM: ATOMS id x y z";

/// Particle positions recorded at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: u64,
    pub positions: Vec<Vector3<f64>>,
}

impl Snapshot {
    pub fn new(step: u64, positions: Vec<Vector3<f64>>) -> Self {
        Self { step, positions }
    }

    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }
}

/// Ordered, append-only list of snapshots.
#[derive(Debug, Clone, Default)]
pub struct History {
    snapshots: Vec<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Step indices of all stored snapshots, in order.
    pub fn steps(&self) -> Vec<u64> {
        self.snapshots.iter().map(|s| s.step).collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

/// Write snapshots as dump blocks.
pub fn write_dump<'a, W, I>(writer: &mut W, snapshots: I, box_size: f64) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Snapshot>,
{
    for snapshot in snapshots {
        writeln!(writer, "{TIMESTEP_HEADER}")?;
        writeln!(writer, "{}", snapshot.step)?;
        writeln!(writer, "{COUNT_HEADER}")?;
        writeln!(writer, "{}", snapshot.positions.len())?;
        writeln!(writer, "{BOUNDS_HEADER}")?;
        for _ in 0..3 {
            writeln!(writer, "0 {box_size}")?;
        }
        writeln!(writer, "{ATOMS_HEADER}")?;
        for (i, p) in snapshot.positions.iter().enumerate() {
            writeln!(writer, "{} {} {} {}", i + 1, p.x, p.y, p.z)?;
        }
    }
    Ok(())
}

/// One block read back from a dump file.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpFrame {
    pub timestep: u64,
    /// `[lo, hi]` per axis
    pub bounds: [[f64; 2]; 3],
    pub ids: Vec<usize>,
    pub positions: Vec<Vector3<f64>>,
}

impl DumpFrame {
    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }
}

struct LineReader<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    /// Next line with trailing whitespace stripped, `None` at end of input.
    fn next(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            None => Ok(None),
            Some(line) => {
                self.line += 1;
                let line = line.map_err(|e| self.error(e.to_string()))?;
                Ok(Some(line.trim_end().to_string()))
            }
        }
    }

    fn require(&mut self, what: &str) -> Result<String> {
        match self.next()? {
            Some(line) => Ok(line),
            None => Err(self.error(format!("unexpected end of input, expected {what}"))),
        }
    }

    fn expect_header(&mut self, header: &str) -> Result<()> {
        let line = self.require(header)?;
        if line == header {
            Ok(())
        } else {
            Err(self.error(format!("expected `{header}`, found `{line}`")))
        }
    }

    fn parse_field<T: std::str::FromStr>(&self, field: Option<&str>, what: &str) -> Result<T> {
        let field = field.ok_or_else(|| self.error(format!("missing {what}")))?;
        field
            .parse()
            .map_err(|_| self.error(format!("invalid {what}: `{field}`")))
    }
}

/// Parse every block of a dump stream.
pub fn parse_dump<R: BufRead>(reader: R) -> Result<Vec<DumpFrame>> {
    let mut input = LineReader::new(reader);
    let mut frames = Vec::new();

    loop {
        let header = loop {
            match input.next()? {
                None => return Ok(frames),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if header != TIMESTEP_HEADER {
            return Err(input.error(format!("expected `{TIMESTEP_HEADER}`, found `{header}`")));
        }

        let line = input.require("timestep")?;
        let timestep: u64 = input.parse_field(Some(line.trim()), "timestep")?;

        input.expect_header(COUNT_HEADER)?;
        let line = input.require("atom count")?;
        let count: usize = input.parse_field(Some(line.trim()), "atom count")?;

        input.expect_header(BOUNDS_HEADER)?;
        let mut bounds = [[0.0; 2]; 3];
        for axis in bounds.iter_mut() {
            let line = input.require("box bounds")?;
            let mut fields = line.split_whitespace();
            axis[0] = input.parse_field(fields.next(), "lower bound")?;
            axis[1] = input.parse_field(fields.next(), "upper bound")?;
        }

        input.expect_header(ATOMS_HEADER)?;
        // the count is untrusted input, so grow the buffers as lines arrive
        let mut ids: Vec<usize> = Vec::new();
        let mut positions = Vec::new();
        for _ in 0..count {
            let line = input.require("atom line")?;
            let mut fields = line.split_whitespace();
            ids.push(input.parse_field(fields.next(), "atom id")?);
            let x: f64 = input.parse_field(fields.next(), "x coordinate")?;
            let y: f64 = input.parse_field(fields.next(), "y coordinate")?;
            let z: f64 = input.parse_field(fields.next(), "z coordinate")?;
            positions.push(Vector3::new(x, y, z));
        }

        frames.push(DumpFrame {
            timestep,
            bounds,
            ids,
            positions,
        });
    }
}

/// Read a dump file from disk.
pub fn read_dump<P: AsRef<Path>>(path: P) -> Result<Vec<DumpFrame>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dump(BufReader::new(file))
}
