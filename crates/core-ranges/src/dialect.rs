use crate::{Colour, Ion, Range, RangeFile, RangeFileError};

/// The three textual range-file dialects the reader must accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `[Ranges]` key=value block, closest to the classic RNG format.
    Rng,
    /// One `ion`/`range` directive per line, RRNG-flavoured.
    Rrng,
    /// Flat CSV: `name,lo,hi,r,g,b`.
    Env,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Rng, Dialect::Rrng, Dialect::Env];

    pub fn try_parse(self, text: &str) -> Result<RangeFile, RangeFileError> {
        match self {
            Dialect::Rng => parse_rng(text),
            Dialect::Rrng => parse_rrng(text),
            Dialect::Env => parse_env(text),
        }
    }

    pub fn write(self, rf: &RangeFile) -> String {
        match self {
            Dialect::Rng => write_rng(rf),
            Dialect::Rrng => write_rrng(rf),
            Dialect::Env => write_env(rf),
        }
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> RangeFileError {
    RangeFileError::Malformed { line, reason: reason.into() }
}

// --- RNG: "[Ranges]" header, then "Ion<k>=name,r,g,b" and "Range<k>=lo,hi,ionindex" ---

fn parse_rng(text: &str) -> Result<RangeFile, RangeFileError> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, l)) if l.trim() == "[Ranges]" => {}
        _ => return Err(malformed(1, "missing [Ranges] header")),
    }
    let mut rf = RangeFile::new();
    for (i, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, val) = line.split_once('=').ok_or_else(|| malformed(i + 1, "expected key=value"))?;
        if let Some(_idx) = key.strip_prefix("Ion") {
            let parts: Vec<&str> = val.split(',').collect();
            if parts.len() != 4 {
                return Err(malformed(i + 1, "expected name,r,g,b"));
            }
            let colour = Colour {
                r: parse_f32(parts[1], i + 1)?,
                g: parse_f32(parts[2], i + 1)?,
                b: parse_f32(parts[3], i + 1)?,
                a: 1.0,
            };
            rf.add_ion(Ion { name: parts[0].to_string(), colour })
                .map_err(|_| malformed(i + 1, "duplicate ion"))?;
        } else if let Some(_idx) = key.strip_prefix("Range") {
            let parts: Vec<&str> = val.split(',').collect();
            if parts.len() != 3 {
                return Err(malformed(i + 1, "expected lo,hi,ion"));
            }
            let lo = parse_f32(parts[0], i + 1)?;
            let hi = parse_f32(parts[1], i + 1)?;
            let ion: usize = parts[2].trim().parse().map_err(|_| malformed(i + 1, "bad ion index"))?;
            rf.add_range(Range { lo, hi, ion }).map_err(|e| malformed(i + 1, e.to_string()))?;
        } else {
            return Err(malformed(i + 1, format!("unrecognised key {key:?}")));
        }
    }
    Ok(rf)
}

fn write_rng(rf: &RangeFile) -> String {
    let mut out = String::from("[Ranges]\n");
    for (i, ion) in rf.ions().iter().enumerate() {
        out.push_str(&format!("Ion{}={},{},{},{}\n", i, ion.name, ion.colour.r, ion.colour.g, ion.colour.b));
    }
    for (i, r) in rf.ranges().iter().enumerate() {
        out.push_str(&format!("Range{}={},{},{}\n", i, r.lo, r.hi, r.ion));
    }
    out
}

// --- RRNG: one directive per line, `ion name r g b` / `range lo hi ion` ---

fn parse_rrng(text: &str) -> Result<RangeFile, RangeFileError> {
    let mut rf = RangeFile::new();
    let mut saw_header = false;
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "RRNG" {
            saw_header = true;
            continue;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("ion") => {
                let name = parts.next().ok_or_else(|| malformed(i + 1, "missing ion name"))?;
                let r = parse_f32(parts.next().ok_or_else(|| malformed(i + 1, "missing r"))?, i + 1)?;
                let g = parse_f32(parts.next().ok_or_else(|| malformed(i + 1, "missing g"))?, i + 1)?;
                let b = parse_f32(parts.next().ok_or_else(|| malformed(i + 1, "missing b"))?, i + 1)?;
                rf.add_ion(Ion { name: name.to_string(), colour: Colour { r, g, b, a: 1.0 } })
                    .map_err(|e| malformed(i + 1, e.to_string()))?;
            }
            Some("range") => {
                let lo = parse_f32(parts.next().ok_or_else(|| malformed(i + 1, "missing lo"))?, i + 1)?;
                let hi = parse_f32(parts.next().ok_or_else(|| malformed(i + 1, "missing hi"))?, i + 1)?;
                let ion: usize = parts
                    .next()
                    .ok_or_else(|| malformed(i + 1, "missing ion index"))?
                    .parse()
                    .map_err(|_| malformed(i + 1, "bad ion index"))?;
                rf.add_range(Range { lo, hi, ion }).map_err(|e| malformed(i + 1, e.to_string()))?;
            }
            _ => return Err(malformed(i + 1, "expected 'ion' or 'range' directive")),
        }
    }
    if !saw_header {
        return Err(malformed(1, "missing RRNG header"));
    }
    Ok(rf)
}

fn write_rrng(rf: &RangeFile) -> String {
    let mut out = String::from("RRNG\n");
    for ion in rf.ions() {
        out.push_str(&format!("ion {} {} {} {}\n", ion.name, ion.colour.r, ion.colour.g, ion.colour.b));
    }
    for r in rf.ranges() {
        out.push_str(&format!("range {} {} {}\n", r.lo, r.hi, r.ion));
    }
    out
}

// --- ENV: flat CSV, one ion definition per line, ranges keyed by ion name ---

fn parse_env(text: &str) -> Result<RangeFile, RangeFileError> {
    let mut rf = RangeFile::new();
    let mut name_to_idx = std::collections::HashMap::new();
    let mut saw_any = false;
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() != 6 {
            return Err(malformed(i + 1, "expected name,lo,hi,r,g,b"));
        }
        saw_any = true;
        let name = parts[0];
        let idx = if let Some(&idx) = name_to_idx.get(name) {
            idx
        } else {
            let colour = Colour {
                r: parse_f32(parts[3], i + 1)?,
                g: parse_f32(parts[4], i + 1)?,
                b: parse_f32(parts[5], i + 1)?,
                a: 1.0,
            };
            let idx = rf
                .add_ion(Ion { name: name.to_string(), colour })
                .map_err(|e| malformed(i + 1, e.to_string()))?;
            name_to_idx.insert(name.to_string(), idx);
            idx
        };
        let lo = parse_f32(parts[1], i + 1)?;
        let hi = parse_f32(parts[2], i + 1)?;
        rf.add_range(Range { lo, hi, ion: idx }).map_err(|e| malformed(i + 1, e.to_string()))?;
    }
    if !saw_any {
        return Err(malformed(1, "empty ENV file"));
    }
    Ok(rf)
}

fn write_env(rf: &RangeFile) -> String {
    let mut out = String::new();
    for r in rf.ranges() {
        let ion = &rf.ions()[r.ion];
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            ion.name, r.lo, r.hi, ion.colour.r, ion.colour.g, ion.colour.b
        ));
    }
    out
}

fn parse_f32(s: &str, line: usize) -> Result<f32, RangeFileError> {
    s.trim().parse::<f32>().map_err(|_| malformed(line, format!("{s:?} is not a float")))
}
