use core_geom::Point3D;

/// A single atom-probe detection event: a 3D position plus a single scalar
/// value (mass-to-charge by convention). Fixed-size and binary-dumpable —
/// the layout backs the little-endian `(x,y,z,value)` float32 quadruple
/// on-disk format directly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IonHit {
    pub pos: Point3D,
    pub value: f32,
}

pub const ION_HIT_BYTES: usize = 16;

impl IonHit {
    pub fn new(pos: Point3D, value: f32) -> Self {
        Self { pos, value }
    }

    pub fn to_bytes(&self) -> [u8; ION_HIT_BYTES] {
        let mut out = [0u8; ION_HIT_BYTES];
        out[0..4].copy_from_slice(&self.pos.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.pos.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.pos.z.to_le_bytes());
        out[12..16].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; ION_HIT_BYTES]) -> Self {
        let f = |r: std::ops::Range<usize>| f32::from_le_bytes(bytes[r].try_into().unwrap());
        IonHit { pos: Point3D::new(f(0..4), f(4..8), f(8..12)), value: f(12..16) }
    }
}

/// Parse a buffer of little-endian `(x,y,z,value)` float32 quadruples. The
/// buffer length must be an exact multiple of 16 bytes.
pub fn decode_ion_buffer(bytes: &[u8]) -> Result<Vec<IonHit>, IonDecodeError> {
    if bytes.len() % ION_HIT_BYTES != 0 {
        return Err(IonDecodeError::TruncatedRecord { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(ION_HIT_BYTES)
        .map(|chunk| IonHit::from_bytes(chunk.try_into().unwrap()))
        .collect())
}

pub fn encode_ion_buffer(hits: &[IonHit]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hits.len() * ION_HIT_BYTES);
    for hit in hits {
        out.extend_from_slice(&hit.to_bytes());
    }
    out
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IonDecodeError {
    #[error("ion buffer length {len} is not a multiple of {ION_HIT_BYTES} bytes")]
    TruncatedRecord { len: usize },
}
