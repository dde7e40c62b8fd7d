//! 2D vector used for offsets and sizes

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use void_batch::{BatchDecode, BatchEncode, BatchReader, BatchResult, BatchWriter};

/// 2D vector in device-independent pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a vector
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `other`
    pub fn lerp(self, other: Self, t: f64) -> Self {
        self + (other - self) * t
    }

    /// Components as an array
    pub const fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl From<[f64; 2]> for Vector2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl Add for Vector2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vector2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl BatchEncode for Vector2 {
    fn encode(&self, writer: &mut BatchWriter) {
        writer.write_object(&self.to_array());
    }
}

impl BatchDecode for Vector2 {
    fn decode(reader: &mut BatchReader<'_>) -> BatchResult<Self> {
        reader.read_object::<[f64; 2]>().map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp() {
        let a = Vector2::new(0.0, 10.0);
        let b = Vector2::new(10.0, 20.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 0.5), Vector2::new(5.0, 15.0));
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn test_batch_encoding() {
        let mut writer = BatchWriter::new();
        writer.write_object(&Vector2::new(1.5, -2.0));
        let data = writer.finish();
        let mut reader = BatchReader::new(&data);
        assert_eq!(reader.read_object::<Vector2>().unwrap(), Vector2::new(1.5, -2.0));
    }
}
