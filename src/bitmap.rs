use alloc::vec;
use alloc::vec::Vec;

/// One bit per sector, set when the sector is in use.
///
/// Bit `i` lives in byte `i / 8` at position `i % 8`; the byte vector is
/// exactly what the free map stores on disk.
pub struct Bitmap {
    bytes: Vec<u8>,
    bits: usize,
}

impl Bitmap {
    /// A bitmap of `bits` clear bits
    pub fn new(bits: usize) -> Self {
        Self {
            bytes: vec![0u8; bits.div_ceil(8)],
            bits,
        }
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.bits
    }

    /// Serialized form
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Serialized form, for loading from disk
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Value of bit `index`
    pub fn test(&self, index: usize) -> bool {
        assert!(index < self.bits);
        self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    /// Set `count` bits starting at `start` to `value`
    pub fn set_multiple(&mut self, start: usize, count: usize, value: bool) {
        assert!(start + count <= self.bits);
        for index in start..start + count {
            let mask = 1u8 << (index % 8);
            if value {
                self.bytes[index / 8] |= mask;
            } else {
                self.bytes[index / 8] &= !mask;
            }
        }
    }

    /// Find the first run of `count` clear bits, set them and return the
    /// index of the first one
    pub fn scan_and_flip(&mut self, count: usize) -> Option<usize> {
        if count == 0 || count > self.bits {
            return None;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        for index in 0..self.bits {
            if self.test(index) {
                run_len = 0;
                run_start = index + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                self.set_multiple(run_start, count, true);
                return Some(run_start);
            }
        }
        None
    }

    /// Number of clear bits
    pub fn count_clear(&self) -> usize {
        let set: usize = self.bytes.iter().map(|b| b.count_ones() as usize).sum();
        self.bits - set
    }
}
