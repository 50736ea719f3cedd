use crate::{error::MemoryFault, util::Addr};
use serde::Serialize;

pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024;

/// Flat little-endian byte-addressed memory. Accesses need not be aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MainMemory {
    mem: Vec<u8>,
}

impl Default for MainMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MainMemory {
    pub fn new() -> Self {
        Self::with_size(DEFAULT_MEMORY_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        Self { mem: vec![0; size] }
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }

    /// Grow to at least `size` bytes, keeping the contents.
    pub fn ensure_size(&mut self, size: usize) {
        if self.mem.len() < size {
            self.mem.resize(size, 0);
        }
    }

    fn range(&self, addr: Addr, width: u32) -> Result<std::ops::Range<usize>, MemoryFault> {
        let fault = MemoryFault {
            address: addr,
            width,
        };
        let start = usize::try_from(addr.0).map_err(|_| fault)?;
        let end = start.checked_add(width as usize).ok_or(fault)?;

        if end <= self.mem.len() {
            Ok(start..end)
        } else {
            Err(fault)
        }
    }

    /// Read `width` (1, 2 or 4) bytes, zero extended.
    pub fn read(&self, addr: Addr, width: u32) -> Result<u32, MemoryFault> {
        let range = self.range(addr, width)?;
        let mut bytes = [0; 4];
        bytes[..range.len()].copy_from_slice(&self.mem[range]);
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write the low `width` bytes of `val`. Nothing is written on a fault.
    pub fn write(&mut self, addr: Addr, width: u32, val: u32) -> Result<(), MemoryFault> {
        let range = self.range(addr, width)?;
        let len = range.len();
        self.mem[range].copy_from_slice(&val.to_le_bytes()[..len]);
        Ok(())
    }

    /// Word read for test harnesses; out of bounds reads as zero.
    pub fn readw(&self, addr: Addr) -> u32 {
        self.read(addr, 4).unwrap_or(0)
    }

    /// Word write for test harnesses; grows memory to fit.
    pub fn writew(&mut self, addr: Addr, val: u32) {
        self.ensure_size(addr.0 as usize + 4);
        let a = addr.0 as usize;
        self.mem[a..a + 4].copy_from_slice(&val.to_le_bytes());
    }

    pub fn copy_from_slice(&mut self, data: &[u8], addr: Addr) {
        let a = addr.0 as usize;
        self.ensure_size(a + data.len());
        self.mem[a..a + data.len()].copy_from_slice(data);
    }
}
