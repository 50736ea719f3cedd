use crate::{
    error::{InvariantViolation, ResourceStall},
    inst::OpClass,
    queue::Queue,
    util::{width_mask, Addr, Tag},
};

#[derive(Debug, Clone)]
pub struct Store {
    pub tag: Tag,
    pub width: u32,
    /// Resolved when the store executes.
    pub address: Option<Addr>,
    pub data: u32,
}

#[derive(Debug, Clone)]
pub struct Load {
    pub tag: Tag,
}

/// Where a load may take its value from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// An older store has an unknown address, or only partly overlaps.
    Blocked,
    /// The youngest older overlapping store covers the whole access.
    Forward(u32),
    /// No older store overlaps; read committed memory.
    Memory,
}

#[derive(Debug, Clone)]
pub struct LoadStoreQueue {
    loads: Queue<Load>,
    stores: Queue<Store>,
}

impl Store {
    fn overlaps(&self, addr: Addr, width: u32) -> Option<bool> {
        let start = self.address?.0 as u64;
        let end = start + self.width as u64;
        let (a, b) = (addr.0 as u64, addr.0 as u64 + width as u64);
        Some(start < b && a < end)
    }

    fn covers(&self, addr: Addr, width: u32) -> bool {
        self.address.map_or(false, |start| {
            let start = start.0 as u64;
            start <= addr.0 as u64 && addr.0 as u64 + width as u64 <= start + self.width as u64
        })
    }
}

impl LoadStoreQueue {
    pub fn new(load_capacity: usize, store_capacity: usize) -> Self {
        Self {
            loads: Queue::new(load_capacity),
            stores: Queue::new(store_capacity),
        }
    }

    pub fn has_space(&self, class: OpClass) -> Result<(), ResourceStall> {
        match class {
            OpClass::Load if self.loads.is_full() => Err(ResourceStall::LoadBufferFull),
            OpClass::Store if self.stores.is_full() => Err(ResourceStall::StoreBufferFull),
            _ => Ok(()),
        }
    }

    pub fn insert_load(&mut self, tag: Tag) -> Result<(), ResourceStall> {
        self.loads
            .try_push(Load { tag })
            .map_or(Ok(()), |_| Err(ResourceStall::LoadBufferFull))
    }

    pub fn insert_store(&mut self, tag: Tag, width: u32) -> Result<(), ResourceStall> {
        self.stores
            .try_push(Store {
                tag,
                width,
                address: None,
                data: 0,
            })
            .map_or(Ok(()), |_| Err(ResourceStall::StoreBufferFull))
    }

    pub fn load_source(&self, tag: Tag, addr: Addr, width: u32) -> LoadSource {
        let older = self.stores.iter().filter(|s| s.tag < tag);

        if older.clone().any(|s| s.address.is_none()) {
            return LoadSource::Blocked;
        }

        match older
            .filter(|s| s.overlaps(addr, width) == Some(true))
            .last()
        {
            None => LoadSource::Memory,
            Some(store) if store.covers(addr, width) => {
                let shift = 8 * (addr.0 - store.address.map_or(0, |a| a.0));
                LoadSource::Forward((store.data >> shift) & width_mask(width))
            }
            Some(_) => LoadSource::Blocked,
        }
    }

    pub fn store_executed(
        &mut self,
        tag: Tag,
        address: Addr,
        data: u32,
    ) -> Result<(), InvariantViolation> {
        let store = self
            .stores
            .iter_mut()
            .find(|s| s.tag == tag)
            .ok_or(InvariantViolation::UnknownRobEntry { tag })?;

        store.address = Some(address);
        store.data = data & width_mask(store.width);
        Ok(())
    }

    /// Stores leave the queue in program order as they commit.
    pub fn commit_store(&mut self, tag: Tag) -> Result<Store, InvariantViolation> {
        match self.stores.front() {
            Some(s) if s.tag == tag && s.address.is_some() => {}
            Some(s) if s.tag == tag => return Err(InvariantViolation::UnresolvedStore { tag }),
            _ => return Err(InvariantViolation::UnknownRobEntry { tag }),
        }

        self.stores
            .try_pop()
            .ok_or(InvariantViolation::UnknownRobEntry { tag })
    }

    pub fn release_load(&mut self, tag: Tag) {
        self.loads.retain(|l| l.tag != tag);
    }

    pub fn squash_from(&mut self, tag: Tag) {
        self.loads.pop_back_while(|l| l.tag >= tag);
        self.stores.pop_back_while(|s| s.tag >= tag);
    }

    pub fn loads(&self) -> usize {
        self.loads.len()
    }

    pub fn stores(&self) -> usize {
        self.stores.len()
    }
}
