use crate::{
    error::{InvariantViolation, ResourceStall},
    model::SimId,
    queue::Queue,
    util::Tag,
};
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RobStatus {
    Allocated,
    Executing,
    Completed,
    Committed,
    Squashed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ReorderBufferEntry {
    pub tag: Tag,
    pub sim: SimId,
    pub status: RobStatus,
}

#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    rob: Queue<ReorderBufferEntry>,
    next_tag: Tag,
    last_committed: Option<Tag>,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            rob: Queue::new(capacity),
            next_tag: Tag::default(),
            last_committed: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.rob.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.rob.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rob.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReorderBufferEntry> + '_ {
        self.rob.iter()
    }

    /// Append an entry. Tags increase with program order and are never reused.
    pub fn allocate(&mut self, sim: SimId) -> Result<Tag, ResourceStall> {
        let tag = self.next_tag;
        self.rob
            .try_push(ReorderBufferEntry {
                tag,
                sim,
                status: RobStatus::Allocated,
            })
            .map_or(Ok(()), |_| Err(ResourceStall::RobFull))?;

        self.next_tag = tag.next();
        Ok(tag)
    }

    fn entry_mut(&mut self, tag: Tag) -> Result<&mut ReorderBufferEntry, InvariantViolation> {
        self.rob
            .iter_mut()
            .find(|ent| ent.tag == tag)
            .ok_or(InvariantViolation::UnknownRobEntry { tag })
    }

    pub fn mark_executing(&mut self, tag: Tag) -> Result<(), InvariantViolation> {
        self.entry_mut(tag)?.status = RobStatus::Executing;
        Ok(())
    }

    pub fn mark_completed(&mut self, tag: Tag) -> Result<(), InvariantViolation> {
        self.entry_mut(tag)?.status = RobStatus::Completed;
        Ok(())
    }

    /// The oldest entries, up to `limit`, that are completed with nothing
    /// older still outstanding. Does not remove them.
    pub fn commit_ready(&self, limit: usize) -> Vec<ReorderBufferEntry> {
        self.rob
            .iter()
            .take(limit)
            .take_while(|ent| ent.status == RobStatus::Completed)
            .copied()
            .collect()
    }

    /// Remove the head, which must be `tag` and completed.
    pub fn retire_head(&mut self, tag: Tag) -> Result<ReorderBufferEntry, InvariantViolation> {
        match self.rob.front() {
            Some(head) if head.tag == tag && head.status == RobStatus::Completed => {}
            Some(head) if head.tag != tag => {
                return Err(InvariantViolation::OutOfOrderCommit {
                    last: head.tag,
                    found: tag,
                })
            }
            _ => return Err(InvariantViolation::CommitNotReady { tag }),
        }

        if let Some(last) = self.last_committed.filter(|&last| last >= tag) {
            return Err(InvariantViolation::OutOfOrderCommit { last, found: tag });
        }

        let mut entry = self
            .rob
            .try_pop()
            .ok_or(InvariantViolation::CommitNotReady { tag })?;
        entry.status = RobStatus::Committed;
        self.last_committed = Some(tag);
        Ok(entry)
    }

    /// Remove `tag` and everything younger. Calling it again removes nothing.
    pub fn squash_from(&mut self, tag: Tag) -> Vec<ReorderBufferEntry> {
        let mut squashed = self.rob.pop_back_while(|ent| ent.tag >= tag);
        for ent in &mut squashed {
            ent.status = RobStatus::Squashed;
        }
        squashed
    }
}
