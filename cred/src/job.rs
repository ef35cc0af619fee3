use crate::helpe::*;

impl DataChunk {
    /// Every chunk costs one slot per unit of demand.
    pub fn new(id: ChunkId) -> Self {
        Self {
            id,
            cost:   1,
        }
    }
}

impl Job {
    /// Creates a job reading `chunks` (in order, repeats
    /// allowed) by `deadline`.
    pub fn new<I>(id: u32, deadline: Deadline, chunks: I) -> Self
    where I: IntoIterator<Item = ChunkId> {
        Self {
            chunks:     chunks.into_iter().map(DataChunk::new).collect(),
            deadline,
            id,
        }
    }

    pub fn get_id(&self) -> u32 {
        self.id
    }

    #[inline(always)]
    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.iter().map(|c| c.id)
    }

    /// Total slots this job needs, over all its chunk reads.
    #[inline(always)]
    pub fn load(&self) -> Slots {
        self.chunks.iter().map(|c| c.cost).sum()
    }

    #[inline(always)]
    pub fn is_due_at(&self, deadline: Deadline) -> bool {
        self.deadline == deadline
    }
}
