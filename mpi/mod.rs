//! Communication groups for the collective metadata merge
//!
//! The merge is the only caller of [`Communicator::all_gather_bytes`]; every
//! other operation in the crate is rank-local.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::{Error, Result};

/// A group of ranks that take part in collective operations together.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Gather one byte buffer from every rank onto every rank, in rank order.
    ///
    /// Collective and blocking: every rank of the group must make the same
    /// sequence of calls, otherwise the callers hang.
    fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// A group of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(vec![local.to_vec()])
    }
}

#[derive(Debug)]
struct GatherState {
    generation: u64,
    arrived: usize,
    slots: Vec<Option<Vec<u8>>>,
    result: Arc<Vec<Vec<u8>>>,
}

#[derive(Debug)]
struct ThreadGroup {
    size: usize,
    state: Mutex<GatherState>,
    ready: Condvar,
}

/// In-process group where each rank runs on its own thread.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    group: Arc<ThreadGroup>,
}

impl ThreadComm {
    /// One handle per rank; hand each to the thread playing that rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let group = Arc::new(ThreadGroup {
            size,
            state: Mutex::new(GatherState {
                generation: 0,
                arrived: 0,
                slots: vec![None; size],
                result: Arc::new(Vec::new()),
            }),
            ready: Condvar::new(),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                group: Arc::clone(&group),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut state = self.group.state.lock();
        if state.slots[self.rank].is_some() {
            return Err(Error::Communication(format!(
                "rank {} entered all-gather twice in one round",
                self.rank
            )));
        }

        state.slots[self.rank] = Some(local.to_vec());
        state.arrived += 1;
        let generation = state.generation;

        if state.arrived == self.group.size {
            let gathered = state
                .slots
                .iter_mut()
                .map(|s| s.take().unwrap_or_default())
                .collect();
            state.result = Arc::new(gathered);
            state.arrived = 0;
            state.generation += 1;
            self.group.ready.notify_all();
        } else {
            // The result of this round stays in place until every rank,
            // including this one, has entered the next round.
            while state.generation == generation {
                self.group.ready.wait(&mut state);
            }
        }

        Ok(state.result.as_ref().clone())
    }
}

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use ::mpi::datatype::PartitionMut;
    use ::mpi::environment::Universe;
    use ::mpi::topology::SimpleCommunicator;
    use ::mpi::traits::{Communicator as _, CommunicatorCollectives};
    use ::mpi::Count;

    use super::Communicator;
    use crate::{Error, Result};

    /// MPI communicator backend.
    pub struct MpiComm {
        comm: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(comm: SimpleCommunicator) -> Self {
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Self { comm, rank, size }
        }

        pub fn world(universe: &Universe) -> Self {
            Self::new(universe.world())
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn all_gather_bytes(&self, local: &[u8]) -> Result<Vec<Vec<u8>>> {
            let count = Count::try_from(local.len()).map_err(|_| {
                Error::Communication(format!("{} byte message exceeds MPI count range", local.len()))
            })?;

            let mut counts = vec![0 as Count; self.size];
            self.comm.all_gather_into(&count, &mut counts[..]);

            let displs: Vec<Count> = counts
                .iter()
                .scan(0, |offset, &c| {
                    let d = *offset;
                    *offset += c;
                    Some(d)
                })
                .collect();
            let total: usize = counts.iter().map(|&c| c as usize).sum();

            let mut buf = vec![0u8; total];
            {
                let mut partition = PartitionMut::new(&mut buf[..], &counts[..], &displs[..]);
                self.comm.all_gather_varcount_into(local, &mut partition);
            }

            Ok(counts
                .iter()
                .zip(&displs)
                .map(|(&c, &d)| buf[d as usize..(d + c) as usize].to_vec())
                .collect())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
