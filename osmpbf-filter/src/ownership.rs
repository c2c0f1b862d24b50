use std::collections::HashSet;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};

/// Initial number of matched ways the ownership set is sized for.
pub const EXPECTED_WAYS: usize = 100;
/// Room reserved per matched way.
pub const NODES_PER_WAY: usize = 3;

/// Node ids referenced by at least one matched way. Frozen once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeOwnership {
    ids: HashSet<i64>,
}

impl NodeOwnership {
    #[inline]
    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ids.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<i64> for NodeOwnership {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Owner thread of the ownership set while the way pass runs.
///
/// Workers send each matched way's node ids through [`sender`](Self::sender);
/// only the owner thread ever inserts.
pub struct OwnershipCollector {
    tx: Sender<Vec<i64>>,
    handle: JoinHandle<(NodeOwnership, usize)>,
}

impl OwnershipCollector {
    /// Starts the owner with room for [`NODES_PER_WAY`] nodes per expected
    /// way. Once more ways than expected arrive, the set is kept at that
    /// ratio of the ways actually matched.
    pub fn spawn(expected_ways: usize) -> Self {
        let (tx, rx) = unbounded::<Vec<i64>>();
        let handle = thread::spawn(move || {
            let mut ids = HashSet::with_capacity(expected_ways * NODES_PER_WAY);
            let mut ways = 0;
            for node_ids in rx {
                ways += 1;
                let wanted = ways * NODES_PER_WAY;
                if ids.capacity() < wanted {
                    ids.reserve(wanted.max(ids.capacity() * 2) - ids.len());
                }
                ids.extend(node_ids);
            }
            (NodeOwnership { ids }, ways)
        });
        Self { tx, handle }
    }

    pub fn sender(&self) -> Sender<Vec<i64>> {
        self.tx.clone()
    }

    /// Waits until every sender is dropped and returns the frozen set and
    /// the number of ways it was built from.
    pub fn finish(self) -> (NodeOwnership, usize) {
        drop(self.tx);
        match self.handle.join() {
            Ok(owned) => owned,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
