//! Composite collections of leaf datasets and promotion of single datasets

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{DataKind, DataObject, Dataset, Information};
use crate::mpi::Communicator;
use crate::{Error, Result};

/// Level structure of an adaptive mesh refinement hierarchy.
///
/// Blocks are numbered level-major: all of level 0, then all of level 1, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmrLayout {
    kind: DataKind,
    blocks_per_level: Vec<usize>,
}

impl AmrLayout {
    pub fn new(kind: DataKind, blocks_per_level: Vec<usize>) -> Result<Self> {
        if !kind.is_amr() {
            return Err(Error::InvalidMesh(format!("{kind} is not an AMR kind")));
        }
        Ok(Self {
            kind,
            blocks_per_level,
        })
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn num_levels(&self) -> usize {
        self.blocks_per_level.len()
    }

    pub fn blocks_per_level(&self) -> &[usize] {
        &self.blocks_per_level
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks_per_level.iter().sum()
    }

    /// `(level, index within level)` of a flat block index.
    pub fn locate(&self, block: usize) -> Option<(usize, usize)> {
        let mut first = 0;
        for (level, &n) in self.blocks_per_level.iter().enumerate() {
            if block < first + n {
                return Some((level, block - first));
            }
            first += n;
        }
        None
    }
}

/// A child slot of a [`MultiBlock`]
#[derive(Debug, Clone)]
pub enum Block {
    Leaf(Arc<Dataset>),
    Nested(MultiBlock),
}

impl Block {
    fn num_blocks(&self) -> usize {
        match self {
            Block::Leaf(_) => 1,
            Block::Nested(mb) => mb.num_blocks(),
        }
    }
}

/// Hierarchical collection of leaf datasets, possibly sparse on this rank.
///
/// Leaves are addressed by a flat index in depth-first slot order. An empty
/// slot still consumes one index so numbering is identical on every rank.
#[derive(Debug, Clone, Default)]
pub struct MultiBlock {
    children: Vec<Option<Block>>,
    amr: Option<AmrLayout>,
    info: Information,
}

impl MultiBlock {
    pub fn new(num_children: usize) -> Self {
        Self {
            children: vec![None; num_children],
            ..Self::default()
        }
    }

    /// Empty AMR hierarchy with one slot per block of `layout`.
    pub fn amr(layout: AmrLayout) -> Self {
        Self {
            children: vec![None; layout.num_blocks()],
            amr: Some(layout),
            info: Information::new(),
        }
    }

    /// One-slot collection holding `dataset`.
    pub fn from_leaf(dataset: Arc<Dataset>) -> Self {
        Self {
            children: vec![Some(Block::Leaf(dataset))],
            ..Self::default()
        }
    }

    pub fn kind(&self) -> DataKind {
        self.amr.as_ref().map_or(DataKind::MultiBlock, AmrLayout::kind)
    }

    pub fn amr_layout(&self) -> Option<&AmrLayout> {
        self.amr.as_ref()
    }

    pub fn information(&self) -> &Information {
        &self.info
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn children(&self) -> &[Option<Block>] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Option<Block>] {
        &mut self.children
    }

    pub fn child(&self, index: usize) -> Option<&Block> {
        self.children.get(index).and_then(Option::as_ref)
    }

    pub fn set_leaf(&mut self, index: usize, dataset: impl Into<Arc<Dataset>>) -> Result<()> {
        let slot = self.slot_mut(index)?;
        *slot = Some(Block::Leaf(dataset.into()));
        Ok(())
    }

    pub fn set_nested(&mut self, index: usize, nested: MultiBlock) -> Result<()> {
        if self.amr.is_some() {
            return Err(Error::InvalidMesh("AMR levels hold leaves only".to_string()));
        }
        let slot = self.slot_mut(index)?;
        *slot = Some(Block::Nested(nested));
        Ok(())
    }

    pub fn clear(&mut self, index: usize) -> Result<()> {
        *self.slot_mut(index)? = None;
        Ok(())
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Option<Block>> {
        let n = self.children.len();
        self.children.get_mut(index).ok_or_else(|| {
            Error::InvalidMesh(format!("child index {index} out of range for {n} children"))
        })
    }

    /// Total number of leaf slots, populated or not, across all levels.
    pub fn num_blocks(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.as_ref().map_or(1, Block::num_blocks))
            .sum()
    }

    /// Locally populated leaves with their flat block index, ascending.
    pub fn leaves(&self) -> Vec<(usize, &Arc<Dataset>)> {
        let mut out = Vec::new();
        self.collect_leaves(0, &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, mut next: usize, out: &mut Vec<(usize, &'a Arc<Dataset>)>) -> usize {
        for child in &self.children {
            match child {
                None => next += 1,
                Some(Block::Leaf(ds)) => {
                    out.push((next, ds));
                    next += 1;
                }
                Some(Block::Nested(mb)) => next = mb.collect_leaves(next, out),
            }
        }
        next
    }

    pub fn leaf(&self, block: usize) -> Option<&Arc<Dataset>> {
        self.leaves()
            .into_iter()
            .find(|(index, _)| *index == block)
            .map(|(_, ds)| ds)
    }
}

fn wrap_leaf<C: Communicator + ?Sized>(dataset: Arc<Dataset>, comm: &C) -> MultiBlock {
    let mut mb = MultiBlock::new(comm.size().max(1));
    let rank = comm.rank().min(mb.children.len() - 1);
    mb.children[rank] = Some(Block::Leaf(dataset));
    mb
}

/// Take ownership of `object` as a composite collection.
///
/// A composite passes through untouched. A single dataset becomes a
/// collection with one slot per rank of `comm` and the dataset at this
/// rank's slot, so the result is congruent across the group. Only the
/// rank and size of `comm` are read; nothing is communicated.
pub fn into_composite<C: Communicator + ?Sized>(object: DataObject, comm: &C) -> MultiBlock {
    match object {
        DataObject::MultiBlock(mb) => mb,
        DataObject::Dataset(ds) => wrap_leaf(ds, comm),
    }
}

/// Composite view of `object` without taking ownership.
///
/// Composites are borrowed as-is; a single dataset is wrapped as in
/// [`into_composite`], sharing the dataset rather than copying it.
pub fn as_composite<'a, C: Communicator + ?Sized>(object: &'a DataObject, comm: &C) -> Cow<'a, MultiBlock> {
    match object {
        DataObject::MultiBlock(mb) => Cow::Borrowed(mb),
        DataObject::Dataset(ds) => Cow::Owned(wrap_leaf(Arc::clone(ds), comm)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Extent, Geometry};
    use crate::mpi::SerialComm;

    fn leaf() -> Arc<Dataset> {
        Arc::new(Dataset::new(Geometry::Uniform {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            extent: Extent([0, 1, 0, 1, 0, 1]),
        }))
    }

    struct FakeRank(usize, usize);

    impl Communicator for FakeRank {
        fn rank(&self) -> usize {
            self.0
        }
        fn size(&self) -> usize {
            self.1
        }
        fn all_gather_bytes(&self, _local: &[u8]) -> Result<Vec<Vec<u8>>> {
            unreachable!("promotion never communicates")
        }
    }

    #[test]
    fn nested_slots_are_numbered_depth_first() {
        let mut inner = MultiBlock::new(2);
        inner.set_leaf(1, leaf()).unwrap();

        let mut outer = MultiBlock::new(3);
        outer.set_leaf(0, leaf()).unwrap();
        outer.set_nested(1, inner).unwrap();

        assert_eq!(outer.num_blocks(), 4);
        let indices: Vec<usize> = outer.leaves().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(outer.leaf(3).is_none());
    }

    #[test]
    fn out_of_range_child_is_rejected() {
        let mut mb = MultiBlock::new(1);
        assert!(matches!(mb.set_leaf(1, leaf()), Err(Error::InvalidMesh(_))));
    }

    #[test]
    fn amr_layout_locates_blocks() {
        let layout = AmrLayout::new(DataKind::OverlappingAmr, vec![1, 4, 2]).unwrap();
        assert_eq!(layout.num_blocks(), 7);
        assert_eq!(layout.locate(0), Some((0, 0)));
        assert_eq!(layout.locate(3), Some((1, 2)));
        assert_eq!(layout.locate(6), Some((2, 1)));
        assert_eq!(layout.locate(7), None);

        let mut mb = MultiBlock::amr(layout);
        assert_eq!(mb.kind(), DataKind::OverlappingAmr);
        assert!(mb.set_nested(0, MultiBlock::new(1)).is_err());
        assert!(AmrLayout::new(DataKind::UniformGrid, vec![1]).is_err());
    }

    #[test]
    fn promotion_is_idempotent() {
        let ds = leaf();
        let once = into_composite(DataObject::Dataset(ds.clone()), &SerialComm);
        assert_eq!(once.num_blocks(), 1);

        let once_obj = DataObject::MultiBlock(once);
        let twice = as_composite(&once_obj, &SerialComm);
        assert!(matches!(twice, Cow::Borrowed(_)));
        assert_eq!(twice.num_blocks(), 1);
        assert_eq!(twice.leaf(0).unwrap().id(), ds.id());
        assert!(matches!(twice.child(0), Some(Block::Leaf(_))));
    }

    #[test]
    fn aliasing_promotion_shares_the_leaf() {
        let ds = leaf();
        let obj = DataObject::Dataset(ds.clone());
        let view = as_composite(&obj, &SerialComm);
        assert!(Arc::ptr_eq(view.leaf(0).unwrap(), &ds));
    }

    #[test]
    fn promoted_leaf_lands_at_rank_slot() {
        let ds = leaf();
        let mb = into_composite(DataObject::Dataset(ds.clone()), &FakeRank(2, 4));
        assert_eq!(mb.num_blocks(), 4);
        let leaves = mb.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, 2);
        assert_eq!(leaves[0].1.id(), ds.id());
    }
}
