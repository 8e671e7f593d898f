//! Local metadata collection and the collective merge into [`MeshMetadata`]
//!
//! Collection runs in two phases. The local pass inspects the leaves held by
//! this rank and never communicates. The merge gathers every rank's local
//! descriptor onto every rank and folds them in rank order, so all ranks reach
//! the same result, or the same error, without further communication.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compute::{apply_composite, Visit};
use crate::core::{
    attributes_for, get_ghost_layer_metadata, AmrLayout, ArrayInfo, Association, BlockInfo, Bounds, DataKind,
    DataObject, Dataset, ElementKind, Extent, GhostLayers, MeshMetadata, MetadataFlags, MultiBlock,
};
use crate::mpi::Communicator;
use crate::Result;

/// Conflicting claims found while building or merging metadata
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum MergeError {
    #[error("no rank contributed metadata")]
    EmptyGroup,

    #[error("contribution of rank {found} found in position {position}")]
    RankSequence { position: usize, found: usize },

    #[error("rank {rank} reports mesh kind {found}, rank 0 reports {expected}")]
    MeshKindMismatch {
        rank: usize,
        expected: DataKind,
        found: DataKind,
    },

    #[error("rank {rank} reports {found} blocks, rank 0 reports {expected}")]
    BlockCountMismatch {
        rank: usize,
        expected: usize,
        found: usize,
    },

    #[error("rank {rank} reports a different AMR level structure than rank 0")]
    AmrLayoutMismatch { rank: usize },

    #[error("rank {rank} collected with {found:?}, rank 0 with {expected:?}")]
    FlagsMismatch {
        rank: usize,
        expected: MetadataFlags,
        found: MetadataFlags,
    },

    #[error("block {block} on rank {rank} is a {found}, earlier blocks are {expected}")]
    BlockKindMismatch {
        rank: usize,
        block: usize,
        expected: DataKind,
        found: DataKind,
    },

    #[error("rank {rank} claims block {block} but the mesh has {num_blocks} blocks")]
    BlockOutOfRange {
        rank: usize,
        block: usize,
        num_blocks: usize,
    },

    #[error("block {block} claimed by rank {first_rank} and, with different content, by rank {rank}")]
    DuplicateBlock {
        block: usize,
        first_rank: usize,
        rank: usize,
    },

    #[error(
        "{association} array `{name}` is {expected_kind:?}x{expected_components} on rank {first_rank} \
         but {found_kind:?}x{found_components} on rank {rank}"
    )]
    ArrayMismatch {
        name: String,
        association: Association,
        first_rank: usize,
        expected_kind: ElementKind,
        expected_components: usize,
        rank: usize,
        found_kind: ElementKind,
        found_components: usize,
    },

    #[error("rank {rank} reports {found:?} ghost layers, {expected:?} reported earlier")]
    GhostLayerMismatch {
        rank: usize,
        expected: GhostLayers,
        found: GhostLayers,
    },
}

/// One locally held block as seen by the local pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: usize,
    pub local_index: usize,
    pub kind: DataKind,
    pub bounds: Option<Bounds>,
    pub extent: Option<Extent>,
    pub num_points: Option<usize>,
    pub num_cells: Option<usize>,
}

impl BlockRecord {
    fn of(index: usize, local_index: usize, ds: &Dataset, flags: MetadataFlags) -> Self {
        let geometry = ds.geometry();
        Self {
            index,
            local_index,
            kind: ds.kind(),
            bounds: geometry.bounds().filter(|_| flags.block_bounds),
            extent: geometry.extent().filter(|_| flags.block_extents),
            num_points: flags.block_sizes.then(|| geometry.num_points()),
            num_cells: flags.block_sizes.then(|| geometry.num_cells()),
        }
    }

    fn into_info(self, owner: usize) -> BlockInfo {
        BlockInfo {
            owner,
            local_index: self.local_index,
            kind: self.kind,
            bounds: self.bounds,
            extent: self.extent,
            num_points: self.num_points,
            num_cells: self.num_cells,
        }
    }
}

fn same_content(a: &BlockInfo, b: &BlockInfo) -> bool {
    a.kind == b.kind
        && a.bounds == b.bounds
        && a.extent == b.extent
        && a.num_points == b.num_points
        && a.num_cells == b.num_cells
}

/// Metadata of the blocks one rank holds, before the collective merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMetadata {
    pub rank: usize,
    pub mesh_kind: DataKind,
    pub num_blocks: usize,
    pub amr: Option<AmrLayout>,
    pub blocks: Vec<BlockRecord>,
    pub arrays: Vec<ArrayInfo>,
    pub ghost_layers: Option<GhostLayers>,
    pub flags: MetadataFlags,
}

type ArraySet = BTreeMap<(Association, String), ArrayInfo>;

fn add_arrays(arrays: &mut ArraySet, ds: &Dataset, rank: usize) -> std::result::Result<(), MergeError> {
    for association in Association::ALL {
        let Some(attrs) = attributes_for(ds, association) else {
            continue;
        };
        for array in attrs.iter() {
            let found = ArrayInfo::of(array, association);
            match arrays.get(&(association, found.name.clone())) {
                None => {
                    arrays.insert((association, found.name.clone()), found);
                }
                Some(prev) if prev.same_type(&found) => {}
                Some(prev) => return Err(array_mismatch(prev, rank, &found, rank)),
            }
        }
    }
    Ok(())
}

fn array_mismatch(prev: &ArrayInfo, first_rank: usize, found: &ArrayInfo, rank: usize) -> MergeError {
    MergeError::ArrayMismatch {
        name: found.name.clone(),
        association: found.association,
        first_rank,
        expected_kind: prev.kind,
        expected_components: prev.components,
        rank,
        found_kind: found.kind,
        found_components: found.components,
    }
}

impl LocalMetadata {
    /// Local pass over a single dataset held by this rank.
    ///
    /// The dataset is block `rank` of a mesh with one block per rank. Blocks
    /// of a composite collection go through [`LocalMetadata::from_composite`].
    pub fn from_dataset<C: Communicator + ?Sized>(
        comm: &C,
        ds: &Dataset,
        flags: MetadataFlags,
    ) -> std::result::Result<Self, MergeError> {
        let rank = comm.rank();
        let mut arrays = ArraySet::new();
        add_arrays(&mut arrays, ds, rank)?;

        Ok(Self {
            rank,
            mesh_kind: ds.kind(),
            num_blocks: comm.size(),
            amr: None,
            blocks: vec![BlockRecord::of(rank, 0, ds, flags)],
            arrays: arrays.into_values().collect(),
            ghost_layers: get_ghost_layer_metadata(ds),
            flags,
        })
    }

    /// Local pass over every leaf this rank holds in `collection`.
    ///
    /// Ghost layers recorded on the collection take precedence; otherwise the
    /// leaves' records are used and must agree.
    pub fn from_composite<C: Communicator + ?Sized>(
        comm: &C,
        collection: &MultiBlock,
        flags: MetadataFlags,
    ) -> std::result::Result<Self, MergeError> {
        let rank = comm.rank();
        let collection_ghosts = get_ghost_layer_metadata(collection);

        let mut blocks: Vec<BlockRecord> = Vec::new();
        let mut arrays = ArraySet::new();
        let mut leaf_ghosts: Option<GhostLayers> = None;
        let mut failure = None;

        apply_composite(collection, |index, ds| {
            if let Some(first) = blocks.first() {
                if first.kind != ds.kind() {
                    failure = Some(MergeError::BlockKindMismatch {
                        rank,
                        block: index,
                        expected: first.kind,
                        found: ds.kind(),
                    });
                    return Visit::ABORT;
                }
            }

            blocks.push(BlockRecord::of(index, blocks.len(), ds, flags));

            if let Err(e) = add_arrays(&mut arrays, ds, rank) {
                failure = Some(e);
                return Visit::ABORT;
            }

            if collection_ghosts.is_none() {
                match (leaf_ghosts, get_ghost_layer_metadata(ds)) {
                    (Some(expected), Some(found)) if expected != found => {
                        failure = Some(MergeError::GhostLayerMismatch { rank, expected, found });
                        return Visit::ABORT;
                    }
                    (None, found) => leaf_ghosts = found,
                    _ => {}
                }
            }
            Visit::CONTINUE
        });

        if let Some(e) = failure {
            return Err(e);
        }

        debug!(rank, blocks = blocks.len(), arrays = arrays.len(), "local metadata collected");

        Ok(Self {
            rank,
            mesh_kind: collection.kind(),
            num_blocks: collection.num_blocks(),
            amr: collection.amr_layout().cloned(),
            blocks,
            arrays: arrays.into_values().collect(),
            ghost_layers: collection_ghosts.or(leaf_ghosts),
            flags,
        })
    }

    /// Local pass choosing the dataset or composite variant by object kind.
    pub fn from_object<C: Communicator + ?Sized>(
        comm: &C,
        object: &DataObject,
        flags: MetadataFlags,
    ) -> std::result::Result<Self, MergeError> {
        match object {
            DataObject::Dataset(ds) => Self::from_dataset(comm, ds, flags),
            DataObject::MultiBlock(mb) => Self::from_composite(comm, mb, flags),
        }
    }
}

/// Fold per-rank descriptors into one [`MeshMetadata`].
///
/// Pure and deterministic: the input order does not matter, contributions
/// are processed by ascending rank and must cover ranks `0..n` exactly once.
/// A block reported by several ranks with identical content is kept once
/// and owned by the lowest rank; differing content is a [`MergeError`].
pub fn reduce(locals: &[LocalMetadata]) -> std::result::Result<MeshMetadata, MergeError> {
    let mut ordered: Vec<&LocalMetadata> = locals.iter().collect();
    ordered.sort_by_key(|l| l.rank);
    for (position, local) in ordered.iter().enumerate() {
        if local.rank != position {
            return Err(MergeError::RankSequence {
                position,
                found: local.rank,
            });
        }
    }

    let first = *ordered.first().ok_or(MergeError::EmptyGroup)?;
    let num_blocks = first.num_blocks;

    let mut block_kind: Option<DataKind> = None;
    let mut blocks: Vec<Option<BlockInfo>> = vec![None; num_blocks];
    let mut arrays: BTreeMap<(Association, String), (ArrayInfo, usize)> = BTreeMap::new();
    let mut ghost_layers: Option<GhostLayers> = None;
    let mut bounds: Option<Bounds> = None;
    let mut extent: Option<Extent> = None;
    let mut num_blocks_local = Vec::with_capacity(ordered.len());

    for local in ordered {
        let rank = local.rank;

        if local.mesh_kind != first.mesh_kind {
            return Err(MergeError::MeshKindMismatch {
                rank,
                expected: first.mesh_kind,
                found: local.mesh_kind,
            });
        }
        if local.num_blocks != num_blocks {
            return Err(MergeError::BlockCountMismatch {
                rank,
                expected: num_blocks,
                found: local.num_blocks,
            });
        }
        if local.amr != first.amr {
            return Err(MergeError::AmrLayoutMismatch { rank });
        }
        if local.flags != first.flags {
            return Err(MergeError::FlagsMismatch {
                rank,
                expected: first.flags,
                found: local.flags,
            });
        }

        num_blocks_local.push(local.blocks.len());

        for record in &local.blocks {
            let block = record.index;
            if block >= num_blocks {
                return Err(MergeError::BlockOutOfRange {
                    rank,
                    block,
                    num_blocks,
                });
            }

            match block_kind {
                None => block_kind = Some(record.kind),
                Some(expected) if expected != record.kind => {
                    return Err(MergeError::BlockKindMismatch {
                        rank,
                        block,
                        expected,
                        found: record.kind,
                    })
                }
                Some(_) => {}
            }

            let claim = record.clone().into_info(rank);
            match &blocks[block] {
                None => {
                    if let Some(b) = claim.bounds {
                        bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
                    }
                    if let Some(e) = claim.extent {
                        extent = Some(extent.map_or(e, |acc| acc.union(&e)));
                    }
                    blocks[block] = Some(claim);
                }
                Some(prev) if same_content(prev, &claim) => {
                    warn!(block, owner = prev.owner, rank, "block reported twice with identical content");
                }
                Some(prev) => {
                    return Err(MergeError::DuplicateBlock {
                        block,
                        first_rank: prev.owner,
                        rank,
                    })
                }
            }
        }

        for array in &local.arrays {
            let key = (array.association, array.name.clone());
            match arrays.get(&key) {
                None => {
                    arrays.insert(key, (array.clone(), rank));
                }
                Some((prev, _)) if prev.same_type(array) => {}
                Some((prev, first_rank)) => return Err(array_mismatch(prev, *first_rank, array, rank)),
            }
        }

        match (ghost_layers, local.ghost_layers) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(MergeError::GhostLayerMismatch { rank, expected, found })
            }
            (None, found) => ghost_layers = found,
            _ => {}
        }
    }

    Ok(MeshMetadata {
        mesh_kind: first.mesh_kind,
        block_kind,
        num_blocks_local,
        blocks,
        arrays: arrays.into_values().map(|(a, _)| a).collect(),
        bounds,
        extent,
        ghost_layers,
        amr: first.amr.clone(),
        flags: first.flags,
    })
}

/// What a rank puts on the wire: its local descriptor, or why it has none.
#[derive(Debug, Serialize, Deserialize)]
enum Contribution {
    Local(LocalMetadata),
    Failed(MergeError),
}

fn exchange<C: Communicator + ?Sized>(comm: &C, contribution: &Contribution) -> Result<MeshMetadata> {
    let bytes = bincode::serialize(contribution)?;
    let gathered = comm.all_gather_bytes(&bytes)?;

    let mut locals = Vec::with_capacity(gathered.len());
    for buf in &gathered {
        match bincode::deserialize::<Contribution>(buf)? {
            Contribution::Local(local) => locals.push(local),
            Contribution::Failed(e) => return Err(e.into()),
        }
    }

    let md = reduce(&locals)?;
    if comm.rank() == 0 {
        info!(
            ranks = comm.size(),
            blocks = md.num_blocks(),
            arrays = md.arrays().len(),
            kind = %md.mesh_kind(),
            "mesh metadata merged"
        );
    }
    Ok(md)
}

/// Collective merge of an already collected local descriptor.
///
/// Every rank of `comm` must call this (or [`get_metadata`]) together; it
/// blocks until all have contributed. Ranks without blocks still take part.
pub fn merge_metadata<C: Communicator + ?Sized>(comm: &C, local: LocalMetadata) -> Result<MeshMetadata> {
    exchange(comm, &Contribution::Local(local))
}

/// Local pass plus collective merge.
///
/// A rank whose local pass fails still joins the merge and reports the
/// failure, so every rank returns the same error instead of some ranks
/// waiting forever.
pub fn get_metadata<C: Communicator + ?Sized>(
    comm: &C,
    object: &DataObject,
    flags: MetadataFlags,
) -> Result<MeshMetadata> {
    let contribution = match LocalMetadata::from_object(comm, object, flags) {
        Ok(local) => Contribution::Local(local),
        Err(e) => {
            warn!(rank = comm.rank(), error = %e, "local metadata pass failed");
            Contribution::Failed(e)
        }
    };
    exchange(comm, &contribution)
}
