//! Global mesh metadata and mesh classification

use serde::{Deserialize, Serialize};

use crate::core::{AmrLayout, Association, Bounds, DataArray, DataKind, ElementKind, Extent, GhostLayers};

/// Optional per-block descriptors recorded by the local metadata pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataFlags {
    pub block_bounds: bool,
    pub block_extents: bool,
    pub block_sizes: bool,
}

impl Default for MetadataFlags {
    fn default() -> Self {
        Self {
            block_bounds: true,
            block_extents: true,
            block_sizes: true,
        }
    }
}

impl MetadataFlags {
    /// Decomposition and arrays only.
    pub fn minimal() -> Self {
        Self {
            block_bounds: false,
            block_extents: false,
            block_sizes: false,
        }
    }

    pub fn with_block_bounds(mut self, on: bool) -> Self {
        self.block_bounds = on;
        self
    }

    pub fn with_block_extents(mut self, on: bool) -> Self {
        self.block_extents = on;
        self
    }

    pub fn with_block_sizes(mut self, on: bool) -> Self {
        self.block_sizes = on;
        self
    }
}

/// Name, association and type of an array seen on some block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayInfo {
    pub name: String,
    pub association: Association,
    pub kind: ElementKind,
    pub components: usize,
}

impl ArrayInfo {
    pub fn new(name: impl Into<String>, association: Association, kind: ElementKind, components: usize) -> Self {
        Self {
            name: name.into(),
            association,
            kind,
            components,
        }
    }

    pub fn of(array: &DataArray, association: Association) -> Self {
        Self::new(array.name(), association, array.element_kind(), array.num_components())
    }

    /// Same element kind and component count.
    pub fn same_type(&self, other: &ArrayInfo) -> bool {
        self.kind == other.kind && self.components == other.components
    }
}

/// Per-block entry of merged metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub owner: usize,
    pub local_index: usize,
    pub kind: DataKind,
    pub bounds: Option<Bounds>,
    pub extent: Option<Extent>,
    pub num_points: Option<usize>,
    pub num_cells: Option<usize>,
}

/// Globally consistent description of a distributed mesh.
///
/// Produced by the collective merge and identical on every rank. Unknown
/// values are `None`, never zero or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshMetadata {
    pub(crate) mesh_kind: DataKind,
    pub(crate) block_kind: Option<DataKind>,
    pub(crate) num_blocks_local: Vec<usize>,
    pub(crate) blocks: Vec<Option<BlockInfo>>,
    pub(crate) arrays: Vec<ArrayInfo>,
    pub(crate) bounds: Option<Bounds>,
    pub(crate) extent: Option<Extent>,
    pub(crate) ghost_layers: Option<GhostLayers>,
    pub(crate) amr: Option<AmrLayout>,
    pub(crate) flags: MetadataFlags,
}

impl MeshMetadata {
    pub fn mesh_kind(&self) -> DataKind {
        self.mesh_kind
    }

    /// Kind shared by all leaves; `None` when no rank holds a leaf.
    pub fn block_kind(&self) -> Option<DataKind> {
        self.block_kind
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_ranks(&self) -> usize {
        self.num_blocks_local.len()
    }

    /// Blocks reported by each rank, indexed by rank.
    pub fn num_blocks_local(&self) -> &[usize] {
        &self.num_blocks_local
    }

    /// Per-block entries; `None` for slots no rank populated.
    pub fn blocks(&self) -> &[Option<BlockInfo>] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&BlockInfo> {
        self.blocks.get(index).and_then(Option::as_ref)
    }

    pub fn owner(&self, index: usize) -> Option<usize> {
        self.block(index).map(|b| b.owner)
    }

    pub fn blocks_owned_by(&self, rank: usize) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().filter(|b| b.owner == rank).map(|_| i))
            .collect()
    }

    /// Union of arrays across all ranks, ordered by association then name.
    pub fn arrays(&self) -> &[ArrayInfo] {
        &self.arrays
    }

    pub fn array(&self, name: &str, association: Association) -> Option<&ArrayInfo> {
        self.arrays
            .iter()
            .find(|a| a.association == association && a.name == name)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    pub fn ghost_layers(&self) -> Option<GhostLayers> {
        self.ghost_layers
    }

    pub fn amr_layout(&self) -> Option<&AmrLayout> {
        self.amr.as_ref()
    }

    pub fn flags(&self) -> MetadataFlags {
        self.flags
    }

    fn is(&self, kind: DataKind) -> bool {
        self.mesh_kind == kind || self.block_kind == Some(kind)
    }

    pub fn is_amr(&self) -> bool {
        self.mesh_kind.is_amr()
    }

    pub fn is_structured(&self) -> bool {
        self.is(DataKind::StructuredGrid)
    }

    pub fn is_polydata(&self) -> bool {
        self.is(DataKind::PolyData)
    }

    pub fn is_unstructured(&self) -> bool {
        self.is(DataKind::UnstructuredGrid)
    }

    pub fn is_stretched_cartesian(&self) -> bool {
        self.is(DataKind::RectilinearGrid)
    }

    pub fn is_uniform_cartesian(&self) -> bool {
        self.is(DataKind::UniformGrid)
    }

    pub fn is_logically_cartesian(&self) -> bool {
        self.is_structured() || self.is_uniform_cartesian() || self.is_stretched_cartesian()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(mesh_kind: DataKind, block_kind: Option<DataKind>) -> MeshMetadata {
        MeshMetadata {
            mesh_kind,
            block_kind,
            num_blocks_local: vec![0],
            blocks: vec![],
            arrays: vec![],
            bounds: None,
            extent: None,
            ghost_layers: None,
            amr: None,
            flags: MetadataFlags::default(),
        }
    }

    #[test]
    fn classification_uses_mesh_and_block_kind() {
        let md = metadata(DataKind::MultiBlock, Some(DataKind::RectilinearGrid));
        assert!(md.is_stretched_cartesian());
        assert!(md.is_logically_cartesian());
        assert!(!md.is_uniform_cartesian());
        assert!(!md.is_amr());

        let md = metadata(DataKind::UnstructuredGrid, Some(DataKind::UnstructuredGrid));
        assert!(md.is_unstructured());
        assert!(!md.is_logically_cartesian());

        let md = metadata(DataKind::PolyData, None);
        assert!(md.is_polydata());
    }

    #[test]
    fn amr_meshes_of_uniform_blocks() {
        let md = metadata(DataKind::NonOverlappingAmr, Some(DataKind::UniformGrid));
        assert!(md.is_amr());
        assert!(md.is_uniform_cartesian());
        assert!(md.is_logically_cartesian());
        assert!(!md.is_structured());
    }

    #[test]
    fn logically_cartesian_is_the_disjunction() {
        let kinds = [
            DataKind::UniformGrid,
            DataKind::RectilinearGrid,
            DataKind::StructuredGrid,
            DataKind::UnstructuredGrid,
            DataKind::PolyData,
        ];
        for kind in kinds {
            let md = metadata(DataKind::MultiBlock, Some(kind));
            assert_eq!(
                md.is_logically_cartesian(),
                md.is_structured() || md.is_uniform_cartesian() || md.is_stretched_cartesian()
            );
        }
    }

    #[test]
    fn flags_builder() {
        let f = MetadataFlags::minimal().with_block_bounds(true);
        assert!(f.block_bounds);
        assert!(!f.block_sizes);
        assert!(!MetadataFlags::default().with_block_extents(false).block_extents);
    }
}
