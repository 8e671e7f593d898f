//! Ghost layer counts attached to mesh objects

use serde::{Deserialize, Serialize};

use crate::core::{InfoValue, MeshObject};

pub const GHOST_CELL_LAYERS_KEY: &str = "vistle.ghost_cell_layers";
pub const GHOST_NODE_LAYERS_KEY: &str = "vistle.ghost_node_layers";

/// Number of replicated halo layers on a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GhostLayers {
    pub cells: u32,
    pub nodes: u32,
}

impl GhostLayers {
    pub fn new(cells: u32, nodes: u32) -> Self {
        Self { cells, nodes }
    }
}

/// Record ghost layer counts on `mesh`, replacing any earlier record.
pub fn set_ghost_layer_metadata<M: MeshObject + ?Sized>(mesh: &M, cells: u32, nodes: u32) {
    let info = mesh.information();
    info.set(GHOST_CELL_LAYERS_KEY, InfoValue::Int(i64::from(cells)));
    info.set(GHOST_NODE_LAYERS_KEY, InfoValue::Int(i64::from(nodes)));
}

/// Ghost layer counts recorded on `mesh`.
///
/// `None` means nothing was ever recorded, which is not the same as zero
/// layers. A record with only one of the two counts, or with a count that
/// does not fit, is treated as absent.
pub fn get_ghost_layer_metadata<M: MeshObject + ?Sized>(mesh: &M) -> Option<GhostLayers> {
    let info = mesh.information();
    let cells = u32::try_from(info.get_int(GHOST_CELL_LAYERS_KEY)?).ok()?;
    let nodes = u32::try_from(info.get_int(GHOST_NODE_LAYERS_KEY)?).ok()?;
    Some(GhostLayers { cells, nodes })
}
