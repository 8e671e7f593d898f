//! Vistle in-situ demo driver
//!
//! Simulates a group of ranks on threads. Each rank deals itself a share of
//! a row of uniform grid blocks, attaches analysis arrays and ghost layer
//! records, and joins the collective metadata merge. Rank 0 prints the
//! merged descriptor and optionally writes the block decomposition.
//!
//! Usage: `vistle-insitu [config.toml]`. Settings can also come from
//! `VISTLE_INSITU__*` environment variables.

use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context};
use tracing::{debug, info};

use vistle_insitu::util::{write_domain_decomp, RuntimeConfig};
use vistle_insitu::{
    apply, get_metadata, set_ghost_layer_metadata, Communicator, DataArray, DataObject, Dataset, Extent, Geometry,
    MeshMetadata, MultiBlock, ThreadComm, Visit,
};

const CELLS_PER_AXIS: i64 = 4;

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = RuntimeConfig::load(path.as_deref()).context("loading configuration")?;
    vistle_insitu::init(cfg.level()?);

    println!("🚀 Starting Vistle in-situ v{}", env!("CARGO_PKG_VERSION"));
    info!(ranks = cfg.ranks, blocks = cfg.blocks, "simulating rank group");

    let handles: Vec<_> = ThreadComm::group(cfg.ranks)
        .into_iter()
        .map(|comm| {
            let cfg = cfg.clone();
            thread::spawn(move || run_rank(&comm, &cfg))
        })
        .collect();

    for handle in handles {
        handle.join().map_err(|_| anyhow!("rank thread panicked"))??;
    }

    println!("✅ Metadata merge completed on {} ranks", cfg.ranks);
    Ok(())
}

fn block(index: usize) -> Dataset {
    let n = CELLS_PER_AXIS as usize;
    let points = (n + 1).pow(3);
    let cells = n.pow(3);

    let temperature: Vec<f64> = (0..points).map(|p| index as f64 + p as f64 / points as f64).collect();
    let owner: Vec<i32> = vec![index as i32; cells];

    Dataset::new(Geometry::Uniform {
        origin: [(index as i64 * CELLS_PER_AXIS) as f64, 0.0, 0.0],
        spacing: [1.0; 3],
        extent: Extent([0, CELLS_PER_AXIS, 0, CELLS_PER_AXIS, 0, CELLS_PER_AXIS]),
    })
    .with_point_array(DataArray::scalars("temperature", temperature))
    .with_cell_array(DataArray::scalars("block", owner))
}

fn run_rank(comm: &ThreadComm, cfg: &RuntimeConfig) -> anyhow::Result<()> {
    let rank = comm.rank();

    let mut mesh = MultiBlock::new(cfg.blocks);
    for index in (rank..cfg.blocks).step_by(comm.size()) {
        mesh.set_leaf(index, block(index))?;
    }
    set_ghost_layer_metadata(&mesh, 1, 0);

    let object = DataObject::from(mesh);
    let mut local_points = 0;
    apply(&object, |index, ds| {
        debug!(rank, block = index, points = ds.geometry().num_points(), "local block");
        local_points += ds.geometry().num_points();
        Visit::CONTINUE
    });

    let md = get_metadata(comm, &object, cfg.metadata)?;
    info!(rank, local_points, owned = ?md.blocks_owned_by(rank), "rank finished merge");

    if rank == 0 {
        summarize(&md);
        if let Some(path) = &cfg.decomp_file {
            write_domain_decomp(comm, &md, path)?;
        }
    }
    Ok(())
}

fn summarize(md: &MeshMetadata) {
    println!("📊 Mesh: {} of {:?} blocks", md.mesh_kind(), md.block_kind());
    println!("   blocks: {} over {} ranks", md.num_blocks(), md.num_ranks());
    if let Some(bounds) = md.bounds() {
        println!("   bounds: {:?} .. {:?}", bounds.min, bounds.max);
    }
    if let Some(ghosts) = md.ghost_layers() {
        println!("   ghost layers: {} cell, {} node", ghosts.cells, ghosts.nodes);
    }
    for array in md.arrays() {
        println!(
            "   {} array `{}`: {:?} x{}",
            array.association, array.name, array.kind, array.components
        );
    }
    println!("   logically cartesian: {}", md.is_logically_cartesian());
}
