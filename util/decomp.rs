//! Legacy VTK export of a block decomposition for visual inspection

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::core::{Bounds, MeshMetadata};
use crate::mpi::Communicator;
use crate::{Error, Result};

const VTK_HEXAHEDRON: u8 = 12;

fn corners(b: &Bounds) -> [[f64; 3]; 8] {
    let ([x0, y0, z0], [x1, y1, z1]) = (b.min, b.max);
    [
        [x0, y0, z0],
        [x1, y0, z0],
        [x1, y1, z0],
        [x0, y1, z0],
        [x0, y0, z1],
        [x1, y0, z1],
        [x1, y1, z1],
        [x0, y1, z1],
    ]
}

/// Write one hexahedron per owned block, tagged with block id and owner rank.
///
/// Only rank 0 writes; other ranks return at once. Needs merged metadata
/// collected with block bounds.
pub fn write_domain_decomp<C: Communicator + ?Sized>(comm: &C, md: &MeshMetadata, path: &Path) -> Result<()> {
    if comm.rank() != 0 {
        return Ok(());
    }

    let mut cells = Vec::new();
    for (index, block) in md.blocks().iter().enumerate() {
        let Some(block) = block else { continue };
        let bounds = block.bounds.ok_or_else(|| {
            Error::InvalidMesh(format!("block {index} has no bounds; enable block_bounds when collecting"))
        })?;
        cells.push((index, block.owner, bounds));
    }

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# vtk DataFile Version 3.0")?;
    writeln!(
        out,
        "{} domain decomposition: {} blocks on {} ranks",
        md.mesh_kind(),
        md.num_blocks(),
        md.num_ranks()
    )?;
    writeln!(out, "ASCII")?;
    writeln!(out, "DATASET UNSTRUCTURED_GRID")?;

    writeln!(out, "POINTS {} double", cells.len() * 8)?;
    for (_, _, bounds) in &cells {
        for [x, y, z] in corners(bounds) {
            writeln!(out, "{x} {y} {z}")?;
        }
    }

    writeln!(out, "CELLS {} {}", cells.len(), cells.len() * 9)?;
    for i in 0..cells.len() {
        let ids: Vec<String> = (i * 8..i * 8 + 8).map(|p| p.to_string()).collect();
        writeln!(out, "8 {}", ids.join(" "))?;
    }

    writeln!(out, "CELL_TYPES {}", cells.len())?;
    for _ in &cells {
        writeln!(out, "{VTK_HEXAHEDRON}")?;
    }

    writeln!(out, "CELL_DATA {}", cells.len())?;
    writeln!(out, "SCALARS BlockId int 1")?;
    writeln!(out, "LOOKUP_TABLE default")?;
    for (index, _, _) in &cells {
        writeln!(out, "{index}")?;
    }
    writeln!(out, "SCALARS BlockOwner int 1")?;
    writeln!(out, "LOOKUP_TABLE default")?;
    for (_, owner, _) in &cells {
        writeln!(out, "{owner}")?;
    }
    out.flush()?;

    info!(path = %path.display(), blocks = cells.len(), "domain decomposition written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{reduce, LocalMetadata};
    use crate::core::{Dataset, Extent, Geometry, MetadataFlags, MultiBlock};
    use crate::mpi::SerialComm;

    fn merged(flags: MetadataFlags) -> MeshMetadata {
        let mut mb = MultiBlock::new(3);
        for b in [0, 2] {
            let ds = Dataset::new(Geometry::Uniform {
                origin: [b as f64, 0.0, 0.0],
                spacing: [1.0; 3],
                extent: Extent([0, 1, 0, 1, 0, 1]),
            });
            mb.set_leaf(b, ds).unwrap();
        }
        let local = LocalMetadata::from_composite(&SerialComm, &mb, flags).unwrap();
        reduce(&[local]).unwrap()
    }

    #[test]
    fn writes_one_hexahedron_per_owned_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decomp.vtk");
        write_domain_decomp(&SerialComm, &merged(MetadataFlags::default()), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# vtk DataFile Version 3.0"));
        assert!(text.contains("POINTS 16 double"));
        assert!(text.contains("CELLS 2 18"));
        assert!(text.contains("8 8 9 10 11 12 13 14 15"));
        assert!(text.contains("SCALARS BlockId int 1\nLOOKUP_TABLE default\n0\n2\n"));
        assert!(text.contains("SCALARS BlockOwner int 1\nLOOKUP_TABLE default\n0\n0\n"));
    }

    #[test]
    fn requires_block_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decomp.vtk");
        let err = write_domain_decomp(&SerialComm, &merged(MetadataFlags::minimal()), &path).unwrap_err();
        assert!(matches!(err, Error::InvalidMesh(_)));
        assert!(!path.exists());
    }
}
