use std::thread;
use std::time::Duration;

use ndarray::array;

use vistle_insitu::{
    get_metadata, merge_metadata, set_ghost_layer_metadata, Association, Communicator, DataArray, DataObject,
    Dataset, ElementKind, Error, Extent, Geometry, LocalMetadata, MergeError, MeshMetadata, MetadataFlags,
    MultiBlock, ThreadComm,
};

fn block(index: usize) -> Dataset {
    Dataset::new(Geometry::Uniform {
        origin: [index as f64, 0.0, 0.0],
        spacing: [0.5; 3],
        extent: Extent([0, 2, 0, 2, 0, 2]),
    })
    .with_cell_array(DataArray::scalars("pressure", vec![1.0f64; 8]))
}

/// Run `body` on every rank of an in-process group and collect the results.
fn run_group<T, F>(size: usize, body: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(ThreadComm) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = ThreadComm::group(size)
        .into_iter()
        .map(|comm| {
            let body = body.clone();
            thread::spawn(move || body(comm))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn disjoint_blocks_merge_identically_on_every_rank() {
    for size in [1, 2, 5] {
        let results = run_group(size, move |comm| {
            // stagger arrival so ranks enter the merge in varying order
            let delay = (comm.size() - comm.rank()) as u64 * 3;
            thread::sleep(Duration::from_millis(delay));

            let mut mb = MultiBlock::new(comm.size());
            mb.set_leaf(comm.rank(), block(comm.rank())).unwrap();
            get_metadata(&comm, &DataObject::from(mb), MetadataFlags::default()).unwrap()
        });

        let first: &MeshMetadata = &results[0];
        assert_eq!(first.num_blocks(), size);
        for b in 0..size {
            assert_eq!(first.owner(b), Some(b));
        }
        assert_eq!(first.num_blocks_local(), vec![1; size].as_slice());
        assert!(results.iter().all(|md| md == first));
    }
}

#[test]
fn single_datasets_become_one_block_per_rank() {
    let results = run_group(3, |comm| {
        let ds = block(comm.rank());
        set_ghost_layer_metadata(&ds, 1, 1);
        get_metadata(&comm, &DataObject::from(ds), MetadataFlags::default()).unwrap()
    });

    let md = &results[0];
    assert_eq!(md.num_blocks(), 3);
    assert_eq!(md.blocks_owned_by(2), vec![2]);
    assert!(md.is_uniform_cartesian());
    let ghosts = md.ghost_layers().unwrap();
    assert_eq!((ghosts.cells, ghosts.nodes), (1, 1));
    let bounds = md.bounds().unwrap();
    assert_eq!(bounds.min[0], 0.0);
    assert_eq!(bounds.max[0], 3.0);
}

#[test]
fn pressure_kind_disagreement_fails_everywhere() {
    let results = run_group(4, |comm| {
        let pressure = if comm.rank() % 2 == 0 {
            DataArray::scalars("pressure", vec![0.0f64; 8])
        } else {
            DataArray::scalars("pressure", vec![0.0f32; 8])
        };
        let ds = Dataset::new(Geometry::Uniform {
            origin: [comm.rank() as f64, 0.0, 0.0],
            spacing: [1.0; 3],
            extent: Extent([0, 2, 0, 2, 0, 2]),
        })
        .with_cell_array(pressure);
        get_metadata(&comm, &DataObject::from(ds), MetadataFlags::default())
    });

    for result in results {
        match result {
            Err(Error::Merge(MergeError::ArrayMismatch {
                name,
                association,
                expected_kind,
                found_kind,
                ..
            })) => {
                assert_eq!(name, "pressure");
                assert_eq!(association, Association::Cell);
                assert_eq!(expected_kind, ElementKind::Float64);
                assert_eq!(found_kind, ElementKind::Float32);
            }
            other => panic!("expected an array mismatch, got {other:?}"),
        }
    }
}

#[test]
fn local_failure_on_one_rank_is_reported_by_all() {
    let results = run_group(3, |comm| {
        let mut mb = MultiBlock::new(6);
        mb.set_leaf(2 * comm.rank(), block(2 * comm.rank())).unwrap();
        if comm.rank() == 1 {
            let odd = Dataset::new(Geometry::Rectilinear {
                extent: Extent([0, 1, 0, 0, 0, 0]),
                x: array![0.0, 1.0],
                y: array![0.0],
                z: array![0.0],
            });
            mb.set_leaf(3, odd).unwrap();
        }
        get_metadata(&comm, &DataObject::from(mb), MetadataFlags::default())
    });

    for result in results {
        assert!(matches!(
            result,
            Err(Error::Merge(MergeError::BlockKindMismatch { rank: 1, block: 3, .. }))
        ));
    }
}

#[test]
fn ranks_without_blocks_still_take_part() {
    let results = run_group(3, |comm| {
        let mut mb = MultiBlock::new(2);
        if comm.rank() < 2 {
            mb.set_leaf(comm.rank(), block(comm.rank())).unwrap();
        }
        let local = LocalMetadata::from_composite(&comm, &mb, MetadataFlags::minimal()).unwrap();
        merge_metadata(&comm, local).unwrap()
    });

    let md = &results[0];
    assert_eq!(md.num_ranks(), 3);
    assert_eq!(md.num_blocks_local(), &[1, 1, 0]);
    assert!(md.blocks_owned_by(2).is_empty());
    assert!(md.block(0).unwrap().bounds.is_none());
    assert!(md.array("pressure", Association::Cell).is_some());
}
