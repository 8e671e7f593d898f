use ndarray::{Array1, Array2};
use proptest::prelude::*;

use vistle_insitu::{apply, as_slice, DataArray, DataObject, Dataset, Extent, Geometry, MultiBlock, Visit};

fn leaf(index: usize) -> Dataset {
    Dataset::new(Geometry::Uniform {
        origin: [index as f64, 0.0, 0.0],
        spacing: [1.0; 3],
        extent: Extent([0, 1, 0, 1, 0, 1]),
    })
}

/// Collection with a leaf wherever `present` is true, half of it nested.
fn collection(present: &[bool]) -> MultiBlock {
    let split = present.len() / 2;
    let mut inner = MultiBlock::new(present.len() - split);
    for (i, _) in present[split..].iter().enumerate().filter(|(_, p)| **p) {
        inner.set_leaf(i, leaf(split + i)).unwrap();
    }

    let mut outer = MultiBlock::new(split + 1);
    for (i, _) in present[..split].iter().enumerate().filter(|(_, p)| **p) {
        outer.set_leaf(i, leaf(i)).unwrap();
    }
    outer.set_nested(split, inner).unwrap();
    outer
}

fn present_indices(present: &[bool]) -> Vec<usize> {
    present.iter().enumerate().filter(|(_, p)| **p).map(|(i, _)| i).collect()
}

proptest! {
    #[test]
    fn layouts_yield_the_same_values(values in prop::collection::vec(any::<f64>(), 1..64)) {
        let n = values.len();
        let interleaved = DataArray::interleaved("v", Array2::from_shape_vec((n, 1), values.clone()).unwrap());
        let separated = DataArray::separated("v", vec![Array1::from(values.clone())]).unwrap();

        let a = as_slice::<f64>(&interleaved).unwrap();
        let b = as_slice::<f64>(&separated).unwrap();
        prop_assert_eq!(a.len(), n);
        prop_assert!(a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn every_leaf_is_visited_once_in_order(present in prop::collection::vec(any::<bool>(), 1..32)) {
        let obj = DataObject::from(collection(&present));
        let mut seen = Vec::new();
        let out = apply(&obj, |index, ds| {
            // each leaf knows its own index through its origin
            assert_eq!(ds.geometry().bounds().unwrap().min[0], index as f64);
            seen.push(index);
            Visit::CONTINUE
        });
        prop_assert_eq!(out, Visit::CONTINUE);
        prop_assert_eq!(seen, present_indices(&present));
    }

    #[test]
    fn nonzero_code_stops_at_that_leaf(
        present in prop::collection::vec(any::<bool>(), 1..32),
        pick in any::<prop::sample::Index>(),
        code in prop_oneof![1i32..100, -100i32..0],
    ) {
        let leaves = present_indices(&present);
        prop_assume!(!leaves.is_empty());
        let stop_at = leaves[pick.index(leaves.len())];

        let obj = DataObject::from(collection(&present));
        let mut seen = Vec::new();
        let out = apply(&obj, |index, _| {
            seen.push(index);
            if index == stop_at { Visit::from_code(code) } else { Visit::CONTINUE }
        });

        prop_assert_eq!(out.code(), code);
        let expected: Vec<usize> = leaves.into_iter().take_while(|&i| i <= stop_at).collect();
        prop_assert_eq!(seen, expected);
    }
}

#[test]
fn empty_collection_visits_nothing() {
    let obj = DataObject::from(MultiBlock::new(4));
    let mut called = false;
    assert_eq!(apply(&obj, |_, _| { called = true; Visit::CONTINUE }), Visit::CONTINUE);
    assert!(!called);
}
