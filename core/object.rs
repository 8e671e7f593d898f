//! Mesh objects: leaf datasets, their geometry and attribute containers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{DataArray, MultiBlock};

/// Unique identifier for datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(Uuid);

impl DatasetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed set of mesh and block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    UniformGrid,
    RectilinearGrid,
    StructuredGrid,
    UnstructuredGrid,
    PolyData,
    MultiBlock,
    OverlappingAmr,
    NonOverlappingAmr,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::UniformGrid => "UniformGrid",
            DataKind::RectilinearGrid => "RectilinearGrid",
            DataKind::StructuredGrid => "StructuredGrid",
            DataKind::UnstructuredGrid => "UnstructuredGrid",
            DataKind::PolyData => "PolyData",
            DataKind::MultiBlock => "MultiBlock",
            DataKind::OverlappingAmr => "OverlappingAmr",
            DataKind::NonOverlappingAmr => "NonOverlappingAmr",
        }
    }

    pub fn is_amr(&self) -> bool {
        matches!(self, DataKind::OverlappingAmr | DataKind::NonOverlappingAmr)
    }

    pub fn is_composite(&self) -> bool {
        self.is_amr() || *self == DataKind::MultiBlock
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Bounds of a `(n, 3)` point array, `None` when it holds no points.
    pub fn from_points(points: ArrayView2<'_, f64>) -> Option<Self> {
        if points.nrows() == 0 || points.ncols() < 3 {
            return None;
        }
        let mut b = Bounds::new([f64::INFINITY; 3], [f64::NEG_INFINITY; 3]);
        for row in points.rows() {
            for axis in 0..3 {
                b.min[axis] = b.min[axis].min(row[axis]);
                b.max[axis] = b.max[axis].max(row[axis]);
            }
        }
        Some(b)
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }
}

/// Inclusive index-space extent `[i0, i1, j0, j1, k0, k1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent(pub [i64; 6]);

impl Extent {
    /// Points along each axis.
    pub fn dims(&self) -> [usize; 3] {
        let e = &self.0;
        [0, 1, 2].map(|axis| (e[2 * axis + 1] - e[2 * axis] + 1).max(0) as usize)
    }

    pub fn num_points(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn num_cells(&self) -> usize {
        let dims = self.dims();
        if dims.contains(&0) {
            return 0;
        }
        dims.iter().filter(|&&d| d > 1).map(|&d| d - 1).product()
    }

    pub fn union(&self, other: &Extent) -> Extent {
        let (a, b) = (&self.0, &other.0);
        Extent([
            a[0].min(b[0]),
            a[1].max(b[1]),
            a[2].min(b[2]),
            a[3].max(b[3]),
            a[4].min(b[4]),
            a[5].max(b[5]),
        ])
    }
}

/// Geometry of a leaf dataset
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Uniform {
        origin: [f64; 3],
        spacing: [f64; 3],
        extent: Extent,
    },
    Rectilinear {
        extent: Extent,
        x: Array1<f64>,
        y: Array1<f64>,
        z: Array1<f64>,
    },
    Structured {
        extent: Extent,
        points: Array2<f64>,
    },
    Unstructured {
        points: Array2<f64>,
        cells: Vec<Vec<usize>>,
    },
    Polygonal {
        points: Array2<f64>,
        polys: Vec<Vec<usize>>,
    },
}

impl Geometry {
    pub fn kind(&self) -> DataKind {
        match self {
            Geometry::Uniform { .. } => DataKind::UniformGrid,
            Geometry::Rectilinear { .. } => DataKind::RectilinearGrid,
            Geometry::Structured { .. } => DataKind::StructuredGrid,
            Geometry::Unstructured { .. } => DataKind::UnstructuredGrid,
            Geometry::Polygonal { .. } => DataKind::PolyData,
        }
    }

    /// Index-space extent, present only for logically Cartesian geometry.
    pub fn extent(&self) -> Option<Extent> {
        match self {
            Geometry::Uniform { extent, .. }
            | Geometry::Rectilinear { extent, .. }
            | Geometry::Structured { extent, .. } => Some(*extent),
            Geometry::Unstructured { .. } | Geometry::Polygonal { .. } => None,
        }
    }

    pub fn num_points(&self) -> usize {
        match self {
            Geometry::Uniform { extent, .. } | Geometry::Rectilinear { extent, .. } => {
                extent.num_points()
            }
            Geometry::Structured { points, .. }
            | Geometry::Unstructured { points, .. }
            | Geometry::Polygonal { points, .. } => points.nrows(),
        }
    }

    pub fn num_cells(&self) -> usize {
        match self {
            Geometry::Uniform { extent, .. }
            | Geometry::Rectilinear { extent, .. }
            | Geometry::Structured { extent, .. } => extent.num_cells(),
            Geometry::Unstructured { cells, .. } => cells.len(),
            Geometry::Polygonal { polys, .. } => polys.len(),
        }
    }

    /// Spatial bounds, `None` for geometry without points.
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Geometry::Uniform {
                origin,
                spacing,
                extent,
            } => {
                if extent.num_points() == 0 {
                    return None;
                }
                let e = &extent.0;
                let mut b = Bounds::new([0.0; 3], [0.0; 3]);
                for axis in 0..3 {
                    let lo = origin[axis] + spacing[axis] * e[2 * axis] as f64;
                    let hi = origin[axis] + spacing[axis] * e[2 * axis + 1] as f64;
                    b.min[axis] = lo.min(hi);
                    b.max[axis] = lo.max(hi);
                }
                Some(b)
            }
            Geometry::Rectilinear { x, y, z, .. } => {
                let mut b = Bounds::new([0.0; 3], [0.0; 3]);
                for (axis, coords) in [x, y, z].into_iter().enumerate() {
                    if coords.is_empty() {
                        return None;
                    }
                    b.min[axis] = coords.fold(f64::INFINITY, |a, &v| a.min(v));
                    b.max[axis] = coords.fold(f64::NEG_INFINITY, |a, &v| a.max(v));
                }
                Some(b)
            }
            Geometry::Structured { points, .. }
            | Geometry::Unstructured { points, .. }
            | Geometry::Polygonal { points, .. } => Bounds::from_points(points.view()),
        }
    }
}

/// Value stored in an object's [`Information`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfoValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Auxiliary, non-geometric key/value store carried by every mesh object.
///
/// Interior-mutable so producers can annotate objects they only hold shared.
#[derive(Debug, Default)]
pub struct Information {
    entries: RwLock<HashMap<String, InfoValue>>,
}

impl Information {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<InfoValue> {
        self.entries.read().get(key).cloned()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.read().get(key) {
            Some(InfoValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: InfoValue) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<InfoValue> {
        self.entries.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl Clone for Information {
    fn clone(&self) -> Self {
        Self {
            entries: RwLock::new(self.entries.read().clone()),
        }
    }
}

/// Named arrays sharing one association
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    arrays: Vec<DataArray>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an array, replacing any array of the same name.
    pub fn add(&mut self, array: DataArray) {
        match self.arrays.iter_mut().find(|a| a.name() == array.name()) {
            Some(slot) => *slot = array,
            None => self.arrays.push(array),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataArray> {
        self.arrays.iter_mut().find(|a| a.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataArray> {
        self.arrays.iter()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// The atomic mesh block: geometry plus point, cell and field arrays
#[derive(Debug, Clone)]
pub struct Dataset {
    id: DatasetId,
    geometry: Geometry,
    pub(crate) point_data: Attributes,
    pub(crate) cell_data: Attributes,
    pub(crate) field_data: Option<Attributes>,
    info: Information,
}

impl Dataset {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: DatasetId::new(),
            geometry,
            point_data: Attributes::new(),
            cell_data: Attributes::new(),
            field_data: None,
            info: Information::new(),
        }
    }

    pub fn with_point_array(mut self, array: DataArray) -> Self {
        self.point_data.add(array);
        self
    }

    pub fn with_cell_array(mut self, array: DataArray) -> Self {
        self.cell_data.add(array);
        self
    }

    pub fn with_field_array(mut self, array: DataArray) -> Self {
        self.field_data.get_or_insert_with(Attributes::new).add(array);
        self
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn kind(&self) -> DataKind {
        self.geometry.kind()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn information(&self) -> &Information {
        &self.info
    }
}

/// Either a single leaf dataset or a composite collection
#[derive(Debug, Clone)]
pub enum DataObject {
    Dataset(Arc<Dataset>),
    MultiBlock(MultiBlock),
}

impl DataObject {
    pub fn kind(&self) -> DataKind {
        match self {
            DataObject::Dataset(ds) => ds.kind(),
            DataObject::MultiBlock(mb) => mb.kind(),
        }
    }

    pub fn information(&self) -> &Information {
        match self {
            DataObject::Dataset(ds) => ds.information(),
            DataObject::MultiBlock(mb) => mb.information(),
        }
    }
}

impl From<Dataset> for DataObject {
    fn from(ds: Dataset) -> Self {
        DataObject::Dataset(Arc::new(ds))
    }
}

impl From<Arc<Dataset>> for DataObject {
    fn from(ds: Arc<Dataset>) -> Self {
        DataObject::Dataset(ds)
    }
}

impl From<MultiBlock> for DataObject {
    fn from(mb: MultiBlock) -> Self {
        DataObject::MultiBlock(mb)
    }
}

/// Anything that carries an [`Information`] store
pub trait MeshObject {
    fn information(&self) -> &Information;
}

impl MeshObject for Dataset {
    fn information(&self) -> &Information {
        &self.info
    }
}

impl MeshObject for MultiBlock {
    fn information(&self) -> &Information {
        MultiBlock::information(self)
    }
}

impl MeshObject for DataObject {
    fn information(&self) -> &Information {
        DataObject::information(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn uniform_geometry_sizes_and_bounds() {
        let g = Geometry::Uniform {
            origin: [0.0, 0.0, 0.0],
            spacing: [0.5, 1.0, 2.0],
            extent: Extent([0, 4, 0, 2, 0, 0]),
        };
        assert_eq!(g.num_points(), 15);
        assert_eq!(g.num_cells(), 8);
        let b = g.bounds().unwrap();
        assert_eq!(b.min, [0.0, 0.0, 0.0]);
        assert_eq!(b.max, [2.0, 2.0, 0.0]);
    }

    #[test]
    fn rectilinear_bounds_follow_coordinates() {
        let g = Geometry::Rectilinear {
            extent: Extent([0, 2, 0, 1, 0, 0]),
            x: arr1(&[0.0, 1.0, 3.0]),
            y: arr1(&[-1.0, 1.0]),
            z: arr1(&[5.0]),
        };
        let b = g.bounds().unwrap();
        assert_eq!(b.min, [0.0, -1.0, 5.0]);
        assert_eq!(b.max, [3.0, 1.0, 5.0]);
        assert_eq!(g.num_cells(), 2);
    }

    #[test]
    fn unstructured_without_points_has_no_bounds() {
        let g = Geometry::Unstructured {
            points: Array2::zeros((0, 3)),
            cells: vec![],
        };
        assert!(g.bounds().is_none());
        assert_eq!(g.extent(), None);
    }

    #[test]
    fn point_bounds_and_union() {
        let a = Bounds::from_points(arr2(&[[0.0, 1.0, 2.0], [-1.0, 4.0, 0.0]]).view()).unwrap();
        assert_eq!(a.min, [-1.0, 1.0, 0.0]);
        let b = Bounds::new([0.0, 0.0, 0.0], [9.0, 1.0, 1.0]);
        let u = a.union(&b);
        assert_eq!(u.min, [-1.0, 0.0, 0.0]);
        assert_eq!(u.max, [9.0, 4.0, 2.0]);
    }

    #[test]
    fn information_distinguishes_absent_from_zero() {
        let info = Information::new();
        assert_eq!(info.get_int("n"), None);
        info.set("n", InfoValue::Int(0));
        assert_eq!(info.get_int("n"), Some(0));
        info.set("s", InfoValue::Text("x".into()));
        assert_eq!(info.get_int("s"), None);
    }

    #[test]
    fn attributes_replace_by_name() {
        let mut attrs = Attributes::new();
        attrs.add(DataArray::scalars("a", vec![1i32]));
        attrs.add(DataArray::scalars("a", vec![1i32, 2]));
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("a").unwrap().num_tuples(), 2);
    }

    #[test]
    fn amr_kinds_are_composite() {
        assert!(DataKind::OverlappingAmr.is_composite());
        assert!(DataKind::MultiBlock.is_composite());
        assert!(!DataKind::PolyData.is_composite());
        assert_eq!(DataKind::StructuredGrid.to_string(), "StructuredGrid");
    }
}
