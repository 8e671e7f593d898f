//! Data associations and their external names

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{Attributes, Dataset};
use crate::{Error, Result};

/// Where an array's values live: one per point, one per cell, or on the
/// object as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Association {
    Point,
    Cell,
    Field,
}

impl Association {
    pub const ALL: [Association; 3] = [Association::Point, Association::Cell, Association::Field];

    pub fn as_str(&self) -> &'static str {
        match self {
            Association::Point => "point",
            Association::Cell => "cell",
            Association::Field => "field",
        }
    }

    /// Geometry-relative associations index mesh points or cells.
    pub fn is_geometric(&self) -> bool {
        !matches!(self, Association::Field)
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Association {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "point" => Ok(Association::Point),
            "cell" => Ok(Association::Cell),
            "field" => Ok(Association::Field),
            other => Err(Error::UnknownAssociation(other.to_string())),
        }
    }
}

/// Parse one of the exact, case-sensitive spellings `point`, `cell`, `field`.
pub fn parse_association(name: &str) -> Result<Association> {
    name.parse()
}

/// Attribute container for `association` on `dataset`.
///
/// Point and cell containers always exist; the field container is absent
/// until a field array has been added.
pub fn attributes_for(dataset: &Dataset, association: Association) -> Option<&Attributes> {
    match association {
        Association::Point => Some(&dataset.point_data),
        Association::Cell => Some(&dataset.cell_data),
        Association::Field => dataset.field_data.as_ref(),
    }
}

/// Mutable container for `association`, creating the field container on demand.
pub fn attributes_for_mut(dataset: &mut Dataset, association: Association) -> &mut Attributes {
    match association {
        Association::Point => &mut dataset.point_data,
        Association::Cell => &mut dataset.cell_data,
        Association::Field => dataset.field_data.get_or_insert_with(Attributes::new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataArray, Extent, Geometry};

    fn leaf() -> Dataset {
        Dataset::new(Geometry::Uniform {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            extent: Extent([0, 1, 0, 1, 0, 1]),
        })
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert_eq!(parse_association("cell").unwrap(), Association::Cell);
        assert!(matches!(
            parse_association("Cell"),
            Err(Error::UnknownAssociation(ref s)) if s == "Cell"
        ));
        assert!(parse_association("").is_err());
    }

    #[test]
    fn names_round_trip() {
        for name in ["point", "cell", "field"] {
            assert_eq!(parse_association(name).unwrap().as_str(), name);
        }
        for assoc in Association::ALL {
            assert_eq!(assoc.to_string().parse::<Association>().unwrap(), assoc);
        }
    }

    #[test]
    fn field_container_is_optional() {
        let mut ds = leaf();
        assert!(attributes_for(&ds, Association::Point).is_some());
        assert!(attributes_for(&ds, Association::Cell).is_some());
        assert!(attributes_for(&ds, Association::Field).is_none());

        attributes_for_mut(&mut ds, Association::Field).add(DataArray::scalars("time", vec![0.5f64]));
        let field = attributes_for(&ds, Association::Field).unwrap();
        assert!(field.get("time").is_some());
    }
}
