//! Typed data arrays in interleaved or separated storage, and uniform access to them

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Storage for one primitive element type.
///
/// `Interleaved` keeps every component of every tuple in a single
/// `(tuples, components)` buffer. `Separated` keeps one buffer per component.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout<T> {
    Interleaved(Array2<T>),
    Separated(Vec<Array1<T>>),
}

impl<T> Layout<T> {
    pub fn num_components(&self) -> usize {
        match self {
            Layout::Interleaved(a) => a.ncols(),
            Layout::Separated(c) => c.len(),
        }
    }

    pub fn num_tuples(&self) -> usize {
        match self {
            Layout::Interleaved(a) => a.nrows(),
            Layout::Separated(c) => c.first().map_or(0, |a| a.len()),
        }
    }
}

/// Primitive types a [`DataArray`] can hold.
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    const KIND: ElementKind;

    fn layout(storage: &ArrayStorage) -> Option<&Layout<Self>>;
    fn layout_mut(storage: &mut ArrayStorage) -> Option<&mut Layout<Self>>;
    fn wrap(layout: Layout<Self>) -> ArrayStorage;
}

// Generates the element tag, the tagged storage union and one `Element`
// impl per primitive, so adding a type touches exactly one line.
macro_rules! element_types {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        /// Tag naming the primitive type held by an array.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum ElementKind {
            $($variant),+
        }

        impl ElementKind {
            /// Size of one element in bytes.
            pub fn size(self) -> usize {
                match self {
                    $(ElementKind::$variant => std::mem::size_of::<$ty>()),+
                }
            }
        }

        /// Array contents tagged by element kind.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ArrayStorage {
            $($variant(Layout<$ty>)),+
        }

        impl ArrayStorage {
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(ArrayStorage::$variant(_) => ElementKind::$variant),+
                }
            }

            pub fn num_components(&self) -> usize {
                match self {
                    $(ArrayStorage::$variant(l) => l.num_components()),+
                }
            }

            pub fn num_tuples(&self) -> usize {
                match self {
                    $(ArrayStorage::$variant(l) => l.num_tuples()),+
                }
            }
        }

        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$variant;

                fn layout(storage: &ArrayStorage) -> Option<&Layout<Self>> {
                    match storage {
                        ArrayStorage::$variant(l) => Some(l),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn layout_mut(storage: &mut ArrayStorage) -> Option<&mut Layout<Self>> {
                    match storage {
                        ArrayStorage::$variant(l) => Some(l),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn wrap(layout: Layout<Self>) -> ArrayStorage {
                    ArrayStorage::$variant(layout)
                }
            }
        )+
    };
}

element_types! {
    Int8 => i8,
    UInt8 => u8,
    Int16 => i16,
    UInt16 => u16,
    Int32 => i32,
    UInt32 => u32,
    Int64 => i64,
    UInt64 => u64,
    Float32 => f32,
    Float64 => f64,
}

/// A named array of one element kind and a fixed number of components.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    name: String,
    storage: ArrayStorage,
}

impl DataArray {
    pub fn new(name: impl Into<String>, storage: ArrayStorage) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }

    /// Interleaved array from a `(tuples, components)` buffer.
    pub fn interleaved<T: Element>(name: impl Into<String>, data: Array2<T>) -> Self {
        Self::new(name, T::wrap(Layout::Interleaved(data)))
    }

    /// Separated array with one buffer per component.
    ///
    /// There must be at least one buffer, and all of them the same length.
    pub fn separated<T: Element>(name: impl Into<String>, components: Vec<Array1<T>>) -> Result<Self> {
        let name = name.into();
        let Some(first) = components.first() else {
            return Err(Error::InvalidLayout {
                array: name,
                reason: "separated layout needs at least one component",
            });
        };
        if components.iter().any(|c| c.len() != first.len()) {
            return Err(Error::InvalidLayout {
                array: name,
                reason: "separated components differ in length",
            });
        }
        Ok(Self::new(name, T::wrap(Layout::Separated(components))))
    }

    /// Single-component interleaved array.
    pub fn scalars<T: Element>(name: impl Into<String>, values: Vec<T>) -> Self {
        Self::interleaved(name, Array1::from(values).insert_axis(Axis(1)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &ArrayStorage {
        &self.storage
    }

    pub fn element_kind(&self) -> ElementKind {
        self.storage.kind()
    }

    pub fn num_components(&self) -> usize {
        self.storage.num_components()
    }

    pub fn num_tuples(&self) -> usize {
        self.storage.num_tuples()
    }

    fn layout<T: Element>(&self) -> Result<&Layout<T>> {
        T::layout(&self.storage).ok_or_else(|| Error::ElementKind {
            array: self.name.clone(),
            expected: T::KIND,
            found: self.storage.kind(),
        })
    }
}

/// Borrow the contents of `array` as one element-major slice.
///
/// Works for interleaved arrays of any component count and for separated
/// arrays with exactly one component. `as_slice(..)?.as_ptr()` is the
/// pointer to the first element.
pub fn as_slice<T: Element>(array: &DataArray) -> Result<&[T]> {
    let invalid = |reason| Error::InvalidLayout {
        array: array.name.clone(),
        reason,
    };

    match array.layout::<T>()? {
        Layout::Interleaved(data) => data
            .as_slice()
            .ok_or_else(|| invalid("interleaved buffer is not contiguous")),
        Layout::Separated(components) => match components.as_slice() {
            [single] => single
                .as_slice()
                .ok_or_else(|| invalid("component buffer is not contiguous")),
            _ => Err(invalid("separated layout must have exactly one component")),
        },
    }
}

/// Mutable counterpart of [`as_slice`].
pub fn as_mut_slice<T: Element>(array: &mut DataArray) -> Result<&mut [T]> {
    let name = array.name.clone();
    let found = array.storage.kind();
    let invalid = |reason| Error::InvalidLayout {
        array: name.clone(),
        reason,
    };

    let layout = T::layout_mut(&mut array.storage).ok_or_else(|| Error::ElementKind {
        array: name.clone(),
        expected: T::KIND,
        found,
    })?;

    match layout {
        Layout::Interleaved(data) => data
            .as_slice_mut()
            .ok_or_else(|| invalid("interleaved buffer is not contiguous")),
        Layout::Separated(components) => match components.as_mut_slice() {
            [single] => single
                .as_slice_mut()
                .ok_or_else(|| invalid("component buffer is not contiguous")),
            _ => Err(invalid("separated layout must have exactly one component")),
        },
    }
}
