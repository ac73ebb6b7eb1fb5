use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::address::Address;
use crate::types::Sort;

/// Opaque name of a front-end type (array type, map type, class...).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TypeTag(Arc<str>);

impl TypeTag {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CollectionKind {
    ArrayContents,
    ArrayLength,
    MapEntries,
    MapSize,
    SetMembership,
}

impl CollectionKind {
    /// Scalar kinds store one value per object, keyed by the reference alone.
    pub fn is_scalar(self) -> bool {
        matches!(self, CollectionKind::ArrayLength | CollectionKind::MapSize)
    }
}

/// Identity of one logical collection: the kind, the sort of the stored values, the sort of the
/// keys and the owning type.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct RegionKey {
    pub kind: CollectionKind,
    pub sort: Sort,
    pub key_sort: Sort,
    pub owner: Option<TypeTag>,
}

impl RegionKey {
    pub fn array(array_type: &TypeTag, element: Sort, size_sort: Sort) -> Self {
        Self {
            kind: CollectionKind::ArrayContents,
            sort: element,
            key_sort: size_sort,
            owner: Some(array_type.clone()),
        }
    }

    pub fn array_length(array_type: &TypeTag, size_sort: Sort) -> Self {
        Self {
            kind: CollectionKind::ArrayLength,
            sort: size_sort,
            key_sort: Sort::Address,
            owner: Some(array_type.clone()),
        }
    }

    pub fn map_entries(map_type: &TypeTag, key_sort: Sort, value_sort: Sort) -> Self {
        Self {
            kind: CollectionKind::MapEntries,
            sort: value_sort,
            key_sort,
            owner: Some(map_type.clone()),
        }
    }

    pub fn map_size(map_type: &TypeTag, size_sort: Sort) -> Self {
        Self {
            kind: CollectionKind::MapSize,
            sort: size_sort,
            key_sort: Sort::Address,
            owner: Some(map_type.clone()),
        }
    }

    pub fn set(set_type: &TypeTag, element: Sort) -> Self {
        Self {
            kind: CollectionKind::SetMembership,
            sort: Sort::Bool,
            key_sort: element,
            owner: Some(set_type.clone()),
        }
    }
}

impl Display for RegionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            CollectionKind::ArrayContents => "array",
            CollectionKind::ArrayLength => "length",
            CollectionKind::MapEntries => "map",
            CollectionKind::MapSize => "size",
            CollectionKind::SetMembership => "set",
        };
        match &self.owner {
            Some(owner) => write!(f, "{}<{}:{}>", kind, owner, self.sort),
            None => write!(f, "{}<{}>", kind, self.sort),
        }
    }
}

/// Identity of one physical collection: the per-object collection of an allocated object, or
/// the shared collection of all input objects.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum CollectionId {
    Allocated { region: RegionKey, address: Address },
    Input { region: RegionKey },
}

impl CollectionId {
    pub fn region(&self) -> &RegionKey {
        match self {
            CollectionId::Allocated { region, .. } | CollectionId::Input { region } => region,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, CollectionId::Input { .. })
    }
}

impl Display for CollectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionId::Allocated { region, address } => write!(f, "{}@{}", region, address),
            CollectionId::Input { region } => write!(f, "{}@input", region),
        }
    }
}
