//! # Vertex Layouts
//!
//! Describes the wire layout of vertex data without per-vertex-type code.
//!
//! - [`AttributeDescriptor`] - component count, component type and normalization of one attribute
//! - [`VertexLayout`] - ordered attribute list; position in the list is the shader location
//! - [`VertexAttribute`] - an attribute kind: its descriptor plus how to extract it from an imported mesh
//! - [`Vertex`] - a composite vertex assembled from attribute kinds
//!
//! Composite vertex types are declared with [`vertex_type!`](crate::vertex_type):
//!
//! ```
//! use haggis_models::vertex_type;
//! use haggis_models::gfx::vertex::{Position, TextureCoordinate, Vertex};
//!
//! vertex_type! {
//!     pub struct SpriteVertex {
//!         pub position: Position,
//!         pub uv: TextureCoordinate,
//!     }
//! }
//!
//! assert_eq!(SpriteVertex::layout().stride(), 20);
//! ```
//!
//! Adding an attribute kind only takes a new [`VertexAttribute`] implementation;
//! offsets and strides are always derived by [`VertexLayout`].

pub mod attributes;
pub mod installer;

pub use attributes::{Normal, Position, TextureCoordinate};
pub use installer::LayoutInstaller;

use crate::gfx::scene::SceneMesh;

/// Primitive type of a single attribute component.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Float32,
    Int32,
    Uint32,
    Int16,
    Uint16,
    Int8,
    Uint8,
}

impl ComponentType {
    pub const fn byte_size(self) -> usize {
        match self {
            ComponentType::Float32 | ComponentType::Int32 | ComponentType::Uint32 => 4,
            ComponentType::Int16 | ComponentType::Uint16 => 2,
            ComponentType::Int8 | ComponentType::Uint8 => 1,
        }
    }
}

/// Metadata for one vertex field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    pub component_count: u32,
    pub component_type: ComponentType,
    /// Integer components are mapped to [0, 1] / [-1, 1] when read by the shader
    pub normalized: bool,
}

impl AttributeDescriptor {
    pub const fn new(component_count: u32, component_type: ComponentType, normalized: bool) -> Self {
        Self {
            component_count,
            component_type,
            normalized,
        }
    }

    /// Unnormalized 32-bit float attribute with `component_count` components.
    pub const fn float32(component_count: u32) -> Self {
        Self::new(component_count, ComponentType::Float32, false)
    }

    pub const fn component_byte_size(&self) -> usize {
        self.component_type.byte_size()
    }

    /// Size of the attribute in bytes.
    pub const fn size(&self) -> usize {
        self.component_count as usize * self.component_byte_size()
    }
}

/// Attribute with its position inside a [`VertexLayout`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AttributeSlot {
    pub location: u32,
    pub offset: usize,
    pub descriptor: AttributeDescriptor,
}

/// Ordered, tightly packed set of vertex attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    descriptors: Vec<AttributeDescriptor>,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute at the next shader location (builder pattern).
    pub fn with(mut self, descriptor: AttributeDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn push(&mut self, descriptor: AttributeDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Byte distance between consecutive vertices.
    pub fn stride(&self) -> usize {
        self.descriptors.iter().map(AttributeDescriptor::size).sum()
    }

    /// Byte offset of each attribute from the start of a vertex.
    pub fn offsets(&self) -> Vec<usize> {
        self.slots().map(|slot| slot.offset).collect()
    }

    /// Attributes with their locations and offsets, in location order.
    pub fn slots(&self) -> impl Iterator<Item = AttributeSlot> + '_ {
        self.descriptors
            .iter()
            .enumerate()
            .scan(0usize, |offset, (location, descriptor)| {
                let slot = AttributeSlot {
                    location: location as u32,
                    offset: *offset,
                    descriptor: *descriptor,
                };
                *offset += descriptor.size();
                Some(slot)
            })
    }
}

/// One attribute kind of a vertex.
///
/// Implementors are plain-old-data values whose size equals their descriptor's
/// size, so a `#[repr(C)]` vertex built from them is tightly packed.
pub trait VertexAttribute: bytemuck::Pod {
    const DESCRIPTOR: AttributeDescriptor;

    /// Reads this attribute for vertex `index` of an imported mesh.
    fn extract(mesh: &SceneMesh, index: usize) -> Self;
}

/// A complete vertex whose layout and extraction are derived from its attributes.
pub trait Vertex: bytemuck::Pod {
    fn layout() -> VertexLayout;

    fn extract(mesh: &SceneMesh, index: usize) -> Self;
}

/// Declares a `#[repr(C)]` vertex struct from attribute kinds and implements
/// [`Vertex`] for it. Field order is shader location order.
#[macro_export]
macro_rules! vertex_type {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($field_vis:vis $field:ident : $attribute:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(
            Copy,
            Clone,
            Debug,
            $crate::__bytemuck::Pod,
            $crate::__bytemuck::Zeroable
        )]
        #[bytemuck(crate = "haggis_models::__bytemuck")]
        $vis struct $name {
            $($field_vis $field: $attribute),+
        }

        impl $crate::gfx::vertex::Vertex for $name {
            fn layout() -> $crate::gfx::vertex::VertexLayout {
                $crate::gfx::vertex::VertexLayout::new()
                    $(.with(<$attribute as $crate::gfx::vertex::VertexAttribute>::DESCRIPTOR))+
            }

            fn extract(mesh: &$crate::gfx::scene::SceneMesh, index: usize) -> Self {
                Self {
                    $($field: <$attribute as $crate::gfx::vertex::VertexAttribute>::extract(mesh, index)),+
                }
            }
        }
    };
}

vertex_type! {
    /// Position, normal and texture coordinate, at locations 0, 1 and 2.
    pub struct DefaultVertex {
        pub position: Position,
        pub normal: Normal,
        pub tex_coord: TextureCoordinate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_left_fold_of_sizes() {
        let layout = VertexLayout::new()
            .with(AttributeDescriptor::float32(3))
            .with(AttributeDescriptor::new(4, ComponentType::Uint8, true))
            .with(AttributeDescriptor::float32(2))
            .with(AttributeDescriptor::new(2, ComponentType::Int16, false));

        assert_eq!(layout.offsets(), vec![0, 12, 16, 24]);
        assert_eq!(layout.stride(), 12 + 4 + 8 + 4);
    }

    #[test]
    fn test_empty_layout() {
        let layout = VertexLayout::new();
        assert!(layout.is_empty());
        assert_eq!(layout.stride(), 0);
        assert!(layout.offsets().is_empty());
    }

    #[test]
    fn test_default_vertex_layout_matches_struct_size() {
        let layout = DefaultVertex::layout();
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.offsets(), vec![0, 12, 24]);
        assert_eq!(layout.stride(), 32);
        assert_eq!(layout.stride(), std::mem::size_of::<DefaultVertex>());
    }

    #[test]
    fn test_custom_vertex_type_composition() {
        crate::vertex_type! {
            struct PositionOnly {
                position: Position,
            }
        }

        crate::vertex_type! {
            struct TexturedNormal {
                uv: TextureCoordinate,
                normal: Normal,
            }
        }

        assert_eq!(PositionOnly::layout().stride(), 12);
        let layout = TexturedNormal::layout();
        assert_eq!(layout.offsets(), vec![0, 8]);
        assert_eq!(layout.stride(), std::mem::size_of::<TexturedNormal>());
    }

    mod without_bytemuck_import {
        use crate::gfx::vertex::{Normal, Position, Vertex};

        crate::vertex_type! {
            pub struct LitVertex {
                pub position: Position,
                pub normal: Normal,
            }
        }

        #[test]
        fn test_macro_vertex_is_pod_through_reexport() {
            let vertices = [LitVertex {
                position: Position([1.0, 2.0, 3.0]),
                normal: Normal([0.0, 1.0, 0.0]),
            }; 2];
            let bytes: &[u8] = crate::__bytemuck::cast_slice(&vertices);
            assert_eq!(bytes.len(), 2 * LitVertex::layout().stride());
            let zeroed: LitVertex = crate::__bytemuck::Zeroable::zeroed();
            assert_eq!(zeroed.position, Position::default());
        }
    }

    #[test]
    fn test_slots_report_locations() {
        let locations: Vec<u32> = DefaultVertex::layout().slots().map(|s| s.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }
}
