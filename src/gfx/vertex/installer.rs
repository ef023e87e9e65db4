//! Registers a [`VertexLayout`] with the device

use log::trace;

use super::VertexLayout;
use crate::gfx::device::{GraphicsDevice, VertexAttributeBinding};

/// Turns a layout into per-attribute device bindings.
///
/// Offsets come from a left-to-right fold over attribute sizes and every
/// attribute shares the layout stride; no padding is inserted.
pub struct LayoutInstaller<'a> {
    layout: &'a VertexLayout,
}

impl<'a> LayoutInstaller<'a> {
    pub fn new(layout: &'a VertexLayout) -> Self {
        Self { layout }
    }

    pub fn bindings(&self) -> Vec<VertexAttributeBinding> {
        let stride = self.layout.stride();
        self.layout
            .slots()
            .map(|slot| VertexAttributeBinding {
                location: slot.location,
                component_count: slot.descriptor.component_count,
                component_type: slot.descriptor.component_type,
                normalized: slot.descriptor.normalized,
                stride,
                offset: slot.offset,
            })
            .collect()
    }

    /// Describes and enables every attribute on the bound vertex array.
    /// Returns the stride.
    pub fn install(&self, device: &dyn GraphicsDevice) -> usize {
        for binding in self.bindings() {
            trace!(
                "vertex attribute {}: {}x{:?} at offset {}",
                binding.location,
                binding.component_count,
                binding.component_type,
                binding.offset
            );
            device.describe_vertex_attribute(&binding);
            device.enable_vertex_attribute(binding.location);
        }
        self.layout.stride()
    }
}
