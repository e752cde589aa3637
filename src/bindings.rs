//! Bind group layout contract for the two passes.
//!
//! The tables are the single source for the wgpu layouts and the WGSL
//! `@group`/`@binding` attributes; pass setup code must follow them exactly.

use std::collections::HashSet;

use thiserror::Error;

use crate::uniforms::{CameraUniform, GlobalLightUniform, ObjectUniform};

/// Kind of resource occupying a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    CameraUniform,
    ObjectUniform,
    GlobalLightUniform,
    DepthTexture2d,
    ComparisonSampler,
}

impl ResourceKind {
    /// Size in bytes of uniform blocks, `None` for textures and samplers.
    pub fn uniform_size(self) -> Option<u64> {
        let size = match self {
            Self::CameraUniform => std::mem::size_of::<CameraUniform>(),
            Self::ObjectUniform => std::mem::size_of::<ObjectUniform>(),
            Self::GlobalLightUniform => std::mem::size_of::<GlobalLightUniform>(),
            Self::DepthTexture2d | Self::ComparisonSampler => return None,
        };
        Some(size as u64)
    }
}

/// Shader stages that read a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Vertex,
    Fragment,
    VertexFragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    pub set: u32,
    pub binding: u32,
    pub resource: ResourceKind,
    pub visibility: Visibility,
}

impl BindingSlot {
    const fn new(set: u32, binding: u32, resource: ResourceKind, visibility: Visibility) -> Self {
        Self {
            set,
            binding,
            resource,
            visibility,
        }
    }
}

pub const MAIN_PASS_LAYOUT: &[BindingSlot] = &[
    BindingSlot::new(0, 0, ResourceKind::CameraUniform, Visibility::VertexFragment),
    BindingSlot::new(1, 0, ResourceKind::ObjectUniform, Visibility::Vertex),
    BindingSlot::new(2, 0, ResourceKind::GlobalLightUniform, Visibility::VertexFragment),
    BindingSlot::new(3, 0, ResourceKind::DepthTexture2d, Visibility::Fragment),
    BindingSlot::new(3, 1, ResourceKind::ComparisonSampler, Visibility::Fragment),
];

/// The depth pass runs with fewer resources, so the light moves to set 0.
pub const SHADOW_PASS_LAYOUT: &[BindingSlot] = &[
    BindingSlot::new(0, 0, ResourceKind::GlobalLightUniform, Visibility::Vertex),
    BindingSlot::new(1, 0, ResourceKind::ObjectUniform, Visibility::Vertex),
];

/// Vertex shader input locations shared by both passes.
pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;

/// Number of bind group sets a layout spans.
pub fn set_count(layout: &[BindingSlot]) -> u32 {
    layout.iter().map(|slot| slot.set + 1).max().unwrap_or(0)
}

/// Slots of `layout` belonging to `set`, ordered by binding index.
pub fn slots_in_set(layout: &[BindingSlot], set: u32) -> Vec<BindingSlot> {
    let mut slots: Vec<_> = layout.iter().copied().filter(|slot| slot.set == set).collect();
    slots.sort_by_key(|slot| slot.binding);
    slots
}

/// Finds where `resource` is bound in `layout`.
pub fn locate(layout: &[BindingSlot], resource: ResourceKind) -> Option<(u32, u32)> {
    layout
        .iter()
        .find(|slot| slot.resource == resource)
        .map(|slot| (slot.set, slot.binding))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("set {set} binding {binding} is assigned twice")]
    DuplicateBinding { set: u32, binding: u32 },
    #[error("set {set} has no bindings")]
    EmptySet { set: u32 },
}

/// Checks that no two slots share a `(set, binding)` pair and that sets are
/// contiguous from zero.
pub fn validate_layout(layout: &[BindingSlot]) -> Result<(), LayoutError> {
    let mut seen = HashSet::new();
    for slot in layout {
        if !seen.insert((slot.set, slot.binding)) {
            return Err(LayoutError::DuplicateBinding {
                set: slot.set,
                binding: slot.binding,
            });
        }
    }
    for set in 0..set_count(layout) {
        if slots_in_set(layout, set).is_empty() {
            return Err(LayoutError::EmptySet { set });
        }
    }
    Ok(())
}
