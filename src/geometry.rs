//! Vertex capabilities of the geometry a program is generated for.

use crate::{declaration::InputAttribute, glsl::{self, GlslType}};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// The optional per-vertex data a geometry provides. Positions are
    /// always available.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct GeometryFlags: u32 {
        const NORMALS                          = 1 << 0;
        const TANGENT_SPACE                    = 1 << 1;
        const VERTEX_COLOR                     = 1 << 2;
        const PRIMARY_2D_TEXTURE_COORDINATES   = 1 << 3;
        const PRIMARY_3D_TEXTURE_COORDINATES   = 1 << 4;
        const SECONDARY_2D_TEXTURE_COORDINATES = 1 << 5;
        const SECONDARY_3D_TEXTURE_COORDINATES = 1 << 6;
    }
}

/// A named description of what a geometry can provide to the vertex stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GeometryDescription {
    name: String,
    flags: GeometryFlags,
}

/// A per-vertex attribute with a fixed location.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Tangent,
    Binormal,
    Normal,
    Primary2DTextureCoordinates,
    Primary3DTextureCoordinates,
    Secondary2DTextureCoordinates,
    Secondary3DTextureCoordinates,
    Color,
    /// Per-instance model matrix, occupying four locations.
    ModelMatrix,
}

impl GeometryDescription {
    pub fn new(name: impl Into<String>, flags: GeometryFlags) -> Self {
        Self {
            name: name.into(),
            flags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> GeometryFlags {
        self.flags
    }

    pub fn has_normals(&self) -> bool {
        self.flags.contains(GeometryFlags::NORMALS)
    }

    pub fn has_tangent_space(&self) -> bool {
        self.flags
            .contains(GeometryFlags::NORMALS | GeometryFlags::TANGENT_SPACE)
    }

    pub fn has_vertex_color(&self) -> bool {
        self.flags.contains(GeometryFlags::VERTEX_COLOR)
    }

    pub fn has_primary_2d_texture_coordinates(&self) -> bool {
        self.flags
            .contains(GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES)
    }

    pub fn has_primary_3d_texture_coordinates(&self) -> bool {
        self.flags
            .contains(GeometryFlags::PRIMARY_3D_TEXTURE_COORDINATES)
    }

    pub fn has_secondary_2d_texture_coordinates(&self) -> bool {
        self.flags
            .contains(GeometryFlags::SECONDARY_2D_TEXTURE_COORDINATES)
    }

    pub fn has_secondary_3d_texture_coordinates(&self) -> bool {
        self.flags
            .contains(GeometryFlags::SECONDARY_3D_TEXTURE_COORDINATES)
    }
}

impl fmt::Display for GeometryDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl VertexAttribute {
    pub const ALL: [Self; 10] = [
        Self::Position,
        Self::Tangent,
        Self::Binormal,
        Self::Normal,
        Self::Primary2DTextureCoordinates,
        Self::Primary3DTextureCoordinates,
        Self::Secondary2DTextureCoordinates,
        Self::Secondary3DTextureCoordinates,
        Self::Color,
        Self::ModelMatrix,
    ];

    pub const fn location(&self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Tangent => 1,
            Self::Binormal => 2,
            Self::Normal => 3,
            Self::Primary2DTextureCoordinates => 4,
            Self::Primary3DTextureCoordinates => 5,
            Self::Secondary2DTextureCoordinates => 6,
            Self::Secondary3DTextureCoordinates => 7,
            Self::Color => 8,
            Self::ModelMatrix => 9,
        }
    }

    pub const fn glsl_type(&self) -> GlslType {
        match self {
            Self::Position
            | Self::Tangent
            | Self::Binormal
            | Self::Normal
            | Self::Primary3DTextureCoordinates
            | Self::Secondary3DTextureCoordinates => GlslType::Vec3,
            Self::Primary2DTextureCoordinates | Self::Secondary2DTextureCoordinates => {
                GlslType::Vec2
            }
            Self::Color => GlslType::Vec4,
            Self::ModelMatrix => GlslType::Mat4,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Position => glsl::attribute::POSITION,
            Self::Tangent => glsl::attribute::TANGENT,
            Self::Binormal => glsl::attribute::BINORMAL,
            Self::Normal => glsl::attribute::NORMAL,
            Self::Primary2DTextureCoordinates => glsl::attribute::PRIMARY_2D_TEXTURE_COORDINATES,
            Self::Primary3DTextureCoordinates => glsl::attribute::PRIMARY_3D_TEXTURE_COORDINATES,
            Self::Secondary2DTextureCoordinates => {
                glsl::attribute::SECONDARY_2D_TEXTURE_COORDINATES
            }
            Self::Secondary3DTextureCoordinates => {
                glsl::attribute::SECONDARY_3D_TEXTURE_COORDINATES
            }
            Self::Color => glsl::attribute::COLOR,
            Self::ModelMatrix => glsl::attribute::MODEL_MATRIX,
        }
    }

    /// Returns the geometry capabilities needed for the attribute to be
    /// available. Positions and per-instance model matrices need nothing.
    pub const fn required_capabilities(&self) -> GeometryFlags {
        match self {
            Self::Position | Self::ModelMatrix => GeometryFlags::empty(),
            Self::Tangent | Self::Binormal => GeometryFlags::TANGENT_SPACE,
            Self::Normal => GeometryFlags::NORMALS,
            Self::Primary2DTextureCoordinates => GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES,
            Self::Primary3DTextureCoordinates => GeometryFlags::PRIMARY_3D_TEXTURE_COORDINATES,
            Self::Secondary2DTextureCoordinates => {
                GeometryFlags::SECONDARY_2D_TEXTURE_COORDINATES
            }
            Self::Secondary3DTextureCoordinates => {
                GeometryFlags::SECONDARY_3D_TEXTURE_COORDINATES
            }
            Self::Color => GeometryFlags::VERTEX_COLOR,
        }
    }

    /// Returns the input declaration for the attribute.
    pub fn declaration(&self) -> InputAttribute {
        InputAttribute::new(self.location(), self.glsl_type(), self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attribute_locations_do_not_overlap() {
        let mut occupied = Vec::new();
        for attribute in VertexAttribute::ALL {
            let locations = attribute.declaration().locations();
            for location in locations {
                assert!(!occupied.contains(&location));
                occupied.push(location);
            }
        }
        assert_eq!(occupied.len(), 13);
    }

    #[test]
    fn tangent_space_requires_normals_as_well() {
        let geometry = GeometryDescription::new("quad", GeometryFlags::TANGENT_SPACE);
        assert!(!geometry.has_tangent_space());
        let geometry = GeometryDescription::new(
            "quad",
            GeometryFlags::TANGENT_SPACE | GeometryFlags::NORMALS,
        );
        assert!(geometry.has_tangent_space());
    }
}
