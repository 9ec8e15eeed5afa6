//! GLSL types, qualifiers and the naming conventions used in generated
//! shaders.

use serde::Serialize;
use std::fmt;

/// A GLSL type that can appear as a block member, vertex attribute or
/// interstage variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum GlslType {
    Bool,
    Int,
    UInt,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    Mat2,
    Mat3,
    Mat4,
}

/// A GLSL opaque sampler type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SamplerType {
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler2DShadow,
    SamplerCubeShadow,
    Sampler2DArray,
}

/// Rules for laying out the members of a block in memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MemoryLayout {
    /// The layout used for uniform blocks.
    Std140,
    /// The layout used for push constant blocks.
    Std430,
}

/// How an interstage variable is interpolated across a primitive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Interpolation {
    #[default]
    Smooth,
    Flat,
    NoPerspective,
}

impl GlslType {
    /// Returns the GLSL keyword for the type.
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::IVec2 => "ivec2",
            Self::IVec3 => "ivec3",
            Self::IVec4 => "ivec4",
            Self::UVec2 => "uvec2",
            Self::UVec3 => "uvec3",
            Self::UVec4 => "uvec4",
            Self::Mat2 => "mat2",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
        }
    }

    /// Returns the number of scalar components in one vector or matrix
    /// column of the type.
    pub const fn column_components(&self) -> usize {
        match self {
            Self::Bool | Self::Int | Self::UInt | Self::Float => 1,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::Mat2 => 2,
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::Mat3 => 3,
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::Mat4 => 4,
        }
    }

    /// Returns the number of columns, which is one for anything that is not
    /// a matrix.
    pub const fn column_count(&self) -> usize {
        match self {
            Self::Mat2 => 2,
            Self::Mat3 => 3,
            Self::Mat4 => 4,
            _ => 1,
        }
    }

    /// Whether the type is a matrix.
    pub const fn is_matrix(&self) -> bool {
        self.column_count() > 1
    }

    /// Whether values of this type must be passed between stages with flat
    /// interpolation.
    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::UInt
                | Self::IVec2
                | Self::IVec3
                | Self::IVec4
                | Self::UVec2
                | Self::UVec3
                | Self::UVec4
        )
    }

    /// Returns the number of interface locations a variable of this type
    /// occupies. Every matrix column takes a location of its own.
    pub const fn location_count(&self) -> u32 {
        self.column_count() as u32
    }

    /// Returns the required byte alignment of the type under the given
    /// memory layout.
    pub const fn alignment(&self, layout: MemoryLayout) -> usize {
        if self.is_matrix() {
            match (layout, self.column_components()) {
                (MemoryLayout::Std430, 2) => 8,
                _ => 16,
            }
        } else {
            Self::vector_alignment(self.column_components())
        }
    }

    /// Returns the number of bytes the type occupies under the given memory
    /// layout, including the padding of matrix columns.
    pub const fn size(&self, layout: MemoryLayout) -> usize {
        if self.is_matrix() {
            self.alignment(layout) * self.column_count()
        } else {
            4 * self.column_components()
        }
    }

    const fn vector_alignment(components: usize) -> usize {
        match components {
            1 => 4,
            2 => 8,
            _ => 16,
        }
    }
}

impl fmt::Display for GlslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl SamplerType {
    /// Returns the GLSL keyword for the sampler type.
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Sampler2D => "sampler2D",
            Self::Sampler3D => "sampler3D",
            Self::SamplerCube => "samplerCube",
            Self::Sampler2DShadow => "sampler2DShadow",
            Self::SamplerCubeShadow => "samplerCubeShadow",
            Self::Sampler2DArray => "sampler2DArray",
        }
    }
}

impl fmt::Display for SamplerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl MemoryLayout {
    /// Returns the alignment the total size of a block is rounded up to,
    /// given the largest alignment among its members.
    pub const fn block_alignment(&self, max_member_alignment: usize) -> usize {
        match self {
            Self::Std140 => 16,
            Self::Std430 => max_member_alignment,
        }
    }
}

impl Interpolation {
    /// Returns the qualifier to put in front of a declaration, which is
    /// empty for the default smooth interpolation.
    pub const fn qualifier(&self) -> &'static str {
        match self {
            Self::Smooth => "",
            Self::Flat => "flat ",
            Self::NoPerspective => "noperspective ",
        }
    }
}

/// Words that can not be used as the name of a declaration.
pub const RESERVED_WORDS: &[&str] = &[
    "attribute", "bool", "break", "buffer", "bvec2", "bvec3", "bvec4", "case", "centroid",
    "const", "continue", "default", "discard", "do", "else", "false", "flat", "float", "for",
    "highp", "if", "in", "inout", "int", "invariant", "ivec2", "ivec3", "ivec4", "layout",
    "lowp", "main", "mat2", "mat3", "mat4", "mediump", "noperspective", "out", "precision",
    "return", "sampler2D", "sampler2DShadow", "sampler3D", "samplerCube", "shared", "smooth",
    "struct", "switch", "true", "uint", "uniform", "uvec2", "uvec3", "uvec4", "varying", "vec2",
    "vec3", "vec4", "void", "while",
];

/// Whether the given name can be used for a declaration. Names must be
/// non-empty identifiers that are neither reserved words nor in the `gl_`
/// namespace.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("gl_")
        && !RESERVED_WORDS.contains(&name)
}

/// Names of vertex attributes (`va` prefix).
pub mod attribute {
    pub const POSITION: &str = "vaVertex";
    pub const TANGENT: &str = "vaTangent";
    pub const BINORMAL: &str = "vaBinormal";
    pub const NORMAL: &str = "vaNormal";
    pub const PRIMARY_2D_TEXTURE_COORDINATES: &str = "va2DTexCoord0";
    pub const PRIMARY_3D_TEXTURE_COORDINATES: &str = "va3DTexCoord0";
    pub const SECONDARY_2D_TEXTURE_COORDINATES: &str = "va2DTexCoord1";
    pub const SECONDARY_3D_TEXTURE_COORDINATES: &str = "va3DTexCoord1";
    pub const COLOR: &str = "vaColor";
    pub const MODEL_MATRIX: &str = "vaModelMatrix";
}

/// Names of synthesized shader variables (`sv` prefix).
pub mod variable {
    pub const MODEL_MATRIX: &str = "svModelMatrix";
    pub const POSITION_WORLD_SPACE: &str = "svPositionWorldSpace";
    pub const POSITION_VIEW_SPACE: &str = "svPositionViewSpace";
    pub const POSITION_LIGHT_SPACE: &str = "svPositionLightSpace";
    pub const NORMAL_WORLD_SPACE: &str = "svNormalWorldSpace";
    pub const TANGENT_WORLD_SPACE: &str = "svTangentWorldSpace";
    pub const BINORMAL_WORLD_SPACE: &str = "svBinormalWorldSpace";
    pub const WORLD_TBN_MATRIX: &str = "svWorldTBNMatrix";
    pub const COLOR: &str = "svColor";
    pub const PRIMARY_2D_TEXTURE_COORDINATES: &str = "svPrimary2DTextureCoordinates";
    pub const PRIMARY_3D_TEXTURE_COORDINATES: &str = "svPrimary3DTextureCoordinates";
    pub const SECONDARY_2D_TEXTURE_COORDINATES: &str = "svSecondary2DTextureCoordinates";
    pub const SECONDARY_3D_TEXTURE_COORDINATES: &str = "svSecondary3DTextureCoordinates";
    pub const VIEW_DIRECTION_WORLD_SPACE: &str = "svViewDirectionWorldSpace";
    pub const SURFACE_NORMAL: &str = "svSurfaceNormal";
    pub const LIGHT_VECTOR: &str = "svLightVector";
    pub const LIGHT_DIRECTION: &str = "svLightDirection";
    pub const LIGHT_ATTENUATION: &str = "svLightAttenuation";
    pub const SPOT_FACTOR: &str = "svSpotFactor";
    pub const SHADOW_FACTOR: &str = "svShadowFactor";
    pub const LIGHT_INTENSITY: &str = "svLightIntensity";
    pub const DIFFUSE_FACTOR: &str = "svDiffuseFactor";
    pub const REFLECTED_LIGHT: &str = "svReflectedLight";
    pub const SPECULAR_COSINE: &str = "svSpecularCosine";
    pub const LIGHT_DIFFUSE: &str = "svLightDiffuse";
    pub const LIGHT_SPECULAR: &str = "svLightSpecular";
    pub const OUTPUT_FRAGMENT: &str = "svOutputFragment";
}

/// Names of built-in variables.
pub mod builtin {
    pub const POSITION: &str = "gl_Position";
    pub const FRAGMENT_DEPTH: &str = "gl_FragDepth";
}

/// Instance and type names of uniform and push constant blocks (`ub` and
/// `pc` prefixes).
pub mod block {
    pub const VIEW: &str = "ubView";
    pub const VIEW_TYPE: &str = "ViewBlock";
    pub const MATERIAL: &str = "ubMaterial";
    pub const STANDARD_MATERIAL_TYPE: &str = "MaterialBlock";
    pub const BASIC_MATERIAL_TYPE: &str = "BasicMaterialBlock";
    pub const LIGHT: &str = "ubLight";
    pub const DIRECTIONAL_LIGHT_TYPE: &str = "DirectionalLightBlock";
    pub const POINT_LIGHT_TYPE: &str = "PointLightBlock";
    pub const SPOT_LIGHT_TYPE: &str = "SpotLightBlock";
    pub const MATRICES: &str = "pcMatrices";
    pub const MATRICES_TYPE: &str = "MatricesBlock";
    pub const OVERLAY: &str = "pcOverlay";
    pub const OVERLAY_TYPE: &str = "OverlayBlock";
}

/// Names of samplers (`su` prefix).
pub mod sampler {
    pub const AMBIENT: &str = "suAmbient";
    pub const DIFFUSE: &str = "suDiffuse";
    pub const SPECULAR: &str = "suSpecular";
    pub const OPACITY: &str = "suOpacity";
    pub const AUTO_ILLUMINATION: &str = "suAutoIllumination";
    pub const NORMAL: &str = "suNormal";
    pub const REFLECTION: &str = "suReflection";
    pub const PRIMARY: &str = "suPrimary";
    pub const SHADOW_MAP: &str = "suShadowMap";
}
