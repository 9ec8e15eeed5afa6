//! Standard rules for the vertex stage.

use crate::{
    declaration::PushConstantBlock,
    geometry::{GeometryFlags, VertexAttribute},
    glsl::{GlslType, block, builtin, variable},
    synthesis::{SynthesisGraph, SynthesisRule},
    view,
};
use anyhow::Result;

/// How the vertex stage obtains the matrices transforming vertex positions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    /// A single premultiplied model-view-projection matrix. World-space
    /// quantities are not available.
    ModelViewProjection,
    /// Separate model and view matrices, with the projection taken from the
    /// view uniform block, so world-space quantities can be synthesized.
    Advanced,
}

/// Creates the `pcMatrices` push constant block for the given matrix mode.
/// With instancing, the model matrix comes from a vertex attribute instead.
///
/// # Errors
/// Returns an error if the block can not be built.
pub fn matrices_block(mode: MatrixMode, instanced: bool) -> Result<PushConstantBlock> {
    let block = PushConstantBlock::new(block::MATRICES_TYPE, block::MATRICES);
    match (mode, instanced) {
        (MatrixMode::ModelViewProjection, false) => {
            block.with_member(GlslType::Mat4, "modelViewProjectionMatrix")
        }
        (MatrixMode::Advanced, false) => block
            .with_member(GlslType::Mat4, "viewMatrix")?
            .with_member(GlslType::Mat4, "modelMatrix"),
        (MatrixMode::ModelViewProjection, true) => {
            block.with_member(GlslType::Mat4, "viewProjectionMatrix")
        }
        (MatrixMode::Advanced, true) => block.with_member(GlslType::Mat4, "viewMatrix"),
    }
}

/// Registers the rules for positions, normals, tangent space, vertex colors
/// and texture coordinates in the given vertex stage graph.
///
/// In [`MatrixMode::ModelViewProjection`] only the clip-space position and
/// pass-through attributes are available.
///
/// # Errors
/// Returns an error if a rule conflicts with one already registered.
pub fn register_vertex_rules(
    graph: &mut SynthesisGraph,
    mode: MatrixMode,
    instanced: bool,
) -> Result<()> {
    let matrices = matrices_block(mode, instanced)?;
    let position = VertexAttribute::Position.declaration();

    match mode {
        MatrixMode::ModelViewProjection => {
            let rule = if instanced {
                SynthesisRule::builtin(
                    builtin::POSITION,
                    GlslType::Vec4,
                    "pcMatrices.viewProjectionMatrix * vaModelMatrix * vec4(vaVertex, 1.0)",
                )
                .with_declaration(VertexAttribute::ModelMatrix.declaration())
            } else {
                SynthesisRule::builtin(
                    builtin::POSITION,
                    GlslType::Vec4,
                    "pcMatrices.modelViewProjectionMatrix * vec4(vaVertex, 1.0)",
                )
            };
            graph.register(
                rule.with_declaration(matrices.clone())
                    .with_declaration(position.clone()),
            )?;
        }
        MatrixMode::Advanced => {
            register_world_space_rules(graph, &matrices, instanced)?;
        }
    }

    graph.register(
        SynthesisRule::computed(variable::COLOR, GlslType::Vec4, "vaColor")
            .with_declaration(VertexAttribute::Color.declaration())
            .requiring(GeometryFlags::VERTEX_COLOR),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::PRIMARY_2D_TEXTURE_COORDINATES,
            GlslType::Vec2,
            "va2DTexCoord0",
        )
        .with_declaration(VertexAttribute::Primary2DTextureCoordinates.declaration())
        .requiring(GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::SECONDARY_2D_TEXTURE_COORDINATES,
            GlslType::Vec2,
            "va2DTexCoord1",
        )
        .with_declaration(VertexAttribute::Secondary2DTextureCoordinates.declaration())
        .requiring(GeometryFlags::SECONDARY_2D_TEXTURE_COORDINATES),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::SECONDARY_3D_TEXTURE_COORDINATES,
            GlslType::Vec3,
            "va3DTexCoord1",
        )
        .with_declaration(VertexAttribute::Secondary3DTextureCoordinates.declaration())
        .requiring(GeometryFlags::SECONDARY_3D_TEXTURE_COORDINATES),
    )?;

    // Without mesh coordinates, 3D textures are looked up procedurally with
    // the object-space position
    let primary_3d = if graph
        .capabilities()
        .contains(GeometryFlags::PRIMARY_3D_TEXTURE_COORDINATES)
    {
        SynthesisRule::computed(
            variable::PRIMARY_3D_TEXTURE_COORDINATES,
            GlslType::Vec3,
            "va3DTexCoord0",
        )
        .with_declaration(VertexAttribute::Primary3DTextureCoordinates.declaration())
    } else {
        SynthesisRule::computed(
            variable::PRIMARY_3D_TEXTURE_COORDINATES,
            GlslType::Vec3,
            "vaVertex",
        )
        .with_declaration(position)
    };
    graph.register(primary_3d)
}

fn register_world_space_rules(
    graph: &mut SynthesisGraph,
    matrices: &PushConstantBlock,
    instanced: bool,
) -> Result<()> {
    let model_matrix = if instanced {
        SynthesisRule::computed(variable::MODEL_MATRIX, GlslType::Mat4, "vaModelMatrix")
            .with_declaration(VertexAttribute::ModelMatrix.declaration())
    } else {
        SynthesisRule::computed(
            variable::MODEL_MATRIX,
            GlslType::Mat4,
            "pcMatrices.modelMatrix",
        )
        .with_declaration(matrices.clone())
    };
    graph.register(model_matrix)?;

    graph.register(
        SynthesisRule::computed(
            variable::POSITION_WORLD_SPACE,
            GlslType::Vec4,
            "svModelMatrix * vec4(vaVertex, 1.0)",
        )
        .with_prerequisites(&[variable::MODEL_MATRIX])
        .with_declaration(VertexAttribute::Position.declaration()),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::POSITION_VIEW_SPACE,
            GlslType::Vec4,
            "pcMatrices.viewMatrix * svPositionWorldSpace",
        )
        .with_prerequisites(&[variable::POSITION_WORLD_SPACE])
        .with_declaration(matrices.clone()),
    )?;
    graph.register(
        SynthesisRule::builtin(
            builtin::POSITION,
            GlslType::Vec4,
            "ubView.projectionMatrix * svPositionViewSpace",
        )
        .with_prerequisites(&[variable::POSITION_VIEW_SPACE])
        .with_declaration(view::view_uniform_block()?),
    )?;

    graph.register(
        SynthesisRule::computed(
            variable::NORMAL_WORLD_SPACE,
            GlslType::Vec3,
            "normalize((svModelMatrix * vec4(vaNormal, 0.0)).xyz)",
        )
        .with_prerequisites(&[variable::MODEL_MATRIX])
        .with_declaration(VertexAttribute::Normal.declaration())
        .requiring(GeometryFlags::NORMALS),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::TANGENT_WORLD_SPACE,
            GlslType::Vec3,
            "normalize((svModelMatrix * vec4(vaTangent, 0.0)).xyz)",
        )
        .with_prerequisites(&[variable::MODEL_MATRIX])
        .with_declaration(VertexAttribute::Tangent.declaration())
        .requiring(GeometryFlags::TANGENT_SPACE),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::BINORMAL_WORLD_SPACE,
            GlslType::Vec3,
            "normalize((svModelMatrix * vec4(vaBinormal, 0.0)).xyz)",
        )
        .with_prerequisites(&[variable::MODEL_MATRIX])
        .with_declaration(VertexAttribute::Binormal.declaration())
        .requiring(GeometryFlags::TANGENT_SPACE),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::WORLD_TBN_MATRIX,
            GlslType::Mat3,
            "mat3(svTangentWorldSpace, svBinormalWorldSpace, svNormalWorldSpace)",
        )
        .with_prerequisites(&[
            variable::TANGENT_WORLD_SPACE,
            variable::BINORMAL_WORLD_SPACE,
            variable::NORMAL_WORLD_SPACE,
        ])
        .requiring(GeometryFlags::NORMALS | GeometryFlags::TANGENT_SPACE),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::VIEW_DIRECTION_WORLD_SPACE,
            GlslType::Vec3,
            "normalize(ubView.positionWorldSpace.xyz - svPositionWorldSpace.xyz)",
        )
        .with_prerequisites(&[variable::POSITION_WORLD_SPACE])
        .with_declaration(view::view_uniform_block()?),
    )
}
