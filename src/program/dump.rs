//! Writing generated sources to disk for inspection.

use crate::{
    program::{Program, ProgramCacheKey},
    stage::{GeneratedShader, ShaderStageKind},
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Returns the path the given stage of a program with the given name and
/// fingerprint is dumped to. Characters that are unsafe in file names are
/// replaced by underscores.
pub fn dump_path(
    directory: &Path,
    program_name: &str,
    fingerprint: u64,
    stage: ShaderStageKind,
) -> PathBuf {
    let sanitized: String = program_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let extension = match stage {
        ShaderStageKind::Vertex => "vert",
        ShaderStageKind::TessellationControl => "tesc",
        ShaderStageKind::TessellationEvaluation => "tese",
        ShaderStageKind::Geometry => "geom",
        ShaderStageKind::Fragment => "frag",
    };
    directory.join(format!("{}_{:016x}.{}", sanitized, fingerprint, extension))
}

/// Writes the source of both stages of the given program to the given
/// directory, creating it if needed.
///
/// # Errors
/// Returns an error if the directory can not be created or a file can not
/// be written.
pub fn dump_program(program: &Program, directory: &Path) -> Result<()> {
    dump_shaders(program.key(), [program.vertex(), program.fragment()], directory)
}

/// Writes the source of the given stages of the program cached under the
/// given key to the given directory, creating it if needed.
pub(super) fn dump_shaders(
    key: &ProgramCacheKey,
    shaders: [&GeneratedShader; 2],
    directory: &Path,
) -> Result<()> {
    fs::create_dir_all(directory).with_context(|| {
        format!(
            "Failed to create shader dump directory {}",
            directory.display()
        )
    })?;

    let fingerprint = key.fingerprint();
    for shader in shaders {
        let path = dump_path(directory, &key.name, fingerprint, shader.kind());
        fs::write(&path, shader.source())
            .with_context(|| format!("Failed to write shader source to {}", path.display()))?;
        log::debug!("Wrote {} stage source to {}", shader.kind(), path.display());
    }
    Ok(())
}
