//! Shader stages under construction and the shaders they produce.

use crate::{
    binding::ShaderStageFlags,
    code::{Code, CodeZone},
    declaration::{
        Declaration, DeclarationCategory, InterfaceDirection, OutputFragment, PushConstantBlock,
        Sampler, StageInput, StageOutput, UniformBlock,
    },
    glsl::{self, GlslType},
    synthesis::SynthesizedVariable,
};
use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use std::fmt;

/// A programmable stage of the graphics pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ShaderStageKind {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
}

/// The lines opening every generated shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlslHeader {
    pub version: u32,
    pub profile: String,
    /// Extension names paired with their behavior, e.g. `enable`.
    pub extensions: Vec<(String, String)>,
}

/// A shader stage under construction.
///
/// The stage owns the registry of everything declared at global scope, the
/// three [`CodeZone`]s of its `main` function and the record of variables
/// synthesized into it. Calling [`finish`](Self::finish) emits the GLSL
/// source and consumes the stage.
#[derive(Debug)]
pub struct ShaderStage {
    kind: ShaderStageKind,
    name: String,
    header: GlslHeader,
    declarations: Vec<Declaration>,
    synthesized: Vec<SynthesizedVariable>,
    top: String,
    main: String,
    output: String,
}

/// The immutable result of finishing a [`ShaderStage`].
#[derive(Clone, Debug)]
pub struct GeneratedShader {
    kind: ShaderStageKind,
    name: String,
    source: String,
    declarations: Vec<Declaration>,
}

impl ShaderStageKind {
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Vertex => "Vertex shader",
            Self::TessellationControl => "Tessellation control shader",
            Self::TessellationEvaluation => "Tessellation evaluation shader",
            Self::Geometry => "Geometry shader",
            Self::Fragment => "Fragment shader",
        }
    }

    /// Returns the conventional file extension for sources of this stage.
    pub const fn file_extension(&self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::TessellationControl => "tesc",
            Self::TessellationEvaluation => "tese",
            Self::Geometry => "geom",
            Self::Fragment => "frag",
        }
    }

    pub const fn flags(&self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::TessellationControl => "tessellation control",
            Self::TessellationEvaluation => "tessellation evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

impl Default for GlslHeader {
    fn default() -> Self {
        Self {
            version: 450,
            profile: "core".to_string(),
            extensions: vec![(
                "GL_ARB_separate_shader_objects".to_string(),
                "enable".to_string(),
            )],
        }
    }
}

impl ShaderStage {
    /// Creates an empty stage of the given kind.
    pub fn new(kind: ShaderStageKind, name: impl Into<String>, header: GlslHeader) -> Self {
        Self {
            kind,
            name: name.into(),
            header,
            declarations: Vec::new(),
            synthesized: Vec::new(),
            top: String::new(),
            main: String::new(),
            output: String::new(),
        }
    }

    pub fn kind(&self) -> ShaderStageKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all declarations in the order they were made.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Returns the declaration with the given name.
    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name() == name)
    }

    /// Whether exactly the given declaration has been made.
    pub fn contains_declaration(&self, declaration: &Declaration) -> bool {
        self.declaration(declaration.name()) == Some(declaration)
    }

    /// Returns the stage input with the given name.
    pub fn stage_input(&self, name: &str) -> Option<&StageInput> {
        match self.declaration(name) {
            Some(Declaration::StageInput(input)) => Some(input),
            _ => None,
        }
    }

    /// Returns the uniform block declared at the given set and binding.
    pub fn uniform_block(&self, set: u32, binding: u32) -> Option<&UniformBlock> {
        find_uniform_block(&self.declarations, set, binding)
    }

    /// Adds the given declaration to the stage.
    ///
    /// Declaring something identical to an existing declaration does
    /// nothing. On failure the stage is left unchanged.
    ///
    /// # Errors
    /// Returns an error if
    /// - the declaration is not allowed in this kind of stage.
    /// - the name is not a valid identifier.
    /// - a different declaration with the same name or block type name
    ///   exists.
    /// - the set and binding or any location is already taken.
    /// - a second push constant block is declared.
    pub fn declare(&mut self, declaration: impl Into<Declaration>) -> Result<()> {
        let declaration = declaration.into();
        self.check_allowed_in_stage(&declaration)?;

        let name = declaration.name();
        if !glsl::is_valid_identifier(name) {
            bail!(
                "Invalid name `{}` declared in {} stage `{}`",
                name,
                self.kind,
                self.name
            );
        }

        if let Some(existing) = self.declaration(name) {
            if *existing == declaration {
                log::warn!(
                    "Identical redeclaration of `{}` in {} stage `{}`",
                    name,
                    self.kind,
                    self.name
                );
                return Ok(());
            }
            bail!(
                "Conflicting declarations of `{}` in {} stage `{}`",
                name,
                self.kind,
                self.name
            );
        }

        for existing in &self.declarations {
            if let (Some(type_name), Some(existing_type_name)) =
                (declaration.block_type_name(), existing.block_type_name())
            {
                if type_name == existing_type_name {
                    bail!(
                        "Block type `{}` declared twice in {} stage `{}`",
                        type_name,
                        self.kind,
                        self.name
                    );
                }
            }
            if let (Some(binding), Some(existing_binding)) =
                (declaration.resource_binding(), existing.resource_binding())
            {
                if binding == existing_binding {
                    bail!(
                        "`{}` and `{}` both bound at set {} binding {} in {} stage `{}`",
                        existing.name(),
                        name,
                        binding.set,
                        binding.binding,
                        self.kind,
                        self.name
                    );
                }
            }
            if let (Some((direction, locations)), Some((existing_direction, existing_locations))) =
                (declaration.interface_locations(), existing.interface_locations())
            {
                if direction == existing_direction
                    && locations.start < existing_locations.end
                    && existing_locations.start < locations.end
                {
                    bail!(
                        "`{}` at locations {:?} overlaps `{}` at locations {:?} in {} stage `{}`",
                        name,
                        locations,
                        existing.name(),
                        existing_locations,
                        self.kind,
                        self.name
                    );
                }
            }
            if matches!(declaration, Declaration::PushConstantBlock(_))
                && matches!(existing, Declaration::PushConstantBlock(_))
            {
                bail!(
                    "Second push constant block `{}` declared in {} stage `{}`",
                    name,
                    self.kind,
                    self.name
                );
            }
        }

        self.declarations.push(declaration);
        Ok(())
    }

    /// Declares the default color output of a fragment stage, a `vec4` at
    /// location zero.
    ///
    /// # Errors
    /// See [`declare`](Self::declare).
    pub fn declare_default_output_fragment(&mut self) -> Result<()> {
        self.declare(OutputFragment::new(
            0,
            GlslType::Vec4,
            glsl::variable::OUTPUT_FRAGMENT,
        ))
    }

    /// Returns the lowest location in the given direction where `count`
    /// consecutive locations are free.
    pub fn next_free_location(&self, direction: InterfaceDirection, count: u32) -> u32 {
        let mut occupied: Vec<_> = self
            .declarations
            .iter()
            .filter_map(Declaration::interface_locations)
            .filter(|(declared_direction, _)| *declared_direction == direction)
            .map(|(_, locations)| locations)
            .collect();
        occupied.sort_by_key(|locations| locations.start);

        let mut candidate = 0;
        for locations in occupied {
            if candidate + count <= locations.start {
                break;
            }
            candidate = candidate.max(locations.end);
        }
        candidate
    }

    /// Declares a stage input matching every output of the given previous
    /// stage, with the same location, type and name.
    ///
    /// # Errors
    /// Returns an error if the given stage does not precede this stage in
    /// the pipeline or if an input can not be declared.
    pub fn connect_from_previous_stage(&mut self, previous: &GeneratedShader) -> Result<()> {
        if previous.kind() >= self.kind {
            bail!(
                "Can not connect {} stage `{}` to {} stage `{}`",
                previous.kind(),
                previous.name(),
                self.kind,
                self.name
            );
        }
        for declaration in previous.declarations() {
            match declaration {
                Declaration::StageOutput(output) => self.declare(output.matching_input())?,
                Declaration::OutputBlock(block) => {
                    self.declare(Declaration::InputBlock(block.clone()))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns a builder appending code to the given zone of `main`.
    pub fn code(&mut self, zone: CodeZone) -> Code<'_> {
        let target = match zone {
            CodeZone::Top => &mut self.top,
            CodeZone::Main => &mut self.main,
            CodeZone::Output => &mut self.output,
        };
        Code::new(target, 1)
    }

    /// Emits the GLSL source of the stage.
    ///
    /// # Errors
    /// Returns an error if a vertex stage does not write `gl_Position` or a
    /// fragment stage neither declares an output fragment nor writes
    /// `gl_FragDepth`.
    pub fn finish(self) -> Result<GeneratedShader> {
        match self.kind {
            ShaderStageKind::Vertex if !self.writes(glsl::builtin::POSITION) => bail!(
                "Vertex stage `{}` never assigns `{}`",
                self.name,
                glsl::builtin::POSITION
            ),
            ShaderStageKind::Fragment
                if !self.writes(glsl::builtin::FRAGMENT_DEPTH)
                    && !self
                        .declarations
                        .iter()
                        .any(|declaration| matches!(declaration, Declaration::OutputFragment(_))) =>
            {
                bail!("Fragment stage `{}` declares no output fragment", self.name)
            }
            _ => {}
        }

        let source = self.render_source();
        log::trace!("Generated {} stage `{}`:\n{}", self.kind, self.name, source);

        Ok(GeneratedShader {
            kind: self.kind,
            name: self.name,
            source,
            declarations: self.declarations,
        })
    }

    pub(crate) fn synthesized_variable(&self, name: &str) -> Option<&SynthesizedVariable> {
        self.synthesized.iter().find(|variable| variable.name == name)
    }

    pub(crate) fn synthesized_variable_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut SynthesizedVariable> {
        self.synthesized
            .iter_mut()
            .find(|variable| variable.name == name)
    }

    pub(crate) fn record_synthesized_variable(&mut self, variable: SynthesizedVariable) {
        self.synthesized.push(variable);
    }

    fn writes(&self, builtin: &str) -> bool {
        self.synthesized
            .iter()
            .any(|variable| variable.name == builtin)
            || [&self.top, &self.main, &self.output]
                .iter()
                .any(|zone| zone.contains(builtin))
    }

    fn check_allowed_in_stage(&self, declaration: &Declaration) -> Result<()> {
        let allowed = match declaration {
            Declaration::InputAttribute(_) => self.kind == ShaderStageKind::Vertex,
            Declaration::StageInput(_) | Declaration::InputBlock(_) => {
                self.kind != ShaderStageKind::Vertex
            }
            Declaration::OutputFragment(_) => self.kind == ShaderStageKind::Fragment,
            Declaration::StageOutput(_) | Declaration::OutputBlock(_) => {
                self.kind != ShaderStageKind::Fragment
            }
            _ => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(anyhow!(
                "{:?} `{}` can not be declared in {} stage `{}`",
                declaration.category(),
                declaration.name(),
                self.kind,
                self.name
            ))
        }
    }

    fn render_source(&self) -> String {
        let mut source = format!(
            "#version {} {}\n",
            self.header.version, self.header.profile
        );
        for (extension, behavior) in &self.header.extensions {
            source.push_str(&format!("#extension {} : {}\n", extension, behavior));
        }
        source.push_str(&format!("\n/* {} : {} */\n\n", self.kind.title(), self.name));

        for category in DeclarationCategory::ALL {
            let mut declarations = self
                .declarations
                .iter()
                .filter(|declaration| declaration.category() == category)
                .peekable();
            if declarations.peek().is_none() {
                continue;
            }
            for declaration in declarations {
                source.push_str(&format!("{}\n", declaration));
            }
            source.push('\n');
        }

        let mut synthesized = String::new();
        {
            let mut code = Code::new(&mut synthesized, 1);
            for variable in &self.synthesized {
                variable.render(&mut code);
            }
        }
        synthesized.push_str(&self.top);

        source.push_str("void main ()\n{\n");
        let zones = [
            synthesized.as_str(),
            self.main.as_str(),
            self.output.as_str(),
        ];
        let mut zones = zones.into_iter().filter(|zone| !zone.is_empty()).peekable();
        while let Some(zone) = zones.next() {
            source.push_str(zone);
            if zones.peek().is_some() {
                source.push('\n');
            }
        }
        source.push_str("}\n");
        source
    }
}

impl GeneratedShader {
    pub fn kind(&self) -> ShaderStageKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the complete GLSL source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Returns the uniform block declared at the given set and binding.
    pub fn uniform_block(&self, set: u32, binding: u32) -> Option<&UniformBlock> {
        find_uniform_block(&self.declarations, set, binding)
    }

    pub fn uniform_blocks(&self) -> impl Iterator<Item = &UniformBlock> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::UniformBlock(block) => Some(block),
            _ => None,
        })
    }

    pub fn samplers(&self) -> impl Iterator<Item = &Sampler> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::Sampler(sampler) => Some(sampler),
            _ => None,
        })
    }

    pub fn push_constant_blocks(&self) -> impl Iterator<Item = &PushConstantBlock> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::PushConstantBlock(block) => Some(block),
            _ => None,
        })
    }

    pub fn stage_inputs(&self) -> impl Iterator<Item = &StageInput> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::StageInput(input) => Some(input),
            _ => None,
        })
    }

    pub fn stage_outputs(&self) -> impl Iterator<Item = &StageOutput> {
        self.declarations.iter().filter_map(|declaration| match declaration {
            Declaration::StageOutput(output) => Some(output),
            _ => None,
        })
    }

    /// Checks that every output of this shader is received by an input of
    /// the given next shader with the same location, type and name, and
    /// that every input of the next shader is fed by such an output.
    ///
    /// # Errors
    /// Returns an error naming the first unmatched variable.
    pub fn check_interface_with(&self, next: &GeneratedShader) -> Result<()> {
        for output in self.stage_outputs() {
            let input = output.matching_input();
            if !next.stage_inputs().any(|candidate| *candidate == input) {
                bail!(
                    "Output `{}` of {} stage `{}` has no matching input in {} stage `{}`",
                    output.name(),
                    self.kind,
                    self.name,
                    next.kind,
                    next.name
                );
            }
        }
        for input in next.stage_inputs() {
            if !self
                .stage_outputs()
                .any(|output| output.matching_input() == *input)
            {
                bail!(
                    "Input `{}` of {} stage `{}` is not written by {} stage `{}`",
                    input.name(),
                    next.kind,
                    next.name,
                    self.kind,
                    self.name
                );
            }
        }
        Ok(())
    }
}

fn find_uniform_block(declarations: &[Declaration], set: u32, binding: u32) -> Option<&UniformBlock> {
    declarations.iter().find_map(|declaration| match declaration {
        Declaration::UniformBlock(block) if block.set() == set && block.binding() == binding => {
            Some(block)
        }
        _ => None,
    })
}
