//! On-demand synthesis of shader variables from declarative rules.
//!
//! A [`SynthesisGraph`] holds one [`SynthesisRule`] per variable name. A
//! rule names the variables it is computed from, the declarations it needs
//! and the geometry capabilities it requires. Requesting a variable
//! synthesizes its prerequisites first, so instructions end up in the stage
//! in dependency order, and every variable is synthesized at most once per
//! stage.

mod fragment;
mod vertex;

pub use fragment::{register_fragment_rules, surface_normal_rule};
pub use vertex::{MatrixMode, matrices_block, register_vertex_rules};

use crate::{
    code::Code,
    declaration::{Declaration, InterfaceDirection, StageOutput},
    geometry::{GeometryDescription, GeometryFlags},
    glsl::{GlslType, Interpolation},
    stage::{ShaderStage, ShaderStageKind},
};
use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;

/// Where a synthesized variable is visible.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A constant local to `main`.
    Local,
    /// A stage output passed on to the next stage.
    Exported,
}

/// How the value of a variable is obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SynthesisKind {
    /// Evaluated from an expression.
    Computed { expression: String },
    /// Assigned to a built-in variable such as `gl_Position`.
    Builtin { expression: String },
    /// Received as an input from the previous stage.
    PreviousStage,
}

/// A recipe for synthesizing one variable.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRule {
    name: String,
    glsl_type: GlslType,
    prerequisites: Vec<String>,
    declarations: Vec<Declaration>,
    statements: Vec<String>,
    required_capabilities: GeometryFlags,
    interpolation: Interpolation,
    kind: SynthesisKind,
}

/// The rules available for synthesizing variables in one stage, for one
/// geometry.
#[derive(Debug)]
pub struct SynthesisGraph {
    stage_kind: ShaderStageKind,
    geometry_name: String,
    capabilities: GeometryFlags,
    rules: HashMap<String, SynthesisRule>,
}

/// The record a stage keeps of a variable synthesized into it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SynthesizedVariable {
    pub(crate) name: String,
    pub(crate) glsl_type: GlslType,
    pub(crate) interpolation: Interpolation,
    pub(crate) statements: Vec<String>,
    pub(crate) assignment: Assignment,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Assignment {
    Local(String),
    Exported(String),
    Builtin(String),
    PreviousStage,
}

impl SynthesisRule {
    /// Creates a rule computing the named variable from the given
    /// expression.
    pub fn computed(
        name: impl Into<String>,
        glsl_type: GlslType,
        expression: impl Into<String>,
    ) -> Self {
        Self::new(
            name.into(),
            glsl_type,
            SynthesisKind::Computed {
                expression: expression.into(),
            },
        )
    }

    /// Creates a rule assigning the given expression to the named built-in
    /// variable.
    pub fn builtin(target: impl Into<String>, glsl_type: GlslType, expression: impl Into<String>) -> Self {
        Self::new(
            target.into(),
            glsl_type,
            SynthesisKind::Builtin {
                expression: expression.into(),
            },
        )
    }

    /// Creates a rule for a variable that must be received from the
    /// previous stage.
    pub fn from_previous_stage(name: impl Into<String>, glsl_type: GlslType) -> Self {
        Self::new(name.into(), glsl_type, SynthesisKind::PreviousStage)
    }

    fn new(name: String, glsl_type: GlslType, kind: SynthesisKind) -> Self {
        let interpolation = if glsl_type.is_integral() {
            Interpolation::Flat
        } else {
            Interpolation::Smooth
        };
        Self {
            name,
            glsl_type,
            prerequisites: Vec::new(),
            declarations: Vec::new(),
            statements: Vec::new(),
            required_capabilities: GeometryFlags::empty(),
            interpolation,
            kind,
        }
    }

    /// Makes the rule depend on the named variables, which are synthesized
    /// as locals before the rule is applied.
    pub fn with_prerequisites(mut self, names: &[&str]) -> Self {
        self.prerequisites
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    /// Makes the rule declare the given declaration when applied.
    pub fn with_declaration(mut self, declaration: impl Into<Declaration>) -> Self {
        self.declarations.push(declaration.into());
        self
    }

    /// Adds a statement emitted before the variable is assigned.
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statements.push(statement.into());
        self
    }

    /// Makes the rule require the given geometry capabilities.
    pub fn requiring(mut self, capabilities: GeometryFlags) -> Self {
        self.required_capabilities |= capabilities;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn glsl_type(&self) -> GlslType {
        self.glsl_type
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn kind(&self) -> &SynthesisKind {
        &self.kind
    }
}

impl SynthesisGraph {
    /// Creates a graph without rules for the given stage kind and geometry.
    pub fn new(stage_kind: ShaderStageKind, geometry: &GeometryDescription) -> Self {
        Self {
            stage_kind,
            geometry_name: geometry.name().to_string(),
            capabilities: geometry.flags(),
            rules: HashMap::new(),
        }
    }

    pub fn stage_kind(&self) -> ShaderStageKind {
        self.stage_kind
    }

    /// Returns the capabilities of the geometry the graph synthesizes for.
    pub fn capabilities(&self) -> GeometryFlags {
        self.capabilities
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn rule(&self, name: &str) -> Option<&SynthesisRule> {
        self.rules.get(name)
    }

    /// Adds the given rule to the graph. Registering an identical rule again
    /// does nothing.
    ///
    /// # Errors
    /// Returns an error if a different rule for the same variable exists.
    pub fn register(&mut self, rule: SynthesisRule) -> Result<()> {
        match self.rules.get(&rule.name) {
            Some(existing) if *existing == rule => Ok(()),
            Some(_) => Err(anyhow!(
                "Conflicting synthesis rules for `{}` in {} stage",
                rule.name,
                self.stage_kind
            )),
            None => {
                self.rules.insert(rule.name.clone(), rule);
                Ok(())
            }
        }
    }

    /// Synthesizes the named variable into the given stage with the given
    /// scope, along with everything it depends on.
    ///
    /// A variable already synthesized as a local and now requested as
    /// exported is promoted in place, so its instruction is never emitted
    /// twice.
    ///
    /// # Errors
    /// Returns an error if
    /// - no rule exists for the variable or one of its prerequisites.
    /// - the prerequisites form a cycle.
    /// - the geometry lacks a required capability.
    /// - a variable received from the previous stage is missing.
    /// - a variable is exported from a fragment stage.
    /// - a needed declaration conflicts with an existing one.
    pub fn synthesize(&self, stage: &mut ShaderStage, name: &str, scope: Scope) -> Result<()> {
        if stage.kind() != self.stage_kind {
            bail!(
                "Synthesis graph for {} stage used with {} stage `{}`",
                self.stage_kind,
                stage.kind(),
                stage.name()
            );
        }
        let mut path = Vec::new();
        self.synthesize_on_path(stage, name, scope, &mut path)
    }

    fn synthesize_on_path(
        &self,
        stage: &mut ShaderStage,
        name: &str,
        scope: Scope,
        path: &mut Vec<String>,
    ) -> Result<()> {
        if path.iter().any(|visited| visited == name) {
            bail!(
                "Cyclic dependency when synthesizing `{}` in {} stage: {} -> {}",
                name,
                self.stage_kind,
                path.join(" -> "),
                name
            );
        }

        if let Some(assignment) = stage
            .synthesized_variable(name)
            .map(|variable| variable.assignment.clone())
        {
            if scope == Scope::Exported {
                match assignment {
                    Assignment::Local(_) => self.promote_to_exported(stage, name)?,
                    Assignment::Exported(_) => {}
                    Assignment::Builtin(_) | Assignment::PreviousStage => bail!(
                        "`{}` can not be exported from {} stage `{}`",
                        name,
                        self.stage_kind,
                        stage.name()
                    ),
                }
            }
            return Ok(());
        }

        let rule = self.rules.get(name).ok_or_else(|| {
            anyhow!(
                "No way to synthesize `{}` in {} stage `{}`",
                name,
                self.stage_kind,
                stage.name()
            )
        })?;

        let missing = rule.required_capabilities.difference(self.capabilities);
        if !missing.is_empty() {
            bail!(
                "Geometry `{}` lacks {:?} needed to synthesize `{}` in {} stage",
                self.geometry_name,
                missing,
                name,
                self.stage_kind
            );
        }

        path.push(name.to_string());
        for prerequisite in &rule.prerequisites {
            self.synthesize_on_path(stage, prerequisite, Scope::Local, path)?;
        }
        path.pop();

        for declaration in &rule.declarations {
            if !stage.contains_declaration(declaration) {
                stage.declare(declaration.clone())?;
            }
        }

        let assignment = match &rule.kind {
            SynthesisKind::PreviousStage => {
                let input = stage.stage_input(name).ok_or_else(|| {
                    anyhow!(
                        "`{}` is not received from the stage before {} stage `{}`",
                        name,
                        self.stage_kind,
                        stage.name()
                    )
                })?;
                if input.glsl_type() != rule.glsl_type {
                    bail!(
                        "`{}` is received as {} but expected as {} in {} stage `{}`",
                        name,
                        input.glsl_type(),
                        rule.glsl_type,
                        self.stage_kind,
                        stage.name()
                    );
                }
                if scope == Scope::Exported {
                    bail!(
                        "`{}` can not be passed through {} stage `{}`",
                        name,
                        self.stage_kind,
                        stage.name()
                    );
                }
                Assignment::PreviousStage
            }
            SynthesisKind::Builtin { expression } => Assignment::Builtin(expression.clone()),
            SynthesisKind::Computed { expression } => match scope {
                Scope::Local => Assignment::Local(expression.clone()),
                Scope::Exported => {
                    self.declare_output(stage, name, rule.glsl_type, rule.interpolation)?;
                    Assignment::Exported(expression.clone())
                }
            },
        };

        stage.record_synthesized_variable(SynthesizedVariable {
            name: name.to_string(),
            glsl_type: rule.glsl_type,
            interpolation: rule.interpolation,
            statements: rule.statements.clone(),
            assignment,
        });
        Ok(())
    }

    fn promote_to_exported(&self, stage: &mut ShaderStage, name: &str) -> Result<()> {
        let (glsl_type, interpolation) = stage
            .synthesized_variable(name)
            .map(|variable| (variable.glsl_type, variable.interpolation))
            .ok_or_else(|| anyhow!("`{}` has not been synthesized", name))?;

        self.declare_output(stage, name, glsl_type, interpolation)?;

        if let Some(variable) = stage.synthesized_variable_mut(name) {
            if let Assignment::Local(expression) = &variable.assignment {
                variable.assignment = Assignment::Exported(expression.clone());
            }
        }
        Ok(())
    }

    fn declare_output(
        &self,
        stage: &mut ShaderStage,
        name: &str,
        glsl_type: GlslType,
        interpolation: Interpolation,
    ) -> Result<()> {
        if self.stage_kind == ShaderStageKind::Fragment {
            bail!(
                "`{}` can not be exported from fragment stage `{}`",
                name,
                stage.name()
            );
        }
        if glsl_type == GlslType::Bool {
            bail!(
                "`{}` can not be exported from {} stage `{}`, as booleans can not be passed between stages",
                name,
                self.stage_kind,
                stage.name()
            );
        }
        let location =
            stage.next_free_location(InterfaceDirection::Out, glsl_type.location_count());
        stage.declare(StageOutput::new(location, glsl_type, name, interpolation))
    }
}

impl SynthesizedVariable {
    pub(crate) fn render(&self, code: &mut Code<'_>) {
        for statement in &self.statements {
            code.line(statement);
        }
        match &self.assignment {
            Assignment::Local(expression) => {
                code.line(format!(
                    "const {} {} = {};",
                    self.glsl_type, self.name, expression
                ));
            }
            Assignment::Exported(expression) | Assignment::Builtin(expression) => {
                code.line(format!("{} = {};", self.name, expression));
            }
            Assignment::PreviousStage => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        declaration::{InputAttribute, StageInput},
        stage::GlslHeader,
    };

    fn geometry(flags: GeometryFlags) -> GeometryDescription {
        GeometryDescription::new("mesh", flags)
    }

    fn vertex_stage() -> ShaderStage {
        ShaderStage::new(ShaderStageKind::Vertex, "test", GlslHeader::default())
    }

    fn chain_graph() -> SynthesisGraph {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry(GeometryFlags::NORMALS));
        graph
            .register(
                SynthesisRule::computed("svA", GlslType::Vec4, "vec4(vaVertex, 1.0)")
                    .with_declaration(InputAttribute::new(0, GlslType::Vec3, "vaVertex")),
            )
            .unwrap();
        graph
            .register(SynthesisRule::computed("svB", GlslType::Vec4, "2.0 * svA").with_prerequisites(&["svA"]))
            .unwrap();
        graph
            .register(
                SynthesisRule::computed("svC", GlslType::Vec4, "svA + svB")
                    .with_prerequisites(&["svA", "svB"]),
            )
            .unwrap();
        graph
            .register(
                SynthesisRule::builtin("gl_Position", GlslType::Vec4, "svC")
                    .with_prerequisites(&["svC"]),
            )
            .unwrap();
        graph
    }

    #[test]
    fn synthesizing_emits_prerequisites_first_and_once() {
        let graph = chain_graph();
        let mut stage = vertex_stage();
        graph
            .synthesize(&mut stage, "gl_Position", Scope::Local)
            .unwrap();
        graph.synthesize(&mut stage, "svB", Scope::Local).unwrap();

        let source = stage.finish().unwrap().source().to_string();
        let body = &source[source.find("void main").unwrap()..];
        assert_eq!(
            body,
            "void main ()\n{\n\
             \tconst vec4 svA = vec4(vaVertex, 1.0);\n\
             \tconst vec4 svB = 2.0 * svA;\n\
             \tconst vec4 svC = svA + svB;\n\
             \tgl_Position = svC;\n\
             }\n"
        );
    }

    #[test]
    fn exporting_boolean_fails() {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry(GeometryFlags::empty()));
        graph
            .register(SynthesisRule::computed("svVisible", GlslType::Bool, "true"))
            .unwrap();
        let mut stage = vertex_stage();
        assert!(graph.synthesize(&mut stage, "svVisible", Scope::Exported).is_err());
        assert!(graph.synthesize(&mut stage, "svVisible", Scope::Local).is_ok());
    }

    #[test]
    fn synthesizing_twice_is_idempotent() {
        let graph = chain_graph();
        let mut stage = vertex_stage();
        graph.synthesize(&mut stage, "svC", Scope::Exported).unwrap();
        let n_declarations = stage.declarations().len();
        graph.synthesize(&mut stage, "svC", Scope::Exported).unwrap();
        graph.synthesize(&mut stage, "svC", Scope::Local).unwrap();
        assert_eq!(stage.declarations().len(), n_declarations);
    }

    #[test]
    fn requesting_local_variable_as_exported_promotes_it() {
        let graph = chain_graph();
        let mut stage = vertex_stage();
        graph.synthesize(&mut stage, "gl_Position", Scope::Local).unwrap();
        graph.synthesize(&mut stage, "svA", Scope::Exported).unwrap();

        let shader = stage.finish().unwrap();
        let outputs: Vec<_> = shader.stage_outputs().map(StageOutput::name).collect();
        assert_eq!(outputs, vec!["svA"]);
        let source = shader.source();
        assert!(source.contains("\tsvA = vec4(vaVertex, 1.0);\n"));
        assert!(!source.contains("const vec4 svA"));
        assert_eq!(source.matches("vec4(vaVertex, 1.0)").count(), 1);
    }

    #[test]
    fn exported_variables_get_consecutive_free_locations() {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry(GeometryFlags::empty()));
        graph
            .register(SynthesisRule::computed("svM", GlslType::Mat3, "mat3(1.0)"))
            .unwrap();
        graph
            .register(SynthesisRule::computed("svV", GlslType::Vec4, "vec4(1.0)"))
            .unwrap();
        let mut stage = vertex_stage();
        graph.synthesize(&mut stage, "svM", Scope::Exported).unwrap();
        graph.synthesize(&mut stage, "svV", Scope::Exported).unwrap();
        assert_eq!(
            stage.declaration("svV").and_then(Declaration::interface_locations),
            Some((InterfaceDirection::Out, 3..4))
        );
    }

    #[test]
    fn synthesizing_cyclic_rules_fails() {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry(GeometryFlags::empty()));
        graph
            .register(SynthesisRule::computed("svX", GlslType::Float, "svY").with_prerequisites(&["svY"]))
            .unwrap();
        graph
            .register(SynthesisRule::computed("svY", GlslType::Float, "svX").with_prerequisites(&["svX"]))
            .unwrap();
        let error = graph
            .synthesize(&mut vertex_stage(), "svX", Scope::Local)
            .unwrap_err();
        assert!(error.to_string().contains("Cyclic"));
    }

    #[test]
    fn synthesizing_unknown_variable_fails() {
        let graph = chain_graph();
        assert!(
            graph
                .synthesize(&mut vertex_stage(), "svUnknown", Scope::Local)
                .is_err()
        );
    }

    #[test]
    fn synthesizing_without_required_capability_fails() {
        let mut graph = SynthesisGraph::new(
            ShaderStageKind::Vertex,
            &GeometryDescription::new("sphere", GeometryFlags::NORMALS),
        );
        graph
            .register(
                SynthesisRule::computed("svPrimary2DTextureCoordinates", GlslType::Vec2, "va2DTexCoord0")
                    .requiring(GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES),
            )
            .unwrap();
        let error = graph
            .synthesize(&mut vertex_stage(), "svPrimary2DTextureCoordinates", Scope::Exported)
            .unwrap_err()
            .to_string();
        assert!(error.contains("sphere"));
        assert!(error.contains("svPrimary2DTextureCoordinates"));
    }

    #[test]
    fn registering_conflicting_rule_fails() {
        let mut graph = chain_graph();
        assert!(
            graph
                .register(SynthesisRule::computed("svA", GlslType::Vec4, "vec4(0.0)"))
                .is_err()
        );
        graph
            .register(
                SynthesisRule::computed("svA", GlslType::Vec4, "vec4(vaVertex, 1.0)")
                    .with_declaration(InputAttribute::new(0, GlslType::Vec3, "vaVertex")),
            )
            .unwrap();
    }

    #[test]
    fn previous_stage_variable_must_be_a_stage_input() {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Fragment, &geometry(GeometryFlags::empty()));
        graph
            .register(SynthesisRule::from_previous_stage("svColor", GlslType::Vec4))
            .unwrap();

        let mut stage = ShaderStage::new(ShaderStageKind::Fragment, "test", GlslHeader::default());
        assert!(graph.synthesize(&mut stage, "svColor", Scope::Local).is_err());

        stage
            .declare(StageInput::new(0, GlslType::Vec4, "svColor", Interpolation::Smooth))
            .unwrap();
        graph.synthesize(&mut stage, "svColor", Scope::Local).unwrap();
    }

    #[test]
    fn exporting_from_fragment_stage_fails() {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Fragment, &geometry(GeometryFlags::empty()));
        graph
            .register(SynthesisRule::computed("svX", GlslType::Float, "1.0"))
            .unwrap();
        let mut stage = ShaderStage::new(ShaderStageKind::Fragment, "test", GlslHeader::default());
        assert!(graph.synthesize(&mut stage, "svX", Scope::Exported).is_err());
    }

    #[test]
    fn using_graph_with_other_stage_kind_fails() {
        let graph = chain_graph();
        let mut stage = ShaderStage::new(ShaderStageKind::Fragment, "test", GlslHeader::default());
        assert!(graph.synthesize(&mut stage, "svA", Scope::Local).is_err());
    }

    #[test]
    fn integral_variables_are_exported_flat() {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry(GeometryFlags::empty()));
        graph
            .register(SynthesisRule::computed("svIndex", GlslType::UInt, "0u"))
            .unwrap();
        let mut stage = vertex_stage();
        graph.synthesize(&mut stage, "svIndex", Scope::Exported).unwrap();
        assert_eq!(
            stage.declaration("svIndex").map(ToString::to_string),
            Some("layout(location = 0) flat out uint svIndex;".to_string())
        );
    }
}
