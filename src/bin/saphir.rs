use anyhow::Result;

#[cfg(feature = "cli")]
mod main {
    use super::*;
    use anyhow::{Context, bail};
    use clap::{Parser, Subcommand, ValueEnum};
    use nalgebra::Vector4;
    use saphir::{
        geometry::{GeometryDescription, GeometryFlags},
        layout_cache::DescriptionOnlyFactory,
        material::{BasicMaterial, Component, Material, MaterialSlot, StandardMaterial},
        program::{ColorConversion, GeneratorConfig, Program, ProgramGenerator, ProgramRequest},
        render_pass::RenderPassKind,
        resource::{TextureKind, TextureRegistry, TextureResource},
    };
    use std::{fs, path::PathBuf, sync::Arc};

    #[derive(Debug, Parser)]
    #[command(about = "Generate GLSL programs and their resource layouts", long_about = None)]
    struct Cli {
        /// Path to JSON configuration file to use
        #[arg(short, long, global = true)]
        config: Option<PathBuf>,

        /// Directory to write the generated sources to
        #[arg(long, global = true)]
        dump_dir: Option<PathBuf>,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Debug, Subcommand)]
    enum Command {
        /// Generate the program for a material drawn in a render pass
        Generate {
            #[command(flatten)]
            material: MaterialArgs,

            #[command(flatten)]
            geometry: GeometryArgs,

            /// Render pass to generate the program for
            #[arg(short, long, value_enum, default_value_t = RenderPassKind::AmbientPass)]
            pass: RenderPassKind,

            /// Read model matrices from per-instance vertex attributes
            #[arg(long)]
            instanced: bool,

            #[command(flatten)]
            output: OutputArgs,
        },
        /// Generate the program drawing a textured screen-space quad
        Overlay {
            /// Conversion applied to the sampled color
            #[arg(long, value_enum, default_value_t = ColorConversion::None)]
            conversion: ColorConversion,

            #[command(flatten)]
            output: OutputArgs,
        },
        /// Generate the depth-only program rendering shadow casters
        ShadowCasting {
            /// Read model matrices from per-instance vertex attributes
            #[arg(long)]
            instanced: bool,

            #[command(flatten)]
            output: OutputArgs,
        },
        /// Generate the default JSON configuration file
        GenerateConfig {
            /// Path where the file should be written
            #[arg(short, long)]
            output_path: PathBuf,
            /// Overwrite any existing file at the given path
            #[arg(short, long)]
            force_overwrite: bool,
        },
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
    enum MaterialKind {
        Standard,
        Basic,
        None,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
    enum StageSelection {
        Vertex,
        Fragment,
        Both,
    }

    #[derive(Debug, clap::Args)]
    struct MaterialArgs {
        /// Kind of material to draw with
        #[arg(short, long, value_enum, default_value_t = MaterialKind::Standard)]
        material: MaterialKind,

        /// Diffuse (or basic) color as comma separated RGBA values
        #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0, 1.0, 1.0])]
        color: Vec<f32>,

        /// Read the diffuse (or basic) color from a 2D texture
        #[arg(long)]
        diffuse_texture: bool,

        /// Add a white specular color with the given shininess
        #[arg(long)]
        specular: Option<f32>,

        /// Perturb normals with a normal map
        #[arg(long)]
        normal_map: bool,

        /// Reflect a cube map environment
        #[arg(long)]
        reflection: bool,

        /// Constant opacity of the surface
        #[arg(long)]
        opacity: Option<f32>,

        /// Blend the surface with what is behind it
        #[arg(long)]
        blending: bool,

        /// Multiply the color of a basic material by the vertex color
        #[arg(long)]
        vertex_color: bool,
    }

    #[derive(Debug, clap::Args)]
    struct GeometryArgs {
        /// The geometry provides no vertex normals
        #[arg(long)]
        no_normals: bool,

        /// The geometry provides tangents and binormals
        #[arg(long)]
        tangent_space: bool,

        /// The geometry provides vertex colors
        #[arg(long)]
        vertex_colors: bool,

        /// The geometry provides 2D texture coordinates
        #[arg(long)]
        texture_coordinates_2d: bool,

        /// The geometry provides 3D texture coordinates
        #[arg(long)]
        texture_coordinates_3d: bool,
    }

    #[derive(Debug, clap::Args)]
    struct OutputArgs {
        /// Stages whose source is printed
        #[arg(short, long, value_enum, default_value_t = StageSelection::Both)]
        stage: StageSelection,

        /// Print the pipeline layout as JSON instead of the source
        #[arg(short, long)]
        layout: bool,
    }

    impl MaterialArgs {
        fn build(&self, textures: &mut TextureRegistry) -> Result<Option<Material>> {
            if self.color.len() != 4 {
                bail!("Expected four color components, got {}", self.color.len());
            }
            let color = Vector4::from_column_slice(&self.color);
            match self.material {
                MaterialKind::None => Ok(None),
                MaterialKind::Basic => {
                    let mut material = BasicMaterial::new(color)
                        .with_shininess(self.specular.unwrap_or(0.0))
                        .with_opacity(self.opacity.unwrap_or(1.0))
                        .with_blending(self.blending);
                    if self.diffuse_texture {
                        let kind = TextureKind::Texture2D;
                        let handle = textures.insert(TextureResource::new("diffuse", kind));
                        material = material.with_texture(handle, kind)?;
                    }
                    if self.vertex_color {
                        material = material.with_vertex_color();
                    }
                    Ok(Some(material.into()))
                }
                MaterialKind::Standard => {
                    let mut material = StandardMaterial::new().with_blending(self.blending);
                    let diffuse = if self.diffuse_texture {
                        texture(textures, "diffuse", TextureKind::Texture2D)
                    } else {
                        Component::Color(color)
                    };
                    material = material.with_component(MaterialSlot::Diffuse, diffuse)?;
                    if let Some(shininess) = self.specular {
                        material = material
                            .with_component(
                                MaterialSlot::Specular,
                                Component::Color(Vector4::new(1.0, 1.0, 1.0, 1.0)),
                            )?
                            .with_shininess(shininess);
                    }
                    if self.normal_map {
                        material = material.with_component(
                            MaterialSlot::Normal,
                            texture(textures, "normal", TextureKind::Texture2D),
                        )?;
                    }
                    if self.reflection {
                        material = material.with_component(
                            MaterialSlot::Reflection,
                            texture(textures, "environment", TextureKind::Cube),
                        )?;
                    }
                    if let Some(opacity) = self.opacity {
                        material = material
                            .with_component(MaterialSlot::Opacity, Component::Value(opacity))?;
                    }
                    Ok(Some(material.into()))
                }
            }
        }
    }

    impl GeometryArgs {
        fn build(&self) -> GeometryDescription {
            let mut flags = GeometryFlags::empty();
            flags.set(GeometryFlags::NORMALS, !self.no_normals);
            flags.set(GeometryFlags::TANGENT_SPACE, self.tangent_space);
            flags.set(GeometryFlags::VERTEX_COLOR, self.vertex_colors);
            flags.set(
                GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES,
                self.texture_coordinates_2d,
            );
            flags.set(
                GeometryFlags::PRIMARY_3D_TEXTURE_COORDINATES,
                self.texture_coordinates_3d,
            );
            GeometryDescription::new("cli", flags)
        }
    }

    impl OutputArgs {
        fn print(&self, program: &Program) -> Result<()> {
            if self.layout {
                println!("{}", serde_json::to_string_pretty(program.layout())?);
                return Ok(());
            }
            if matches!(self.stage, StageSelection::Vertex | StageSelection::Both) {
                print!("{}", program.vertex().source());
            }
            if matches!(self.stage, StageSelection::Fragment | StageSelection::Both) {
                print!("{}", program.fragment().source());
            }
            Ok(())
        }
    }

    fn texture(textures: &mut TextureRegistry, name: &str, kind: TextureKind) -> Component {
        let handle = textures.insert(TextureResource::new(name, kind));
        Component::Texture { handle, kind }
    }

    fn load_config(cli: &Cli) -> Result<GeneratorConfig> {
        let mut config = match &cli.config {
            Some(file_path) => {
                let text = fs::read_to_string(file_path)
                    .with_context(|| format!("Failed to read {}", file_path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid configuration in {}", file_path.display()))?
            }
            None => GeneratorConfig::default(),
        };
        if cli.dump_dir.is_some() {
            config.source_dump_directory.clone_from(&cli.dump_dir);
        }
        Ok(config)
    }

    pub fn main() -> Result<()> {
        env_logger::init();
        let cli = Cli::parse();

        match &cli.command {
            Command::Generate {
                material,
                geometry,
                pass,
                instanced,
                output,
            } => {
                let generator =
                    ProgramGenerator::new(load_config(&cli)?, Arc::new(DescriptionOnlyFactory::new()))?;
                let mut textures = TextureRegistry::new();
                let material = material.build(&mut textures)?;
                let geometry = geometry.build();
                let mut request =
                    ProgramRequest::new("program", *pass, material.as_ref(), &geometry);
                request.instanced = *instanced;
                let program = generator.obtain_program(&request)?;
                output.print(&program)
            }
            Command::Overlay { conversion, output } => {
                let generator =
                    ProgramGenerator::new(load_config(&cli)?, Arc::new(DescriptionOnlyFactory::new()))?;
                let program = generator.obtain_overlay_program(*conversion)?;
                output.print(&program)
            }
            Command::ShadowCasting { instanced, output } => {
                let generator =
                    ProgramGenerator::new(load_config(&cli)?, Arc::new(DescriptionOnlyFactory::new()))?;
                let program = generator.obtain_shadow_casting_program(*instanced)?;
                output.print(&program)
            }
            Command::GenerateConfig {
                output_path,
                force_overwrite,
            } => {
                if !force_overwrite && output_path.exists() {
                    bail!("File {} already exists", output_path.display());
                }
                let config = GeneratorConfig::default();
                fs::write(output_path, serde_json::to_string_pretty(&config)?)
                    .with_context(|| format!("Failed to write {}", output_path.display()))
            }
        }
    }
}

#[cfg(not(feature = "cli"))]
mod main {
    use super::*;

    pub fn main() -> Result<()> {
        anyhow::bail!("This binary requires the `cli` feature to be enabled.")
    }
}

fn main() -> Result<()> {
    main::main()
}
