//! Generation of GLSL shader programs and their resource layouts from
//! declarative descriptions of materials, lights, geometry and render
//! passes.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::cast_lossless)]

#[macro_use]
mod macros;

pub mod binding;
pub mod code;
pub mod declaration;
pub mod geometry;
pub mod glsl;
pub mod layout_cache;
pub mod light;
pub mod material;
pub mod program;
pub mod render_pass;
pub mod resource;
pub mod stage;
pub mod synthesis;
pub mod uniform;
pub mod view;
