//! Memory layout of uniform data and buffers shared between many uniforms.

mod layout;
mod shared_buffer;

pub use layout::{BlockLayout, MemberLayout, UniformMirror};
pub use shared_buffer::{SharedUniformBuffer, SharedUniformBufferRegistry};
