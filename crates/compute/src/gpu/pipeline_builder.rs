//! Reusable compute pipeline builder.
//!
//! Collapses shader module, bind group layout and pipeline layout creation
//! into one fluent call:
//!
//! ```ignore
//! let (pipeline, layout) = PipelineBuilder::new(device)
//!     .shader_source(include_str!("shaders/bitonic.wgsl"))
//!     .label("bitonic_sort")
//!     .constant("WORKGROUP_SIZE", 256)
//!     .storage_buffer(false)
//!     .uniform_buffer_dynamic(8)
//!     .build()?;
//! ```
//!
//! Constants are specialised by rewriting `const NAME: u32 = ...;` lines of
//! the WGSL source before it is compiled. Creation runs inside a validation
//! error scope, so a bad shader comes back as [`GpuError::PipelineCreation`].

use std::borrow::Cow;
use std::num::NonZeroU64;

use super::GpuError;

pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    shader_source: Option<&'a str>,
    label: Option<&'a str>,
    entry_point: &'a str,
    constants: Vec<(&'a str, u32)>,
    bindings: Vec<BufferBinding>,
}

#[derive(Clone, Debug)]
enum BufferBinding {
    DynamicUniform {
        min_size: Option<NonZeroU64>,
    },
    Storage {
        read_only: bool,
    },
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self {
            device,
            shader_source: None,
            label: None,
            entry_point: "main",
            constants: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Set the WGSL shader source code.
    pub fn shader_source(mut self, source: &'a str) -> Self {
        self.shader_source = Some(source);
        self
    }

    pub fn label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    /// Set the entry point function name (default: "main").
    pub fn entry_point(mut self, entry_point: &'a str) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Replace the value of the module-scope `const name: u32` declaration.
    pub fn constant(mut self, name: &'a str, value: u32) -> Self {
        self.constants.push((name, value));
        self
    }

    /// Add a uniform binding of `size` bytes, addressed by a dynamic offset at bind time.
    pub fn uniform_buffer_dynamic(mut self, size: u64) -> Self {
        self.bindings.push(BufferBinding::DynamicUniform {
            min_size: NonZeroU64::new(size),
        });
        self
    }

    /// Add a storage buffer binding.
    ///
    /// - `read_only = true`: Buffer is read-only in the shader
    /// - `read_only = false`: Buffer is read-write in the shader
    pub fn storage_buffer(mut self, read_only: bool) -> Self {
        self.bindings.push(BufferBinding::Storage { read_only });
        self
    }

    /// Add multiple storage buffers at once.
    pub fn storage_buffers(mut self, read_only_flags: &[bool]) -> Self {
        for &read_only in read_only_flags {
            self.bindings.push(BufferBinding::Storage { read_only });
        }
        self
    }

    /// Build the compute pipeline and return both the pipeline and its bind group layout.
    pub fn build(self) -> Result<(wgpu::ComputePipeline, wgpu::BindGroupLayout), GpuError> {
        let label = self.label.unwrap_or("Pipeline");
        let source = self.shader_source.ok_or_else(|| GpuError::PipelineCreation {
            label: label.to_string(),
            message: "no shader source".to_string(),
        })?;
        let source = specialize(source, &self.constants).map_err(|message| {
            GpuError::PipelineCreation {
                label: label.to_string(),
                message,
            }
        })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source),
            });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .bindings
            .iter()
            .enumerate()
            .map(|(binding, spec)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: match spec {
                    BufferBinding::DynamicUniform { min_size } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: *min_size,
                    },
                    BufferBinding::Storage { read_only } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: *read_only,
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                },
                count: None,
            })
            .collect();

        let layout_label = format!("{} Bind Group Layout", label);
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(layout_label.as_str()),
                    entries: &entries,
                });

        let pipeline_layout_label = format!("{} Pipeline Layout", label);
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(pipeline_layout_label.as_str()),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(self.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("pipeline {} failed: {}", label, error);
            return Err(GpuError::PipelineCreation {
                label: label.to_string(),
                message: error.to_string(),
            });
        }

        Ok((pipeline, bind_group_layout))
    }
}

/// Rewrite each `const NAME: u32 = ...;` named in `constants` to the given value.
fn specialize<'s>(source: &'s str, constants: &[(&str, u32)]) -> Result<Cow<'s, str>, String> {
    if constants.is_empty() {
        return Ok(Cow::Borrowed(source));
    }

    let mut found = vec![false; constants.len()];
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let declared = line
            .trim_start()
            .strip_prefix("const ")
            .and_then(|rest| rest.split(':').next())
            .map(str::trim);
        match declared.and_then(|name| constants.iter().position(|(n, _)| *n == name)) {
            Some(i) => {
                let (name, value) = constants[i];
                out.push_str(&format!("const {}: u32 = {}u;", name, value));
                found[i] = true;
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }

    match found.iter().position(|f| !f) {
        Some(i) => Err(format!("constant `{}` is not declared", constants[i].0)),
        None => Ok(Cow::Owned(out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
const WORKGROUP_SIZE: u32 = 64u;
const LOCAL_SIZE: u32 = 128u;
const WORKGROUP_SIZE_2: u32 = 1u;

@compute @workgroup_size(WORKGROUP_SIZE)
fn main() {}
";

    #[test]
    fn no_constants_borrows_source() {
        assert!(matches!(specialize(SOURCE, &[]), Ok(Cow::Borrowed(_))));
    }

    #[test]
    fn rewrites_named_constants() {
        let out = specialize(SOURCE, &[("WORKGROUP_SIZE", 256), ("LOCAL_SIZE", 512)]).unwrap();
        assert!(out.contains("const WORKGROUP_SIZE: u32 = 256u;"));
        assert!(out.contains("const LOCAL_SIZE: u32 = 512u;"));
        // Prefix match is not a match.
        assert!(out.contains("const WORKGROUP_SIZE_2: u32 = 1u;"));
        assert!(out.contains("@workgroup_size(WORKGROUP_SIZE)"));
    }

    #[test]
    fn missing_constant_is_an_error() {
        let err = specialize(SOURCE, &[("BLOCK", 4)]).unwrap_err();
        assert!(err.contains("BLOCK"));
    }
}
