// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. Shaders are precompiled by
// build.rs and read from disk at startup. A small reflection pass extracts
// the vertex stage's input locations so the input layout can be checked
// against them.

use anyhow::{Context, Result};
use ash::vk;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const HEADER_WORDS: usize = 5;

const OP_DECORATE: u32 = 71;
const OP_VARIABLE: u32 = 59;
const DECORATION_LOCATION: u32 = 30;
const STORAGE_CLASS_INPUT: u32 = 1;

/// A shader module that destroys itself
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    /// Locations of the stage's `in` variables
    pub input_locations: BTreeSet<u32>,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    /// Read a SPIR-V binary from disk and create a shader module
    pub fn load(device: &Arc<VulkanDevice>, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read shader {:?}", path))?;
        let module = Self::from_bytes(device, &bytes)
            .with_context(|| format!("Invalid shader binary {:?}", path))?;

        log::debug!(
            "Loaded shader {:?} ({} bytes, inputs {:?})",
            path,
            bytes.len(),
            module.input_locations
        );
        Ok(module)
    }

    pub fn from_bytes(device: &Arc<VulkanDevice>, bytes: &[u8]) -> Result<Self> {
        // read_spv copies into u32 words, so alignment of `bytes` doesn't matter
        let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .context("Not a SPIR-V binary")?;
        let input_locations = input_locations(&words)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self {
            module,
            input_locations,
            device: device.clone(),
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Locations of all `Input` storage-class variables in a SPIR-V module.
/// Built-ins carry no Location decoration and are left out.
pub fn input_locations(words: &[u32]) -> Result<BTreeSet<u32>> {
    if words.len() < HEADER_WORDS || words[0] != SPIRV_MAGIC {
        anyhow::bail!("Missing SPIR-V header");
    }

    let mut locations = std::collections::HashMap::new();
    let mut inputs = Vec::new();

    let mut i = HEADER_WORDS;
    while i < words.len() {
        let word_count = (words[i] >> 16) as usize;
        let opcode = words[i] & 0xffff;
        if word_count == 0 || i + word_count > words.len() {
            anyhow::bail!("Truncated SPIR-V instruction at word {}", i);
        }
        let operands = &words[i + 1..i + word_count];

        match opcode {
            // OpDecorate %target Location n
            OP_DECORATE if operands.len() >= 3 && operands[1] == DECORATION_LOCATION => {
                locations.insert(operands[0], operands[2]);
            }
            // OpVariable %type %id StorageClass
            OP_VARIABLE if operands.len() >= 3 && operands[2] == STORAGE_CLASS_INPUT => {
                inputs.push(operands[1]);
            }
            _ => {}
        }

        i += word_count;
    }

    Ok(inputs
        .iter()
        .filter_map(|id| locations.get(id).copied())
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn instruction(opcode: u32, operands: &[u32]) -> Vec<u32> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | opcode];
        words.extend_from_slice(operands);
        words
    }

    /// Minimal module declaring input variables at the given locations, plus
    /// one built-in input and one output
    pub(crate) fn module_with_inputs(locations: &[u32]) -> Vec<u32> {
        let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 100, 0];
        let mut id = 10;
        for &location in locations {
            words.extend(instruction(OP_DECORATE, &[id, DECORATION_LOCATION, location]));
            words.extend(instruction(OP_VARIABLE, &[2, id, STORAGE_CLASS_INPUT]));
            id += 1;
        }
        // gl_VertexIndex-style built-in: decorated BuiltIn (11), no Location
        words.extend(instruction(OP_DECORATE, &[50, 11, 42]));
        words.extend(instruction(OP_VARIABLE, &[2, 50, STORAGE_CLASS_INPUT]));
        // Output at location 0 (storage class 3) must not be reported
        words.extend(instruction(OP_DECORATE, &[51, DECORATION_LOCATION, 0]));
        words.extend(instruction(OP_VARIABLE, &[2, 51, 3]));
        words
    }

    #[test]
    fn finds_vertex_inputs() {
        let words = module_with_inputs(&[0, 1]);
        assert_eq!(input_locations(&words).unwrap(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn builtins_and_outputs_are_ignored() {
        let words = module_with_inputs(&[]);
        assert!(input_locations(&words).unwrap().is_empty());
    }

    #[test]
    fn rejects_missing_magic() {
        let mut words = module_with_inputs(&[0]);
        words[0] = 0xdead_beef;
        assert!(input_locations(&words).is_err());
    }

    #[test]
    fn rejects_truncated_instruction() {
        let mut words = module_with_inputs(&[0]);
        words.push((4 << 16) | OP_DECORATE);
        assert!(input_locations(&words).is_err());
    }

    #[test]
    fn read_spv_accepts_unaligned_bytes() {
        let words = module_with_inputs(&[0, 1]);
        let mut bytes = vec![0u8];
        bytes.extend(words.iter().flat_map(|w| w.to_le_bytes()));
        let parsed = ash::util::read_spv(&mut std::io::Cursor::new(&bytes[1..])).unwrap();
        assert_eq!(parsed, words);
    }
}
