// Input layout - how vertex buffer bytes feed the vertex shader
//
// location 0: position (3 x f32, offset 0)
// location 1: color    (4 x f32, offset 12)

use anyhow::Result;
use ash::vk;
use std::collections::BTreeSet;

use crate::model::Vertex;

#[derive(Debug, Clone)]
pub struct InputLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl InputLayout {
    /// Layout for `Vertex`, checked against the locations the vertex shader
    /// reads
    pub fn new(shader_inputs: &BTreeSet<u32>) -> Result<Self> {
        let layout = Self::for_vertex();

        let provided: BTreeSet<u32> = layout.attributes.iter().map(|a| a.location).collect();
        let missing: Vec<u32> = shader_inputs.difference(&provided).copied().collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "Vertex shader reads locations {:?} that the vertex format does not provide",
                missing
            );
        }

        Ok(layout)
    }

    fn for_vertex() -> Self {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        let position = vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, position) as u32,
        };

        let color = vk::VertexInputAttributeDescription {
            binding: 0,
            location: 1,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, color) as u32,
        };

        Self {
            bindings: vec![binding],
            attributes: vec![position, color],
        }
    }
}
