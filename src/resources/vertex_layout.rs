//! Vertex data layouts and shader input layouts
//!
//! A [`VertexLayout`] says how a submesh's interleaved float array is laid
//! out. A [`ShaderInputLayout`] says which locations a program reads. The
//! two are matched by location when a vertex array is built.

/// Size of one vertex component in bytes (all attributes are f32)
pub const COMPONENT_SIZE: u8 = 4;

/// One attribute of an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayoutAttribute {
    pub location: u8,
    pub component_count: u8,
    /// Byte offset inside one vertex
    pub offset: u8,
}

/// Interleaved float vertex layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub attributes: Vec<VertexLayoutAttribute>,
    /// Bytes per vertex
    pub stride: u8,
}

impl VertexLayout {
    pub fn builder() -> VertexLayoutBuilder {
        VertexLayoutBuilder::default()
    }

    /// Attribute stored at `location`, if any
    pub fn find(&self, location: u8) -> Option<&VertexLayoutAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }

    /// Floats per vertex
    pub fn floats_per_vertex(&self) -> usize {
        (self.stride / COMPONENT_SIZE) as usize
    }
}

/// Appends attributes back to back, growing the stride
#[derive(Debug, Default)]
pub struct VertexLayoutBuilder {
    layout: VertexLayout,
}

impl VertexLayoutBuilder {
    pub fn attribute(mut self, location: u8, component_count: u8) -> Self {
        self.layout.attributes.push(VertexLayoutAttribute {
            location,
            component_count,
            offset: self.layout.stride,
        });
        self.layout.stride += component_count * COMPONENT_SIZE;
        self
    }

    pub fn build(self) -> VertexLayout {
        self.layout
    }
}

/// One vertex input declared by a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInput {
    pub location: u8,
    pub component_count: u8,
    /// Variable name, for diagnostics
    pub name: String,
}

/// Vertex inputs of a compiled program, sorted by location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInputLayout {
    pub inputs: Vec<ShaderInput>,
}

impl ShaderInputLayout {
    pub fn new(mut inputs: Vec<ShaderInput>) -> Self {
        inputs.sort_by_key(|input| input.location);
        Self { inputs }
    }

    pub fn locations(&self) -> impl Iterator<Item = u8> + '_ {
        self.inputs.iter().map(|input| input.location)
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}
