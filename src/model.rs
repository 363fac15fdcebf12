use crate::{
    bounds::Aabb,
    error::ViewerError,
    resources::load_binary_with_progress,
    scene::{Disposable, Model, Node},
};
use cgmath::prelude::*;
use cgmath::{Matrix3, Matrix4, Point3, Vector3, Zero};
use std::collections::HashSet;
use wgpu::util::DeviceExt;

// Guards against node cycles in malformed files
const MAX_NODE_DEPTH: usize = 64;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{
            BufferAddress, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
        };
        VertexBufferLayout {
            array_stride: std::mem::size_of::<ModelVertex>() as BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as BufferAddress,
                    shader_location: 1,
                    format: VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialProperties {
    pub base_color: [f32; 4],
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// CPU-side material description
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: Option<String>,
    pub properties: MaterialProperties,
}

/// One draw call worth of geometry, already in model space
#[derive(Debug, Clone)]
pub struct PrimitiveData {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    /// Index into the owning mesh's `materials`
    pub material: usize,
}

/// A glTF mesh: any number of primitives sharing a list of materials
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: Option<String>,
    pub primitives: Vec<PrimitiveData>,
    pub materials: Vec<MaterialData>,
}

/// A parsed model, ready for upload
#[derive(Debug)]
pub struct ModelData {
    pub root: Node<MeshData>,
    pub bounds: Aabb,
}

/// Parses a binary glTF (or a self-contained JSON glTF) held in memory.
pub fn parse_glb(bytes: &[u8]) -> anyhow::Result<ModelData> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;

    let roots: Vec<gltf::Node> = match document
        .default_scene()
        .or_else(|| document.scenes().next())
    {
        Some(scene) => scene.nodes().collect(),
        None => {
            let children: HashSet<usize> = document
                .nodes()
                .flat_map(|node| node.children().map(|child| child.index()))
                .collect();
            document
                .nodes()
                .filter(|node| !children.contains(&node.index()))
                .collect()
        }
    };

    let mut bounds = Aabb::empty();
    let mut root = Node::new(None);
    for node in &roots {
        root.children
            .push(build_node(node, Matrix4::identity(), &buffers, &mut bounds, 0)?);
    }

    if root.mesh_count() == 0 {
        log::warn!("Model contains no drawable geometry");
    }

    Ok(ModelData { root, bounds })
}

fn build_node(
    node: &gltf::Node,
    parent: Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    bounds: &mut Aabb,
    depth: usize,
) -> anyhow::Result<Node<MeshData>> {
    if depth > MAX_NODE_DEPTH {
        anyhow::bail!("node hierarchy deeper than {} levels", MAX_NODE_DEPTH);
    }

    let world = parent * Matrix4::from(node.transform().matrix());
    let mut out = Node::new(node.name().map(str::to_owned));

    if let Some(mesh) = node.mesh() {
        out.meshes.push(read_mesh(&mesh, &world, buffers, bounds)?);
    }
    for child in node.children() {
        out.children
            .push(build_node(&child, world, buffers, bounds, depth + 1)?);
    }

    Ok(out)
}

fn read_mesh(
    mesh: &gltf::Mesh,
    world: &Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    bounds: &mut Aabb,
) -> anyhow::Result<MeshData> {
    let mesh_name = mesh.name().unwrap_or("<unnamed>");
    let normal_matrix = normal_matrix(world);
    // Mirroring transforms turn counter-clockwise triangles clockwise
    let flip_winding = world.determinant() < 0.0;

    let mut material_ids: Vec<Option<usize>> = Vec::new();
    let mut materials = Vec::new();
    let mut primitives = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "Skipping {:?} primitive in mesh {}",
                primitive.mode(),
                mesh_name
            );
            continue;
        }

        let reader = primitive.reader(|buffer| {
            buffers
                .get(buffer.index())
                .map(|data| data.0.as_slice())
        });

        let Some(positions) = reader.read_positions() else {
            log::warn!("Skipping primitive without positions in mesh {}", mesh_name);
            continue;
        };
        let positions: Vec<Point3<f32>> = positions
            .map(|p| world.transform_point(Point3::from(p)))
            .collect();

        let mut indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        if indices.len() % 3 != 0 {
            log::warn!(
                "Mesh {} has {} indices, dropping the incomplete triangle",
                mesh_name,
                indices.len()
            );
            indices.truncate(indices.len() - indices.len() % 3);
        }
        if let Some(index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            anyhow::bail!(
                "mesh {} references vertex {} but only has {}",
                mesh_name,
                index,
                positions.len()
            );
        }
        if indices.is_empty() {
            continue;
        }
        if flip_winding {
            for triangle in indices.chunks_exact_mut(3) {
                triangle.swap(1, 2);
            }
        }

        let normals: Vec<Vector3<f32>> = match reader.read_normals() {
            Some(normals) => normals
                .map(|n| normalize_or_zero(normal_matrix * Vector3::from(n)))
                .collect(),
            None => vertex_normals(&positions, &indices),
        };
        if normals.len() != positions.len() {
            anyhow::bail!(
                "mesh {} has {} normals for {} positions",
                mesh_name,
                normals.len(),
                positions.len()
            );
        }

        for position in &positions {
            bounds.expand_to(*position);
        }

        let material = primitive.material();
        let slot = match material_ids.iter().position(|id| *id == material.index()) {
            Some(slot) => slot,
            None => {
                material_ids.push(material.index());
                materials.push(MaterialData {
                    name: material.name().map(str::to_owned),
                    properties: MaterialProperties {
                        base_color: material.pbr_metallic_roughness().base_color_factor(),
                    },
                });
                materials.len() - 1
            }
        };

        let vertices = positions
            .iter()
            .zip(&normals)
            .map(|(position, normal)| ModelVertex {
                position: (*position).into(),
                normal: (*normal).into(),
            })
            .collect();

        primitives.push(PrimitiveData {
            vertices,
            indices,
            material: slot,
        });
    }

    Ok(MeshData {
        name: mesh.name().map(str::to_owned),
        primitives,
        materials,
    })
}

fn normal_matrix(world: &Matrix4<f32>) -> Matrix3<f32> {
    let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
    linear
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or_else(Matrix3::identity)
}

fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    if v.magnitude2() > 0.0 {
        v.normalize()
    } else {
        v
    }
}

/// Area-weighted average of the face normals around each vertex.
fn vertex_normals(positions: &[Point3<f32>], indices: &[u32]) -> Vec<Vector3<f32>> {
    let mut normals = vec![Vector3::zero(); positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals.into_iter().map(normalize_or_zero).collect()
}

/// Fetches and parses a model. Runs off the render thread; nothing here
/// touches the GPU.
pub async fn load_model_data(path: &str) -> Result<ModelData, ViewerError> {
    log::info!("Loading model {}", path);

    let bytes = load_binary_with_progress(path, |progress| {
        if let Some(fraction) = progress.fraction() {
            log::debug!("{}: {:.0}% loaded", path, fraction * 100.0);
        }
    })
    .await
    .map_err(|e| ViewerError::asset_load(path, e))?;

    parse_glb(&bytes).map_err(|e| ViewerError::asset_load(path, e))
}

pub struct GpuPrimitive {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
}

/// GPU realization of a material
pub struct GpuMaterial {
    pub properties_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

pub struct GpuMesh {
    pub name: Option<String>,
    pub primitives: Vec<GpuPrimitive>,
    pub materials: Vec<GpuMaterial>,
}

impl Disposable for GpuMesh {
    fn dispose(self) {
        for primitive in self.primitives {
            primitive.vertex_buffer.destroy();
            primitive.index_buffer.destroy();
        }
        for material in self.materials {
            material.properties_buffer.destroy();
        }
    }
}

pub fn material_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material_bind_group_layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn upload_mesh(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, mesh: MeshData) -> GpuMesh {
    let label = mesh.name.as_deref().unwrap_or("mesh");

    let materials = mesh
        .materials
        .iter()
        .map(|material| {
            let name = material.name.as_deref().unwrap_or("material");
            let properties_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}_properties", name)),
                contents: bytemuck::cast_slice(&[material.properties]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(name),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: properties_buffer.as_entire_binding(),
                }],
            });
            GpuMaterial {
                properties_buffer,
                bind_group,
            }
        })
        .collect();

    let primitives = mesh
        .primitives
        .iter()
        .map(|primitive| GpuPrimitive {
            vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Vertex Buffer", label)),
                contents: bytemuck::cast_slice(&primitive.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Index Buffer", label)),
                contents: bytemuck::cast_slice(&primitive.indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            num_elements: primitive.indices.len() as u32,
            material: primitive.material,
        })
        .collect();

    GpuMesh {
        name: mesh.name,
        primitives,
        materials,
    }
}

/// Creates the GPU buffers for every mesh of a parsed model.
pub fn upload(
    device: &wgpu::Device,
    material_layout: &wgpu::BindGroupLayout,
    path: &str,
    data: ModelData,
) -> Model<GpuMesh> {
    let ModelData { root, bounds } = data;
    let root = root.map(&mut |mesh| upload_mesh(device, material_layout, mesh));
    Model::new(path, root, bounds)
}

pub trait DrawModel<'a> {
    fn draw_mesh(&mut self, mesh: &'a GpuMesh);

    fn draw_model(&mut self, model: &'a Model<GpuMesh>);
}

// Camera, light and model transform bind groups (0..=2) are set by the
// caller; each primitive binds its own material at group 3.
impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh(&mut self, mesh: &'b GpuMesh) {
        for primitive in &mesh.primitives {
            let Some(material) = mesh.materials.get(primitive.material) else {
                continue;
            };
            self.set_vertex_buffer(0, primitive.vertex_buffer.slice(..));
            self.set_index_buffer(primitive.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            self.set_bind_group(3, &material.bind_group, &[]);
            self.draw_indexed(0..primitive.num_elements, 0, 0..1);
        }
    }

    fn draw_model(&mut self, model: &'b Model<GpuMesh>) {
        model.root.for_each_mesh(&mut |mesh| self.draw_mesh(mesh));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::{Value, json};

    /// Packs a JSON document and binary payload into a GLB container.
    fn glb(document: &Value, bin: &[u8]) -> Vec<u8> {
        let mut json = serde_json::to_vec(document).unwrap();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = bin.to_vec();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
        out
    }

    /// A single triangle (0,0,0) (1,0,0) (0,1,0) with the given indices,
    /// wrapped in whatever scene, node, mesh and material layout the test needs.
    fn triangle_glb(extra: Value, indices: [u16; 3]) -> Vec<u8> {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let mut bin = bytemuck::cast_slice::<_, u8>(&positions).to_vec();
        bin.extend_from_slice(bytemuck::cast_slice(&indices));

        let mut document = json!({
            "asset": { "version": "2.0" },
            "accessors": [
                {
                    "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                    "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
                },
                { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
            ],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
            ],
            "buffers": [{ "byteLength": 42 }]
        });
        for (key, value) in extra.as_object().unwrap() {
            document[key] = value.clone();
        }
        glb(&document, &bin)
    }

    fn red_triangle_mesh() -> Value {
        json!([{
            "name": "tri",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }])
    }

    fn red_material() -> Value {
        json!([{ "name": "red", "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] } }])
    }

    fn first_mesh(data: &ModelData) -> &MeshData {
        let mut found = None;
        data.root.for_each_mesh(&mut |mesh| {
            if found.is_none() {
                found = Some(mesh);
            }
        });
        found.expect("model has a mesh")
    }

    #[test]
    fn parses_a_translated_triangle() {
        let bytes = triangle_glb(
            json!({
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [{ "name": "tri", "mesh": 0, "translation": [0.0, 0.0, -2.0] }],
                "meshes": red_triangle_mesh(),
                "materials": red_material()
            }),
            [0, 1, 2],
        );

        let data = parse_glb(&bytes).unwrap();

        assert_eq!(data.root.mesh_count(), 1);
        assert_eq!(data.root.children[0].name.as_deref(), Some("tri"));
        assert_eq!(data.bounds.min, Point3::new(0.0, 0.0, -2.0));
        assert_eq!(data.bounds.max, Point3::new(1.0, 1.0, -2.0));

        let mesh = first_mesh(&data);
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].name.as_deref(), Some("red"));
        assert_eq!(mesh.materials[0].properties.base_color, [1.0, 0.0, 0.0, 1.0]);

        let primitive = &mesh.primitives[0];
        assert_eq!(primitive.indices, vec![0, 1, 2]);
        assert_eq!(primitive.vertices[1].position, [1.0, 0.0, -2.0]);
        // computed from the counter-clockwise face
        for vertex in &primitive.vertices {
            assert_relative_eq!(vertex.normal[2], 1.0);
        }
    }

    #[test]
    fn node_transforms_are_baked_down_the_hierarchy() {
        let bytes = triangle_glb(
            json!({
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [
                    { "name": "parent", "children": [1], "scale": [2.0, 2.0, 2.0] },
                    { "name": "child", "mesh": 0, "translation": [1.0, 0.0, 0.0] }
                ],
                "meshes": red_triangle_mesh(),
                "materials": red_material()
            }),
            [0, 1, 2],
        );

        let data = parse_glb(&bytes).unwrap();

        assert_eq!(data.bounds.min, Point3::new(2.0, 0.0, 0.0));
        assert_eq!(data.bounds.max, Point3::new(4.0, 2.0, 0.0));
        let parent = &data.root.children[0];
        assert!(parent.meshes.is_empty());
        assert_eq!(parent.children[0].meshes.len(), 1);
    }

    #[test]
    fn primitives_share_deduplicated_material_slots() {
        let bytes = triangle_glb(
            json!({
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [{ "mesh": 0 }],
                "meshes": [{
                    "primitives": [
                        { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 },
                        { "attributes": { "POSITION": 0 }, "indices": 1, "material": 1 },
                        { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 },
                        { "attributes": { "POSITION": 0 }, "indices": 1 }
                    ]
                }],
                "materials": [
                    { "name": "red", "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] } },
                    { "name": "blue", "pbrMetallicRoughness": { "baseColorFactor": [0.0, 0.0, 1.0, 1.0] } }
                ]
            }),
            [0, 1, 2],
        );

        let data = parse_glb(&bytes).unwrap();
        let mesh = first_mesh(&data);

        let slots: Vec<usize> = mesh.primitives.iter().map(|p| p.material).collect();
        assert_eq!(slots, vec![0, 1, 0, 2]);
        assert_eq!(mesh.materials.len(), 3);
        assert_eq!(mesh.materials[2].properties, MaterialProperties::default());
    }

    #[test]
    fn mirrored_nodes_flip_winding() {
        let bytes = triangle_glb(
            json!({
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [{ "mesh": 0, "scale": [-1.0, 1.0, 1.0] }],
                "meshes": red_triangle_mesh(),
                "materials": red_material()
            }),
            [0, 1, 2],
        );

        let data = parse_glb(&bytes).unwrap();
        let primitive = &first_mesh(&data).primitives[0];

        assert_eq!(primitive.indices, vec![0, 2, 1]);
        assert_eq!(primitive.vertices[1].position, [-1.0, 0.0, 0.0]);
        assert_relative_eq!(primitive.vertices[0].normal[2], 1.0);
    }

    #[test]
    fn documents_without_scenes_use_root_nodes() {
        let bytes = triangle_glb(
            json!({
                "nodes": [
                    { "name": "root", "children": [1] },
                    { "name": "leaf", "mesh": 0 }
                ],
                "meshes": red_triangle_mesh(),
                "materials": red_material()
            }),
            [0, 1, 2],
        );

        let data = parse_glb(&bytes).unwrap();

        assert_eq!(data.root.children.len(), 1);
        assert_eq!(data.root.children[0].name.as_deref(), Some("root"));
        assert_eq!(data.root.mesh_count(), 1);
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let bytes = triangle_glb(
            json!({
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [{ "mesh": 0 }],
                "meshes": red_triangle_mesh(),
                "materials": red_material()
            }),
            [0, 1, 7],
        );

        let err = parse_glb(&bytes).unwrap_err();
        assert!(err.to_string().contains("references vertex 7"));
    }

    #[test]
    fn garbage_is_not_a_model() {
        assert!(parse_glb(b"definitely not a glb file").is_err());
        assert!(parse_glb(&[]).is_err());
    }

    #[test]
    fn scene_without_meshes_has_empty_bounds() {
        let bytes = triangle_glb(
            json!({
                "scene": 0,
                "scenes": [{ "nodes": [0] }],
                "nodes": [{ "name": "empty" }]
            }),
            [0, 1, 2],
        );

        let data = parse_glb(&bytes).unwrap();
        assert_eq!(data.root.mesh_count(), 0);
        assert!(data.bounds.is_empty());
    }

    fn bundled(name: &str) -> ModelData {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("res/models")
            .join(name);
        parse_glb(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn bundled_models_parse() {
        let cube = bundled("1.glb");
        let mesh = first_mesh(&cube);
        assert_eq!(mesh.primitives.len(), 2);
        assert_eq!(mesh.materials.len(), 2);
        assert_relative_eq!(cube.bounds.size(), 3.0_f32.sqrt(), epsilon = 1e-5);

        let pyramid = bundled("2.glb");
        assert_eq!(pyramid.root.mesh_count(), 1);
        assert_relative_eq!(pyramid.bounds.min.y, -0.5, epsilon = 1e-5);
        assert_relative_eq!(pyramid.bounds.max.y, 1.5, epsilon = 1e-5);

        // one mesh instanced by two nodes
        let pair = bundled("3.glb");
        assert_eq!(pair.root.mesh_count(), 2);
        assert_relative_eq!(pair.bounds.min.x, -2.2, epsilon = 1e-5);
        assert_relative_eq!(pair.bounds.max.x, 1.8, epsilon = 1e-5);
    }
}
