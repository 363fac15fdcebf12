use crate::bounds::Aabb;
use cgmath::{Matrix4, Rad};

/// Something holding GPU-side memory that must be released explicitly.
///
/// `dispose` consumes the value, so a resource can be released at most
/// once, and a node hierarchy handed to [`dispose_hierarchy`] cannot be
/// drawn afterwards.
pub trait Disposable {
    fn dispose(self);
}

/// One node of a model's hierarchy. World transforms are baked into the
/// mesh data at load time, so a node only carries structure.
#[derive(Debug)]
pub struct Node<M> {
    pub name: Option<String>,
    pub meshes: Vec<M>,
    pub children: Vec<Node<M>>,
}

impl<M> Default for Node<M> {
    fn default() -> Self {
        Self {
            name: None,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl<M> Node<M> {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Number of meshes in this node and all of its descendants.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len() + self.children.iter().map(Node::mesh_count).sum::<usize>()
    }

    /// Visits every mesh depth-first, parents before children.
    pub fn for_each_mesh<'a, F: FnMut(&'a M)>(&'a self, f: &mut F) {
        for mesh in &self.meshes {
            f(mesh);
        }
        for child in &self.children {
            child.for_each_mesh(f);
        }
    }

    /// Rebuilds the same hierarchy with every mesh converted by `f`.
    pub fn map<N, F: FnMut(M) -> N>(self, f: &mut F) -> Node<N> {
        Node {
            name: self.name,
            meshes: self.meshes.into_iter().map(&mut *f).collect(),
            children: self
                .children
                .into_iter()
                .map(|child| child.map(&mut *f))
                .collect(),
        }
    }
}

/// Releases every mesh of the hierarchy exactly once. Returns how many
/// meshes were released.
pub fn dispose_hierarchy<M: Disposable>(root: Node<M>) -> usize {
    let mut disposed = 0;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        for mesh in node.meshes {
            mesh.dispose();
            disposed += 1;
        }
        stack.extend(node.children);
    }
    disposed
}

/// A loaded model: its hierarchy, the bounds of its geometry and the idle
/// rotation applied on top of it.
#[derive(Debug)]
pub struct Model<M> {
    pub path: String,
    pub root: Node<M>,
    pub bounds: Aabb,
    pub rotation: Rad<f32>,
}

impl<M> Model<M> {
    pub fn new(path: impl Into<String>, root: Node<M>, bounds: Aabb) -> Self {
        Self {
            path: path.into(),
            root,
            bounds,
            rotation: Rad(0.0),
        }
    }

    pub fn rotate_y(&mut self, angle: Rad<f32>) {
        self.rotation += angle;
    }

    pub fn transform(&self) -> Matrix4<f32> {
        Matrix4::from_angle_y(self.rotation)
    }
}

impl<M: Disposable> Model<M> {
    pub fn dispose(self) -> usize {
        dispose_hierarchy(self.root)
    }
}
