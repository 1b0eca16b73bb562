//! Connected components over triangle adjacency.
//!
//! Two triangles are connected when they share an edge. Components are
//! found by flood fill with an explicit LIFO worklist, so arbitrarily large
//! meshes never recurse. Results describe a snapshot of the mesh; editing
//! it afterwards invalidates them.

use crate::mesh::{DynamicMesh, TriangleId, VertexId};

/// One connected set of triangles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Component {
    /// Triangles in discovery order.
    pub triangles: Vec<TriangleId>,
}

impl Component {
    /// Number of triangles.
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// True if the component has no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// The distinct vertices of the component, sorted by id.
    pub fn vertices(&self, mesh: &DynamicMesh) -> Vec<VertexId> {
        let mut vertices: Vec<VertexId> = self
            .triangles
            .iter()
            .flat_map(|&t| mesh.triangle(t))
            .collect();
        vertices.sort_unstable();
        vertices.dedup();
        vertices
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Untouched,
    Queued,
    Done,
    Excluded,
}

/// Partition of the live triangles into connected components.
#[derive(Debug, Clone, Default)]
pub struct ConnectedComponents {
    components: Vec<Component>,
    lookup: Vec<Option<usize>>,
}

impl ConnectedComponents {
    /// Find the components of every live triangle.
    pub fn find(mesh: &DynamicMesh) -> Self {
        Self::find_filtered(mesh, |_| true)
    }

    /// Find components among the triangles accepted by `filter`.
    ///
    /// Rejected triangles belong to no component and do not connect their
    /// neighbors.
    pub fn find_filtered<F>(mesh: &DynamicMesh, filter: F) -> Self
    where
        F: Fn(TriangleId) -> bool,
    {
        let max = mesh.max_triangle_id();
        let mut marks = vec![Mark::Excluded; max];
        for t in mesh.triangle_ids() {
            if filter(t) {
                marks[t.index()] = Mark::Untouched;
            }
        }

        let mut components = Vec::new();
        let mut lookup = vec![None; max];
        let mut stack = Vec::new();

        for seed in mesh.triangle_ids() {
            if marks[seed.index()] != Mark::Untouched {
                continue;
            }
            let id = components.len();
            let mut triangles = Vec::new();
            marks[seed.index()] = Mark::Queued;
            stack.push(seed);

            while let Some(t) = stack.pop() {
                marks[t.index()] = Mark::Done;
                lookup[t.index()] = Some(id);
                triangles.push(t);
                for n in mesh.triangle_neighbors(t) {
                    if n.is_valid() && marks[n.index()] == Mark::Untouched {
                        marks[n.index()] = Mark::Queued;
                        stack.push(n);
                    }
                }
            }

            components.push(Component { triangles });
        }

        log::debug!("found {} connected components", components.len());
        Self { components, lookup }
    }

    /// All components, in order of their lowest-id seed triangle.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True if there are no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Index of the component with the most triangles; the first wins ties.
    pub fn largest_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, c) in self.components.iter().enumerate() {
            if best.map_or(true, |b| c.len() > self.components[b].len()) {
                best = Some(i);
            }
        }
        best
    }

    /// The component with the most triangles; the first wins ties.
    pub fn largest(&self) -> Option<&Component> {
        self.largest_index().map(|i| &self.components[i])
    }

    /// Index of the component containing `t`.
    pub fn component_of(&self, t: TriangleId) -> Option<usize> {
        self.lookup.get(t.index()).copied().flatten()
    }

    /// Iterate over components.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }
}
