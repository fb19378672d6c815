use glam::Vec3;
use tracing::warn;

/// Append-only triangle mesh: a vertex arena plus faces indexing into it.
///
/// Every face index is below the vertex count and no face has all three
/// corners at the same position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a mesh from arenas filled by the geometry builder, dropping
    /// any face that breaks the arena invariants.
    pub(crate) fn from_arenas(vertices: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        let mut mesh = Self {
            vertices,
            faces: Vec::with_capacity(faces.len()),
        };
        let total = faces.len();
        for face in faces {
            mesh.push_face(face);
        }
        if mesh.faces.len() < total {
            warn!("Dropped {} degenerate faces", total - mesh.faces.len());
        }
        mesh
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Append a vertex and return its index.
    pub fn push_vertex(&mut self, position: Vec3) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(position);
        index
    }

    /// Append a face; out-of-range or fully collapsed faces are refused.
    pub fn push_face(&mut self, face: [u32; 3]) -> bool {
        if !self.is_valid_face(face) {
            return false;
        }
        self.faces.push(face);
        true
    }

    /// Corner positions of a face.
    pub fn face_positions(&self, face: [u32; 3]) -> [Vec3; 3] {
        face.map(|i| self.vertices[i as usize])
    }

    /// Axis-aligned bounds `(min, max)`, or `None` for an empty vertex store.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    fn is_valid_face(&self, face: [u32; 3]) -> bool {
        let count = self.vertices.len();
        if face.iter().any(|&i| i as usize >= count) {
            return false;
        }
        let [a, b, c] = self.face_positions(face);
        !(a == b && b == c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_count() {
        let mut mesh = Mesh::new();
        let a = mesh.push_vertex(Vec3::ZERO);
        let b = mesh.push_vertex(Vec3::X);
        let c = mesh.push_vertex(Vec3::Y);
        assert_eq!((a, b, c), (0, 1, 2));
        assert!(mesh.push_face([a, b, c]));
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_face() {
        let mut mesh = Mesh::new();
        mesh.push_vertex(Vec3::ZERO);
        mesh.push_vertex(Vec3::X);
        assert!(!mesh.push_face([0, 1, 2]));
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_rejects_collapsed_face() {
        let mut mesh = Mesh::new();
        let p = Vec3::new(1.0, 2.0, 3.0);
        mesh.push_vertex(p);
        mesh.push_vertex(p);
        mesh.push_vertex(p);
        assert!(!mesh.push_face([0, 1, 2]));
        assert!(!mesh.push_face([0, 0, 0]));
    }

    #[test]
    fn test_arenas_drop_collapsed_faces() {
        let p = Vec3::new(1000.0, 1000.0, 0.2);
        let mesh = Mesh::from_arenas(
            vec![p, p, p, Vec3::X],
            vec![[0, 1, 2], [0, 1, 3], [0, 1, 9]],
        );
        assert_eq!(mesh.faces(), &[[0, 1, 3]]);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_bounds() {
        let mut mesh = Mesh::new();
        assert_eq!(mesh.bounds(), None);
        mesh.push_vertex(Vec3::new(1.0, -2.0, 0.5));
        mesh.push_vertex(Vec3::new(-1.0, 4.0, 0.2));
        assert_eq!(
            mesh.bounds(),
            Some((Vec3::new(-1.0, -2.0, 0.2), Vec3::new(1.0, 4.0, 0.5)))
        );
    }
}
