use glam::DVec3;
use thiserror::Error;

/// Error types for mesh construction.
#[derive(Debug, Error, PartialEq)]
pub enum MeshError {
    /// A face references a vertex that does not exist.
    #[error("Face {face} references vertex {index} but the mesh has {num_vertices} vertices")]
    FaceIndexOutOfRange {
        /// Index of the offending face.
        face: usize,
        /// Offending vertex index.
        index: usize,
        /// Number of vertices in the mesh.
        num_vertices: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("Vertex {0} has a non-finite coordinate")]
    NonFiniteVertex(usize),
}

/// A triangle mesh: an ordered list of vertices and faces indexing into it.
///
/// Vertex order is significant: per-vertex colour codes and correspondences refer to
/// vertices by their index.
#[derive(Debug, Clone, PartialEq)]
pub struct TriMesh {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
}

impl TriMesh {
    /// Create a mesh, checking that every face index is `< vertices.len()`.
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        if let Some(i) = vertices
            .iter()
            .position(|v| v.iter().any(|c| !c.is_finite()))
        {
            return Err(MeshError::NonFiniteVertex(i));
        }
        let num_vertices = vertices.len();
        for (face, f) in faces.iter().enumerate() {
            if let Some(&index) = f.iter().find(|&&i| i >= num_vertices) {
                return Err(MeshError::FaceIndexOutOfRange {
                    face,
                    index,
                    num_vertices,
                });
            }
        }
        Ok(Self { vertices, faces })
    }

    /// Create a face-less mesh (a point cloud).
    pub fn from_points(vertices: Vec<[f64; 3]>) -> Result<Self, MeshError> {
        Self::new(vertices, Vec::new())
    }

    /// The vertex positions.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// The triangular faces.
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Vertex `i` as a vector, if it exists.
    pub fn vertex(&self, i: usize) -> Option<DVec3> {
        self.vertices.get(i).map(|&v| DVec3::from_array(v))
    }

    /// Arithmetic mean of the vertices, `None` for an empty mesh.
    pub fn centroid(&self) -> Option<DVec3> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self
            .vertices
            .iter()
            .fold(DVec3::ZERO, |acc, &v| acc + DVec3::from_array(v));
        Some(sum / self.vertices.len() as f64)
    }

    /// Axis-aligned bounding box as `(min, max)`, `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<(DVec3, DVec3)> {
        let first = DVec3::from_array(*self.vertices.first()?);
        Some(self.vertices.iter().fold((first, first), |(lo, hi), &v| {
            let v = DVec3::from_array(v);
            (lo.min(v), hi.max(v))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_index_validation() {
        let verts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(TriMesh::new(verts.clone(), vec![[0, 1, 2]]).is_ok());
        assert_eq!(
            TriMesh::new(verts, vec![[0, 1, 2], [0, 3, 1]]),
            Err(MeshError::FaceIndexOutOfRange {
                face: 1,
                index: 3,
                num_vertices: 3
            })
        );
    }

    #[test]
    fn test_non_finite_vertex() {
        let res = TriMesh::from_points(vec![[0.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0]]);
        assert_eq!(res, Err(MeshError::NonFiniteVertex(1)));
    }

    #[test]
    fn test_centroid_and_bbox() -> Result<(), MeshError> {
        let mesh = TriMesh::from_points(vec![[0.0, 0.0, 0.0], [2.0, 4.0, -2.0]])?;
        assert_eq!(mesh.centroid(), Some(DVec3::new(1.0, 2.0, -1.0)));
        assert_eq!(
            mesh.bounding_box(),
            Some((DVec3::new(0.0, 0.0, -2.0), DVec3::new(2.0, 4.0, 0.0)))
        );
        let empty = TriMesh::from_points(vec![])?;
        assert_eq!(empty.centroid(), None);
        assert_eq!(empty.bounding_box(), None);
        Ok(())
    }
}
