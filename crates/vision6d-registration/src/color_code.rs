use std::collections::HashMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vision6d_3d::TriMesh;

/// Channel value of the uniform gray fallback.
pub const GRAY: u8 = 128;

/// Error types for vertex color coding.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ColorCodeError {
    /// The mesh has no spatial extent to normalize against.
    #[error("Degenerate mesh: {num_vertices} vertices with zero bounding-box extent")]
    DegenerateMesh {
        /// Number of vertices in the mesh.
        num_vertices: usize,
    },
}

/// How vertex positions are mapped to colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Normalized object coordinates: the bounding box mapped onto the RGB cube.
    #[default]
    Nocs,
    /// Longitude and latitude around the centroid in red and green, blue constant.
    LatLon,
}

impl std::str::FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nocs" => Ok(ColorScheme::Nocs),
            "latlon" => Ok(ColorScheme::LatLon),
            other => Err(format!("unknown color scheme '{other}', expected 'nocs' or 'latlon'")),
        }
    }
}

/// Per-vertex RGB colors plus the scheme that produced them.
///
/// Decoding is a nearest-color lookup; exact colors hit a hash table first.
#[derive(Debug, Clone)]
pub struct ColorCode {
    scheme: ColorScheme,
    colors: Vec<[u8; 3]>,
    // first vertex index of every distinct color
    exact: HashMap<[u8; 3], usize>,
}

impl ColorCode {
    /// Build a code from explicit colors.
    pub fn from_colors(scheme: ColorScheme, colors: Vec<[u8; 3]>) -> Self {
        let mut exact = HashMap::with_capacity(colors.len());
        for (i, c) in colors.iter().enumerate() {
            exact.entry(*c).or_insert(i);
        }
        Self {
            scheme,
            colors,
            exact,
        }
    }

    /// Color every vertex of `mesh` with `scheme`.
    ///
    /// # Errors
    ///
    /// [`ColorCodeError::DegenerateMesh`] when the mesh is empty or all vertices coincide.
    pub fn encode(mesh: &TriMesh, scheme: ColorScheme) -> Result<Self, ColorCodeError> {
        let colors = match scheme {
            ColorScheme::Nocs => encode_nocs(mesh)?,
            ColorScheme::LatLon => encode_latlon(mesh)?,
        };
        Ok(Self::from_colors(scheme, colors))
    }

    /// Like [`ColorCode::encode`], falling back to uniform gray for degenerate meshes.
    pub fn encode_or_gray(mesh: &TriMesh, scheme: ColorScheme) -> Self {
        match Self::encode(mesh, scheme) {
            Ok(code) => code,
            Err(e) => {
                log::warn!("{e}; coloring the mesh uniform gray");
                Self::uniform_gray(scheme, mesh.num_vertices())
            }
        }
    }

    /// Every vertex gray. Decoding such a code always yields vertex 0.
    pub fn uniform_gray(scheme: ColorScheme, num_vertices: usize) -> Self {
        Self::from_colors(scheme, vec![[GRAY; 3]; num_vertices])
    }

    /// The scheme that produced the colors.
    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    /// Per-vertex colors.
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Number of coded vertices.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether no vertex is coded.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Index of the vertex whose color is nearest to `rgb` in RGB space.
    ///
    /// Ties go to the lowest vertex index. `None` only for an empty code.
    pub fn decode(&self, rgb: [u8; 3]) -> Option<usize> {
        if let Some(&idx) = self.exact.get(&rgb) {
            return Some(idx);
        }
        let mut best: Option<(u32, usize)> = None;
        for (i, c) in self.colors.iter().enumerate() {
            let d = sq_dist(*c, rgb);
            if best.map_or(true, |(best_d, _)| d < best_d) {
                best = Some((d, i));
            }
        }
        best.map(|(_, i)| i)
    }
}

fn sq_dist(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x.abs_diff(y) as u32;
            d * d
        })
        .sum()
}

/// Map `[0, 1]` onto `[1, 254]`. The two extreme channel values stay free so that a black or
/// white background can never be mistaken for a vertex.
fn quantize(unit: f64) -> u8 {
    1 + (unit.clamp(0.0, 1.0) * 253.0).round() as u8
}

fn encode_nocs(mesh: &TriMesh) -> Result<Vec<[u8; 3]>, ColorCodeError> {
    let degenerate = ColorCodeError::DegenerateMesh {
        num_vertices: mesh.num_vertices(),
    };
    let (min, max) = mesh.bounding_box().ok_or_else(|| degenerate.clone())?;
    let extent = max - min;
    if extent.max_element() <= 0.0 {
        return Err(degenerate);
    }
    // A flat axis carries no information and stays at zero.
    let inv = DVec3::select(extent.cmpgt(DVec3::ZERO), extent.recip(), DVec3::ZERO);
    Ok(mesh
        .vertices()
        .iter()
        .map(|v| {
            let unit = (DVec3::from(*v) - min) * inv;
            [quantize(unit.x), quantize(unit.y), quantize(unit.z)]
        })
        .collect())
}

fn encode_latlon(mesh: &TriMesh) -> Result<Vec<[u8; 3]>, ColorCodeError> {
    let degenerate = ColorCodeError::DegenerateMesh {
        num_vertices: mesh.num_vertices(),
    };
    let centroid = mesh.centroid().ok_or_else(|| degenerate.clone())?;
    let (min, max) = mesh.bounding_box().ok_or_else(|| degenerate.clone())?;
    if (max - min).max_element() <= 0.0 {
        return Err(degenerate);
    }
    Ok(mesh
        .vertices()
        .iter()
        .map(|v| {
            let p = DVec3::from(*v) - centroid;
            let r = p.length();
            let lon = p.y.atan2(p.x);
            let lat = if r > 0.0 { (p.z / r).clamp(-1.0, 1.0).asin() } else { 0.0 };
            let lon_unit = (lon + std::f64::consts::PI) / std::f64::consts::TAU;
            let lat_unit = (lat + std::f64::consts::FRAC_PI_2) / std::f64::consts::PI;
            [quantize(lon_unit), quantize(lat_unit), GRAY]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_mesh() -> Result<TriMesh, vision6d_3d::MeshError> {
        let mut vertices = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    vertices.push([i as f64, j as f64 * 0.5, k as f64 * 2.0 - 3.0]);
                }
            }
        }
        TriMesh::from_points(vertices)
    }

    #[test]
    fn test_nocs_corners() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = cube_mesh()?;
        let code = ColorCode::encode(&mesh, ColorScheme::Nocs)?;
        assert_eq!(code.len(), 64);
        assert_eq!(code.colors()[0], [1, 1, 1]);
        assert_eq!(code.colors()[63], [254, 254, 254]);
        // (1, 1.0, -1.0) -> (1/3, 2/3, 1/3)
        assert_eq!(code.colors()[16 + 8 + 1], [85, 170, 85]);
        Ok(())
    }

    #[test]
    fn test_codes_avoid_black_and_white() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = cube_mesh()?;
        for scheme in [ColorScheme::Nocs, ColorScheme::LatLon] {
            let code = ColorCode::encode(&mesh, scheme)?;
            for c in code.colors() {
                assert!(c.iter().all(|&v| (1..=254).contains(&v)), "{scheme:?} {c:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_nocs_decode_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = cube_mesh()?;
        let code = ColorCode::encode(&mesh, ColorScheme::Nocs)?;
        for (i, c) in code.colors().iter().enumerate() {
            assert_eq!(code.decode(*c), Some(i));
        }
        Ok(())
    }

    #[test]
    fn test_decode_nearest_and_ties() {
        let code = ColorCode::from_colors(
            ColorScheme::Nocs,
            vec![[10, 10, 10], [20, 10, 10], [10, 10, 10], [200, 0, 0]],
        );
        assert_eq!(code.decode([12, 10, 10]), Some(0));
        assert_eq!(code.decode([18, 11, 10]), Some(1));
        // equidistant from 0 and 1
        assert_eq!(code.decode([15, 10, 10]), Some(0));
        // exact duplicate color resolves to the lowest index
        assert_eq!(code.decode([10, 10, 10]), Some(0));
        assert_eq!(code.decode([255, 0, 0]), Some(3));
        assert_eq!(ColorCode::from_colors(ColorScheme::Nocs, vec![]).decode([0, 0, 0]), None);
    }

    #[test]
    fn test_degenerate_mesh_falls_back_to_gray() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = TriMesh::from_points(vec![[1.0, 2.0, 3.0]; 3])?;
        assert_eq!(
            ColorCode::encode(&mesh, ColorScheme::Nocs).err(),
            Some(ColorCodeError::DegenerateMesh { num_vertices: 3 })
        );
        assert!(ColorCode::encode(&mesh, ColorScheme::LatLon).is_err());

        let code = ColorCode::encode_or_gray(&mesh, ColorScheme::Nocs);
        assert_eq!(code.colors(), &[[GRAY; 3]; 3]);
        assert_eq!(code.decode([0, 0, 0]), Some(0));
        Ok(())
    }

    #[test]
    fn test_flat_mesh_is_not_degenerate() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = TriMesh::from_points(vec![[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [0.0, 1.0, 1.0]])?;
        let code = ColorCode::encode(&mesh, ColorScheme::Nocs)?;
        assert_eq!(code.colors(), &[[1, 1, 1], [254, 1, 1], [1, 254, 1]]);
        Ok(())
    }

    #[test]
    fn test_latlon_layout() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = TriMesh::from_points(vec![
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ])?;
        let code = ColorCode::encode(&mesh, ColorScheme::LatLon)?;
        assert_eq!(code.scheme(), ColorScheme::LatLon);
        // +x: lon 0, lat 0
        assert_eq!(code.colors()[0], [128, 128, GRAY]);
        // +y: lon pi/2
        assert_eq!(code.colors()[2], [191, 128, GRAY]);
        // poles
        assert_eq!(code.colors()[4][1], 254);
        assert_eq!(code.colors()[5][1], 1);
        assert!(code.colors().iter().all(|c| c[2] == GRAY));
        Ok(())
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("NOCS".parse::<ColorScheme>(), Ok(ColorScheme::Nocs));
        assert_eq!("latlon".parse::<ColorScheme>(), Ok(ColorScheme::LatLon));
        assert!("rgb".parse::<ColorScheme>().is_err());
    }
}
