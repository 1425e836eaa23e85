//! Decoded model geometry: triangles, bounds, centering and enclosed volume.

use anyhow::{Result, anyhow, bail};
use csgrs::mesh::Mesh;
use nalgebra::{Point3, Vector3};

use crate::upload::ModelId;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Smallest box holding every point, `None` for an empty set.
    pub fn from_points<I: IntoIterator<Item = Point3<f32>>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.inf(&p), hi.sup(&p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Radius of the bounding sphere around [`Aabb::center`].
    pub fn radius(&self) -> f32 {
        self.size().norm() * 0.5
    }
}

/// Triangle soup of one displayed model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGeometry {
    model: ModelId,
    triangles: Vec<[Point3<f32>; 3]>,
}

impl ModelGeometry {
    pub fn new(model: ModelId, triangles: Vec<[Point3<f32>; 3]>) -> Self {
        Self { model, triangles }
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn triangles(&self) -> &[[Point3<f32>; 3]] {
        &self.triangles
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.triangles.iter().flatten().copied())
    }

    pub fn translate(&mut self, offset: Vector3<f32>) {
        for p in self.triangles.iter_mut().flatten() {
            *p += offset;
        }
    }

    /// Move the geometry so its bounding box is centered on the origin.
    ///
    /// Returns the applied offset, `None` for empty geometry.
    pub fn center(&mut self) -> Option<Vector3<f32>> {
        let offset = -self.bounds()?.center().coords;
        self.translate(offset);
        Some(offset)
    }

    /// Edge list for the line renderer: per vertex `x y z r g b`.
    pub fn edge_vertices(&self, rgb: [f32; 3]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.triangles.len() * 36);
        for [a, b, c] in &self.triangles {
            for (p, q) in [(a, b), (b, c), (c, a)] {
                out.extend_from_slice(&[p.x, p.y, p.z, rgb[0], rgb[1], rgb[2]]);
                out.extend_from_slice(&[q.x, q.y, q.z, rgb[0], rgb[1], rgb[2]]);
            }
        }
        out
    }
}

fn read_stl(bytes: &[u8]) -> Result<Vec<[Point3<f64>; 3]>> {
    let mesh = Mesh::<()>::from_stl(bytes, None).map_err(|e| anyhow!("not a readable STL file: {e}"))?;
    let triangles: Vec<_> = mesh
        .polygons
        .iter()
        .flat_map(|poly| {
            let v = &poly.vertices;
            (1..v.len().saturating_sub(1)).map(move |i| [v[0].pos, v[i].pos, v[i + 1].pos])
        })
        .collect();
    if triangles.is_empty() {
        bail!("file contains no triangles");
    }
    Ok(triangles)
}

/// Decode STL bytes for display.
pub fn decode_stl(model: ModelId, bytes: &[u8]) -> Result<ModelGeometry> {
    let triangles = read_stl(bytes)?
        .into_iter()
        .map(|tri| tri.map(|p| p.cast::<f32>()))
        .collect();
    Ok(ModelGeometry::new(model, triangles))
}

/// Volume enclosed by a closed triangle mesh (divergence theorem).
pub fn enclosed_volume(triangles: &[[Point3<f64>; 3]]) -> f64 {
    let signed: f64 = triangles
        .iter()
        .map(|[a, b, c]| a.coords.dot(&b.coords.cross(&c.coords)) / 6.0)
        .sum();
    signed.abs()
}

/// Volume of an STL model in cm³, assuming millimetre units.
pub fn stl_volume_cm3(bytes: &[u8]) -> Result<f64> {
    Ok(enclosed_volume(&read_stl(bytes)?) / 1000.0)
}
