use crate::config::Config;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::processor::ExtrusionSegment;
use glam::Vec3;
use tracing::debug;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

/// Tube mesh plus the tally of segments that did not make it in.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltMesh {
    pub mesh: Mesh,
    pub retained: usize,
    pub skipped: usize,
}

/// Expected `(vertices, faces)` for `segments` retained tubes with `sides`-gon
/// cross-sections. The first tube caps its start and the last caps its end.
pub fn mesh_size(segments: usize, sides: usize) -> (usize, usize) {
    if segments == 0 {
        return (0, 0);
    }
    (2 * sides * segments + 2, 2 * sides * segments + 2 * sides)
}

/// Oriented frame of one retained segment.
#[derive(Debug, Clone, Copy)]
struct Tube {
    start: Vec3,
    end: Vec3,
    right: Vec3,
    up: Vec3,
    radius: f32,
    cap_start: bool,
    cap_end: bool,
}

impl Tube {
    fn new(segment: &ExtrusionSegment, circle: &[(f32, f32)], config: &Config) -> Option<Self> {
        let ExtrusionSegment {
            start,
            end,
            width,
            height,
            ..
        } = *segment;
        if !(start.is_finite() && end.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }

        let delta = end - start;
        let length = delta.length();
        if length < config.min_segment_length {
            return None;
        }

        let radius = width.min(height) * 0.5;
        if radius <= 0.0 {
            return None;
        }

        let dir = delta / length;
        // Near-vertical moves would make the cross product with Z collapse
        let reference = if dir.z.abs() < Config::VERTICAL_THRESHOLD {
            Vec3::Z
        } else {
            Vec3::X
        };
        let right = dir.cross(reference).normalize();
        let up = right.cross(dir).normalize();

        // A radius below float resolution at these coordinates collapses the
        // rings onto the centre line
        let collapsed = circle.iter().any(|&(c, s)| {
            let offset = (right * c + up * s) * radius;
            start + offset == start || end + offset == end
        });
        if collapsed {
            return None;
        }

        Some(Self {
            start,
            end,
            right,
            up,
            radius,
            cap_start: false,
            cap_end: false,
        })
    }

    fn caps(&self) -> usize {
        self.cap_start as usize + self.cap_end as usize
    }

    fn vertex_count(&self, sides: usize) -> usize {
        2 * sides + self.caps()
    }

    fn face_count(&self, sides: usize) -> usize {
        2 * sides + sides * self.caps()
    }

    /// Fill this tube's slice of the arenas. `base` is the global index of
    /// `vertices[0]`.
    fn write(&self, circle: &[(f32, f32)], base: u32, vertices: &mut [Vec3], faces: &mut [[u32; 3]]) {
        let sides = circle.len();
        let n = sides as u32;

        for (j, &(c, s)) in circle.iter().enumerate() {
            let offset = (self.right * c + self.up * s) * self.radius;
            vertices[j] = self.start + offset;
            vertices[sides + j] = self.end + offset;
        }

        let mut f = 0;
        for j in 0..sides {
            let a = base + j as u32;
            let b = base + ((j + 1) % sides) as u32;
            faces[f] = [a, b, a + n];
            faces[f + 1] = [b, b + n, a + n];
            f += 2;
        }

        let mut next = 2 * sides;
        if self.cap_start {
            let apex = base + next as u32;
            vertices[next] = self.start;
            next += 1;
            for j in 0..sides {
                let a = base + j as u32;
                let b = base + ((j + 1) % sides) as u32;
                faces[f] = [apex, b, a];
                f += 1;
            }
        }
        if self.cap_end {
            let apex = base + next as u32;
            vertices[next] = self.end;
            for j in 0..sides {
                let a = base + n + j as u32;
                let b = base + n + ((j + 1) % sides) as u32;
                faces[f] = [apex, a, b];
                f += 1;
            }
        }
    }
}

/// Sweep an `mesh_sides`-gon along every retained segment.
///
/// Segments are subsampled by the configured stride first; the ones that are
/// too short, non-finite, or too thin to resolve are skipped and counted. Only the
/// outer ends of the chain are capped, interior junctions stay open.
pub fn generate_mesh(segments: &[ExtrusionSegment], config: &Config) -> Result<BuiltMesh> {
    config.validate()?;
    let sides = config.mesh_sides;
    let unit_circle: Vec<(f32, f32)> = (0..sides)
        .map(|j| {
            let angle = (j as f32 / sides as f32) * std::f32::consts::TAU;
            (angle.cos(), angle.sin())
        })
        .collect();
    let stride = config.effective_stride(segments.len());

    let sampled = segments.iter().step_by(stride);
    let sampled_count = sampled.len();
    let mut tubes: Vec<Tube> = sampled
        .filter_map(|segment| Tube::new(segment, &unit_circle, config))
        .collect();
    let skipped = sampled_count - tubes.len();

    if let Some(first) = tubes.first_mut() {
        first.cap_start = true;
    }
    if let Some(last) = tubes.last_mut() {
        last.cap_end = true;
    }

    // Prefix sums give every tube a disjoint index range up front
    let total_vertices: usize = tubes.iter().map(|t| t.vertex_count(sides)).sum();
    let total_faces: usize = tubes.iter().map(|t| t.face_count(sides)).sum();
    if u32::try_from(total_vertices).is_err() {
        return Err(Error::MeshTooLarge {
            vertices: total_vertices,
        });
    }

    let mut vertices = vec![Vec3::ZERO; total_vertices];
    let mut faces = vec![[0u32; 3]; total_faces];

    let mut jobs = Vec::with_capacity(tubes.len());
    let mut vertex_rest = &mut vertices[..];
    let mut face_rest = &mut faces[..];
    let mut base = 0u32;
    for tube in &tubes {
        let (v, v_tail) = std::mem::take(&mut vertex_rest).split_at_mut(tube.vertex_count(sides));
        let (f, f_tail) = std::mem::take(&mut face_rest).split_at_mut(tube.face_count(sides));
        vertex_rest = v_tail;
        face_rest = f_tail;
        let offset = base;
        base += v.len() as u32;
        jobs.push((tube, offset, v, f));
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        jobs.into_par_iter()
            .for_each(|(tube, offset, v, f)| tube.write(&unit_circle, offset, v, f));
    }

    #[cfg(target_arch = "wasm32")]
    {
        jobs.into_iter()
            .for_each(|(tube, offset, v, f)| tube.write(&unit_circle, offset, v, f));
    }

    debug!(
        "Built {} vertices / {} faces from {} segments (stride {}, {} skipped)",
        total_vertices,
        total_faces,
        tubes.len(),
        stride,
        skipped
    );

    Ok(BuiltMesh {
        mesh: Mesh::from_arenas(vertices, faces),
        retained: tubes.len(),
        skipped,
    })
}
