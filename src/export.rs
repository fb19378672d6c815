use crate::error::Result;
use crate::mesh::Mesh;
use byteorder::{LittleEndian, WriteBytesExt};
use glam::Vec3;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Marker text at the start of the 80-byte header.
pub const STL_HEADER: &[u8] = b"gcodemesh binary STL";
pub const HEADER_LEN: usize = 80;
/// Normal + three vertices + attribute count.
pub const TRIANGLE_LEN: usize = 50;

/// Normal written for faces whose cross product has no length.
pub const FALLBACK_NORMAL: Vec3 = Vec3::Z;

/// One STL facet, derived from a mesh face at write time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StlTriangle {
    pub normal: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub v3: Vec3,
}

/// Exact byte length of a binary STL with `faces` triangles.
pub fn stl_len(faces: usize) -> usize {
    HEADER_LEN + 4 + faces * TRIANGLE_LEN
}

/// Unit normal of `(v2 - v1) x (v3 - v1)`, or [`FALLBACK_NORMAL`] when it collapses.
pub fn facet_normal(v1: Vec3, v2: Vec3, v3: Vec3) -> Vec3 {
    let normal = (v2 - v1).cross(v3 - v1).normalize_or_zero();
    if normal == Vec3::ZERO {
        FALLBACK_NORMAL
    } else {
        normal
    }
}

/// Facets in face order.
pub fn triangles(mesh: &Mesh) -> impl Iterator<Item = StlTriangle> + '_ {
    mesh.faces().iter().map(move |&face| {
        let [v1, v2, v3] = mesh.face_positions(face);
        StlTriangle {
            normal: facet_normal(v1, v2, v3),
            v1,
            v2,
            v3,
        }
    })
}

fn write_vec3<W: Write>(buf: &mut W, v: Vec3) -> std::io::Result<()> {
    buf.write_f32::<LittleEndian>(v.x)?;
    buf.write_f32::<LittleEndian>(v.y)?;
    buf.write_f32::<LittleEndian>(v.z)
}

pub fn write_stl<W: Write>(writer: &mut W, mesh: &Mesh) -> Result<()> {
    // Wrap in BufWriter for better I/O performance (64KB buffer)
    let mut buf = BufWriter::with_capacity(64 * 1024, writer);

    let mut header = [0u8; HEADER_LEN];
    header[..STL_HEADER.len()].copy_from_slice(STL_HEADER);
    buf.write_all(&header)?;

    buf.write_u32::<LittleEndian>(mesh.face_count() as u32)?;

    for tri in triangles(mesh) {
        write_vec3(&mut buf, tri.normal)?;
        write_vec3(&mut buf, tri.v1)?;
        write_vec3(&mut buf, tri.v2)?;
        write_vec3(&mut buf, tri.v3)?;

        // Attribute byte count (u16)
        buf.write_u16::<LittleEndian>(0)?;
    }

    buf.flush()?;
    Ok(())
}

/// Create `path` and write the mesh into it.
pub fn save_stl(mesh: &Mesh, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    write_stl(&mut file, mesh)?;
    info!(
        "Saved {} triangles ({} bytes) to {:?}",
        mesh.face_count(),
        stl_len(mesh.face_count()),
        path
    );
    Ok(())
}
