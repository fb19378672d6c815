//! Turn G-code extrusion moves into a tube mesh and write it as binary STL.
//!
//! The pipeline runs in three strictly ordered stages: [`processor`] scans the
//! command stream into segments, [`geometry`] sweeps a polygon along each
//! segment, and [`export`] serializes the faces.

pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod mesh;
pub mod parser;
pub mod processor;

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use glam::Vec3;
use tracing::{info, info_span};

pub use config::{Config, LayerHeightPrecedence};
pub use error::{Error, Result};
pub use mesh::Mesh;
pub use processor::ExtrusionSegment;

/// Summary of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub segments: usize,
    pub layer_height: f32,
    pub extrusion_width: f32,
    pub retained: usize,
    pub skipped: usize,
    pub vertices: usize,
    pub faces: usize,
    pub bounds: Option<(Vec3, Vec3)>,
    pub bytes_written: usize,
}

/// Scan `input` and build the tube mesh (stages one and two).
pub fn build_mesh<R: BufRead>(
    input: R,
    config: &Config,
) -> Result<(processor::Extraction, geometry::BuiltMesh)> {
    // Both stages validate the config on entry
    let extraction = info_span!("scan").in_scope(|| processor::extract_segments(input, config))?;
    if extraction.segments.is_empty() {
        info!("No extrusion segments found");
    }

    let built =
        info_span!("build").in_scope(|| geometry::generate_mesh(&extraction.segments, config))?;
    Ok((extraction, built))
}

fn report(extraction: &processor::Extraction, built: &geometry::BuiltMesh) -> ConversionReport {
    let report = ConversionReport {
        segments: extraction.segments.len(),
        layer_height: extraction.layer_height,
        extrusion_width: extraction.extrusion_width,
        retained: built.retained,
        skipped: built.skipped,
        vertices: built.mesh.vertex_count(),
        faces: built.mesh.face_count(),
        bounds: built.mesh.bounds(),
        bytes_written: export::stl_len(built.mesh.face_count()),
    };
    info!(
        "Converted {} segments into {} vertices / {} faces ({} skipped)",
        report.segments, report.vertices, report.faces, report.skipped
    );
    report
}

/// Scan `input`, build the tube mesh and write binary STL to `output`.
pub fn convert_gcode_to_stl<R: BufRead, W: Write>(
    input: R,
    output: &mut W,
    config: &Config,
) -> Result<ConversionReport> {
    let (extraction, built) = build_mesh(input, config)?;
    info_span!("serialize").in_scope(|| export::write_stl(output, &built.mesh))?;
    Ok(report(&extraction, &built))
}

/// Path-based [`convert_gcode_to_stl`]. The destination is only created once
/// the mesh has been built.
pub fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &Config,
) -> Result<ConversionReport> {
    let reader = BufReader::new(File::open(input.as_ref())?);
    let (extraction, built) = build_mesh(reader, config)?;
    info_span!("serialize").in_scope(|| export::save_stl(&built.mesh, output.as_ref()))?;
    Ok(report(&extraction, &built))
}
