use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use glam::Vec3;
use tracing::{debug, trace, warn};

use crate::config::{Config, LayerHeightPrecedence};
use crate::error::{Error, Result};
use crate::parser::{comment_hint, parse_line, CommentHints, GCodeLine};

/// One extruding move, ready to be turned into a tube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrusionSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub width: f32,
    pub height: f32,
    /// Filament advanced by this move (E delta).
    pub extrusion: f32,
}

impl ExtrusionSegment {
    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub lines: usize,
    pub motion_lines: usize,
    /// Extruding moves dropped because they had no length to divide by.
    pub zero_length: usize,
}

/// Result of one full scan over a G-code stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub segments: Vec<ExtrusionSegment>,
    pub layer_height: f32,
    pub extrusion_width: f32,
    pub stats: ExtractStats,
}

/// Tool head state threaded through every line.
#[derive(Debug, Clone)]
struct MotionState {
    x: Option<f32>,
    y: Option<f32>,
    z: f32,
    z_seen: bool,
    e: f32,
    layer_height: f32,
    extrusion_width: f32,
    layer_height_from_comment: bool,
    relative_positioning: bool, // G91
    relative_extrusion: bool,   // M83
}

impl MotionState {
    fn new(config: &Config) -> Self {
        Self {
            x: None,
            y: None,
            z: 0.0,
            z_seen: false,
            e: 0.0,
            layer_height: config.default_layer_height,
            extrusion_width: config.default_extrusion_width,
            layer_height_from_comment: false,
            relative_positioning: false,
            relative_extrusion: false,
        }
    }
}

/// Single-pass scanner turning G-code lines into extrusion segments.
///
/// Feed lines in file order with [`push_line`](Self::push_line) and collect the
/// result with [`finish`](Self::finish).
pub struct SegmentExtractor<'c> {
    config: &'c Config,
    state: MotionState,
    segments: Vec<ExtrusionSegment>,
    stats: ExtractStats,
}

impl<'c> SegmentExtractor<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            state: MotionState::new(config),
            segments: Vec::new(),
            stats: ExtractStats::default(),
        }
    }

    pub fn push_line(&mut self, raw: &str) -> Result<()> {
        let index = self.stats.lines;
        self.stats.lines += 1;

        if index < self.config.hint_scan_lines {
            self.apply_hints(comment_hint(raw));
        }

        let Some(line) = parse_line(raw) else {
            return Ok(());
        };

        if line.is_motion() {
            self.stats.motion_lines += 1;
            self.process_move(&line, raw)?;
        } else if line.is_command("G90") {
            self.state.relative_positioning = false;
        } else if line.is_command("G91") {
            self.state.relative_positioning = true;
        } else if line.is_command("M82") {
            self.state.relative_extrusion = false;
        } else if line.is_command("M83") {
            self.state.relative_extrusion = true;
        } else if line.is_command("G92") {
            self.process_reset(&line, raw)?;
        }

        Ok(())
    }

    pub fn finish(self) -> Extraction {
        debug!(
            "Extracted {} segments from {} lines (layer_height={}, extrusion_width={})",
            self.segments.len(),
            self.stats.lines,
            self.state.layer_height,
            self.state.extrusion_width
        );
        Extraction {
            segments: self.segments,
            layer_height: self.state.layer_height,
            extrusion_width: self.state.extrusion_width,
            stats: self.stats,
        }
    }

    fn field(&self, line: &GCodeLine<'_>, letter: char, raw: &str) -> Result<Option<f32>> {
        match line.field(letter) {
            Ok(Some(value)) if !value.is_finite() => {
                Err(Error::parse(self.stats.lines, raw.trim_end()))
            }
            Ok(value) => Ok(value),
            Err(_) => Err(Error::parse(self.stats.lines, raw.trim_end())),
        }
    }

    fn apply_hints(&mut self, hints: CommentHints) {
        if let Some(height) = hints.layer_height {
            if height.is_finite() && height > 0.0 {
                debug!("Detected layer height from comment: {height}");
                self.state.layer_height = height;
                self.state.layer_height_from_comment = true;
            } else {
                warn!("Ignoring layer height hint {height} on line {}", self.stats.lines);
            }
        }
        if let Some(width) = hints.extrusion_width {
            if width.is_finite() && width > 0.0 {
                debug!("Detected extrusion width from comment: {width}");
                self.state.extrusion_width = width;
            } else {
                warn!("Ignoring extrusion width hint {width} on line {}", self.stats.lines);
            }
        }
    }

    fn observe_z(&mut self, new_z: f32) {
        if self.state.z_seen && new_z > self.state.z {
            let step = new_z - self.state.z;
            if (self.config.min_layer_step..=self.config.max_layer_step).contains(&step) {
                let locked = self.config.layer_height_precedence
                    == LayerHeightPrecedence::CommentFirst
                    && self.state.layer_height_from_comment;
                if locked {
                    trace!("Z step {step} ignored, layer height comes from a comment");
                } else {
                    trace!("Detected layer height from Z step: {step}");
                    self.state.layer_height = step;
                }
            }
        }
        self.state.z = new_z;
        self.state.z_seen = true;
    }

    fn process_move(&mut self, line: &GCodeLine<'_>, raw: &str) -> Result<()> {
        let x = self.field(line, 'X', raw)?;
        let y = self.field(line, 'Y', raw)?;
        let z = self.field(line, 'Z', raw)?;
        let e = self.field(line, 'E', raw)?;

        let relative = self.state.relative_positioning;
        let resolve = |current: Option<f32>, given: Option<f32>| match given {
            Some(v) if relative => Some(current.unwrap_or(0.0) + v),
            Some(v) => Some(v),
            None => current,
        };
        let target_x = resolve(self.state.x, x);
        let target_y = resolve(self.state.y, y);

        if let Some(v) = z {
            let new_z = if relative { self.state.z + v } else { v };
            self.observe_z(new_z);
        }

        let previous_e = self.state.e;
        let target_e = e.map(|v| {
            if self.state.relative_extrusion {
                previous_e + v
            } else {
                v
            }
        });

        if let Some(new_e) = target_e.filter(|&new_e| new_e > previous_e) {
            if let (Some(x0), Some(y0), Some(x1), Some(y1)) =
                (self.state.x, self.state.y, target_x, target_y)
            {
                let z = self.state.z;
                self.emit(Vec3::new(x0, y0, z), Vec3::new(x1, y1, z), new_e - previous_e);
            }
        }

        self.state.x = target_x;
        self.state.y = target_y;
        if let Some(new_e) = target_e {
            self.state.e = new_e;
        }
        Ok(())
    }

    fn process_reset(&mut self, line: &GCodeLine<'_>, raw: &str) -> Result<()> {
        if let Some(v) = self.field(line, 'X', raw)? {
            self.state.x = Some(v);
        }
        if let Some(v) = self.field(line, 'Y', raw)? {
            self.state.y = Some(v);
        }
        if let Some(v) = self.field(line, 'Z', raw)? {
            self.state.z = v;
            self.state.z_seen = true;
        }
        if let Some(v) = self.field(line, 'E', raw)? {
            self.state.e = v;
        }
        Ok(())
    }

    fn emit(&mut self, start: Vec3, end: Vec3, extrusion: f32) {
        let width = if self.config.volumetric_width {
            match volumetric_width(
                extrusion,
                start.distance(end),
                self.state.layer_height,
                self.state.extrusion_width,
                self.config,
            ) {
                Some(width) => width,
                None => {
                    trace!("Dropping zero-length extrusion on line {}", self.stats.lines);
                    self.stats.zero_length += 1;
                    return;
                }
            }
        } else {
            self.state.extrusion_width
        };

        self.segments.push(ExtrusionSegment {
            start,
            end,
            width,
            height: self.state.layer_height,
            extrusion,
        });
    }
}

/// Bead width that conserves the extruded volume over a move.
///
/// Returns `None` when the move has no length. A non-positive layer height
/// or an undefined quotient falls back to `fallback_width`, which must be
/// finite. The result is clamped to the configured width bounds.
pub fn volumetric_width(
    extrusion: f32,
    length: f32,
    layer_height: f32,
    fallback_width: f32,
    config: &Config,
) -> Option<f32> {
    if !(length > f32::EPSILON) {
        return None;
    }

    let width = if layer_height > 0.0 {
        extrusion / (length * layer_height)
    } else {
        fallback_width
    };
    let width = if width.is_nan() { fallback_width } else { width };
    Some(config.clamp_width(width))
}

/// Scan a whole G-code stream.
pub fn extract_segments<R: BufRead>(reader: R, config: &Config) -> Result<Extraction> {
    config.validate()?;
    let mut extractor = SegmentExtractor::new(config);
    for line in reader.lines() {
        extractor.push_line(&line?)?;
    }
    Ok(extractor.finish())
}

pub fn extract_from_str(input: &str, config: &Config) -> Result<Extraction> {
    extract_segments(input.as_bytes(), config)
}

/// Open, scan and close a G-code file.
pub fn extract_from_path(path: impl AsRef<Path>, config: &Config) -> Result<Extraction> {
    let file = File::open(path.as_ref())?;
    extract_segments(BufReader::new(file), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(input: &str) -> Extraction {
        extract_from_str(input, &Config::default()).unwrap()
    }

    #[test]
    fn test_single_segment_emission() {
        let out = extract("G1 X0 Y0 E0\nG1 X10 Y0 E5\nG1 X10 Y10\n");
        assert_eq!(out.segments.len(), 1);
        let seg = out.segments[0];
        assert_eq!(seg.start, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(seg.end, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(seg.extrusion, 5.0);
        assert_eq!(out.stats.motion_lines, 3);
    }

    #[test]
    fn test_coordinate_carry_forward() {
        let out = extract("G0 X5 Y5 Z0.3\nG1 X15 E1\nG1 Y20 E2\n");
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.segments[0].start, Vec3::new(5.0, 5.0, 0.3));
        assert_eq!(out.segments[0].end, Vec3::new(15.0, 5.0, 0.3));
        assert_eq!(out.segments[1].end, Vec3::new(15.0, 20.0, 0.3));
    }

    #[test]
    fn test_unresolved_start_emits_nothing() {
        let out = extract("G1 X10 E1\nG1 X20 Y5 E2\nG1 X30 E3\n");
        // Y is unknown until line 2, so only line 3 has a resolved start.
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].start, Vec3::new(20.0, 5.0, 0.0));
    }

    #[test]
    fn test_retraction_is_not_extrusion() {
        let out = extract("G1 X0 Y0 E5\nG1 X10 Y0 E4\nG1 X20 Y0 E4\nG1 X30 Y0 E4.5\n");
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].start.x, 20.0);
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        let out = extract("M104 S200\nT0\nG28\n; comment\n\nG1 X0 Y0\nG1 X1 Y0 E0.1\n");
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.stats.lines, 7);
    }

    #[test]
    fn test_malformed_number_reports_line() {
        let err = extract_from_str("G1 X0 Y0\nG1 X1.2.3 E1\n", &Config::default()).unwrap_err();
        match err {
            Error::Parse { line, text } => {
                assert_eq!(line, 2);
                assert_eq!(text, "G1 X1.2.3 E1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_finite_numbers_are_malformed() {
        for (input, bad) in [
            ("G1 X0 Y0\nG1 Xnan Y0 E1\nG1 X10 Y0 E2\n", "G1 Xnan Y0 E1"),
            ("G1 X0 Y0\nG1 X10 Yinf E1\n", "G1 X10 Yinf E1"),
            ("G1 X0 Y0\nG1 X10 Y0 E1e400\n", "G1 X10 Y0 E1e400"),
            ("G1 X0 Y0\nG92 Z-infinity\n", "G92 Z-infinity"),
        ] {
            match extract_from_str(input, &Config::default()) {
                Err(Error::Parse { line, text }) => {
                    assert_eq!(line, 2);
                    assert_eq!(text, bad);
                }
                other => panic!("expected parse error for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_tiny_layer_hint_meshes_nothing() {
        let gcode = "; layer_height = 0.0000000001\nG1 X1000 Y1000 Z0.2\nG1 X1010 Y1000 E1\n";
        let out = extract(gcode);
        assert_eq!(out.segments.len(), 1);
        let built = crate::geometry::generate_mesh(&out.segments, &Config::default()).unwrap();
        assert_eq!(built.skipped, 1);
        assert!(built.mesh.is_empty());
    }

    #[test]
    fn test_unused_words_are_not_parsed() {
        let out = extract("M117 Hello world\nG1 X0 Y0 Fabc\nG1 X1 Y0 E0.1\n");
        assert_eq!(out.segments.len(), 1);
    }

    #[test]
    fn test_comment_hints_set_parameters() {
        let out = extract("; layer_height = 0.3\n; extrusion_width = 0.5\n");
        assert_eq!(out.layer_height, 0.3);
        assert_eq!(out.extrusion_width, 0.5);
    }

    #[test]
    fn test_comment_hints_only_in_header() {
        let mut gcode = "G4 P0\n".repeat(100);
        gcode.push_str("; layer_height = 0.3\n");
        let out = extract(&gcode);
        assert_eq!(out.layer_height, Config::DEFAULT_LAYER_HEIGHT);
    }

    #[test]
    fn test_non_positive_hint_is_ignored() {
        let out = extract("; layer_height = 0\n");
        assert_eq!(out.layer_height, Config::DEFAULT_LAYER_HEIGHT);
    }

    #[test]
    fn test_layer_height_from_z_steps() {
        let out = extract("G1 Z0.3\nG1 Z0.55\n");
        assert!((out.layer_height - 0.25).abs() < 1e-5);

        // Steps outside the window leave the estimate alone.
        let out = extract("G1 Z0.3\nG1 Z5.0\nG1 Z5.02\n");
        assert_eq!(out.layer_height, Config::DEFAULT_LAYER_HEIGHT);

        // The first Z has nothing to compare against.
        let out = extract("G1 Z0.5\n");
        assert_eq!(out.layer_height, Config::DEFAULT_LAYER_HEIGHT);
    }

    #[test]
    fn test_comment_first_precedence() {
        let gcode = "; layer_height = 0.15\nG1 Z0.3\nG1 Z0.6\n";
        let out = extract(gcode);
        assert_eq!(out.layer_height, 0.15);

        let config = Config::builder()
            .layer_height_precedence(LayerHeightPrecedence::LastObserved)
            .build();
        let out = extract_from_str(gcode, &config).unwrap();
        assert!((out.layer_height - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_comment_overrides_earlier_z_step() {
        let out = extract("G1 Z0.3\nG1 Z0.6\n; layer height: 0.12\n");
        assert_eq!(out.layer_height, 0.12);
    }

    #[test]
    fn test_segment_uses_height_at_emission() {
        let out = extract("G1 Z0.2\nG1 X0 Y0\nG1 X10 E1\nG1 Z0.5\nG1 X0 E2\n");
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.segments[0].height, Config::DEFAULT_LAYER_HEIGHT);
        assert!((out.segments[1].height - 0.3).abs() < 1e-5);
        assert_eq!(out.segments[1].start.z, 0.5);
    }

    #[test]
    fn test_volumetric_width_per_segment() {
        // 10 mm at 0.2 mm layer with E 0.8 -> 0.8 / (10 * 0.2) = 0.4
        let out = extract("G1 X0 Y0\nG1 X10 Y0 E0.8\n");
        assert!((out.segments[0].width - 0.4).abs() < 1e-6);

        let out = extract("G1 X0 Y0\nG1 X10 Y0 E5\n");
        assert_eq!(out.segments[0].width, 2.0);
    }

    #[test]
    fn test_constant_width_mode() {
        let config = Config::builder().volumetric_width(false).build();
        let out = extract_from_str("; extrusion width 0.45\nG1 X0 Y0\nG1 X10 Y0 E5\n", &config)
            .unwrap();
        assert_eq!(out.segments[0].width, 0.45);
    }

    #[test]
    fn test_zero_length_extrusion_dropped() {
        let out = extract("G1 X0 Y0\nG1 E1\nG1 X5 E2\n");
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.stats.zero_length, 1);
    }

    #[test]
    fn test_volumetric_width_bounds() {
        let config = Config::default();
        assert_eq!(volumetric_width(1.0, 0.0, 0.2, 0.4, &config), None);
        assert_eq!(volumetric_width(1.0, f32::NAN, 0.2, 0.4, &config), None);
        assert_eq!(volumetric_width(1000.0, 1.0, 0.2, 0.4, &config), Some(2.0));
        assert_eq!(volumetric_width(1e-6, 100.0, 0.2, 0.4, &config), Some(0.1));
        assert_eq!(volumetric_width(1.0, 1.0, 0.0, 0.4, &config), Some(0.4));
        assert_eq!(volumetric_width(f32::INFINITY, f32::INFINITY, 0.2, 0.4, &config), Some(0.4));
    }

    #[test]
    fn test_g92_resets_extrusion_register() {
        let out = extract("G1 X0 Y0 E100\nG92 E0\nG1 X10 Y0 E1\n");
        assert_eq!(out.segments.len(), 1);
        assert_eq!(out.segments[0].extrusion, 1.0);
    }

    #[test]
    fn test_relative_modes() {
        let out = extract("G1 X0 Y0 Z0.2\nM83\nG1 X10 E0.4\nG1 X20 E0.4\nG91\nG1 Y5 E0.2\n");
        assert_eq!(out.segments.len(), 3);
        assert_eq!(out.segments[1].start.x, 10.0);
        assert_eq!(out.segments[2].end, Vec3::new(20.0, 5.0, 0.2));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::builder().width_bounds(1.0, 0.5).build();
        assert!(matches!(
            extract_from_str("G1 X0 Y0\n", &config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = extract_from_path("/nonexistent/input.gcode", &Config::default()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
