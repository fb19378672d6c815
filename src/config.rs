use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for segment extraction and tube mesh generation.
///
/// # Usage
///
/// ```rust
/// use gcodemesh::config::Config;
/// // Quick setup with defaults
/// let config = Config::default();
///
/// // Custom basic parameters
/// let config = Config::new(0.2, 0.45, 12);
///
/// // Full control via builder
/// let config = Config::builder()
///     .default_layer_height(0.3)
///     .mesh_sides(16)
///     .segment_stride(2)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ─────────────────────────────────────────────────────────────
    // Printer Parameters
    // ─────────────────────────────────────────────────────────────
    /// Layer height in mm used until one is detected (default: 0.2)
    pub default_layer_height: f32,
    /// Extrusion width in mm used until one is detected (default: 0.4)
    pub default_extrusion_width: f32,

    // ─────────────────────────────────────────────────────────────
    // Parameter Inference
    // ─────────────────────────────────────────────────────────────
    /// Number of leading lines scanned for slicer comment hints (default: 100)
    pub hint_scan_lines: usize,
    /// Smallest Z increase accepted as a layer height (default: 0.1)
    pub min_layer_step: f32,
    /// Largest Z increase accepted as a layer height (default: 1.0)
    pub max_layer_step: f32,
    /// Which source wins when comments and Z steps disagree
    pub layer_height_precedence: LayerHeightPrecedence,
    /// Derive each segment's width from the extruded volume (default: true)
    pub volumetric_width: bool,
    /// Lower clamp for per-segment width in mm (default: 0.1)
    pub min_extrusion_width: f32,
    /// Upper clamp for per-segment width in mm (default: 2.0)
    pub max_extrusion_width: f32,

    // ─────────────────────────────────────────────────────────────
    // Mesh Quality
    // ─────────────────────────────────────────────────────────────
    /// Number of sides of the tube cross-section (default: 8)
    pub mesh_sides: usize,
    /// Keep every Nth segment (default: 1)
    pub segment_stride: usize,
    /// Raise the stride so at most this many segments are meshed (default: none)
    pub max_segments: Option<usize>,
    /// Segments shorter than this are skipped, in mm (default: 0.001)
    pub min_segment_length: f32,
}

/// Resolution rule for the two layer height sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerHeightPrecedence {
    /// A slicer comment hint is authoritative once seen; Z steps only
    /// update the estimate before any hint has been read.
    #[default]
    CommentFirst,
    /// Whichever source fired most recently in scan order wins.
    LastObserved,
}

// ═══════════════════════════════════════════════════════════════════
// Default values as constants for easy reference
// ═══════════════════════════════════════════════════════════════════

impl Config {
    pub const DEFAULT_LAYER_HEIGHT: f32 = 0.2;
    pub const DEFAULT_EXTRUSION_WIDTH: f32 = 0.4;
    pub const DEFAULT_HINT_SCAN_LINES: usize = 100;
    pub const DEFAULT_MIN_LAYER_STEP: f32 = 0.1;
    pub const DEFAULT_MAX_LAYER_STEP: f32 = 1.0;
    pub const DEFAULT_MIN_EXTRUSION_WIDTH: f32 = 0.1;
    pub const DEFAULT_MAX_EXTRUSION_WIDTH: f32 = 2.0;
    pub const DEFAULT_MESH_SIDES: usize = 8;
    pub const DEFAULT_SEGMENT_STRIDE: usize = 1;
    pub const DEFAULT_MIN_SEGMENT_LENGTH: f32 = 0.001;

    /// Directions whose |z| reaches this use world X as the reference axis.
    pub const VERTICAL_THRESHOLD: f32 = 0.9;
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_layer_height: Self::DEFAULT_LAYER_HEIGHT,
            default_extrusion_width: Self::DEFAULT_EXTRUSION_WIDTH,
            hint_scan_lines: Self::DEFAULT_HINT_SCAN_LINES,
            min_layer_step: Self::DEFAULT_MIN_LAYER_STEP,
            max_layer_step: Self::DEFAULT_MAX_LAYER_STEP,
            layer_height_precedence: LayerHeightPrecedence::default(),
            volumetric_width: true,
            min_extrusion_width: Self::DEFAULT_MIN_EXTRUSION_WIDTH,
            max_extrusion_width: Self::DEFAULT_MAX_EXTRUSION_WIDTH,
            mesh_sides: Self::DEFAULT_MESH_SIDES,
            segment_stride: Self::DEFAULT_SEGMENT_STRIDE,
            max_segments: None,
            min_segment_length: Self::DEFAULT_MIN_SEGMENT_LENGTH,
        }
    }
}

impl Config {
    /// Create config with basic printing parameters (uses defaults for everything else)
    pub fn new(default_layer_height: f32, default_extrusion_width: f32, mesh_sides: usize) -> Self {
        Self {
            default_layer_height,
            default_extrusion_width,
            mesh_sides,
            ..Default::default()
        }
    }

    /// Start building a config with the builder pattern
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the settings describe a buildable mesh.
    pub fn validate(&self) -> Result<()> {
        if self.mesh_sides < 3 {
            return Err(Error::Config(format!(
                "mesh_sides must be at least 3, got {}",
                self.mesh_sides
            )));
        }
        if !(self.default_extrusion_width.is_finite() && self.default_extrusion_width > 0.0) {
            return Err(Error::Config(format!(
                "default_extrusion_width must be positive, got {}",
                self.default_extrusion_width
            )));
        }
        if self.segment_stride == 0 {
            return Err(Error::Config("segment_stride must be at least 1".into()));
        }
        if self.max_segments == Some(0) {
            return Err(Error::Config("max_segments must be at least 1".into()));
        }
        if !(self.min_segment_length > 0.0) {
            return Err(Error::Config(format!(
                "min_segment_length must be positive, got {}",
                self.min_segment_length
            )));
        }
        if !(self.min_extrusion_width <= self.max_extrusion_width) {
            return Err(Error::Config(format!(
                "extrusion width bounds are inverted: [{}, {}]",
                self.min_extrusion_width, self.max_extrusion_width
            )));
        }
        if !(self.min_layer_step <= self.max_layer_step) {
            return Err(Error::Config(format!(
                "layer step window is inverted: [{}, {}]",
                self.min_layer_step, self.max_layer_step
            )));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Computed Values (derived from other fields)
    // ─────────────────────────────────────────────────────────────

    /// Stride actually applied to a list of `segment_count` segments.
    pub fn effective_stride(&self, segment_count: usize) -> usize {
        let stride = self.segment_stride.max(1);
        match self.max_segments {
            Some(max) if max > 0 => stride.max(segment_count.div_ceil(max)),
            _ => stride,
        }
    }

    /// Clamp a width into the configured bounds
    #[inline]
    pub fn clamp_width(&self, width: f32) -> f32 {
        width.clamp(self.min_extrusion_width, self.max_extrusion_width)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Builder Pattern
// ═══════════════════════════════════════════════════════════════════

/// Fluent builder for `Config`
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────
    // Printer Parameters
    // ─────────────────────────────────────────────────────────────

    pub fn default_layer_height(mut self, value: f32) -> Self {
        self.0.default_layer_height = value;
        self
    }

    pub fn default_extrusion_width(mut self, value: f32) -> Self {
        self.0.default_extrusion_width = value;
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Parameter Inference
    // ─────────────────────────────────────────────────────────────

    pub fn hint_scan_lines(mut self, value: usize) -> Self {
        self.0.hint_scan_lines = value;
        self
    }

    pub fn layer_step_window(mut self, min: f32, max: f32) -> Self {
        self.0.min_layer_step = min;
        self.0.max_layer_step = max;
        self
    }

    pub fn layer_height_precedence(mut self, value: LayerHeightPrecedence) -> Self {
        self.0.layer_height_precedence = value;
        self
    }

    pub fn volumetric_width(mut self, value: bool) -> Self {
        self.0.volumetric_width = value;
        self
    }

    pub fn width_bounds(mut self, min: f32, max: f32) -> Self {
        self.0.min_extrusion_width = min;
        self.0.max_extrusion_width = max;
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Mesh Quality
    // ─────────────────────────────────────────────────────────────

    pub fn mesh_sides(mut self, value: usize) -> Self {
        self.0.mesh_sides = value;
        self
    }

    pub fn segment_stride(mut self, value: usize) -> Self {
        self.0.segment_stride = value;
        self
    }

    pub fn max_segments(mut self, value: usize) -> Self {
        self.0.max_segments = Some(value);
        self
    }

    pub fn min_segment_length(mut self, value: f32) -> Self {
        self.0.min_segment_length = value;
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Build
    // ─────────────────────────────────────────────────────────────

    /// Consume the builder and return the configured `Config`
    pub fn build(self) -> Config {
        self.0
    }
}
