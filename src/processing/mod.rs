pub mod interpolation;
pub mod quality;

pub use interpolation::{
    confidence_bounds, interpolate_gap, interpolate_range, quality_flags, GapWindow,
    InterpolationMetadata, InterpolationMethod, SHUTDOWN_WINDOW,
};
pub use quality::{DataQuality, QualityRegistry};
