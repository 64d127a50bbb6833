#![allow(dead_code)]

use mode_objects_lib::{FuzzyConfig, RawField, ThreshOp, Threshold, DEFAULT_BAD_DATA};

/// Rectangle of constant value: (x0, y0, width, height, value)
pub type Block = (usize, usize, usize, usize, f64);

pub fn field_with_blocks(nx: usize, ny: usize, blocks: &[Block]) -> RawField {
    let mut field = RawField::filled(nx, ny, 0.0, DEFAULT_BAD_DATA);
    for &(x0, y0, w, h, value) in blocks {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                field.set(x, y, value);
            }
        }
    }
    field
}

/// Field with the given pixels set to `value`
pub fn field_with_pixels(nx: usize, ny: usize, pixels: &[(usize, usize)], value: f64) -> RawField {
    let mut field = RawField::filled(nx, ny, 0.0, DEFAULT_BAD_DATA);
    for &(x, y) in pixels {
        field.set(x, y, value);
    }
    field
}

/// No smoothing and a threshold of 1 so masks follow the raw values exactly
pub fn unsmoothed_config() -> FuzzyConfig {
    let mut config = FuzzyConfig::default();
    for field in [&mut config.fcst, &mut config.obs] {
        field.conv_radius = 0;
        field.conv_thresh = Threshold::new(ThreshOp::Ge, 1.0);
        field.merge_thresh = Threshold::new(ThreshOp::Ge, 0.5);
    }
    config
}
