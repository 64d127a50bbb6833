use log::debug;

use crate::config::Threshold;
use crate::errors::{ModeError, Result};
use crate::field::{Mask, RawField};

/// Offsets of a disk of the given radius, including the rim (`dx² + dy² <= r²`)
pub fn circular_kernel(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let r_sq = r * r;
    let mut offsets = Vec::with_capacity((2 * radius + 1) * (2 * radius + 1));

    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r_sq {
                offsets.push((dx, dy));
            }
        }
    }

    offsets
}

/// Mark a band of `size` pixels along every grid edge as bad data
pub fn apply_zero_border(field: &mut RawField, size: usize) {
    let (nx, ny) = (field.nx(), field.ny());
    for y in 0..ny {
        for x in 0..nx {
            if x < size || y < size || x + size >= nx || y + size >= ny {
                field.set_bad(x, y);
            }
        }
    }
}

/// Circular averaging filter.
///
/// Bad pixels and pixels outside the grid do not contribute to the mean. A bad centre
/// pixel stays bad when the fraction of valid pixels under the kernel is below
/// `vld_thresh`; a valid centre always receives the mean of the valid pixels.
pub fn convolve(raw: &RawField, radius: usize, vld_thresh: f64) -> RawField {
    if radius == 0 {
        return raw.clone();
    }

    let (nx, ny) = (raw.nx(), raw.ny());
    let kernel = circular_kernel(radius);
    let mut out = raw.clone();

    for y in 0..ny {
        for x in 0..nx {
            let centre_bad = raw.is_bad(raw.get(x, y));

            let mut sum = 0.0;
            let mut count = 0usize;
            let mut bad_count = 0usize;

            for &(dx, dy) in &kernel {
                let xx = x as isize + dx;
                let yy = y as isize + dy;
                if let Some(&v) = raw.grid().get_signed(xx, yy) {
                    if raw.is_bad(v) {
                        bad_count += 1;
                    } else {
                        sum += v;
                        count += 1;
                    }
                }
            }

            let valid_ratio = count as f64 / (count + bad_count) as f64;
            if count == 0 || (centre_bad && valid_ratio < vld_thresh) {
                out.set_bad(x, y);
            } else {
                out.set(x, y, sum / count as f64);
            }
        }
    }

    out
}

/// On where the value is valid and satisfies the threshold
pub fn threshold_mask(field: &RawField, threshold: &Threshold) -> Mask {
    let mut mask = Mask::new(field.nx(), field.ny(), false);
    for (on, &v) in mask.data_mut().iter_mut().zip(field.data()) {
        *on = !field.is_bad(v) && threshold.check(v);
    }
    mask
}

/// Zero border, circular convolution and thresholding of one raw field.
///
/// Returns the convolved field and its binary mask. Pixels inside the zero border are
/// bad in the convolved field and always off in the mask.
pub fn preprocess(
    raw: &RawField,
    radius: i32,
    threshold: &Threshold,
    zero_border: i32,
    vld_thresh: f64,
) -> Result<(RawField, Mask)> {
    if radius < 0 {
        return Err(ModeError::Config(format!(
            "convolution radius ({}) must be >= 0",
            radius
        )));
    }
    if zero_border < 1 {
        return Err(ModeError::Config(format!(
            "zero_border_size ({}) must be >= 1",
            zero_border
        )));
    }

    let mut bordered = raw.clone();
    apply_zero_border(&mut bordered, zero_border as usize);

    let mut convolved = convolve(&bordered, radius as usize, vld_thresh);
    apply_zero_border(&mut convolved, zero_border as usize);

    let mask = threshold_mask(&convolved, threshold);

    debug!(
        "Convolved {}x{} field with radius {} and threshold {}: {} pixels on",
        raw.nx(),
        raw.ny(),
        radius,
        threshold,
        mask.count_on()
    );

    Ok((convolved, mask))
}
