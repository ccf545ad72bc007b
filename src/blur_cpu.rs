use rayon::prelude::*;

use crate::error::{FrostError, FrostResult};

/// Separable Gaussian blur over a straight-alpha RGBA8 buffer.
///
/// Kernel weights are Q16 fixed-point and normalized to sum exactly to 1<<16,
/// so a constant image is a fixed point of the filter. `parallel` fans the row
/// passes out over the rayon pool; output is identical either way.
pub fn gaussian_blur_rgba8(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
    parallel: bool,
) -> FrostResult<Vec<u8>> {
    check_buffer(src, width, height)?;
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let row_len = (width as usize) * 4;

    let mut tmp = vec![0u8; src.len()];
    if parallel {
        tmp.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| blur_row_h(src, width, y, &kernel, row));
    } else {
        for (y, row) in tmp.chunks_mut(row_len).enumerate() {
            blur_row_h(src, width, y, &kernel, row);
        }
    }

    let mut out = vec![0u8; src.len()];
    if parallel {
        out.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| blur_row_v(&tmp, width, height, y, &kernel, row));
    } else {
        for (y, row) in out.chunks_mut(row_len).enumerate() {
            blur_row_v(&tmp, width, height, y, &kernel, row);
        }
    }

    Ok(out)
}

/// Three-pass box blur, a fast approximation of a Gaussian with comparable
/// spread. Used by the fast-approximation backend on slow frames.
pub fn box_blur_rgba8(src: &[u8], width: u32, height: u32, radius: u32) -> FrostResult<Vec<u8>> {
    check_buffer(src, width, height)?;
    if radius == 0 {
        return Ok(src.to_vec());
    }

    // Each pass widens the effective kernel; a third of the requested radius
    // per pass keeps the total spread close to the Gaussian path.
    let pass_radius = (radius / 3).max(1);
    let mut buf = src.to_vec();
    let mut tmp = vec![0u8; src.len()];
    for _ in 0..3 {
        box_pass_h(&buf, &mut tmp, width, height, pass_radius);
        box_pass_v(&tmp, &mut buf, width, height, pass_radius);
    }
    Ok(buf)
}

/// Deterministic ordered-dither noise over the RGB channels, +/-4 at full
/// strength. Breaks up banding on large smooth gradients after a heavy blur.
pub fn apply_noise_in_place(pixels: &mut [u8], width: u32, seed: u64) {
    let w = width.max(1) as usize;
    for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
        let x = (i % w) as u64;
        let y = (i / w) as u64;
        let n = mix64(seed ^ (x << 32) ^ y);
        // Map to [-4, 3].
        let offset = ((n & 0x7) as i16) - 4;
        for c in px.iter_mut().take(3) {
            *c = (i16::from(*c) + offset).clamp(0, 255) as u8;
        }
    }
}

fn check_buffer(src: &[u8], width: u32, height: u32) -> FrostResult<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| FrostError::render("blur buffer size overflow"))?;
    if src.len() != expected {
        return Err(FrostError::render(
            "blur expects src matching width*height*4",
        ));
    }
    Ok(())
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> FrostResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(FrostError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(FrostError::render("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Push rounding residue into the center tap so the kernel sums to 1<<16.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn blur_row_h(src: &[u8], width: u32, y: usize, k: &[u32], dst_row: &mut [u8]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let row_base = y * (width as usize) * 4;
    for x in 0..w {
        let mut acc = [0u64; 4];
        for (ki, &kw) in k.iter().enumerate() {
            let sx = (x + ki as i32 - radius).clamp(0, w - 1);
            let idx = row_base + (sx as usize) * 4;
            for c in 0..4 {
                acc[c] += u64::from(kw) * u64::from(src[idx + c]);
            }
        }
        let out = (x as usize) * 4;
        for c in 0..4 {
            dst_row[out + c] = q16_to_u8(acc[c]);
        }
    }
}

fn blur_row_v(src: &[u8], width: u32, height: u32, y: usize, k: &[u32], dst_row: &mut [u8]) {
    let radius = (k.len() / 2) as i32;
    let w = width as usize;
    let h = height as i32;
    for x in 0..w {
        let mut acc = [0u64; 4];
        for (ki, &kw) in k.iter().enumerate() {
            let sy = (y as i32 + ki as i32 - radius).clamp(0, h - 1) as usize;
            let idx = (sy * w + x) * 4;
            for c in 0..4 {
                acc[c] += u64::from(kw) * u64::from(src[idx + c]);
            }
        }
        let out = x * 4;
        for c in 0..4 {
            dst_row[out + c] = q16_to_u8(acc[c]);
        }
    }
}

fn box_pass_h(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: u32) {
    let w = width as i32;
    let r = radius as i32;
    let window = 2 * radius + 1;
    for y in 0..height as i32 {
        let row = (y * w) as usize * 4;
        let mut acc = [0u32; 4];
        // Prime the window against the clamped left edge.
        for dx in -r..=r {
            let sx = dx.clamp(0, w - 1) as usize;
            for c in 0..4 {
                acc[c] += u32::from(src[row + sx * 4 + c]);
            }
        }
        for x in 0..w {
            let out = row + (x as usize) * 4;
            for c in 0..4 {
                dst[out + c] = ((acc[c] + window / 2) / window) as u8;
            }
            let leaving = (x - r).clamp(0, w - 1) as usize;
            let entering = (x + r + 1).clamp(0, w - 1) as usize;
            for c in 0..4 {
                acc[c] += u32::from(src[row + entering * 4 + c]);
                acc[c] -= u32::from(src[row + leaving * 4 + c]);
            }
        }
    }
}

fn box_pass_v(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: u32) {
    let w = width as usize;
    let h = height as i32;
    let r = radius as i32;
    let window = 2 * radius + 1;
    for x in 0..w {
        let mut acc = [0u32; 4];
        for dy in -r..=r {
            let sy = dy.clamp(0, h - 1) as usize;
            for c in 0..4 {
                acc[c] += u32::from(src[(sy * w + x) * 4 + c]);
            }
        }
        for y in 0..h {
            let out = ((y as usize) * w + x) * 4;
            for c in 0..4 {
                dst[out + c] = ((acc[c] + window / 2) / window) as u8;
            }
            let leaving = (y - r).clamp(0, h - 1) as usize;
            let entering = (y + r + 1).clamp(0, h - 1) as usize;
            for c in 0..4 {
                acc[c] += u32::from(src[(entering * w + x) * 4 + c]);
                acc[c] -= u32::from(src[(leaving * w + x) * 4 + c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    (((acc + 32768) >> 16).min(255)) as u8
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
