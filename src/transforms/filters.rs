//! Small separable filters shared by the watermark eraser and the matting engine.
//!
//! All filters clamp at the image border, so a uniform input stays exactly uniform.

use image::{ImageBuffer, Pixel};

/// Normalized 1-D Gaussian kernel; half-width is `ceil(3 * sigma)`
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-d * d / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

fn convolve(
    src: &[f32],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    horizontal: bool,
) -> Vec<f32> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = vec![0.0f32; src.len()];

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let offset = k as isize - radius;
                    let (sx, sy) = if horizontal {
                        ((x as isize + offset).clamp(0, width as isize - 1) as usize, y)
                    } else {
                        (x, (y as isize + offset).clamp(0, height as isize - 1) as usize)
                    };
                    acc += src[(sy * width + sx) * channels + c] * weight;
                }
                out[(y * width + x) * channels + c] = acc;
            }
        }
    }

    out
}

/// Gaussian blur of an interleaved f32 plane with `channels` values per pixel
pub fn blur_plane(src: &[f32], width: u32, height: u32, channels: usize, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 || width == 0 || height == 0 {
        return src.to_vec();
    }

    let kernel = gaussian_kernel(sigma);
    let (w, h) = (width as usize, height as usize);
    let pass = convolve(src, w, h, channels, &kernel, true);
    convolve(&pass, w, h, channels, &kernel, false)
}

/// Gaussian blur of any 8-bit image buffer
pub fn gaussian_blur<P>(image: &ImageBuffer<P, Vec<u8>>, sigma: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut out = image.clone();
    if sigma <= 0.0 {
        return out;
    }

    let channels = P::CHANNEL_COUNT as usize;
    let src: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    let blurred = blur_plane(&src, image.width(), image.height(), channels, sigma);

    let raw: &mut [u8] = &mut out;
    for (dst, value) in raw.iter_mut().zip(blurred) {
        *dst = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Binary dilation with a 3x3 square structuring element, repeated `iterations` times
pub fn dilate(flags: &[bool], width: u32, height: u32, iterations: u32) -> Vec<bool> {
    let (w, h) = (width as i64, height as i64);
    let mut current = flags.to_vec();

    for _ in 0..iterations {
        let mut next = current.clone();
        for y in 0..h {
            for x in 0..w {
                if current[(y * w + x) as usize] {
                    continue;
                }
                let hit = (-1..=1).any(|dy| {
                    (-1..=1).any(|dx| {
                        let (nx, ny) = (x + dx, y + dy);
                        nx >= 0 && ny >= 0 && nx < w && ny < h && current[(ny * w + nx) as usize]
                    })
                });
                next[(y * w + x) as usize] = hit;
            }
        }
        current = next;
    }

    current
}

/// Pixels whose 3x3 neighbourhood is not uniform
pub fn transitions(values: &[u8], width: u32, height: u32) -> Vec<bool> {
    let (w, h) = (width as i64, height as i64);
    let mut out = vec![false; values.len()];

    for y in 0..h {
        for x in 0..w {
            let center = values[(y * w + x) as usize];
            out[(y * w + x) as usize] = (-1..=1).any(|dy| {
                (-1..=1).any(|dx| {
                    let (nx, ny) = (x + dx, y + dy);
                    nx >= 0 && ny >= 0 && nx < w && ny < h && values[(ny * w + nx) as usize] != center
                })
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = gaussian_kernel(1.5);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel.len() % 2, 1);
    }

    #[test]
    fn test_blur_keeps_uniform_image_exact() {
        let image = RgbImage::from_pixel(16, 9, Rgb([255, 0, 7]));
        let blurred = gaussian_blur(&image, 2.0);
        assert!(blurred.pixels().all(|p| p.0 == [255, 0, 7]));
    }

    #[test]
    fn test_blur_spreads_a_point() {
        let mut plane = vec![0.0f32; 25];
        plane[12] = 1.0;
        let blurred = blur_plane(&plane, 5, 5, 1, 1.0);
        assert!(blurred[12] < 1.0);
        assert!(blurred[11] > 0.0 && blurred[13] > 0.0);
    }

    #[test]
    fn test_dilate_single_pass() {
        let mut flags = vec![false; 25];
        flags[12] = true;
        let grown = dilate(&flags, 5, 5, 1);
        assert_eq!(grown.iter().filter(|&&f| f).count(), 9);
        assert!(!grown[0]);
    }

    #[test]
    fn test_transitions_on_step_edge() {
        let values: Vec<u8> = (0..16).map(|i| if i % 4 < 2 { 0 } else { 255 }).collect();
        let edges = transitions(&values, 4, 4);
        // Columns 1 and 2 border the step, columns 0 and 3 do not
        assert!(edges[1] && edges[2]);
        assert!(!edges[0] && !edges[3]);
    }
}
