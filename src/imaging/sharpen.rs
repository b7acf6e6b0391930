//! 地図画像のシャープ化
//!
//! 平滑化した画像を基準に元画像との差分を `factor` 倍して強調します。
//! factor = 1.0 で元画像、0.0 で平滑化画像、2.0 で通常のシャープ化になります。

use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;

/// 平滑化カーネル (3x3, 合計13)
const SMOOTH_KERNEL: [[u32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
const SMOOTH_SCALE: u32 = 13;

/// 画像をシャープ化する
pub fn sharpen(image: &DynamicImage, factor: f32) -> DynamicImage {
    let source = image.to_rgba8();
    let smoothed = smooth(&source);
    DynamicImage::ImageRgba8(blend(&smoothed, &source, factor))
}

/// 3x3 平滑化フィルタ
///
/// 外周1ピクセルは元の値のまま、アルファチャンネルは変更しません。
// imageops::filter3x3 は外周を端の画素で補うため、外周をそのまま残すにはこのループが必要
fn smooth(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    let mut output = source.clone();

    if width < 3 || height < 3 {
        return output;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0u32; 3];
            for (ky, row) in SMOOTH_KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let pixel = source.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for c in 0..3 {
                        acc[c] += pixel[c] as u32 * weight;
                    }
                }
            }

            let alpha = source.get_pixel(x, y)[3];
            let round = |v: u32| ((v + SMOOTH_SCALE / 2) / SMOOTH_SCALE).min(255) as u8;
            output.put_pixel(x, y, Rgba([round(acc[0]), round(acc[1]), round(acc[2]), alpha]));
        }
    }

    output
}

/// `base + factor * (image - base)` を0～255に丸める
fn blend(base: &RgbaImage, image: &RgbaImage, factor: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let b = base.get_pixel(x, y);
        let p = image.get_pixel(x, y);
        let mix = |c: usize| {
            let v = b[c] as f32 + factor * (p[c] as f32 - b[c] as f32);
            v.clamp(0.0, 255.0) as u8
        };
        Rgba([mix(0), mix(1), mix(2), p[3]])
    })
}

/// 地図画像を読み込み、シャープ化した画像を保存する
///
/// 戻り値は画像の (幅, 高さ) です。
pub fn sharpen_file(input: &Path, output: &Path, factor: f32) -> Result<(u32, u32)> {
    let image = image::open(input).context(format!("Failed to open image: {:?}", input))?;
    log::info!(
        "地図画像を読み込みました: {} ({}x{})",
        input.display(),
        image.width(),
        image.height()
    );

    let sharpened = sharpen(&image, factor);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create parent directory: {:?}", parent))?;
    }
    sharpened
        .save(output)
        .context(format!("Failed to save image: {:?}", output))?;

    log::info!("シャープ化した画像を保存しました: {} (係数 {})", output.display(), factor);
    Ok((sharpened.width(), sharpened.height()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard() -> RgbaImage {
        RgbaImage::from_fn(5, 5, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([200, 200, 200, 255])
            } else {
                Rgba([50, 50, 50, 128])
            }
        })
    }

    #[test]
    fn test_factor_one_is_identity() {
        let source = DynamicImage::ImageRgba8(checkerboard());
        let output = sharpen(&source, 1.0).to_rgba8();
        assert_eq!(output, checkerboard());
    }

    #[test]
    fn test_flat_image_is_unchanged() {
        let flat = RgbaImage::from_pixel(4, 4, Rgba([90, 120, 30, 255]));
        let output = sharpen(&DynamicImage::ImageRgba8(flat.clone()), 2.0).to_rgba8();
        assert_eq!(output, flat);
    }

    #[test]
    fn test_sharpen_increases_contrast() {
        let source = checkerboard();
        let output = sharpen(&DynamicImage::ImageRgba8(source.clone()), 2.0).to_rgba8();

        // 中心 (2,2) は明るい画素: 平滑化 (200*5 + 200*4 + 50*4) / 13 = 154
        // 200 + (200 - 154) = 246
        assert_eq!(output.get_pixel(2, 2)[0], 246);
        // 暗い画素 (2,1): 平滑化 (50*5 + 50*4 + 200*4) / 13 = 96 -> 50 - 46 = 4
        assert_eq!(output.get_pixel(2, 1)[0], 4);
        // 外周とアルファは変わらない
        assert_eq!(output.get_pixel(0, 0), source.get_pixel(0, 0));
        assert_eq!(output.get_pixel(2, 1)[3], 128);
    }

    #[test]
    fn test_sharpen_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rawmap.png");
        let output = dir.path().join("preview/sharpened.png");
        checkerboard().save(&input).unwrap();

        let dims = sharpen_file(&input, &output, 2.0).unwrap();
        assert_eq!(dims, (5, 5));

        let saved = image::open(&output).unwrap();
        assert_eq!((saved.width(), saved.height()), (5, 5));
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sharpen_file(&dir.path().join("none.png"), &dir.path().join("out.png"), 2.0).is_err());
    }
}
