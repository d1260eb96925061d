use anyhow::{bail, Result};
use ndarray::Array4;
use opencv::{
    core::{self, AlgorithmHint, Mat, Scalar, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// SpinePose用の入力サイズ (幅 x 高さ)
pub const SPINEPOSE_INPUT_WIDTH: i32 = 192;
pub const SPINEPOSE_INPUT_HEIGHT: i32 = 256;

/// ImageNet の平均・標準偏差 (RGB, 0-255)
const IMAGENET_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const IMAGENET_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// BGR / BGRA / GRAY を RGB に
fn to_rgb(frame: &Mat) -> Result<Mat> {
    if frame.empty() {
        bail!("empty frame");
    }
    let code = match frame.channels() {
        1 => imgproc::COLOR_GRAY2RGB,
        3 => imgproc::COLOR_BGR2RGB,
        4 => imgproc::COLOR_BGRA2RGB,
        n => bail!("unsupported channel count: {}", n),
    };
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, code, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;
    Ok(rgb)
}

fn resize(src: &Mat, width: i32, height: i32) -> Result<Mat> {
    let mut resized = Mat::default();
    imgproc::resize(src, &mut resized, Size::new(width, height), 0.0, 0.0, imgproc::INTER_LINEAR)?;
    Ok(resized)
}

/// 動画フレーム (BGR / BGRA / GRAY) を MoveNet 入力テンソル [1, 192, 192, 3] に変換
///
/// 値域は 0.0-255.0 のまま (MoveNet はモデル内で正規化する)
pub fn preprocess_for_movenet(frame: &Mat) -> Result<Array4<f32>> {
    let rgb = to_rgb(frame)?;
    let resized = resize(&rgb, MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE)?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let side = MOVENET_INPUT_SIZE as usize;
    let pixels = float_mat.data_typed::<Vec3f>()?;
    let flat: Vec<f32> = pixels.iter().flat_map(|p| [p[0], p[1], p[2]]).collect();
    let tensor = Array4::from_shape_vec((1, side, side, 3), flat)?;

    Ok(tensor)
}

/// アスペクト比を保った縮小 + 余白の配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_width: i32,
    pub input_height: i32,
    /// 縮小後の画像サイズ
    pub scaled_width: i32,
    pub scaled_height: i32,
    /// 左・上の余白 (ピクセル)
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Letterbox {
    pub fn fit(frame_width: i32, frame_height: i32, input_width: i32, input_height: i32) -> Self {
        let scale = (input_width as f32 / frame_width.max(1) as f32)
            .min(input_height as f32 / frame_height.max(1) as f32);
        let scaled_width = ((frame_width as f32 * scale).round() as i32).clamp(1, input_width);
        let scaled_height = ((frame_height as f32 * scale).round() as i32).clamp(1, input_height);
        Self {
            input_width,
            input_height,
            scaled_width,
            scaled_height,
            offset_x: (input_width - scaled_width) / 2,
            offset_y: (input_height - scaled_height) / 2,
        }
    }

    /// 入力画像の正規化座標 → 元フレームの正規化座標
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let fx = (x * self.input_width as f32 - self.offset_x as f32) / self.scaled_width as f32;
        let fy = (y * self.input_height as f32 - self.offset_y as f32) / self.scaled_height as f32;
        (fx, fy)
    }
}

/// 動画フレームを SpinePose 入力テンソル [1, 3, 256, 192] (NCHW, ImageNet正規化) に変換
pub fn preprocess_for_spinepose(frame: &Mat) -> Result<(Array4<f32>, Letterbox)> {
    let rgb = to_rgb(frame)?;
    let size = rgb.size()?;
    let letterbox = Letterbox::fit(size.width, size.height, SPINEPOSE_INPUT_WIDTH, SPINEPOSE_INPUT_HEIGHT);
    let resized = resize(&rgb, letterbox.scaled_width, letterbox.scaled_height)?;

    let mut padded = Mat::default();
    core::copy_make_border(
        &resized,
        &mut padded,
        letterbox.offset_y,
        SPINEPOSE_INPUT_HEIGHT - letterbox.scaled_height - letterbox.offset_y,
        letterbox.offset_x,
        SPINEPOSE_INPUT_WIDTH - letterbox.scaled_width - letterbox.offset_x,
        core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    let mut float_mat = Mat::default();
    padded.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let (w, h) = (SPINEPOSE_INPUT_WIDTH as usize, SPINEPOSE_INPUT_HEIGHT as usize);
    let pixels = float_mat.data_typed::<Vec3f>()?;
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (i, p) in pixels.iter().enumerate() {
        let (y, x) = (i / w, i % w);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (p[c] - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Ok((tensor, letterbox))
}
