//! `image`-crate integration: loading, overlays and end-to-end helpers.

use crate::core::{bounding_rect, GrayImage, GrayImageView, Keypoint};
use crate::recognition::{
    DetectionRenderer, ImagePreprocessor, LoadError, LoadMode, MatchResult, RecognitionEngine,
    TargetModel,
};
use ab_glyph::{FontArc, PxScale};
use image::{ImageReader, Rgb, RgbImage};
use imageproc::drawing::{
    draw_cross_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use nalgebra::Point2;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Color of reference keypoints in keypoint dumps.
const KEYPOINT_COLOR: [u8; 3] = [255, 0, 255];
/// Color of inlier keypoints in detection overlays.
const INLIER_COLOR: [u8; 3] = [0, 255, 255];
/// Color of correspondence lines in inlier-matches images.
const MATCH_COLOR: [u8; 3] = [0, 255, 0];
const LABEL_COLOR: [u8; 3] = [255, 255, 255];
const LABEL_FONT_SIZE: f32 = 32.0;
const CAPTION_FONT_SIZE: f32 = 24.0;
const CAPTION_PADDING: u32 = 4;

/// Convert an `image::GrayImage` into the lightweight core view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

fn to_core(img: ::image::GrayImage) -> GrayImage {
    GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    }
}

fn to_rgb(view: &GrayImageView<'_>) -> RgbImage {
    RgbImage::from_fn(view.width as u32, view.height as u32, |x, y| {
        let v = view.get(x as i32, y as i32);
        Rgb([v, v, v])
    })
}

/// Loads images from disk with the `image` crate.
///
/// Masks are binarized: pixels above `mask_threshold` become 255, the rest 0.
#[derive(Clone, Debug)]
pub struct ImageLoader {
    pub mask_threshold: u8,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self { mask_threshold: 127 }
    }
}

impl ImageLoader {
    pub fn load_luma(&self, path: &Path) -> Result<::image::GrayImage, LoadError> {
        let reader = ImageReader::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = reader.decode().map_err(|e| LoadError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(decoded.to_luma8())
    }
}

impl ImagePreprocessor for ImageLoader {
    fn load(&self, path: &Path, mode: LoadMode) -> Result<GrayImage, LoadError> {
        let mut img = self.load_luma(path)?;
        if mode == LoadMode::Mask {
            let t = self.mask_threshold;
            img.pixels_mut()
                .for_each(|p| p.0[0] = if p.0[0] > t { 255 } else { 0 });
        }
        Ok(to_core(img))
    }
}

fn save(img: &RgbImage, path: &Path) -> Result<(), LoadError> {
    img.save(path).map_err(|e| LoadError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn draw_polygon(img: &mut RgbImage, pts: &[Point2<f32>], color: Rgb<u8>) {
    for (i, a) in pts.iter().enumerate() {
        let b = pts[(i + 1) % pts.len()];
        for d in [-1.0f32, 0.0, 1.0] {
            draw_line_segment_mut(img, (a.x + d, a.y), (b.x + d, b.y), color);
            draw_line_segment_mut(img, (a.x, a.y + d), (b.x, b.y + d), color);
        }
    }
}

fn draw_keypoints(img: &mut RgbImage, keypoints: &[Keypoint], color: Rgb<u8>) {
    for kp in keypoints {
        let c = (kp.position.x.round() as i32, kp.position.y.round() as i32);
        let r = (kp.size * 0.5).round().clamp(2.0, 16.0) as i32;
        draw_hollow_circle_mut(img, c, r, color);
    }
}

/// Detection overlays.
///
/// [`OverlayRenderer::draw`] paints each accepted detection's contour in its
/// target color, its inlier keypoints as crosses, and its target id at the
/// center of its bounding box. As a [`DetectionRenderer`] it also prints the
/// caption in the top-left corner and writes one inlier-matches image per
/// detection next to the overlay. Without a font all text is skipped.
#[derive(Clone, Default)]
pub struct OverlayRenderer {
    font: Option<FontArc>,
    loader: ImageLoader,
}

/// Parse a TrueType/OpenType font file.
pub fn load_font(path: &Path) -> Result<FontArc, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|e| LoadError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Top-left corner that centers a `text_w` x `text_h` label in the bounding
/// box of `contour`, clipped to a `width` x `height` image.
fn label_anchor(
    contour: &[Point2<f32>],
    width: u32,
    height: u32,
    text_w: u32,
    text_h: u32,
) -> Option<(i32, i32)> {
    let [x0, y0, x1, y1] = bounding_rect(contour)?;
    let (w, h) = (width as f32, height as f32);
    let (x0, x1) = (x0.clamp(0.0, w), x1.clamp(0.0, w));
    let (y0, y1) = (y0.clamp(0.0, h), y1.clamp(0.0, h));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let cx = (x0 + x1) * 0.5 - text_w as f32 * 0.5;
    let cy = (y0 + y1) * 0.5 - text_h as f32 * 0.5;
    Some((cx.round() as i32, cy.round() as i32))
}

/// `<dir>/<overlay stem>_inliers_matches_<index>.png`.
pub fn inlier_matches_path(overlay_path: &Path, index: usize) -> PathBuf {
    let stem = overlay_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    overlay_path.with_file_name(format!("{stem}_inliers_matches_{index}.png"))
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Renderer using the font at `path`. A missing path or an unreadable
    /// font is logged and leaves the renderer text-free.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        let renderer = Self::new();
        let Some(path) = path else {
            log::debug!("no font configured, overlays are drawn without text");
            return renderer;
        };
        match load_font(path) {
            Ok(font) => renderer.with_font(font),
            Err(err) => {
                log::warn!("overlay text disabled: {err}");
                renderer
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw_label(&self, canvas: &mut RgbImage, contour: &[Point2<f32>], text: &str) {
        let Some(font) = &self.font else { return };
        let scale = PxScale::from(LABEL_FONT_SIZE);
        let (tw, th) = text_size(scale, font, text);
        if let Some((x, y)) = label_anchor(contour, canvas.width(), canvas.height(), tw, th) {
            draw_text_mut(canvas, Rgb(LABEL_COLOR), x, y, scale, font, text);
        }
    }

    /// Print `caption` on a dark band in the top-left corner.
    pub fn draw_caption(&self, canvas: &mut RgbImage, caption: &str) {
        let Some(font) = &self.font else { return };
        let scale = PxScale::from(CAPTION_FONT_SIZE);
        let (tw, th) = text_size(scale, font, caption);
        let band_w = (tw + 2 * CAPTION_PADDING).min(canvas.width());
        let band_h = (th + 2 * CAPTION_PADDING).min(canvas.height());
        if band_w == 0 || band_h == 0 {
            return;
        }
        draw_filled_rect_mut(canvas, Rect::at(0, 0).of_size(band_w, band_h), Rgb([0, 0, 0]));
        let pad = CAPTION_PADDING as i32;
        draw_text_mut(canvas, Rgb(LABEL_COLOR), pad, pad, scale, font, caption);
    }

    fn draw_detection(&self, canvas: &mut RgbImage, det: &MatchResult) {
        for p in &det.inlier_points {
            draw_cross_mut(canvas, Rgb(INLIER_COLOR), p.x.round() as i32, p.y.round() as i32);
        }
        draw_polygon(canvas, &det.contour, Rgb(det.color));
        self.draw_label(canvas, &det.contour, &det.target_id.to_string());
    }

    pub fn draw(&self, image: &GrayImageView<'_>, detections: &[MatchResult]) -> RgbImage {
        let mut canvas = to_rgb(image);
        for det in detections {
            self.draw_detection(&mut canvas, det);
        }
        canvas
    }

    /// Reference image beside the query, one line per inlier correspondence.
    /// The query side shows only `det`. `None` when the detection carries no
    /// readable reference image.
    pub fn inlier_matches(&self, image: &GrayImageView<'_>, det: &MatchResult) -> Option<RgbImage> {
        let reference = det.reference.as_deref()?;
        let luma = match self.loader.load_luma(reference) {
            Ok(luma) => luma,
            Err(err) => {
                log::warn!("inlier matches for target {}: {err}", det.target_id);
                return None;
            }
        };
        let left = to_rgb(&gray_view(&luma));
        let mut right = to_rgb(image);
        self.draw_detection(&mut right, det);

        let offset = left.width();
        let mut canvas = RgbImage::new(
            offset + right.width(),
            left.height().max(right.height()),
        );
        ::image::imageops::replace(&mut canvas, &left, 0, 0);
        ::image::imageops::replace(&mut canvas, &right, i64::from(offset), 0);

        for (t, q) in det.target_points.iter().zip(&det.inlier_points) {
            draw_line_segment_mut(
                &mut canvas,
                (t.x, t.y),
                (q.x + offset as f32, q.y),
                Rgb(MATCH_COLOR),
            );
        }
        Some(canvas)
    }
}

impl DetectionRenderer for OverlayRenderer {
    fn render(
        &self,
        image: &GrayImageView<'_>,
        detections: &[MatchResult],
        caption: &str,
        out_path: &Path,
    ) -> Result<(), LoadError> {
        log::debug!("{}: {caption}", out_path.display());
        let mut canvas = self.draw(image, detections);
        self.draw_caption(&mut canvas, caption);
        save(&canvas, out_path)?;

        for (i, det) in detections.iter().enumerate() {
            if let Some(matches) = self.inlier_matches(image, det) {
                save(&matches, &inlier_matches_path(out_path, i))?;
            }
        }
        Ok(())
    }
}

/// Render a model's retained keypoints over its reference image as
/// `<out_dir>/<stem><tag>.png`. Returns the written path.
pub fn save_model_keypoints(
    model: &TargetModel,
    loader: &ImageLoader,
    out_dir: &Path,
    tag: &str,
) -> Result<PathBuf, LoadError> {
    let source = model.source().ok_or_else(|| LoadError::Io {
        path: PathBuf::new(),
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("target {} has no reference image", model.id()),
        ),
    })?;
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| LoadError::MaskPath(source.to_path_buf()))?;

    let luma = loader.load_luma(source)?;
    let mut canvas = to_rgb(&gray_view(&luma));
    draw_keypoints(&mut canvas, model.features().keypoints(), Rgb(KEYPOINT_COLOR));
    draw_polygon(&mut canvas, model.outline(), Rgb(model.color()));

    let out = out_dir.join(format!("{stem}{tag}.png"));
    save(&canvas, &out)?;
    Ok(out)
}

/// Run detection on an `image::GrayImage`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(engine, img), fields(width = img.width(), height = img.height()))
)]
pub fn detect_targets(engine: &RecognitionEngine, img: &::image::GrayImage) -> Vec<MatchResult> {
    engine.detect(&gray_view(img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::MatchStatus;

    #[test]
    fn masks_are_binarized_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("m_mask.png");
        let mask = ::image::GrayImage::from_fn(4, 1, |x, _| {
            ::image::Luma([[0, 127, 128, 250][x as usize]])
        });
        mask.save(&path).expect("save");

        let loader = ImageLoader::default();
        let m = loader.load(&path, LoadMode::Mask).expect("mask");
        assert_eq!(m.data, vec![0, 0, 255, 255]);
        let g = loader.load(&path, LoadMode::Gray).expect("gray");
        assert_eq!(g.data, vec![0, 127, 128, 250]);
    }

    #[test]
    fn missing_and_undecodable_files_are_load_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = ImageLoader::default();
        assert!(matches!(
            loader.load(&dir.path().join("none.png"), LoadMode::Gray),
            Err(LoadError::Io { .. })
        ));
        let junk = dir.path().join("junk.png");
        std::fs::write(&junk, b"not an image").expect("write");
        assert!(matches!(
            loader.load(&junk, LoadMode::Gray),
            Err(LoadError::Decode { .. })
        ));
    }

    fn detection(id: u32, contour: &[(f32, f32)]) -> MatchResult {
        MatchResult {
            target_id: id,
            score: 1.0,
            inliers: Vec::new(),
            inlier_points: Vec::new(),
            target_points: Vec::new(),
            contour: contour.iter().map(|&(x, y)| Point2::new(x, y)).collect(),
            color: [255, 0, 0],
            homography: None,
            status: MatchStatus::Fitted,
            reference: None,
        }
    }

    const BOX: [(f32, f32); 4] = [(5.0, 5.0), (30.0, 5.0), (30.0, 30.0), (5.0, 30.0)];

    fn system_font() -> Option<FontArc> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ]
        .iter()
        .find_map(|p| load_font(Path::new(p)).ok())
    }

    #[test]
    fn overlay_draws_contour_in_target_color() {
        let gray = GrayImage::new(40, 40);
        let mut det = detection(5, &BOX);
        det.inlier_points = vec![Point2::new(20.0, 20.0)];

        let img = OverlayRenderer::new().draw(&gray.view(), &[det.clone()]);
        assert_eq!(img.get_pixel(15, 5).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(20, 20).0, INLIER_COLOR);
        assert_eq!(img.get_pixel(15, 15).0, [0, 0, 0]);

        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("o.png");
        OverlayRenderer::new()
            .render(&gray.view(), &[det], "Global result: 5 ( 5 )", &out)
            .expect("render");
        assert!(out.is_file());
        assert!(!inlier_matches_path(&out, 0).exists());
    }

    #[test]
    fn labels_center_in_the_clipped_bounding_box() {
        let contour: Vec<Point2<f32>> = [(10.0, 20.0), (50.0, 20.0), (50.0, 60.0), (10.0, 60.0)]
            .iter()
            .map(|&(x, y)| Point2::new(x, y))
            .collect();
        assert_eq!(label_anchor(&contour, 100, 100, 10, 6), Some((25, 37)));
        // box reaching past the right edge is clipped to x in [10, 40]
        assert_eq!(label_anchor(&contour, 40, 100, 10, 6), Some((20, 37)));
        assert_eq!(label_anchor(&contour, 5, 100, 10, 6), None);
        assert_eq!(label_anchor(&[], 100, 100, 10, 6), None);
    }

    #[test]
    fn inlier_matches_are_named_after_the_overlay() {
        assert_eq!(
            inlier_matches_path(Path::new("out/q_orb.png"), 2),
            PathBuf::from("out/q_orb_inliers_matches_2.png")
        );
    }

    #[test]
    fn inlier_matches_put_reference_beside_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reference = dir.path().join("ref.png");
        ::image::GrayImage::from_pixel(30, 20, ::image::Luma([90]))
            .save(&reference)
            .expect("save");

        let query = GrayImage::new(40, 40);
        let mut det = detection(7, &BOX);
        det.reference = Some(reference);
        det.target_points = vec![Point2::new(2.0, 2.0), Point2::new(20.0, 10.0)];
        det.inlier_points = vec![Point2::new(12.0, 12.0), Point2::new(25.0, 25.0)];

        let renderer = OverlayRenderer::new();
        let matches = renderer.inlier_matches(&query.view(), &det).expect("matches");
        assert_eq!(matches.dimensions(), (70, 40));
        assert_eq!(matches.get_pixel(25, 18).0, [90, 90, 90]);
        assert_eq!(matches.get_pixel(2, 2).0, MATCH_COLOR);
        assert_eq!(matches.get_pixel(30 + 15, 5).0, [255, 0, 0]);

        let out = dir.path().join("q_orb.png");
        renderer
            .render(&query.view(), &[det], "Global result: 7 ( 7 )", &out)
            .expect("render");
        assert!(inlier_matches_path(&out, 0).is_file());
    }

    #[test]
    fn missing_font_disables_text_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = OverlayRenderer::from_font_path(Some(&dir.path().join("none.ttf")));
        assert!(!renderer.has_font());
        assert!(!OverlayRenderer::from_font_path(None).has_font());

        let junk = dir.path().join("junk.ttf");
        std::fs::write(&junk, b"not a font").expect("write");
        assert!(matches!(load_font(&junk), Err(LoadError::Decode { .. })));

        let mut canvas = RgbImage::new(50, 20);
        renderer.draw_caption(&mut canvas, "Global result: 0 ( )");
        assert!(canvas.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn font_draws_caption_and_id_label() {
        let Some(font) = system_font() else {
            return;
        };
        let renderer = OverlayRenderer::new().with_font(font);
        let gray = GrayImage::new(200, 100);
        let det = detection(20, &[(50.0, 40.0), (150.0, 40.0), (150.0, 95.0), (50.0, 95.0)]);

        let mut canvas = renderer.draw(&gray.view(), &[det]);
        let white = |p: &Rgb<u8>| p.0.iter().all(|&c| c > 200);
        let label_pixels = (60..140)
            .flat_map(|x| (45..90).map(move |y| (x, y)))
            .filter(|&(x, y)| white(canvas.get_pixel(x, y)))
            .count();
        assert!(label_pixels > 0);

        renderer.draw_caption(&mut canvas, "Global result: 20 ( 20 )");
        let caption_pixels = (0..200)
            .flat_map(|x| (0..30).map(move |y| (x, y)))
            .filter(|&(x, y)| white(canvas.get_pixel(x, y)))
            .count();
        assert!(caption_pixels > 0);
    }
}
