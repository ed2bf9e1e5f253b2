mod anchors;
mod suppression;

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use log::{debug, info};
use ndarray::prelude::*;
use ndarray::{concatenate, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};

use self::suppression::weighted_nms;

use crate::config::{InputRange, ModelSettings, ModelVariant};
use crate::face::Detection;
use crate::face_detection::{check_rgb_buffer, DetectionError, FaceDetectionModel};

// values per anchor in the regressor output: box (4) + six keypoints (12)
const REGRESSOR_WIDTH: usize = 16;
const SCORE_CLIP: f32 = 100.0;

/// BlazeFace running on ONNX Runtime.
///
/// Loaded once from [`ModelSettings`]; every call to
/// [`FaceDetectionModel::detect`] letterboxes the image into the square model
/// input, runs the network, decodes the anchor-relative boxes, and merges
/// overlapping hits with weighted non-maximum suppression.
pub struct BlazefaceModel {
    // keeps the runtime alive for as long as the session
    _environment: Arc<Environment>,
    session: Mutex<Session>,
    anchors: Array2<f32>,
    variant: ModelVariant,
    input_range: InputRange,
    min_confidence: f32,
    suppression_threshold: f32,
}

impl BlazefaceModel {
    pub fn new(settings: &ModelSettings) -> Result<Self, DetectionError> {
        let model_load = |source| DetectionError::ModelLoad {
            path: settings.path.clone(),
            source,
        };

        let environment = Environment::builder()
            .with_name("facebatch")
            .build()
            .map_err(model_load)?
            .into_arc();

        let session = SessionBuilder::new(&environment)
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.with_intra_threads(settings.intra_threads))
            .and_then(|b| b.with_model_from_file(&settings.path))
            .map_err(model_load)?;

        let anchors = match settings.anchors.as_ref() {
            Some(path) => anchors::load(path)?,
            None => anchors::generate(settings.variant),
        };

        info!(
            "Loaded {} BlazeFace model from {} ({} anchors, min confidence {})",
            settings.variant,
            settings.path.display(),
            anchors.nrows(),
            settings.min_confidence
        );

        Ok(BlazefaceModel {
            _environment: environment,
            session: Mutex::new(session),
            anchors,
            variant: settings.variant,
            input_range: settings.input_range,
            min_confidence: settings.min_confidence,
            suppression_threshold: settings.suppression_threshold,
        })
    }

    fn infer(&self, input: Vec<f32>) -> Result<Vec<Array3<f32>>, DetectionError> {
        let size = self.variant.input_size() as usize;
        let array: CowArray<f32, IxDyn> = Array::from_shape_vec((1, size, size, 3), input)
            .map_err(|err| DetectionError::Output(err.to_string()))?
            .into_dyn()
            .into();

        let session = self.session.lock().map_err(|_| DetectionError::Poisoned)?;
        let inputs = vec![Value::from_array(session.allocator(), &array)?];
        let outputs: Vec<Value> = session.run(inputs)?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for output in &outputs {
            let tensor: OrtOwnedTensor<f32, _> = output.try_extract()?;
            let tensor = tensor
                .view()
                .deref()
                .to_owned()
                .into_dimensionality::<Ix3>()
                .map_err(|err| DetectionError::Output(format!("expected a rank 3 output: {err}")))?;
            tensors.push(tensor);
        }
        Ok(tensors)
    }
}

impl FaceDetectionModel for BlazefaceModel {
    fn detect(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, DetectionError> {
        check_rgb_buffer(pixels, width, height)?;
        let image: ImageBuffer<Rgb<u8>, &[u8]> = ImageBuffer::from_raw(width, height, pixels)
            .ok_or(DetectionError::EmptyImage)?;

        let letterbox = Letterbox::fit(width, height, self.variant.input_size());
        let input = letterbox.apply(&image);
        let input: Vec<f32> = input
            .pixels()
            .flat_map(|p| p.0)
            .map(|p| self.input_range.normalize(p))
            .collect();

        let outputs = self.infer(input)?;
        let (regressors, scores) = split_outputs(outputs)?;

        let candidates = decode(
            &regressors,
            &scores,
            &self.anchors,
            self.variant.input_size() as f32,
            self.min_confidence,
        )?;
        let candidate_count = candidates.len();
        let detections: Vec<Detection> = weighted_nms(candidates, self.suppression_threshold)
            .into_iter()
            .map(|d| letterbox.to_image(d))
            .collect();

        debug!(
            "{}x{} image: {} candidate(s), {} face(s) after suppression",
            width,
            height,
            candidate_count,
            detections.len()
        );
        Ok(detections)
    }
}

/// Placement of an image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    input_size: u32,
    pad_x: u32,
    pad_y: u32,
    content_width: u32,
    content_height: u32,
}

impl Letterbox {
    /// Scales `width x height` to fit a `input_size` square, centered.
    pub fn fit(width: u32, height: u32, input_size: u32) -> Self {
        let longest = width.max(height).max(1) as f32;
        let scale = input_size as f32 / longest;
        let content_width = ((width as f32 * scale).round() as u32).clamp(1, input_size);
        let content_height = ((height as f32 * scale).round() as u32).clamp(1, input_size);
        Letterbox {
            input_size,
            pad_x: (input_size - content_width) / 2,
            pad_y: (input_size - content_height) / 2,
            content_width,
            content_height,
        }
    }

    pub fn apply<I>(&self, image: &I) -> RgbImage
    where
        I: image::GenericImageView<Pixel = Rgb<u8>>,
    {
        let resized = imageops::resize(
            image,
            self.content_width,
            self.content_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::new(self.input_size, self.input_size);
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Maps a box relative to the model input back to one relative to the source image.
    pub fn to_image(&self, d: Detection) -> Detection {
        let size = self.input_size as f32;
        let cw = self.content_width as f32;
        let ch = self.content_height as f32;
        Detection {
            xmin: (d.xmin * size - self.pad_x as f32) / cw,
            ymin: (d.ymin * size - self.pad_y as f32) / ch,
            width: d.width * size / cw,
            height: d.height * size / ch,
            score: d.score,
        }
    }
}

/// Sorts raw outputs into box regressors and score logits.
///
/// Exports differ in how many tensors they emit per stride group, so tensors
/// are told apart by their last dimension and concatenated along the anchor
/// axis in output order.
fn split_outputs(outputs: Vec<Array3<f32>>) -> Result<(Array3<f32>, Array3<f32>), DetectionError> {
    let (boxes, logits): (Vec<_>, Vec<_>) = outputs
        .into_iter()
        .partition(|t| t.len_of(Axis(2)) == REGRESSOR_WIDTH);

    if boxes.is_empty() || logits.is_empty() {
        return Err(DetectionError::Output(
            "model did not emit both box regressors and scores".into(),
        ));
    }
    if let Some(t) = logits.iter().find(|t| t.len_of(Axis(2)) != 1) {
        return Err(DetectionError::Output(format!(
            "unrecognized output shape {:?}",
            t.shape()
        )));
    }

    let join = |parts: Vec<Array3<f32>>| {
        let views: Vec<_> = parts.iter().map(|t| t.view()).collect();
        concatenate(Axis(1), &views).map_err(|err| DetectionError::Output(err.to_string()))
    };
    Ok((join(boxes)?, join(logits)?))
}

fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit.clamp(-SCORE_CLIP, SCORE_CLIP)).exp())
}

/// Turns regressor rows into boxes relative to the model input, keeping
/// only those scoring at least `min_confidence`.
fn decode(
    regressors: &Array3<f32>,
    scores: &Array3<f32>,
    anchors: &Array2<f32>,
    scale: f32,
    min_confidence: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let count = regressors.len_of(Axis(1));
    if count != anchors.nrows() || count != scores.len_of(Axis(1)) {
        return Err(DetectionError::Output(format!(
            "{} regressors and {} scores for {} anchors",
            count,
            scores.len_of(Axis(1)),
            anchors.nrows()
        )));
    }

    let mut detections = Vec::new();
    for i in 0..count {
        let score = sigmoid(scores[[0, i, 0]]);
        if score.is_nan() || score < min_confidence {
            continue;
        }

        let x_center = regressors[[0, i, 0]] / scale * anchors[[i, 2]] + anchors[[i, 0]];
        let y_center = regressors[[0, i, 1]] / scale * anchors[[i, 3]] + anchors[[i, 1]];
        let w = regressors[[0, i, 2]] / scale * anchors[[i, 2]];
        let h = regressors[[0, i, 3]] / scale * anchors[[i, 3]];

        detections.push(Detection {
            xmin: x_center - w / 2.0,
            ymin: y_center - h / 2.0,
            width: w,
            height: h,
            score,
        });
    }
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn single_anchor() -> Array2<f32> {
        array![[0.5, 0.5, 1.0, 1.0]]
    }

    #[test]
    fn decode_centers_box_on_anchor() {
        let mut regressors = Array3::<f32>::zeros((1, 1, REGRESSOR_WIDTH));
        regressors[[0, 0, 2]] = 64.0;
        regressors[[0, 0, 3]] = 128.0;
        let scores = Array3::<f32>::from_elem((1, 1, 1), 5.0);

        let found = decode(&regressors, &scores, &single_anchor(), 256.0, 0.5).unwrap();
        assert_eq!(found.len(), 1);
        let d = found[0];
        assert_eq!((d.xmin, d.ymin, d.width, d.height), (0.375, 0.25, 0.25, 0.5));
        assert!(d.score > 0.99);
    }

    #[test]
    fn decode_drops_low_scores() {
        let regressors = Array3::<f32>::zeros((1, 1, REGRESSOR_WIDTH));
        let scores = Array3::<f32>::from_elem((1, 1, 1), -3.0);
        let found = decode(&regressors, &scores, &single_anchor(), 128.0, 0.1).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn decode_rejects_anchor_mismatch() {
        let regressors = Array3::<f32>::zeros((1, 2, REGRESSOR_WIDTH));
        let scores = Array3::<f32>::zeros((1, 2, 1));
        assert!(decode(&regressors, &scores, &single_anchor(), 128.0, 0.1).is_err());
    }

    #[test]
    fn sigmoid_clips_extreme_logits() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(1e9).is_finite());
        assert!(sigmoid(-1e9) >= 0.0);
    }

    #[test]
    fn split_outputs_concatenates_stride_groups() {
        let outputs = vec![
            Array3::<f32>::zeros((1, 512, 1)),
            Array3::<f32>::zeros((1, 512, REGRESSOR_WIDTH)),
            Array3::<f32>::zeros((1, 384, REGRESSOR_WIDTH)),
            Array3::<f32>::zeros((1, 384, 1)),
        ];
        let (boxes, logits) = split_outputs(outputs).unwrap();
        assert_eq!(boxes.shape(), &[1, 896, REGRESSOR_WIDTH]);
        assert_eq!(logits.shape(), &[1, 896, 1]);
    }

    #[test]
    fn split_outputs_requires_scores() {
        let outputs = vec![Array3::<f32>::zeros((1, 896, REGRESSOR_WIDTH))];
        assert!(split_outputs(outputs).is_err());
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let letterbox = Letterbox::fit(800, 400, 256);
        assert_eq!(letterbox.content_width, 256);
        assert_eq!(letterbox.content_height, 128);
        assert_eq!(letterbox.pad_x, 0);
        assert_eq!(letterbox.pad_y, 64);
    }

    #[test]
    fn letterbox_maps_content_area_back_to_full_image() {
        let letterbox = Letterbox::fit(800, 400, 256);
        // the content occupies rows 64..192 of the input, i.e. 0.25..0.75
        let d = letterbox.to_image(Detection::new(0.0, 0.25, 1.0, 0.5));
        assert_eq!((d.xmin, d.ymin, d.width, d.height), (0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn letterbox_apply_produces_square_input() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        let input = Letterbox::fit(40, 20, 128).apply(&image);
        assert_eq!(input.dimensions(), (128, 128));
        // padding stays black, content is white
        assert_eq!(input.get_pixel(64, 0), &Rgb([0, 0, 0]));
        assert_eq!(input.get_pixel(64, 64), &Rgb([255, 255, 255]));
    }
}
