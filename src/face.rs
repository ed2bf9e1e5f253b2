use serde::Serialize;

/// A face found by a detector, expressed relative to the image it was found in.
///
/// All four box fields are fractions of the image width (`xmin`, `width`) or
/// height (`ymin`, `height`), with the origin at the top-left corner. Values
/// outside `[0, 1]` are allowed; detectors may report boxes that spill over
/// the image border.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub width: f32,
    pub height: f32,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

impl Detection {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            score: 1.0,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Converts the relative box into pixel coordinates for an image of the given size.
    ///
    /// Each value is `relative * dimension` truncated toward zero. Nothing is
    /// clamped, so a box hanging off the left edge yields a negative `x`.
    pub fn to_face_box(&self, image_width: u32, image_height: u32) -> FaceBox {
        FaceBox {
            x: scale(self.xmin, image_width),
            y: scale(self.ymin, image_height),
            width: scale(self.width, image_width),
            height: scale(self.height, image_height),
        }
    }
}

fn scale(relative: f32, dimension: u32) -> i64 {
    (f64::from(relative) * f64::from(dimension)) as i64
}

/// A detected face in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FaceBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl FaceBox {
    pub fn to_tuple(&self) -> (i64, i64, i64, i64) {
        (self.x, self.y, self.width, self.height)
    }
}

/// Converts every detection of one image, keeping detector order.
pub fn to_face_boxes(
    detections: &[Detection],
    image_width: u32,
    image_height: u32,
) -> Vec<FaceBox> {
    detections
        .iter()
        .map(|d| d.to_face_box(image_width, image_height))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_reference_detection() {
        let detection = Detection::new(0.1, 0.2, 0.3, 0.4);
        let face = detection.to_face_box(800, 600);
        assert_eq!(face.to_tuple(), (80, 120, 240, 240));
    }

    #[test]
    fn full_frame_box_covers_whole_image() {
        let face = Detection::new(0.0, 0.0, 1.0, 1.0).to_face_box(1023, 767);
        assert_eq!(face.to_tuple(), (0, 0, 1023, 767));
    }

    #[test]
    fn truncates_instead_of_rounding() {
        // 0.109 * 100 = 10.9
        let face = Detection::new(0.109, 0.0, 0.5, 0.5).to_face_box(100, 100);
        assert_eq!(face.x, 10);
    }

    #[test]
    fn negative_offsets_truncate_toward_zero_and_are_not_clamped() {
        let face = Detection::new(-0.015, 0.75, 0.5, 0.5).to_face_box(100, 100);
        // -1.5 truncates to -1, 0.75 + 0.5 runs past the bottom edge unchanged
        assert_eq!(face.x, -1);
        assert_eq!(face.y, 75);
        assert_eq!(face.height, 50);
    }

    #[test]
    fn serializes_with_named_fields() {
        let face = FaceBox {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        };
        let json = serde_json::to_value(face).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"x": 1, "y": 2, "width": 3, "height": 4})
        );
    }

    #[test]
    fn keeps_detector_order() {
        let detections = [
            Detection::new(0.5, 0.5, 0.1, 0.1),
            Detection::new(0.0, 0.0, 0.1, 0.1),
        ];
        let faces = to_face_boxes(&detections, 10, 10);
        assert_eq!(faces[0].x, 5);
        assert_eq!(faces[1].x, 0);
    }
}
