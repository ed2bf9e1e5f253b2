use std::io::Cursor;
use std::path::Path;

use ndarray::{Array2, Axis};
use ndarray_npy::ReadNpyExt;

use crate::config::ModelVariant;
use crate::face_detection::DetectionError;

const ANCHOR_OFFSET: f32 = 0.5;
// one anchor for the layer scale, one for the interpolated scale
const ANCHORS_PER_LAYER: usize = 2;

/// Builds the `[N, 4]` anchor table (`x_center, y_center, w, h`) for a variant.
///
/// Layers sharing a stride are folded into one feature map, each contributing
/// two anchors per cell. Anchor sizes are fixed at 1, so the regressor output
/// is scaled by the input size alone.
pub fn generate(variant: ModelVariant) -> Array2<f32> {
    let input_size = variant.input_size();
    let strides = variant.strides();

    let mut rows: Vec<f32> = Vec::new();
    let mut layer = 0;
    while layer < strides.len() {
        let stride = strides[layer];
        let mut same_stride = 0;
        while layer + same_stride < strides.len() && strides[layer + same_stride] == stride {
            same_stride += 1;
        }

        let cells = input_size.div_ceil(stride);
        let per_cell = same_stride * ANCHORS_PER_LAYER;
        for y in 0..cells {
            for x in 0..cells {
                let x_center = (x as f32 + ANCHOR_OFFSET) / cells as f32;
                let y_center = (y as f32 + ANCHOR_OFFSET) / cells as f32;
                for _ in 0..per_cell {
                    rows.extend_from_slice(&[x_center, y_center, 1.0, 1.0]);
                }
            }
        }

        layer += same_stride;
    }

    let count = rows.len() / 4;
    Array2::from_shape_vec((count, 4), rows).unwrap_or_else(|_| Array2::zeros((0, 4)))
}

/// Reads anchors saved with `numpy.save`, as `float32` or `float64`.
pub fn load(path: &Path) -> Result<Array2<f32>, DetectionError> {
    let bytes = std::fs::read(path).map_err(|err| DetectionError::Anchors {
        path: path.to_path_buf(),
        source: ndarray_npy::ReadNpyError::Io(err),
    })?;

    let anchors = match Array2::<f32>::read_npy(Cursor::new(&bytes)) {
        Ok(anchors) => anchors,
        Err(_) => Array2::<f64>::read_npy(Cursor::new(&bytes))
            .map_err(|source| DetectionError::Anchors {
                path: path.to_path_buf(),
                source,
            })?
            .map(|x| *x as f32),
    };

    if anchors.len_of(Axis(1)) < 4 {
        return Err(DetectionError::Output(format!(
            "anchor table in {} has {} columns, expected 4",
            path.display(),
            anchors.len_of(Axis(1))
        )));
    }
    Ok(anchors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::WriteNpyExt;

    #[test]
    fn both_variants_have_896_anchors() {
        assert_eq!(generate(ModelVariant::ShortRange).nrows(), 896);
        assert_eq!(generate(ModelVariant::FullRange).nrows(), 896);
    }

    #[test]
    fn first_and_last_anchor_centers() {
        let anchors = generate(ModelVariant::FullRange);
        // 16x16 grid for stride 16 on a 256 input
        assert_eq!(anchors.row(0).to_vec(), vec![0.5 / 16.0, 0.5 / 16.0, 1.0, 1.0]);
        assert_eq!(anchors.row(1).to_vec(), anchors.row(0).to_vec());
        // last cell of the 8x8 stride-32 grid
        let last = anchors.row(895);
        assert_eq!(last[0], 7.5 / 8.0);
        assert_eq!(last[1], 7.5 / 8.0);
    }

    #[test]
    fn stride_groups_split_at_512() {
        let anchors = generate(ModelVariant::ShortRange);
        // first anchor of the coarse 8x8 grid
        assert_eq!(anchors[[512, 0]], 0.5 / 8.0);
        assert_eq!(anchors[[511, 0]], 15.5 / 16.0);
    }

    #[test]
    fn loads_float64_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors.npy");
        let table = generate(ModelVariant::ShortRange).map(|x| *x as f64);
        let mut file = std::fs::File::create(&path).unwrap();
        table.write_npy(&mut file).unwrap();
        drop(file);

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, generate(ModelVariant::ShortRange));
    }

    #[test]
    fn missing_anchor_file_is_reported() {
        let err = load(Path::new("does/not/exist.npy")).unwrap_err();
        assert!(matches!(err, DetectionError::Anchors { .. }));
    }
}
