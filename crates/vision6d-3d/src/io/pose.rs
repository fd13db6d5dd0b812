use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use thiserror::Error;

use crate::pose::Pose;

/// Element-wise tolerance of the rigidity check on load.
pub const RIGIDITY_TOLERANCE: f64 = 1e-6;

/// Error types for pose persistence.
#[derive(Debug, Error)]
pub enum PoseIoError {
    /// The file exists but does not hold a 4x4 matrix.
    #[error("Invalid pose format: expected a 4x4 matrix, got {rows}x{cols} with {len} values")]
    InvalidFormat {
        /// Stored row count.
        rows: u64,
        /// Stored column count.
        cols: u64,
        /// Stored number of values.
        len: usize,
    },

    /// The matrix holds NaN or infinite values.
    #[error("Pose matrix contains non-finite values")]
    NonFinite,

    /// The rotation block is not orthonormal (up to a reflection) or the last row is not
    /// `0 0 0 1`.
    #[error("Pose matrix is not rigid up to a reflection (tolerance {tolerance})")]
    NotRigid {
        /// Element-wise tolerance used for the check.
        tolerance: f64,
    },

    /// Failed to open, read or write the file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The payload could not be decoded.
    #[error("Failed to decode pose file: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The payload could not be encoded.
    #[error("Failed to encode pose file: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// On-disk layout: shape header followed by row-major values.
#[derive(bincode::Encode, bincode::Decode)]
struct MatrixRecord {
    shape: [u64; 2],
    data: Vec<f64>,
}

/// Write a pose as a flat row-major 4x4 matrix.
pub fn save_pose(path: impl AsRef<Path>, pose: &Pose) -> Result<(), PoseIoError> {
    let record = MatrixRecord {
        shape: [4, 4],
        data: pose.to_rows().iter().flatten().copied().collect(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::encode_into_std_write(&record, &mut writer, bincode::config::standard())?;
    Ok(())
}

/// Read a pose written by [`save_pose`].
///
/// # Errors
///
/// [`PoseIoError::InvalidFormat`] for any shape other than 4x4, [`PoseIoError::NotRigid`] when
/// the matrix is not a rotation or reflection plus translation.
pub fn load_pose(path: impl AsRef<Path>) -> Result<Pose, PoseIoError> {
    let mut reader = BufReader::new(File::open(path)?);
    let record: MatrixRecord =
        bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
    pose_from_record(record)
}

fn pose_from_record(record: MatrixRecord) -> Result<Pose, PoseIoError> {
    let [rows, cols] = record.shape;
    if rows != 4 || cols != 4 || record.data.len() != 16 {
        return Err(PoseIoError::InvalidFormat {
            rows,
            cols,
            len: record.data.len(),
        });
    }
    if record.data.iter().any(|v| !v.is_finite()) {
        return Err(PoseIoError::NonFinite);
    }
    let mut m = [[0.0; 4]; 4];
    for (r, row) in m.iter_mut().enumerate() {
        row.copy_from_slice(&record.data[r * 4..r * 4 + 4]);
    }
    let pose = Pose::from_rows(m);
    if !pose.is_orthonormal_up_to_reflection(RIGIDITY_TOLERANCE) {
        return Err(PoseIoError::NotRigid {
            tolerance: RIGIDITY_TOLERANCE,
        });
    }
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_pose() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pose.bin");
        let pose = Pose::from_rows([
            [0.0, -1.0, 0.0, 1.5],
            [1.0, 0.0, 0.0, -2.5],
            [0.0, 0.0, 1.0, 3.25],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        save_pose(&path, &pose)?;
        assert_eq!(load_pose(&path)?, pose);
        Ok(())
    }

    #[test]
    fn test_load_rejects_wrong_shape() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pose3x3.bin");
        let record = MatrixRecord {
            shape: [3, 3],
            data: vec![0.0; 9],
        };
        let mut file = File::create(&path)?;
        bincode::encode_into_std_write(&record, &mut file, bincode::config::standard())?;
        drop(file);

        let res = load_pose(&path);
        assert!(matches!(
            res,
            Err(PoseIoError::InvalidFormat {
                rows: 3,
                cols: 3,
                len: 9
            })
        ));
        Ok(())
    }

    #[test]
    fn test_load_rejects_garbage() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, [1u8, 2, 3])?;
        assert!(load_pose(&path).is_err());
        assert!(matches!(
            load_pose(dir.path().join("missing.bin")),
            Err(PoseIoError::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn test_sheared_matrix_rejected() -> Result<(), PoseIoError> {
        let mut data = vec![0.0; 16];
        for d in 0..4 {
            data[d * 5] = 1.0;
        }
        // shear x by y
        data[1] = 0.5;
        let res = pose_from_record(MatrixRecord {
            shape: [4, 4],
            data: data.clone(),
        });
        assert!(matches!(res, Err(PoseIoError::NotRigid { .. })));

        // a mirrored pose is fine
        data[1] = 0.0;
        data[0] = -1.0;
        let mirrored = pose_from_record(MatrixRecord {
            shape: [4, 4],
            data,
        })?;
        assert_eq!(mirrored.rotation().determinant(), -1.0);
        Ok(())
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut data = vec![0.0; 16];
        data[5] = f64::NAN;
        let res = pose_from_record(MatrixRecord {
            shape: [4, 4],
            data,
        });
        assert!(matches!(res, Err(PoseIoError::NonFinite)));
    }
}
