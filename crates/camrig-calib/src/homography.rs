//! Plane-to-image homography estimation.

use camrig_core::{Mat3, Pt2, Real};
use nalgebra::DMatrix;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point counts differ: {board} board vs {image} image")]
    MismatchedPoints { board: usize, image: usize },
    #[error("svd failed")]
    SvdFailed,
    #[error("degenerate correspondence set")]
    Degenerate,
}

/// Estimate `H` such that `image ~ H · board` using the DLT.
///
/// `board` points live on the target plane (board coordinates), `image`
/// points are the observed pixels. The result is normalised so that
/// `H[2, 2] == 1`.
pub fn dlt_homography(board: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = board.len();
    if image.len() != n {
        return Err(HomographyError::MismatchedPoints {
            board: n,
            image: image.len(),
        });
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);

    for (i, (pb, pi)) in board.iter().zip(image.iter()).enumerate() {
        let (x, y) = (pb.x, pb.y);
        let (u, v) = (pi.x, pi.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Null vector of A = singular vector of the smallest singular value.
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let h = v_t.row(v_t.nrows() - 1);

    let mut h_mat = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h_mat[(r, c)] = h[3 * r + c];
        }
    }

    let scale = h_mat[(2, 2)];
    if scale.abs() < 1e-12 {
        // A vanishing H[2,2] means the plane maps through infinity: the
        // correspondences do not pin down a projective plane mapping.
        return Err(HomographyError::Degenerate);
    }
    h_mat /= scale;

    Ok(h_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camrig_core::to_homogeneous;

    #[test]
    fn recovers_pure_scaling() {
        let board = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ];
        let image: Vec<Pt2> = board.iter().map(|p| Pt2::new(2.0 * p.x, 2.0 * p.y)).collect();

        let h = dlt_homography(&board, &image).unwrap();
        assert_relative_eq!(h[(0, 0)], 2.0, epsilon = 1e-9);
        assert_relative_eq!(h[(1, 1)], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn maps_board_points_onto_image_points() {
        let board = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(0.1, 0.0),
            Pt2::new(0.1, 0.1),
            Pt2::new(0.0, 0.1),
            Pt2::new(0.05, 0.02),
        ];
        // A full projective warp.
        let h_gt = Mat3::new(820.0, 12.0, 300.0, -4.0, 790.0, 260.0, 0.01, -0.02, 1.0);
        let image: Vec<Pt2> = board
            .iter()
            .map(|p| {
                let v = h_gt * to_homogeneous(p);
                Pt2::new(v.x / v.z, v.y / v.z)
            })
            .collect();

        let h = dlt_homography(&board, &image).unwrap();
        for (pb, pi) in board.iter().zip(&image) {
            let v = h * to_homogeneous(pb);
            assert_relative_eq!(Pt2::new(v.x / v.z, v.y / v.z), *pi, epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_too_few_points() {
        let pts = vec![Pt2::new(0.0, 0.0), Pt2::new(1.0, 0.0), Pt2::new(1.0, 1.0)];
        assert!(matches!(
            dlt_homography(&pts, &pts),
            Err(HomographyError::NotEnoughPoints(3))
        ));
    }

    #[test]
    fn rejects_mismatched_counts() {
        let a = vec![Pt2::new(0.0, 0.0); 4];
        let b = vec![Pt2::new(0.0, 0.0); 5];
        assert!(matches!(
            dlt_homography(&a, &b),
            Err(HomographyError::MismatchedPoints { board: 4, image: 5 })
        ));
    }
}
