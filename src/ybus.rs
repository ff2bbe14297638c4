use crate::cmplx;
use crate::debug::format_rect_vec;
use crate::network::{Branch, Bus};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

/// Builds the bus admittance matrix.
///
/// Each branch contributes its series admittance `y = 1/(r + jx)` to the
/// four entries of its terminal buses and half of its line charging
/// susceptance to each terminal diagonal:
///
/// ```text
///  | Ii |   |  y + jb/2      -y     |   | Vi |
///  |    | = |                       | * |    |
///  | Ij |   |    -y       y + jb/2  |   | Vj |
/// ```
///
/// Bus shunts are added to the diagonal last. Bus numbers must be
/// consecutive beginning at 1 and self-loops must already be removed;
/// a self-loop is not detected here and corrupts its diagonal.
pub fn make_ybus(bus: &[Bus], branch: &[Branch]) -> CsMat<Complex64> {
    let nb = bus.len();

    let mut y_bus = TriMat::with_capacity((nb, nb), 4 * branch.len() + nb);

    for br in branch {
        let y_s = br.y_s(); // series admittance
        let y_c = cmplx!(0.0, br.b / 2.0); // line charging, half at each end

        let (f, t) = (br.from - 1, br.to - 1);

        y_bus.add_triplet(f, f, y_s + y_c);
        y_bus.add_triplet(f, t, -y_s);
        y_bus.add_triplet(t, f, -y_s);
        y_bus.add_triplet(t, t, y_s + y_c);
    }

    for b in bus {
        let y_sh = b.y_sh();
        if y_sh != cmplx!() {
            y_bus.add_triplet(b.idx(), b.idx(), y_sh);
        }
    }

    let y_bus: CsMat<Complex64> = y_bus.to_csr();

    if log::log_enabled!(log::Level::Trace) {
        for (i, row) in y_bus.outer_iterator().enumerate() {
            let v = row.iter().map(|(_, &y)| y).collect::<Vec<Complex64>>();
            log::trace!("Ybus[{}]: {}", i, format_rect_vec(&v));
        }
    }
    y_bus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{entry, J};

    /// Row `i` of Y without shunt and line charging terms. Zero for every
    /// bus of a well formed network.
    fn series_row_sum(
        y_bus: &CsMat<Complex64>,
        bus: &[Bus],
        branch: &[Branch],
        i: usize,
    ) -> Complex64 {
        let mut sum = y_bus
            .outer_view(i)
            .map(|row| row.iter().map(|(_, &y)| y).sum::<Complex64>())
            .unwrap_or_default();

        sum -= bus[i].y_sh();
        for br in branch {
            if br.from - 1 == i || br.to - 1 == i {
                sum -= J * (br.b / 2.0);
            }
        }
        sum
    }

    fn four_bus() -> (Vec<Bus>, Vec<Branch>) {
        let mut bus = (1..=4).map(|i| Bus::new(i, "A")).collect::<Vec<Bus>>();
        bus[2].gs = 0.02;
        bus[3].bs = 0.15;
        let mut branch = vec![
            Branch::new(1, 2, 0.01, 0.1, 1.0),
            Branch::new(2, 3, 0.02, 0.25, 1.0),
            Branch::new(3, 4, 0.0, 0.05, 1.0),
            Branch::new(4, 1, 0.03, 0.3, 1.0),
            Branch::new(1, 2, 0.01, 0.12, 1.0), // parallel circuit
        ];
        branch[1].b = 0.04;
        (bus, branch)
    }

    #[test]
    fn off_diagonals_are_symmetric() {
        let (bus, branch) = four_bus();
        let y = make_ybus(&bus, &branch);
        for i in 0..4 {
            for j in 0..4 {
                let (yij, yji) = (entry(&y, i, j), entry(&y, j, i));
                assert!((yij - yji).norm() < 1e-12, "Y[{},{}] != Y[{},{}]", i, j, j, i);
            }
        }
    }

    #[test]
    fn parallel_branches_accumulate() {
        let (bus, branch) = four_bus();
        let y = make_ybus(&bus, &branch);
        let expect = -(branch[0].y_s() + branch[4].y_s());
        assert!((entry(&y, 0, 1) - expect).norm() < 1e-12);
    }

    #[test]
    fn rows_without_shunts_sum_to_zero() {
        let (bus, branch) = four_bus();
        let y = make_ybus(&bus, &branch);
        for i in 0..bus.len() {
            let sum = series_row_sum(&y, &bus, &branch, i);
            assert!(sum.norm() < 1e-9, "row {} sums to {}", i, sum);
        }
    }

    #[test]
    fn shunts_land_on_diagonal() {
        let (bus, branch) = four_bus();
        let y = make_ybus(&bus, &branch);
        let expect = branch[1].y_s() + branch[2].y_s() + cmplx!(0.02, 0.02);
        assert!((entry(&y, 2, 2) - expect).norm() < 1e-12);
    }
}
