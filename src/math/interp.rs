//! Piecewise-linear table lookup.
//!
//! Track quantities are sampled at the simulator's own time steps, so every
//! comparison against a target age goes through `interp`. Outside the table the
//! lookup is flat (the first/last value), which matters at the final age point:
//! reading exactly `xs[last]` returns `ys[last]` untouched.

/// Linearly interpolate `ys` at `x0` against increasing `xs`.
///
/// Returns `None` if the table is empty, the slices differ in length, `x0` is
/// NaN, the bracketing abscissae are not finite, or the result is not finite.
pub fn interp(x0: f64, xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.is_empty() || xs.len() != ys.len() || x0.is_nan() {
        return None;
    }

    let last = xs.len() - 1;
    if !(xs[0].is_finite() && xs[last].is_finite()) {
        return None;
    }
    let y = if x0 <= xs[0] {
        ys[0]
    } else if x0 >= xs[last] {
        ys[last]
    } else {
        // First index with xs[j] > x0; x0 lies in [xs[j-1], xs[j]).
        let j = xs.partition_point(|&x| x <= x0);
        // An unsorted or NaN-bearing table can put j at either end.
        if j == 0 || j == xs.len() {
            return None;
        }
        let i = j - 1;
        if !(xs[i].is_finite() && xs[j].is_finite()) {
            return None;
        }
        if xs[i] == x0 {
            ys[i]
        } else {
            let t = (x0 - xs[i]) / (xs[j] - xs[i]);
            ys[i] + t * (ys[j] - ys[i])
        }
    };

    y.is_finite().then_some(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const XS: [f64; 4] = [0.0, 1.0, 3.0, 4.0];
    const YS: [f64; 4] = [10.0, 20.0, 0.0, 5.0];

    #[test]
    fn interior_points_are_linear() {
        assert_relative_eq!(interp(0.5, &XS, &YS).unwrap(), 15.0);
        assert_relative_eq!(interp(2.0, &XS, &YS).unwrap(), 10.0);
        assert_relative_eq!(interp(3.25, &XS, &YS).unwrap(), 1.25);
    }

    #[test]
    fn grid_points_return_table_values() {
        for (x, y) in XS.iter().zip(YS.iter()) {
            assert_eq!(interp(*x, &XS, &YS), Some(*y));
        }
    }

    #[test]
    fn outside_the_table_is_flat() {
        assert_eq!(interp(-100.0, &XS, &YS), Some(10.0));
        assert_eq!(interp(4.0 + 1e-9, &XS, &YS), Some(5.0));
        assert_eq!(interp(f64::INFINITY, &XS, &YS), Some(5.0));
    }

    #[test]
    fn degenerate_tables_yield_none() {
        assert_eq!(interp(1.0, &[], &[]), None);
        assert_eq!(interp(1.0, &[0.0, 1.0], &[1.0]), None);
        assert_eq!(interp(f64::NAN, &XS, &YS), None);
        assert_eq!(interp(0.5, &[0.0, 1.0], &[f64::NAN, 1.0]), None);
    }

    #[test]
    fn non_finite_abscissae_yield_none() {
        let ys = [1.0, 2.0, 3.0];
        assert_eq!(interp(4.568, &[f64::NAN, 1.0, 5.0], &ys), None);
        assert_eq!(interp(0.5, &[0.0, 1.0, f64::NAN], &ys), None);
        assert_eq!(interp(1.5, &[0.0, f64::NAN, 5.0], &ys), None);
    }

    #[test]
    fn single_row_table_is_constant() {
        assert_eq!(interp(7.0, &[1.0], &[2.5]), Some(2.5));
    }
}
