//! `C = alpha * A B + beta * C` over strided `f64` slices.
//!
//! `Matrix` routes its three products through here: the bias-skipping affine
//! map, the transposed error product and the rank-1 gradient update. Strides are
//! element counts, so a transpose is just a stride swap.

#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f64(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    rsa: usize,
    csa: usize,
    b: &[f64],
    rsb: usize,
    csb: usize,
    beta: f64,
    c: &mut [f64],
    rsc: usize,
    csc: usize,
) {
    debug_assert!(m > 0 && n > 0 && k > 0);
    debug_assert!(rsa > 0 || m <= 1);
    debug_assert!(csa > 0 || k <= 1);
    debug_assert!(rsb > 0 || k <= 1);
    debug_assert!(csb > 0 || n <= 1);
    debug_assert!(rsc > 0 || m <= 1);
    debug_assert!(csc > 0 || n <= 1);
    debug_assert!(a.len() > (m - 1) * rsa + (k - 1) * csa);
    debug_assert!(b.len() > (k - 1) * rsb + (n - 1) * csb);
    debug_assert!(c.len() > (m - 1) * rsc + (n - 1) * csc);

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: every index reached through (m, n, k) and the strides lies inside
        // `a`, `b` and `c`, and `c` does not alias the inputs.
        unsafe {
            matrixmultiply::dgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        let row = &a[i * rsa..];
        for j in 0..n {
            let col = &b[j * csb..];
            let dot = (0..k).fold(0.0_f64, |acc, p| row[p * csa].mul_add(col[p * rsb], acc));

            let out = &mut c[i * rsc + j * csc];
            *out = if beta == 0.0 {
                alpha * dot
            } else {
                alpha * dot + beta * *out
            };
        }
    }
}
