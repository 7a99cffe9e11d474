// Host kernels — generic over the element type
//
// Every kernel reads its inputs through a Layout, so strided views
// (negative strides, stride-0 new axes, offsets) are handled without a
// separate "make contiguous" pass. Arithmetic is done in f64 and converted
// back with WithDType::from_f64.
//
// Gather and scatter-add split the input shape around the indexed axis:
//
//   [ pre.. | axis | post.. ]   →   flat = (p * axis_len + i) * post_len + r

use tessera_core::backend::BinaryOp;
use tessera_core::dtype::WithDType;
use tessera_core::error::{Error, Result};
use tessera_core::layout::Layout;

/// Copy the elements addressed by `layout` into a new row-major Vec.
pub(crate) fn strided_copy<T: Copy>(data: &[T], layout: &Layout) -> Vec<T> {
    layout.strided_indices().map(|i| data[i]).collect()
}

pub(crate) fn binary_map<T: WithDType>(
    op: BinaryOp,
    lhs: &[T],
    lhs_layout: &Layout,
    rhs: &[T],
    rhs_layout: &Layout,
) -> Vec<T> {
    lhs_layout
        .strided_indices()
        .zip(rhs_layout.strided_indices())
        .map(|(l, r)| T::from_f64(op.apply(lhs[l].to_f64(), rhs[r].to_f64())))
        .collect()
}

/// `dst[view] += src`, elementwise in logical order.
pub(crate) fn add_assign_strided<T: WithDType>(
    dst: &mut [T],
    dst_layout: &Layout,
    src: &[T],
    src_layout: &Layout,
) {
    for (d, s) in dst_layout
        .strided_indices()
        .zip(src_layout.strided_indices())
    {
        dst[d] = T::from_f64(dst[d].to_f64() + src[s].to_f64());
    }
}

pub(crate) fn sum_strided<T: WithDType>(data: &[T], layout: &Layout) -> Vec<T> {
    let total: f64 = layout.strided_indices().map(|i| data[i].to_f64()).sum();
    vec![T::from_f64(total)]
}

/// Sizes of the axes before, at, and after `axis`.
fn split_dims(dims: &[usize], axis: usize) -> (usize, usize, usize) {
    let pre: usize = dims[..axis].iter().product();
    let post: usize = dims[axis + 1..].iter().product();
    (pre, dims[axis], post)
}

/// Map an index onto `[0, len)`, wrapping modulo the axis length.
/// Negative values count from the end.
fn wrap_index(index: i64, len: usize, axis: usize) -> Result<usize> {
    if len == 0 {
        return Err(Error::IndexOutOfBounds {
            index,
            axis,
            size: 0,
        });
    }
    Ok(index.rem_euclid(len as i64) as usize)
}

fn wrap_all(indices: &[i64], len: usize, axis: usize) -> Result<Vec<usize>> {
    indices
        .iter()
        .map(|&i| wrap_index(i, len, axis))
        .collect()
}

/// `out[p, q, r] = input[p, indices[q], r]`
pub(crate) fn take<T: WithDType>(
    input: &[T],
    input_layout: &Layout,
    indices: &[i64],
    axis: usize,
) -> Result<Vec<T>> {
    let (pre, axis_len, post) = split_dims(input_layout.dims(), axis);
    let indices = wrap_all(indices, axis_len, axis)?;
    let src = strided_copy(input, input_layout);

    let mut out = Vec::with_capacity(pre * indices.len() * post);
    for p in 0..pre {
        for &i in &indices {
            let base = (p * axis_len + i) * post;
            out.extend_from_slice(&src[base..base + post]);
        }
    }
    Ok(out)
}

/// `out = a; out[p, indices[q], r] += b[p, q, r]`, accumulating repeats.
pub(crate) fn add_at<T: WithDType>(
    a: &[T],
    a_layout: &Layout,
    indices: &[i64],
    axis: usize,
    b: &[T],
    b_layout: &Layout,
) -> Result<Vec<T>> {
    let (pre, axis_len, post) = split_dims(a_layout.dims(), axis);
    let indices = wrap_all(indices, axis_len, axis)?;
    let mut out = strided_copy(a, a_layout);
    let b = strided_copy(b, b_layout);

    let n_idx = indices.len();
    for p in 0..pre {
        for (q, &i) in indices.iter().enumerate() {
            let dst = (p * axis_len + i) * post;
            let src = (p * n_idx + q) * post;
            for r in 0..post {
                out[dst + r] = T::from_f64(out[dst + r].to_f64() + b[src + r].to_f64());
            }
        }
    }
    Ok(out)
}
