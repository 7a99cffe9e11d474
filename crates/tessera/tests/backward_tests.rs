// Integration tests for gradients through indexing
//
// Each forward op registers its closures through BackwardBuilder; these
// tests run the backward traversal and compare gradients against values
// worked out by hand.

use tessera::prelude::*;
use tessera::{BackwardBuilder, Error};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn variable(data: &[f64], dims: &[usize]) -> tessera::Result<CpuArray> {
    Ok(CpuArray::from_f64_slice(data, dims, DType::F64, &CpuDevice)?.set_variable())
}

fn arange34_var() -> tessera::Result<CpuArray> {
    let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
    variable(&data, &[3, 4])
}

fn index_array(values: &[i64], dims: &[usize]) -> tessera::Result<CpuArray> {
    let data: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    CpuArray::from_f64_slice(&data, dims, DType::I64, &CpuDevice)
}

fn grad_of(grads: &GradStore<CpuBackend>, x: &CpuArray) -> Vec<f64> {
    grads
        .get(x)
        .expect("no gradient reached the array")
        .to_f64_vec()
        .expect("gradient readback")
}

// Graph recording

#[test]
fn test_node_names() -> tessera::Result<()> {
    let a = arange34_var()?;
    let idx = index_array(&[0], &[1])?;

    let view = a.at(&indices![1])?;
    assert_eq!(view.backward_node().map(|n| n.name()), Some("get_item"));

    let gathered = a.take(&idx, 0)?;
    assert_eq!(gathered.backward_node().map(|n| n.name()), Some("take"));

    let b = CpuArray::ones(4usize, DType::F64, &CpuDevice)?.set_variable();
    let scattered = a.add_at(&indices![1], &b)?;
    let node = scattered.backward_node().expect("add_at records a node");
    assert_eq!(node.name(), "add_at");
    assert_eq!(node.num_edges(), 2);

    let rows = CpuArray::ones((1, 4), DType::F64, &CpuDevice)?;
    let scattered = a.add_at_axis(&idx, 0, &rows)?;
    let node = scattered.backward_node().expect("add_at_axis records a node");
    assert_eq!(node.name(), "add_at");
    assert_eq!(node.num_edges(), 1);
    Ok(())
}

#[test]
fn test_no_node_without_variables() -> tessera::Result<()> {
    let a = CpuArray::zeros((3, 4), DType::F64, &CpuDevice)?;
    let idx = index_array(&[0, 2], &[2])?;
    assert!(a.at(&indices![1])?.backward_node().is_none());
    assert!(a.take(&idx, 1)?.backward_node().is_none());
    assert!(!a.at(&indices![1])?.requires_grad());
    Ok(())
}

#[test]
fn test_no_grad_suppresses_recording() -> tessera::Result<()> {
    let a = arange34_var()?;
    let view = no_grad(|| a.at(&indices![1]))?;
    assert!(view.backward_node().is_none());
    {
        let _guard = NoGradGuard::new();
        let idx = index_array(&[0], &[1])?;
        assert!(a.take(&idx, 0)?.backward_node().is_none());
    }
    assert!(a.at(&indices![1])?.backward_node().is_some());
    Ok(())
}

// at

#[test]
fn test_at_row_gradient() -> tessera::Result<()> {
    let a = arange34_var()?;
    let row = a.at(&indices![1])?;
    let seed = CpuArray::ones(4usize, DType::F64, &CpuDevice)?;
    let grads = row.backward_with_grad(&seed)?;
    assert_vec_approx(
        &grad_of(&grads, &a),
        &[0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        1e-12,
    );
    Ok(())
}

#[test]
fn test_at_new_axis_gradient_shape() -> tessera::Result<()> {
    let a = arange34_var()?;
    let v = a.at(&indices![0..2, ArrayIndex::NewAxis])?;
    let grads = v.sum_all()?.backward()?;
    let g = grads.get(&a).expect("gradient for a");
    assert_eq!(g.dims(), &[3, 4]);
    let mut expected = vec![1.0; 8];
    expected.extend(vec![0.0; 4]);
    assert_vec_approx(&g.to_f64_vec()?, &expected, 1e-12);
    Ok(())
}

#[test]
fn test_at_negative_step_gradient() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0, 4.0], &[4])?;
    let rev = x.at(&indices![Slice::new(None, None, -1)?])?;
    let seed = CpuArray::from_f64_slice(&[10.0, 20.0, 30.0, 40.0], 4usize, DType::F64, &CpuDevice)?;
    let grads = rev.backward_with_grad(&seed)?;
    assert_vec_approx(&grad_of(&grads, &x), &[40.0, 30.0, 20.0, 10.0], 1e-12);
    Ok(())
}

#[test]
fn test_overlapping_views_accumulate() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0, 4.0], &[4])?;
    let left = x.at(&indices![0..3])?;
    let right = x.at(&indices![1..4])?;
    let y = left.add(&right)?.sum_all()?;
    let grads = y.backward()?;
    assert_vec_approx(&grad_of(&grads, &x), &[1.0, 2.0, 2.0, 1.0], 1e-12);
    Ok(())
}

// take

#[test]
fn test_take_duplicate_indices_accumulate() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0], &[3])?;
    let idx = index_array(&[0, 0], &[2])?;
    let y = x.take(&idx, 0)?.sum_all()?;
    let grads = y.backward()?;
    assert_vec_approx(&grad_of(&grads, &x), &[2.0, 0.0, 0.0], 1e-12);
    Ok(())
}

#[test]
fn test_take_weighted_gradient() -> tessera::Result<()> {
    let a = arange34_var()?;
    let idx = index_array(&[2, 0, 2], &[3])?;
    let picked = a.take(&idx, 1)?;
    assert_eq!(picked.dims(), &[3, 3]);

    let seed_data: Vec<f64> = (1..=9).map(|v| v as f64).collect();
    let seed = CpuArray::from_f64_slice(&seed_data, (3, 3), DType::F64, &CpuDevice)?;
    let grads = picked.backward_with_grad(&seed)?;
    // column 0 gets seed[:, 1], column 2 gets seed[:, 0] + seed[:, 2]
    assert_vec_approx(
        &grad_of(&grads, &a),
        &[2.0, 0.0, 4.0, 0.0, 5.0, 0.0, 10.0, 0.0, 8.0, 0.0, 16.0, 0.0],
        1e-12,
    );
    Ok(())
}

#[test]
fn test_take_gradient_follows_output_dtype() -> tessera::Result<()> {
    let x = CpuArray::ones((2, 3), DType::F32, &CpuDevice)?.set_variable();
    let idx = index_array(&[1], &[1])?;
    let grads = x.take(&idx, 0)?.sum_all()?.backward()?;
    let g = grads.get(&x).expect("gradient for x");
    assert_eq!(g.dtype(), DType::F32);
    assert_vec_approx(&g.to_f64_vec()?, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0], 1e-6);
    Ok(())
}

#[test]
fn test_indices_receive_no_gradient() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0], &[3])?;
    let idx = index_array(&[2, 1], &[2])?;
    let grads = x.take(&idx, 0)?.sum_all()?.backward()?;
    assert!(grads.get(&idx).is_none());
    Ok(())
}

// add_at

#[test]
fn test_add_at_gradients() -> tessera::Result<()> {
    let a = arange34_var()?;
    let b = CpuArray::ones((3, 2), DType::F64, &CpuDevice)?.set_variable();
    let out = a.add_at(&indices![.., 1..3], &b)?;

    let seed_data: Vec<f64> = (0..12).map(|v| v as f64 * 0.5).collect();
    let seed = CpuArray::from_f64_slice(&seed_data, (3, 4), DType::F64, &CpuDevice)?;
    let grads = out.backward_with_grad(&seed)?;

    assert_vec_approx(&grad_of(&grads, &a), &seed_data, 1e-12);
    assert_vec_approx(
        &grad_of(&grads, &b),
        &[0.5, 1.0, 2.5, 3.0, 4.5, 5.0],
        1e-12,
    );
    Ok(())
}

#[test]
fn test_add_at_axis_gradients() -> tessera::Result<()> {
    let a = CpuArray::zeros((3, 2), DType::F64, &CpuDevice)?.set_variable();
    let idx = index_array(&[2, 2, 0], &[3])?;
    let b = variable(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], &[3, 2])?;
    let out = a.add_at_axis(&idx, 0, &b)?;

    let seed = CpuArray::from_f64_slice(
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        (3, 2),
        DType::F64,
        &CpuDevice,
    )?;
    let grads = out.backward_with_grad(&seed)?;
    assert_vec_approx(
        &grad_of(&grads, &a),
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        1e-12,
    );
    // grad_b = seed.take(idx, 0): rows 2, 2, 0
    assert_vec_approx(
        &grad_of(&grads, &b),
        &[5.0, 6.0, 5.0, 6.0, 1.0, 2.0],
        1e-12,
    );
    Ok(())
}

// Composition

#[test]
fn test_view_then_take_chain() -> tessera::Result<()> {
    let a = arange34_var()?;
    let idx = index_array(&[3, 3], &[2])?;
    let y = a.at(&indices![1..])?.take(&idx, 1)?.sum_all()?;
    assert_eq!(y.to_scalar_f64()?, 2.0 * (7.0 + 11.0));
    let grads = y.backward()?;
    assert_vec_approx(
        &grad_of(&grads, &a),
        &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0],
        1e-12,
    );
    Ok(())
}

#[test]
fn test_contiguous_passes_gradient_through() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0], &[3])?;
    let rev = x.at(&indices![Slice::new(None, None, -1)?])?.contiguous()?;
    assert!(rev.is_contiguous());
    let w = CpuArray::from_f64_slice(&[1.0, 10.0, 100.0], 3usize, DType::F64, &CpuDevice)?;
    let grads = rev.mul(&w)?.sum_all()?.backward()?;
    assert_vec_approx(&grad_of(&grads, &x), &[100.0, 10.0, 1.0], 1e-12);
    Ok(())
}

#[test]
fn test_same_input_twice_in_one_op() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0], &[3])?;
    let grads = x.mul(&x)?.sum_all()?.backward()?;
    assert_vec_approx(&grad_of(&grads, &x), &[2.0, 4.0, 6.0], 1e-12);

    let grads = x.sub(&x)?.sum_all()?.backward()?;
    assert_vec_approx(&grad_of(&grads, &x), &[0.0, 0.0, 0.0], 1e-12);
    Ok(())
}

#[test]
fn test_gradients_are_constants() -> tessera::Result<()> {
    let a = arange34_var()?;
    let grads = a.at(&indices![0])?.sum_all()?.backward()?;
    let g = grads.get(&a).expect("gradient for a");
    assert!(g.backward_node().is_none());
    assert!(!g.requires_grad());
    Ok(())
}

// Custom ops through the public builder

/// y = 3x, wired by hand.
fn triple(x: &CpuArray) -> tessera::Result<CpuArray> {
    let three = CpuArray::full(x.shape().clone(), 3.0, x.dtype(), x.device())?;
    let out = no_grad(|| x.mul(&three))?;
    if !x.is_backprop_required() {
        return Ok(out);
    }
    let mut bb = BackwardBuilder::new("triple", out);
    bb.define(x, move |ctx| {
        let g = ctx.output_grad().mul(&three)?;
        ctx.set_input_grad(g)
    });
    Ok(bb.build())
}

#[test]
fn test_custom_backward_closure() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0, 4.0], &[2, 2])?;
    let y = triple(&x.at(&indices![1])?)?;
    assert_eq!(y.backward_node().map(|n| n.name()), Some("triple"));
    let grads = y.sum_all()?.backward()?;
    assert_vec_approx(&grad_of(&grads, &x), &[0.0, 0.0, 3.0, 3.0], 1e-12);
    Ok(())
}

#[test]
fn test_setting_input_grad_twice_is_an_error() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0], &[2])?;
    let out = x.copy()?;
    let mut bb = BackwardBuilder::new("double_write", out);
    bb.define(&x, |ctx| {
        let g = ctx.output_grad().clone();
        ctx.set_input_grad(g.clone())?;
        ctx.set_input_grad(g)
    });
    let y = bb.build().sum_all()?;
    assert!(matches!(y.backward(), Err(Error::Msg(_))));
    Ok(())
}

#[test]
fn test_wrong_gradient_shape_is_rejected() -> tessera::Result<()> {
    let x = variable(&[1.0, 2.0, 3.0], &[3])?;
    let out = x.copy()?;
    let mut bb = BackwardBuilder::new("bad_shape", out);
    bb.define(&x, |ctx| {
        let g = CpuArray::zeros(2usize, DType::F64, &CpuDevice)?;
        ctx.set_input_grad(g)
    });
    let y = bb.build().sum_all()?;
    assert!(matches!(y.backward(), Err(Error::ShapeMismatch { .. })));
    Ok(())
}

// Seeding

#[test]
fn test_backward_requires_single_element() -> tessera::Result<()> {
    let a = arange34_var()?;
    let row = a.at(&indices![0])?;
    assert!(row.backward().is_err());
    Ok(())
}

#[test]
fn test_backward_with_grad_validates_seed() -> tessera::Result<()> {
    let a = arange34_var()?;
    let row = a.at(&indices![0])?;

    let wrong_shape = CpuArray::ones(3usize, DType::F64, &CpuDevice)?;
    assert!(matches!(
        row.backward_with_grad(&wrong_shape),
        Err(Error::ShapeMismatch { .. })
    ));

    let wrong_dtype = CpuArray::ones(4usize, DType::F32, &CpuDevice)?;
    assert!(matches!(
        row.backward_with_grad(&wrong_dtype),
        Err(Error::DTypeMismatch { .. })
    ));
    Ok(())
}
