// Backpropagation — reverse traversal over registered backward closures
//
//   1. Forward ops attach a BackwardNode to their output (see backward.rs).
//      Each node lists its inputs and one closure per input.
//
//   2. backward() sorts the graph depth-first from the root so every array
//      comes after the arrays it was computed from.
//
//   3. Starting from the seed gradient at the root, walk the order in
//      reverse. For every node, hand each closure the accumulated gradient
//      of the node's output and collect what it writes as the input's
//      gradient.
//
// ACCUMULATION: an array feeding several ops receives the sum of all
// contributions (multivariate chain rule). This is also what makes the
// gather adjoint correct for repeated indices.
//
// The whole traversal runs under NoGradGuard: gradient arithmetic produces
// constants, never new graph nodes.

use std::collections::{HashMap, HashSet};

use crate::array::{Array, ArrayId};
use crate::backend::Backend;
use crate::backward::BackwardContext;
use crate::error::{Error, Result};
use crate::grad_mode::NoGradGuard;

/// Stores gradients for all arrays in a computation graph.
///
/// Returned by [`Array::backward`]; look gradients up with `grads.get(&x)`.
pub struct GradStore<B: Backend> {
    grads: HashMap<ArrayId, Array<B>>,
}

impl<B: Backend> Clone for GradStore<B> {
    fn clone(&self) -> Self {
        GradStore {
            grads: self.grads.clone(),
        }
    }
}

impl<B: Backend> Default for GradStore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GradStore<B> {
    pub fn new() -> Self {
        GradStore {
            grads: HashMap::new(),
        }
    }

    /// Get the gradient of an array (if one reached it).
    pub fn get(&self, array: &Array<B>) -> Option<&Array<B>> {
        self.grads.get(&array.id())
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Accumulate a gradient contribution, summing with any existing one.
    pub fn accumulate(&mut self, id: ArrayId, grad: Array<B>) -> Result<()> {
        let grad = match self.grads.remove(&id) {
            Some(existing) => existing.add(&grad)?,
            None => grad,
        };
        self.grads.insert(id, grad);
        Ok(())
    }
}

/// Topological order of the graph under `root`: inputs before outputs.
fn build_topo<B: Backend>(root: &Array<B>) -> Vec<Array<B>> {
    fn visit<B: Backend>(
        a: &Array<B>,
        visited: &mut HashSet<ArrayId>,
        order: &mut Vec<Array<B>>,
    ) {
        if !visited.insert(a.id()) {
            return;
        }
        if let Some(node) = a.backward_node() {
            for input in node.inputs() {
                visit(input, visited, order);
            }
        }
        order.push(a.clone());
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(root, &mut visited, &mut order);
    order
}

/// Backprop from a single-element root, seeded with 1.
pub fn backward<B: Backend>(root: &Array<B>) -> Result<GradStore<B>> {
    if root.elem_count() != 1 {
        crate::bail!(
            "backward() requires a single-element array, got shape {}; \
             use backward_with_grad() to seed it",
            root.shape()
        );
    }
    let seed = Array::<B>::ones(root.shape().clone(), root.dtype(), root.device())?;
    backward_with_grad(root, &seed)
}

/// Backprop from `root` seeded with an explicit output gradient.
pub fn backward_with_grad<B: Backend>(root: &Array<B>, grad: &Array<B>) -> Result<GradStore<B>> {
    if grad.shape() != root.shape() {
        return Err(Error::ShapeMismatch {
            expected: root.shape().clone(),
            got: grad.shape().clone(),
        });
    }
    if grad.dtype() != root.dtype() {
        return Err(Error::DTypeMismatch {
            expected: root.dtype(),
            got: grad.dtype(),
        });
    }

    let _guard = NoGradGuard::new();
    let topo = build_topo(root);
    log::debug!(
        "backward from {:?}: {} arrays in graph",
        root.id(),
        topo.len()
    );

    let mut grads = GradStore::new();
    grads.grads.insert(root.id(), grad.detach());

    for array in topo.iter().rev() {
        let node = match array.backward_node() {
            Some(node) => node,
            None => continue, // leaf
        };
        let grad_output = match grads.get(array) {
            Some(g) => g.clone(),
            None => continue, // no gradient flows here
        };

        for edge in node.edges() {
            let mut ctx = BackwardContext::new(&grad_output);
            (edge.backward_fn)(&mut ctx)?;
            let Some(grad_input) = ctx.into_input_grad() else {
                continue;
            };
            if grad_input.shape() != edge.input.shape() {
                return Err(Error::ShapeMismatch {
                    expected: edge.input.shape().clone(),
                    got: grad_input.shape().clone(),
                });
            }
            grads.accumulate(edge.input.id(), grad_input)?;
        }
    }

    log::debug!("backward done: {} gradients", grads.len());
    Ok(grads)
}
