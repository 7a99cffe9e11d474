// Backward graph wiring — closures registered per differentiable input
//
// A forward op that wants gradients opens a BackwardBuilder tagged with its
// name and output, then defines one closure per input that needs a
// gradient:
//
//   let mut bb = BackwardBuilder::new("take", out);
//   bb.define(&a, move |ctx| {
//       let gout = ctx.output_grad();
//       ctx.set_input_grad(/* gradient for a, computed from gout */)
//   });
//   let out = bb.build();
//
// The closures run later, during backprop (see `backprop.rs`). They must be
// self-contained: anything they need (indices, axis, shapes, dtypes) is
// moved in by value. The `'static + Send + Sync` bound enforces that.
//
// If the same array is passed as two inputs of one op (e.g. `a.mul(&a)`),
// the second `define` folds into the first so the input still owns exactly
// one closure, whose gradient is the sum of both contributions.

use std::fmt;
use std::sync::Arc;

use crate::array::Array;
use crate::backend::Backend;
use crate::error::{Error, Result};

/// Gradient closure stored in the graph.
pub type BackwardFn<B> =
    Box<dyn Fn(&mut BackwardContext<'_, B>) -> Result<()> + Send + Sync + 'static>;

/// What a backward closure sees: the gradient flowing into the op's output,
/// and a single write slot for the gradient of its input.
pub struct BackwardContext<'a, B: Backend> {
    output_grad: &'a Array<B>,
    input_grad: Option<Array<B>>,
}

impl<'a, B: Backend> BackwardContext<'a, B> {
    pub(crate) fn new(output_grad: &'a Array<B>) -> Self {
        BackwardContext {
            output_grad,
            input_grad: None,
        }
    }

    /// Gradient of the loss with respect to the op's output.
    pub fn output_grad(&self) -> &'a Array<B> {
        self.output_grad
    }

    /// Write the gradient of the loss with respect to this input.
    /// May be called at most once.
    pub fn set_input_grad(&mut self, grad: Array<B>) -> Result<()> {
        if self.input_grad.is_some() {
            return Err(Error::msg("input gradient already set for this backward edge"));
        }
        self.input_grad = Some(grad);
        Ok(())
    }

    pub(crate) fn into_input_grad(self) -> Option<Array<B>> {
        self.input_grad
    }
}

pub(crate) struct BackwardEdge<B: Backend> {
    pub(crate) input: Array<B>,
    pub(crate) backward_fn: BackwardFn<B>,
}

/// The backward record attached to an op's output.
pub struct BackwardNode<B: Backend> {
    name: &'static str,
    edges: Vec<BackwardEdge<B>>,
}

impl<B: Backend> BackwardNode<B> {
    /// Name of the forward op ("get_item", "take", "add_at", ...).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Inputs that receive a gradient from this node.
    pub fn inputs(&self) -> impl Iterator<Item = &Array<B>> {
        self.edges.iter().map(|e| &e.input)
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn edges(&self) -> &[BackwardEdge<B>] {
        &self.edges
    }
}

impl<B: Backend> fmt::Debug for BackwardNode<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<_> = self.edges.iter().map(|e| e.input.id()).collect();
        write!(f, "BackwardNode({}, inputs={:?})", self.name, ids)
    }
}

/// Collects backward closures for one forward op.
pub struct BackwardBuilder<B: Backend> {
    name: &'static str,
    output: Array<B>,
    edges: Vec<BackwardEdge<B>>,
}

impl<B: Backend> BackwardBuilder<B> {
    pub fn new(name: &'static str, output: Array<B>) -> Self {
        BackwardBuilder {
            name,
            output,
            edges: Vec::new(),
        }
    }

    /// Register the gradient closure for `input`.
    pub fn define<F>(&mut self, input: &Array<B>, f: F) -> &mut Self
    where
        F: Fn(&mut BackwardContext<'_, B>) -> Result<()> + Send + Sync + 'static,
    {
        match self.edges.iter_mut().find(|e| e.input.id() == input.id()) {
            Some(edge) => {
                let noop: BackwardFn<B> = Box::new(|_: &mut BackwardContext<'_, B>| Ok(()));
                let first = std::mem::replace(&mut edge.backward_fn, noop);
                edge.backward_fn = Box::new(move |ctx: &mut BackwardContext<'_, B>| {
                    let gout = ctx.output_grad();
                    let mut c1 = BackwardContext::new(gout);
                    first(&mut c1)?;
                    let mut c2 = BackwardContext::new(gout);
                    f(&mut c2)?;
                    match (c1.into_input_grad(), c2.into_input_grad()) {
                        (Some(g1), Some(g2)) => ctx.set_input_grad(g1.add(&g2)?),
                        (Some(g), None) | (None, Some(g)) => ctx.set_input_grad(g),
                        (None, None) => Ok(()),
                    }
                });
            }
            None => self.edges.push(BackwardEdge {
                input: input.clone(),
                backward_fn: Box::new(f),
            }),
        }
        self
    }

    /// Attach the collected closures to the output and return it.
    pub fn build(self) -> Array<B> {
        if self.edges.is_empty() {
            return self.output;
        }
        log::trace!(
            "backward node '{}' attached to {:?} ({} edges)",
            self.name,
            self.output.id(),
            self.edges.len()
        );
        let node = BackwardNode {
            name: self.name,
            edges: self.edges,
        };
        self.output.with_backward_node(Arc::new(node))
    }
}
