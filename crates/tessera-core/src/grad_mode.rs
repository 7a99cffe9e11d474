// Grad mode — thread-local switch for graph recording
//
// While disabled, operations still compute their outputs but register no
// backward closures, so results are plain constants. The backprop traversal
// itself runs with recording disabled so gradient arithmetic never grows
// the graph it is walking.

use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether operations on this thread currently record backward closures.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// RAII guard that disables graph recording for its lifetime.
///
/// Guards nest: dropping restores whatever state was active when the guard
/// was created.
///
/// ```ignore
/// {
///     let _guard = NoGradGuard::new();
///     let y = x.at(&indices)?;   // no backward node
/// }
/// ```
pub struct NoGradGuard {
    prev: bool,
}

impl NoGradGuard {
    #[must_use]
    pub fn new() -> Self {
        let prev = GRAD_ENABLED.with(|g| g.replace(false));
        NoGradGuard { prev }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|g| g.set(self.prev));
    }
}

/// Run `f` with graph recording disabled.
pub fn no_grad<F, T>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = NoGradGuard::new();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enabled() {
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_guard_nesting() {
        {
            let _outer = NoGradGuard::new();
            assert!(!is_grad_enabled());
            {
                let _inner = NoGradGuard::new();
                assert!(!is_grad_enabled());
            }
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_no_grad_closure() {
        let inside = no_grad(is_grad_enabled);
        assert!(!inside);
        assert!(is_grad_enabled());
    }
}
