//! Computation Module
//!
//! A function paired with the source text that identifies it in the cache.

use std::borrow::Cow;
use std::fmt;

/// A memoizable function and its identity.
///
/// The cache keys a computation by its source text, not by the closure
/// value: two computations with identical source text share cache entries.
pub struct Computation<F> {
    source: Cow<'static, str>,
    func: F,
}

impl<F> Computation<F> {
    // == Constructor ==
    /// Creates a computation identified by `source`.
    pub fn new(source: impl Into<Cow<'static, str>>, func: F) -> Self {
        Self {
            source: source.into(),
            func,
        }
    }

    /// The source text the cache fingerprints.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn func(&self) -> &F {
        &self.func
    }
}

impl<F> fmt::Debug for Computation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Computation`] whose identity is the closure's own tokens.
///
/// ```
/// use function_cache::computation;
///
/// let double = computation!(|x: u32| Ok::<_, std::convert::Infallible>(x * 2));
/// assert!(double.source().contains("x * 2"));
/// ```
#[macro_export]
macro_rules! computation {
    ($func:expr $(,)?) => {
        $crate::Computation::new(stringify!($func), $func)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_source() {
        let c = Computation::new("square", |x: i64| x * x);
        assert_eq!(c.source(), "square");
        assert_eq!((c.func())(4), 16);
    }

    #[test]
    fn test_macro_uses_tokens_as_source() {
        let a = computation!(|x: i64| x + 1);
        let b = computation!(|x: i64| x + 1);
        assert_eq!(a.source(), b.source());
        assert!(a.source().contains("x + 1"));
    }
}
