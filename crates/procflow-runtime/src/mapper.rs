//! Stateful stream transformers.
//!
//! A [`Mapper`] consumes its inputs serially and may emit any number of
//! outputs per input, in order. Mappers never suspend; the runtime drives
//! each instance from a single task.

use procflow_core::Result;
use std::marker::PhantomData;

/// Stateful transformer from `In` to zero or more `Self::Output`.
pub trait Mapper<In>: Send {
    type Output: Send;

    /// Process one input.
    fn on_next(&mut self, item: In) -> Result<Vec<Self::Output>>;

    /// Called once when the input completes without error.
    fn on_complete(&mut self) -> Result<Vec<Self::Output>> {
        Ok(Vec::new())
    }
}

impl<In, M> Mapper<In> for Box<M>
where
    M: Mapper<In> + ?Sized,
{
    type Output = M::Output;

    fn on_next(&mut self, item: In) -> Result<Vec<Self::Output>> {
        (**self).on_next(item)
    }

    fn on_complete(&mut self) -> Result<Vec<Self::Output>> {
        (**self).on_complete()
    }
}

/// Synchronous composition helpers.
pub trait MapperExt<In>: Mapper<In> + Sized {
    /// Feed every output of `self` into `next`.
    fn then<N>(self, next: N) -> Chain<Self, N>
    where
        N: Mapper<Self::Output>,
    {
        Chain { first: self, second: next }
    }
}

impl<In, M: Mapper<In>> MapperExt<In> for M {}

/// Two mappers run back to back inside one stage.
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<In, A, B> Mapper<In> for Chain<A, B>
where
    A: Mapper<In>,
    B: Mapper<A::Output>,
{
    type Output = B::Output;

    fn on_next(&mut self, item: In) -> Result<Vec<Self::Output>> {
        let mut out = Vec::new();
        for mid in self.first.on_next(item)? {
            out.extend(self.second.on_next(mid)?);
        }
        Ok(out)
    }

    fn on_complete(&mut self) -> Result<Vec<Self::Output>> {
        let mut out = Vec::new();
        for mid in self.first.on_complete()? {
            out.extend(self.second.on_next(mid)?);
        }
        out.extend(self.second.on_complete()?);
        Ok(out)
    }
}

/// Keeps the inputs matching a predicate.
pub struct Filter<T, F> {
    predicate: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> Filter<T, F>
where
    F: FnMut(&T) -> bool,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Mapper<T> for Filter<T, F>
where
    T: Send,
    F: FnMut(&T) -> bool + Send,
{
    type Output = T;

    fn on_next(&mut self, item: T) -> Result<Vec<T>> {
        if (self.predicate)(&item) {
            Ok(vec![item])
        } else {
            Ok(Vec::new())
        }
    }
}

/// One output per input from a plain function.
pub struct MapFn<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, R, F> MapFn<T, F>
where
    F: FnMut(T) -> R,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<T, R, F> Mapper<T> for MapFn<T, F>
where
    R: Send,
    F: FnMut(T) -> R + Send,
{
    type Output = R;

    fn on_next(&mut self, item: T) -> Result<Vec<R>> {
        Ok(vec![(self.f)(item)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::MiningError;

    struct Duplicate;

    impl Mapper<u32> for Duplicate {
        type Output = u32;

        fn on_next(&mut self, item: u32) -> Result<Vec<u32>> {
            Ok(vec![item, item])
        }
    }

    /// Emits the running count on completion.
    struct Counter(u32);

    impl Mapper<u32> for Counter {
        type Output = u32;

        fn on_next(&mut self, _item: u32) -> Result<Vec<u32>> {
            self.0 += 1;
            Ok(Vec::new())
        }

        fn on_complete(&mut self) -> Result<Vec<u32>> {
            Ok(vec![self.0])
        }
    }

    #[test]
    fn test_filter() {
        let mut even = Filter::new(|x: &u32| x % 2 == 0);
        assert_eq!(even.on_next(4).unwrap(), vec![4]);
        assert!(even.on_next(5).unwrap().is_empty());
    }

    #[test]
    fn test_map_fn() {
        let mut double = MapFn::new(|x: u32| x * 2);
        assert_eq!(double.on_next(21).unwrap(), vec![42]);
    }

    #[test]
    fn test_chain_preserves_order() {
        let mut chain = Duplicate.then(MapFn::new(|x: u32| x + 1));
        assert_eq!(chain.on_next(1).unwrap(), vec![2, 2]);
        assert_eq!(chain.on_next(5).unwrap(), vec![6, 6]);
    }

    #[test]
    fn test_chain_completes_both_stages() {
        let mut chain = Duplicate.then(Counter(0));
        chain.on_next(1).unwrap();
        chain.on_next(2).unwrap();
        assert_eq!(chain.on_complete().unwrap(), vec![4]);
    }

    #[test]
    fn test_boxed_mapper() {
        let mut boxed: Box<dyn Mapper<u32, Output = u32>> = Box::new(Duplicate);
        assert_eq!(boxed.on_next(3).unwrap(), vec![3, 3]);
    }

    #[test]
    fn test_error_propagates_through_chain() {
        struct Fails;
        impl Mapper<u32> for Fails {
            type Output = u32;
            fn on_next(&mut self, _item: u32) -> Result<Vec<u32>> {
                Err(MiningError::input("bad"))
            }
        }
        let mut chain = Duplicate.then(Fails);
        assert!(chain.on_next(1).is_err());
    }
}
