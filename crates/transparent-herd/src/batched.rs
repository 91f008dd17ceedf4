use core::future::Future;

/// An asynchronous operation that processes many argument sets in one
/// invocation.
///
/// Given `N` argument sets, a well-behaved implementation resolves to `N`
/// element futures, where element `i` produces the result for argument set
/// `i`. Elements settle independently of one another. The operation may also
/// fail outright, in which case every call of the batch receives that error.
///
/// Any `Fn(Vec<A>) -> Fut` closure with the right shape implements this trait,
/// so most users never implement it by hand:
///
/// ```
/// use futures::future::{Ready, ready};
///
/// let double = |args: Vec<u32>| async move {
///     Ok::<_, String>(
///         args.into_iter()
///             .map(|n| ready(Ok(n * 2)))
///             .collect::<Vec<Ready<Result<u32, String>>>>(),
///     )
/// };
/// # fn assert_batched<F: transparent_herd::BatchedFn<u32>>(_: &F) {}
/// # assert_batched(&double);
/// ```
pub trait BatchedFn<A>: Send + Sync + 'static {
    /// The value one call resolves with.
    type Output: Send + 'static;
    /// The error of the whole operation and of individual elements.
    type Error: Clone + Send + 'static;
    /// The per-call result handle.
    type Element: Future<Output = Result<Self::Output, Self::Error>> + Send + 'static;

    /// Invokes the operation with argument sets in submission order.
    fn call(
        &self,
        args: Vec<A>,
    ) -> impl Future<Output = Result<Vec<Self::Element>, Self::Error>> + Send;
}

impl<A, F, Fut, El, T, E> BatchedFn<A> for F
where
    F: Fn(Vec<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<El>, E>> + Send,
    El: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Error = E;
    type Element = El;

    fn call(&self, args: Vec<A>) -> impl Future<Output = Result<Vec<El>, E>> + Send {
        self(args)
    }
}
