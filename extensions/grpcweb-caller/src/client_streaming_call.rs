use crate::call_options::CallOptions;
use crate::channel::Channel;
use crate::error::CallError;
use futures::Stream;
use grpcweb::ClientStreamingMethod;

/// Trait for types that represent callable client-streaming methods.
///
/// This trait forms the final layer of abstraction, allowing downstream
/// users to write `M::call(&channel, requests, options)` without dealing with
/// the driver or transport explicitly. It is implemented for every
/// [`ClientStreamingMethod`].
#[async_trait::async_trait]
pub trait ClientStreamingCall: ClientStreamingMethod + Sized + Send + Sync {
    async fn call<S, E>(
        channel: &Channel,
        requests: S,
        options: CallOptions,
    ) -> Result<Self::Response, CallError<E>>
    where
        S: Stream<Item = Result<Self::Request, E>> + Send + 'static,
        E: Send + 'static;
}

#[async_trait::async_trait]
impl<M> ClientStreamingCall for M
where
    M: ClientStreamingMethod + Sized + Send + Sync,
    M::Request: Send + 'static,
    M::Response: Send + 'static,
{
    async fn call<S, E>(
        channel: &Channel,
        requests: S,
        options: CallOptions,
    ) -> Result<Self::Response, CallError<E>>
    where
        S: Stream<Item = Result<Self::Request, E>> + Send + 'static,
        E: Send + 'static,
    {
        channel.client_streaming::<M, S, E>(requests, options).await
    }
}
