use example_grpcweb_service_definition::{Sum, SumRequest, SumResponse};
use futures::{StreamExt, stream};
use grpcweb_tokio_client::{
    CallOptions, Channel, ClientStreamingCall, FetchTransport, WebsocketTransport,
};
use grpcweb_tokio_server::utils::bind_tcp_listener_on_random_port;
use grpcweb_tokio_server::{GrpcWebServer, ServerError};
use std::io;
use std::sync::Arc;
use tokio::join;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Bind to a random available port
    let (listener, port) = bind_tcp_listener_on_random_port().await.unwrap();

    {
        let server = GrpcWebServer::new();

        server
            .register_client_streaming::<Sum, _, _>(|mut requests, ctx| async move {
                let mut response = SumResponse {
                    total: 0.0,
                    count: 0,
                };
                while let Some(request) = requests.next().await {
                    response.total += request?.value;
                    response.count += 1;
                }

                ctx.set_trailer("x-sum-count", response.count.to_string());
                Ok::<_, ServerError>(response)
            })
            .await
            .unwrap();

        // Spawn the server using the pre-bound listener
        let _server_task = tokio::spawn(async move {
            let _ = Arc::new(server).serve_with_listener(listener).await;
        });
    }

    {
        let address = format!("http://127.0.0.1:{port}");
        let websocket = Channel::new(address.clone(), WebsocketTransport::new());
        let fetch = Channel::new(address, FetchTransport::new());

        let numbers = |values: Vec<f64>| {
            stream::iter(values.into_iter().map(|value| Ok::<_, io::Error>(SumRequest { value })))
        };

        // `join!` will await all responses before proceeding
        let (res1, res2, res3) = join!(
            Sum::call(&websocket, numbers(vec![1.0, 2.0, 3.0]), CallOptions::new()),
            Sum::call(&websocket, numbers(vec![8.0, 3.0, 7.0]), CallOptions::new()),
            Sum::call(
                &fetch,
                numbers(vec![1.5, 2.5, 8.5]),
                CallOptions::new().on_trailer(|trailer| {
                    tracing::info!("fetch trailer: {:?}", trailer);
                }),
            ),
        );

        println!("Result from first websocket sum(): {:?}", res1);
        println!("Result from second websocket sum(): {:?}", res2);
        println!("Result from fetch sum(): {:?}", res3);
    }
}
