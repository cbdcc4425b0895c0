//! Serves the shard on an ephemeral port and calls it over a real channel.

use std::sync::Arc;

use cf_shard_server::model::FactorizedModel;
use cf_shard_server::reliability::GracefulShutdown;
use cf_shard_server::server::proto::cf_service_client::CfServiceClient;
use cf_shard_server::server::proto::{CfRequest, ErrorKind, UtilRequest};
use cf_shard_server::server::{serve, DispersionDelay, ShardService};
use cf_shard_server::telemetry::ProcStatSampler;
use futures::future::join_all;
use tokio::net::TcpListener;

fn shard() -> Arc<ShardService> {
    let model =
        FactorizedModel::from_factors(3, 2, 1, vec![1.0, 2.0, 3.0], vec![0.5, 2.0]).unwrap();
    Arc::new(ShardService::new(
        Arc::new(model),
        Arc::new(ProcStatSampler::default()),
        DispersionDelay::new(500),
    ))
}

fn rating(id: u64, user: i64, item: i64) -> CfRequest {
    CfRequest {
        request_id: id,
        user_id: Some(user),
        item_id: Some(item),
        util_request: Some(UtilRequest { util_request: false }),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_calls_over_grpc() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = shard();
    let stats = Arc::clone(service.stats());

    let shutdown = GracefulShutdown::new();
    let server = tokio::spawn(serve(listener, service, shutdown.wait()));

    let client = CfServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap();

    let calls = (0..24u64).map(|id| {
        let mut client = client.clone();
        async move {
            let user = (id % 3) as i64;
            let response = client.cf(rating(id, user, 0)).await.unwrap().into_inner();
            (id, user, response)
        }
    });

    for (id, user, response) in join_all(calls).await {
        assert_eq!(response.request_id, id);
        assert_eq!(response.rating, Some((user + 1) as f32 * 0.5));
        assert!(response.timing_data_in_micro.is_some());
    }

    shutdown.shutdown();
    server.await.unwrap().unwrap();
    assert_eq!(stats.total_requests(), 24);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn application_errors_keep_transport_ok() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = GracefulShutdown::new();
    let server = tokio::spawn(serve(listener, shard(), shutdown.wait()));

    let mut client = CfServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap();

    let response = client.cf(rating(99, 5, 0)).await.unwrap().into_inner();
    assert_eq!(response.request_id, 99);
    assert_eq!(response.rating, None);
    assert_eq!(response.error.unwrap().kind, ErrorKind::UnknownEntity as i32);

    let response = client
        .cf(CfRequest {
            request_id: 100,
            user_id: None,
            item_id: Some(0),
            util_request: None,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.request_id, 100);
    assert_eq!(response.error.unwrap().kind, ErrorKind::MalformedRequest as i32);

    shutdown.shutdown();
    server.await.unwrap().unwrap();
}
