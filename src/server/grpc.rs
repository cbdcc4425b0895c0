//! tonic binding for the shard service.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info};

use crate::error::Result;
use crate::server::dispatcher::ShardService;
use crate::server::proto::cf_service_server::{CfService, CfServiceServer};
use crate::server::proto::{CfRequest, CfResponse};

/// gRPC front of a [`ShardService`].
#[derive(Clone)]
pub struct CfGrpcService {
    service: Arc<ShardService>,
}

impl CfGrpcService {
    pub fn new(service: Arc<ShardService>) -> Self {
        Self { service }
    }

    pub fn into_server(self) -> CfServiceServer<Self> {
        CfServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl CfService for CfGrpcService {
    async fn cf(&self, request: Request<CfRequest>) -> std::result::Result<Response<CfResponse>, Status> {
        let service = Arc::clone(&self.service);
        let request = request.into_inner();
        let request_id = request.request_id;

        // The pipeline busy-waits, so it runs on the blocking pool rather
        // than on an async worker.
        tokio::task::spawn_blocking(move || service.handle(request))
            .await
            .map(Response::new)
            .map_err(|e| {
                error!("Request #{} aborted: {}", request_id, e);
                Status::internal(format!("request {} aborted", request_id))
            })
    }
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// In-flight requests run to completion before this returns.
pub async fn serve<F>(listener: TcpListener, service: Arc<ShardService>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    info!("Shard listening on {}", local);

    Server::builder()
        .add_service(CfGrpcService::new(service).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    info!("Shard on {} stopped", local);
    Ok(())
}
