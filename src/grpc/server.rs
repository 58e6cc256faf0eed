//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::floodgate::v1::rate_limit_server::RateLimitServer;
use super::service::RateLimitServiceImpl;
use crate::error::{FloodgateError, Result};
use crate::ratelimit::RateLimiter;

/// gRPC server for the rate limit service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    limiter: Arc<RateLimiter>,
}

impl GrpcServer {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, limiter: Arc<RateLimiter>) -> Self {
        Self { addr, limiter }
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let service = RateLimitServiceImpl::new(self.limiter);

        info!(
            addr = %self.addr,
            "Starting gRPC server for RateLimit service"
        );

        Server::builder()
            .add_service(RateLimitServer::new(service))
            .serve(self.addr)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                FloodgateError::Grpc(e)
            })
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let service = RateLimitServiceImpl::new(self.limiter);

        info!(
            addr = %self.addr,
            "Starting gRPC server for RateLimit service with graceful shutdown"
        );

        Server::builder()
            .add_service(RateLimitServer::new(service))
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                FloodgateError::Grpc(e)
            })
    }
}
