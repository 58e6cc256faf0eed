//! gRPC server module for the rate limit check service.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;

// Include the generated protobuf code
pub mod proto {
    pub mod floodgate {
        pub mod v1 {
            tonic::include_proto!("floodgate.v1");
        }
    }
}

// Re-export commonly used types
pub use proto::floodgate::v1::{
    rate_limit_server::RateLimitServer,
    CheckRequest, CheckResponse,
};
