//! Rate limit service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::proto::floodgate::v1::{rate_limit_server::RateLimit, CheckRequest, CheckResponse};
use crate::ratelimit::RateLimiter;

/// Implementation of the RateLimit gRPC interface.
pub struct RateLimitServiceImpl {
    /// The rate limiter instance
    limiter: Arc<RateLimiter>,
}

impl RateLimitServiceImpl {
    /// Create a new RateLimitServiceImpl with the given rate limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[tonic::async_trait]
impl RateLimit for RateLimitServiceImpl {
    /// Decide whether a request from an identity is within its budget.
    ///
    /// The caller derives the identity (client address or principal) and
    /// names a configured policy; a denied verdict carries the time until
    /// the window resets so the caller can render retry guidance.
    #[instrument(
        skip(self, request),
        fields(
            policy = %request.get_ref().policy,
            identity = %request.get_ref().identity
        )
    )]
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let req = request.into_inner();

        debug!(
            policy = %req.policy,
            identity = %req.identity,
            "Processing rate limit check"
        );

        // Validate the request
        if req.policy.is_empty() {
            warn!("Received rate limit check with empty policy");
            return Err(Status::invalid_argument("policy is required"));
        }

        if req.identity.is_empty() {
            warn!("Received rate limit check with empty identity");
            return Err(Status::invalid_argument("identity is required"));
        }

        let Some(policy) = self.limiter.policy(&req.policy) else {
            warn!(policy = %req.policy, "Received check for unknown policy");
            return Err(Status::not_found(format!("unknown policy: {}", req.policy)));
        };

        let decision = self.limiter.check_policy(&req.policy, policy, &req.identity);

        let response = CheckResponse {
            allowed: decision.allowed,
            remaining: decision.remaining,
            retry_after: Some(prost_types::Duration {
                seconds: decision.retry_after.as_secs() as i64,
                nanos: decision.retry_after.subsec_nanos() as i32,
            }),
            limit: policy.max_requests(),
        };

        info!(
            policy = %req.policy,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Rate limit decision made"
        );

        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimiterConfig;
    use crate::ratelimit::PolicyTable;

    fn test_service() -> RateLimitServiceImpl {
        let table =
            PolicyTable::from_yaml("login: { max_requests: 5, window_ms: 60000 }").unwrap();
        let limiter = Arc::new(RateLimiter::new(table, LimiterConfig::default()));
        RateLimitServiceImpl::new(limiter)
    }

    fn check_request(policy: &str, identity: &str) -> Request<CheckRequest> {
        Request::new(CheckRequest {
            policy: policy.to_string(),
            identity: identity.to_string(),
        })
    }

    #[tokio::test]
    async fn test_empty_policy_rejected() {
        let service = test_service();

        let result = service.check(check_request("", "1.2.3.4")).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let service = test_service();

        let result = service.check(check_request("login", "")).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unknown_policy_not_found() {
        let service = test_service();

        let result = service.check(check_request("signup", "1.2.3.4")).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_allowed_request() {
        let service = test_service();

        let response = service
            .check(check_request("login", "1.2.3.4"))
            .await
            .unwrap()
            .into_inner();

        assert!(response.allowed);
        assert_eq!(response.remaining, 4);
        assert_eq!(response.limit, 5);
        assert_eq!(response.retry_after, Some(prost_types::Duration::default()));
    }

    #[tokio::test]
    async fn test_over_limit_request() {
        let service = test_service();

        for _ in 0..5 {
            let response = service
                .check(check_request("login", "1.2.3.4"))
                .await
                .unwrap()
                .into_inner();
            assert!(response.allowed);
        }

        let response = service
            .check(check_request("login", "1.2.3.4"))
            .await
            .unwrap()
            .into_inner();

        assert!(!response.allowed);
        assert_eq!(response.remaining, 0);
        let retry_after = response.retry_after.unwrap();
        assert!(retry_after.seconds > 0 || retry_after.nanos > 0);
    }
}
