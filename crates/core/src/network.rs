//! Network seam the interceptor fetches through.

use async_trait::async_trait;

use crate::{Error, InterceptedRequest, Response};

/// Performs the outbound fetch for an intercepted request.
///
/// Only a rejected fetch is an error. A response with an HTTP error status
/// is still a successful fetch and must be returned as `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, Error>;
}
