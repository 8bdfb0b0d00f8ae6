use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::CoreResult;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub role: String,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a bearer credential to the caller it was issued to.
    async fn resolve(&self, credential: &str) -> CoreResult<CurrentUser>;
}
