//! # Application State
//!
//! Shared state handed to every route through the `State` extractor. All
//! members are cheap to clone: the store and credentials share their data
//! through `Arc`, and the policy is immutable after load.

use std::sync::Arc;

use sar_policy::{LoadedAuthorization, PolicySet};
use sar_store::ArtefactStore;

use crate::auth::Credentials;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: ArtefactStore,
    pub policy: Arc<PolicySet>,
    pub credentials: Credentials,
}

impl AppState {
    pub fn new(store: ArtefactStore, authorization: LoadedAuthorization) -> Self {
        Self {
            store,
            policy: Arc::new(authorization.policy),
            credentials: Credentials::new(authorization.credentials),
        }
    }

    /// State with authorization disabled and no known principals.
    pub fn open(store: ArtefactStore) -> Self {
        Self {
            store,
            policy: Arc::new(PolicySet::disabled()),
            credentials: Credentials::default(),
        }
    }
}
