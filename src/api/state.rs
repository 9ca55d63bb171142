use std::sync::Arc;

use crate::config::TransferConfig;
use crate::scheduler::TransferScheduler;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<TransferScheduler>,
    pub transfer: TransferConfig,
    pub client: reqwest::Client,
}
