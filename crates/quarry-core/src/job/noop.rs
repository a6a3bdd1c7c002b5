use async_trait::async_trait;

use super::{Job, JobResult};
use crate::clients::Clients;
use crate::context::SearchContext;
use crate::streaming::SharedSender;

/// Emits nothing and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

#[async_trait]
impl Job for Noop {
    async fn run(&self, _ctx: &SearchContext, _clients: &Clients, _stream: &SharedSender) -> JobResult {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Noop"
    }
}
