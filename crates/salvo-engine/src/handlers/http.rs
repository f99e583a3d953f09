use async_trait::async_trait;
use salvo_script::payload::HttpPayload;
use salvo_script::{Action, ActionType};
use salvo_types::{ActionOutcome, Result};

use crate::handler::{ActionHandler, HandlerContext};

/// Calls an HTTP endpoint. The parsed body is the capture payload; status and
/// headers travel alongside as transport metadata.
pub struct HttpHandler;

#[async_trait]
impl ActionHandler for HttpHandler {
    fn action_type(&self) -> ActionType {
        ActionType::InvokeHttpCall
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let request: HttpPayload = super::payload(action, self.action_type())?;

        if ctx.dry_run {
            tracing::info!(
                action = %action.name,
                method = %request.method,
                target = %request.target,
                "Dry run, request not sent"
            );
            return Ok(ActionOutcome::NoData);
        }

        tracing::info!(action = %action.name, method = %request.method, target = %request.target, "Invoking HTTP call");
        let response = ctx
            .http
            .call(&request, ctx.env.working_directory(), ctx.timeout)
            .await?;
        let transport = response.transport();
        Ok(ActionOutcome::with_transport(response.body, transport))
    }
}
