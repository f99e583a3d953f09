use async_trait::async_trait;
use salvo_script::payload::EmailPayload;
use salvo_script::{Action, ActionType};
use salvo_types::{ActionOutcome, Result};

use crate::handler::{ActionHandler, HandlerContext};

pub struct EmailHandler;

#[async_trait]
impl ActionHandler for EmailHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let email: EmailPayload = super::payload(action, self.action_type())?;
        let to = email.message.to.joined();

        if ctx.dry_run {
            tracing::info!(action = %action.name, to = %to, subject = %email.message.subject, "Dry run, email not sent");
            return Ok(ActionOutcome::NoData);
        }

        tracing::info!(action = %action.name, to = %to, "Sending email");
        ctx.mailer.send(&email).await?;
        Ok(ActionOutcome::NoData)
    }
}
