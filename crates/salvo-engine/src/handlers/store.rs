use async_trait::async_trait;
use salvo_script::payload::{SetOp, SetVarPayload};
use salvo_script::{Action, ActionType};
use salvo_types::value::{loose_number, number_value};
use salvo_types::{ActionOutcome, Result, SalvoError};
use serde_json::Value;

use crate::handler::{ActionHandler, HandlerContext};

/// Writes straight into the store. Runs even in dry-run mode.
pub struct SetVariableHandler;

#[async_trait]
impl ActionHandler for SetVariableHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SetStoreVariable
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let set: SetVarPayload = super::payload(action, self.action_type())?;
        if set.target.trim().is_empty() {
            return Err(SalvoError::capability(self.action_type().as_str(), "empty target"));
        }

        match set.action {
            SetOp::Replace => ctx.store.set(set.target.clone(), set.data).await,
            SetOp::Append => {
                ctx.store.append(&set.target, set.data).await;
            }
            SetOp::Increment => {
                let next = ctx.store.increment(&set.target, &increment_by(set.data)).await;
                tracing::debug!(target = %set.target, value = %next, "Incremented");
            }
        }
        Ok(ActionOutcome::NoData)
    }
}

/// Rendered templates are always text, so a numeric string steps as a number.
fn increment_by(data: Value) -> Value {
    let numeric = match &data {
        Value::String(s) if !s.trim().is_empty() => loose_number(&data),
        _ => None,
    };
    numeric.map(number_value).unwrap_or(data)
}
