use async_trait::async_trait;
use salvo_script::payload::ShellPayload;
use salvo_script::{Action, ActionType};
use salvo_types::{ActionOutcome, Result};
use serde_json::Value;

use crate::handler::{ActionHandler, HandlerContext};

// ---------------------------------------------------------------------------
// ShellHandler: runs a command through `sh -c` and captures stdout
// ---------------------------------------------------------------------------

pub struct ShellHandler;

#[async_trait]
impl ActionHandler for ShellHandler {
    fn action_type(&self) -> ActionType {
        ActionType::InvokeShellCommand
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let shell: ShellPayload = super::payload(action, self.action_type())?;
        let command = shell.command_line();
        if command.trim().is_empty() {
            return Ok(ActionOutcome::failed("empty command"));
        }

        if ctx.dry_run {
            tracing::info!(action = %action.name, command = %command, "Dry run, command not executed");
            return Ok(ActionOutcome::NoData);
        }

        tracing::info!(action = %action.name, command = %command, "Executing shell command");
        let result = ctx
            .env
            .exec_command(&command, ctx.timeout.as_millis() as u64, None, None)
            .await?;

        if result.timed_out {
            tracing::warn!(action = %action.name, timeout_ms = ctx.timeout.as_millis() as u64, "Shell command timed out");
            return Ok(ActionOutcome::failed(format!(
                "command timed out after {}ms",
                ctx.timeout.as_millis()
            )));
        }
        if !result.success() {
            tracing::warn!(
                action = %action.name,
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "Shell command failed"
            );
            return Ok(ActionOutcome::failed(format!(
                "exit code {}: {}",
                result.exit_code,
                result.stderr.trim()
            )));
        }

        tracing::debug!(action = %action.name, duration_ms = result.duration_ms, "Shell command finished");
        Ok(ActionOutcome::data(Value::String(result.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn stdout_becomes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::default());
        let outcome = ShellHandler
            .execute(
                &action("invoke-shell-command", json!({"text": "echo", "arguments": [{"key": "hi"}]})),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::data(json!("hi\n")));
    }

    #[tokio::test]
    async fn nonzero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::default());
        let outcome = ShellHandler
            .execute(&action("terminal", json!({"text": "echo bad >&2; exit 4"})), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::failed("exit code 4: bad"));
    }

    #[tokio::test]
    async fn timeout_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), Arc::default());
        ctx.timeout = Duration::from_millis(100);
        let outcome = ShellHandler
            .execute(&action("terminal", json!({"text": "sleep 30"})), &ctx)
            .await
            .unwrap();
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn dry_run_skips_execution() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), Arc::default());
        ctx.dry_run = true;
        let outcome = ShellHandler
            .execute(&action("terminal", json!({"text": "touch made.txt"})), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::NoData);
        assert!(!dir.path().join("made.txt").exists());
    }
}
