//! Built-in action handlers, one per action type.

mod email;
mod files;
mod http;
mod shell;
mod store;

pub use email::EmailHandler;
pub use files::{ReplaceTextHandler, UpdateFileHandler, WriteFileHandler};
pub use http::HttpHandler;
pub use shell::ShellHandler;
pub use store::SetVariableHandler;

use async_trait::async_trait;
use salvo_script::payload::{decode, PrintPayload};
use salvo_script::{Action, ActionType};
use salvo_types::value::display_string;
use salvo_types::{ActionOutcome, Result, SalvoError};

use crate::handler::{ActionHandler, HandlerContext};

/// Decode a rendered action's `values` into its payload type.
pub(crate) fn payload<T: serde::de::DeserializeOwned>(action: &Action, kind: ActionType) -> Result<T> {
    decode(&action.values).map_err(|e| SalvoError::capability(kind.as_str(), format!("invalid values: {}", e)))
}

// ---------------------------------------------------------------------------
// PrintHandler: writes a message to stdout
// ---------------------------------------------------------------------------

pub struct PrintHandler;

#[async_trait]
impl ActionHandler for PrintHandler {
    fn action_type(&self) -> ActionType {
        ActionType::PrintMessage
    }

    async fn execute(&self, action: &Action, _ctx: &HandlerContext) -> Result<ActionOutcome> {
        let message: PrintPayload = payload(action, self.action_type())?;
        println!("{}", display_string(&message.text));
        Ok(ActionOutcome::NoData)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use salvo_capabilities::{HttpClient, LocalExecutionEnvironment, MailTransport};
    use salvo_script::payload::EmailPayload;
    use salvo_script::Action;
    use salvo_types::{Result, Store};
    use serde_json::Value;

    use crate::handler::HandlerContext;

    /// Records every email instead of sending it.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<EmailPayload>>,
    }

    #[async_trait]
    impl MailTransport for RecordingMailer {
        async fn send(&self, payload: &EmailPayload) -> Result<()> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(payload.clone());
            }
            Ok(())
        }
    }

    pub fn context(dir: &Path, mailer: Arc<RecordingMailer>) -> HandlerContext {
        HandlerContext {
            store: Store::new(),
            env: Arc::new(LocalExecutionEnvironment::new(dir)),
            http: HttpClient::new(),
            mailer,
            timeout: Duration::from_secs(5),
            dry_run: false,
        }
    }

    pub fn action(action_type: &str, values: Value) -> Action {
        serde_json::from_value(serde_json::json!({
            "name": "test",
            "type": action_type,
            "values": values
        }))
        .unwrap()
    }
}
