use std::path::Path;

use async_trait::async_trait;
use salvo_capabilities::documents::{edit_json, edit_xml, replace_text};
use salvo_script::payload::{FileKind, ReplaceTextPayload, UpdateFilePayload, WriteFilePayload};
use salvo_script::{Action, ActionType};
use salvo_types::value::display_string;
use salvo_types::{ActionOutcome, Result, SalvoError};

use crate::handler::{ActionHandler, HandlerContext};

// ---------------------------------------------------------------------------
// WriteFileHandler
// ---------------------------------------------------------------------------

pub struct WriteFileHandler;

#[async_trait]
impl ActionHandler for WriteFileHandler {
    fn action_type(&self) -> ActionType {
        ActionType::WriteFile
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let file: WriteFilePayload = super::payload(action, self.action_type())?;
        let content = if file.serialize_as_json() {
            serde_json::to_string_pretty(&file.data)?
        } else {
            display_string(&file.data)
        };

        if ctx.dry_run {
            tracing::info!(action = %action.name, path = %file.file_location, bytes = content.len(), "Dry run, file not written");
            return Ok(ActionOutcome::NoData);
        }

        ctx.env
            .write_file(Path::new(&file.file_location), &content)
            .await?;
        tracing::info!(action = %action.name, path = %file.file_location, "Wrote file");
        Ok(ActionOutcome::NoData)
    }
}

// ---------------------------------------------------------------------------
// UpdateFileHandler: read-modify-write for text, JSON and XML
// ---------------------------------------------------------------------------

pub struct UpdateFileHandler;

#[async_trait]
impl ActionHandler for UpdateFileHandler {
    fn action_type(&self) -> ActionType {
        ActionType::ReadModifyWriteFile
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let file: UpdateFilePayload = super::payload(action, self.action_type())?;
        let path = Path::new(&file.file_location);

        if ctx.dry_run {
            tracing::info!(action = %action.name, path = %file.file_location, kind = ?file.file_type, "Dry run, file not updated");
            return Ok(ActionOutcome::NoData);
        }

        match file.file_type {
            FileKind::Text => {
                let text = display_string(&file.data);
                if file.append() {
                    ctx.env.append_file(path, &text).await?;
                } else {
                    ctx.env.write_file(path, &text).await?;
                }
            }
            kind => {
                let edits = file
                    .edits()
                    .map_err(|e| SalvoError::capability(self.action_type().as_str(), e))?;
                let original = ctx.env.read_file(path).await?;
                let updated = match kind {
                    FileKind::Json => edit_json(&original, &edits)?,
                    _ => edit_xml(&original, &edits)?,
                };
                ctx.env.write_file(path, &updated).await?;
            }
        }
        tracing::info!(action = %action.name, path = %file.file_location, kind = ?file.file_type, "Updated file");
        Ok(ActionOutcome::NoData)
    }
}

// ---------------------------------------------------------------------------
// ReplaceTextHandler
// ---------------------------------------------------------------------------

pub struct ReplaceTextHandler;

#[async_trait]
impl ActionHandler for ReplaceTextHandler {
    fn action_type(&self) -> ActionType {
        ActionType::ReplaceTextInFile
    }

    async fn execute(&self, action: &Action, ctx: &HandlerContext) -> Result<ActionOutcome> {
        let file: ReplaceTextPayload = super::payload(action, self.action_type())?;
        let path = Path::new(&file.file_location);

        if ctx.dry_run {
            tracing::info!(action = %action.name, path = %file.file_location, replacements = file.replacements.len(), "Dry run, text not replaced");
            return Ok(ActionOutcome::NoData);
        }

        let original = ctx.env.read_file(path).await?;
        let updated = replace_text(&original, &file.replacements)?;
        ctx.env.write_file(path, &updated).await?;
        tracing::info!(action = %action.name, path = %file.file_location, "Replaced text");
        Ok(ActionOutcome::NoData)
    }
}
