//! MCP Tools Implementation
//!
//! Curriculum search plus the worksheet history tools.

use crate::RagError;
use crate::database::{NewWorksheet, WorksheetHistory};
use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::retrieval::{self, RetrievalTool};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

pub const SAVE_WORKSHEET: &str = "save_worksheet";
pub const LIST_WORKSHEETS: &str = "list_worksheets";

const DEFAULT_LIST_LIMIT: u32 = 10;
const MAX_LIST_LIMIT: u32 = 100;

fn required_string(
    tool: &str,
    args: &HashMap<String, Value>,
    key: &str,
) -> McpResult<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| McpError::InvalidToolParameters {
            tool: tool.to_string(),
            message: format!("Missing required parameter: {}", key),
        })
}

/// String argument or empty, so the caller can report every missing field at once
fn string_or_empty(args: &HashMap<String, Value>, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Curriculum search tool handler
pub struct CurriculumSearchHandler {
    retrieval: Arc<RetrievalTool>,
}

impl CurriculumSearchHandler {
    #[inline]
    pub fn new(retrieval: Arc<RetrievalTool>) -> Self {
        Self { retrieval }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: retrieval::NAME.to_string(),
            description: Some(retrieval::DESCRIPTION.to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Topic or question to look up in the curricula"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for CurriculumSearchHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = required_string(retrieval::NAME, &args, "query")?;

        debug!("Searching curricula: query='{}'", query);

        let result = self.retrieval.search(&query).await;
        let is_error = result.as_ref().err().is_some_and(|e| e.is_failure());
        Ok(CallToolResult::text(retrieval::render(&result), is_error))
    }
}

/// Saves a generated worksheet to the history
pub struct SaveWorksheetHandler {
    history: Arc<WorksheetHistory>,
}

impl SaveWorksheetHandler {
    #[inline]
    pub fn new(history: Arc<WorksheetHistory>) -> Self {
        Self { history }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: SAVE_WORKSHEET.to_string(),
            description: Some(
                "Save a generated worksheet (topic, subject, student profile and content) to the history"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "description": "Worksheet topic" },
                    "subject": { "type": "string", "description": "School subject, e.g. History" },
                    "student_profile": {
                        "type": "string",
                        "description": "Who the worksheet is for"
                    },
                    "content": { "type": "string", "description": "Generated worksheet text" }
                },
                "required": ["topic", "subject", "student_profile", "content"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SaveWorksheetHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let worksheet = NewWorksheet {
            topic: string_or_empty(&args, "topic"),
            subject: string_or_empty(&args, "subject"),
            student_profile: string_or_empty(&args, "student_profile"),
            content: string_or_empty(&args, "content"),
        };

        match self.history.record(&worksheet).await {
            Ok(saved) => {
                let response = json!({
                    "status": "saved",
                    "id": saved.id,
                    "created_at": saved.created_at.to_rfc3339(),
                });
                Ok(CallToolResult::text(
                    serde_json::to_string_pretty(&response)?,
                    false,
                ))
            }
            Err(RagError::History(message)) => Ok(CallToolResult::text(message, true)),
            Err(e) => {
                error!("Error saving worksheet: {}", e);
                Ok(CallToolResult::text(
                    format!("Error saving worksheet: {}. Generated content:\n{}", e, worksheet.content),
                    true,
                ))
            }
        }
    }
}

/// Lists recently saved worksheets
pub struct ListWorksheetsHandler {
    history: Arc<WorksheetHistory>,
}

impl ListWorksheetsHandler {
    #[inline]
    pub fn new(history: Arc<WorksheetHistory>) -> Self {
        Self { history }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: LIST_WORKSHEETS.to_string(),
            description: Some("List the most recently saved worksheets".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of worksheets (default: 10)"
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListWorksheetsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LIST_LIMIT, |l| {
                u32::try_from(l).unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
            });

        debug!("Listing worksheets, limit={}", limit);

        match self.history.list_recent(limit).await {
            Ok(worksheets) => {
                let response = json!({ "worksheets": worksheets });
                Ok(CallToolResult::text(
                    serde_json::to_string_pretty(&response)?,
                    false,
                ))
            }
            Err(e) => {
                error!("Error listing worksheets: {:#}", e);
                Ok(CallToolResult::text(
                    format!("Error listing worksheets: {:#}", e),
                    true,
                ))
            }
        }
    }
}

/// Register every curriculum tool on `server`
#[inline]
pub async fn register_curriculum_tools(
    server: &McpServer,
    retrieval: Arc<RetrievalTool>,
    history: Arc<WorksheetHistory>,
) {
    server
        .register_tool(
            CurriculumSearchHandler::tool_definition(),
            CurriculumSearchHandler::new(retrieval),
        )
        .await;
    server
        .register_tool(
            SaveWorksheetHandler::tool_definition(),
            SaveWorksheetHandler::new(Arc::clone(&history)),
        )
        .await;
    server
        .register_tool(
            ListWorksheetsHandler::tool_definition(),
            ListWorksheetsHandler::new(history),
        )
        .await;
}
