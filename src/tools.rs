//! Tool definitions exposing the toolkit to an LLM agent
//!
//! Each tool takes JSON arguments and answers with the matching documents as
//! a JSON array. Failures come back as `Err`, never as an empty array.

use crate::error::{Result, RoamerError};
use crate::toolkit::{DestinationQuery, RetrievalToolkit};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DESTINATION_TOOL: &str = "destination_retriever";
pub const EXPERIENCE_TOOL: &str = "experience_retriever";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: DESTINATION_TOOL.to_string(),
            description: "Search for destinations. Pass a natural-language `query` describing the desired destination, or `destination_ids` to fetch specific destinations. Exactly one of the two is required.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language description of the desired destination"
                    },
                    "destination_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Destination IDs to retrieve directly"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of results for a query search",
                        "default": 3,
                        "minimum": 1
                    }
                },
                "required": []
            }),
        },
        Tool {
            name: EXPERIENCE_TOOL.to_string(),
            description: "Search for experiences matching the traveller's preferences, optionally only within one destination.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language description of the desired experiences"
                    },
                    "destination_id": {
                        "type": "string",
                        "description": "Only consider experiences of this destination (optional)"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of results to return",
                        "default": 7,
                        "minimum": 1
                    }
                },
                "required": ["query"]
            }),
        },
    ]
}

/// Run `name` with `arguments` and return the documents as pretty JSON.
pub async fn execute_tool(toolkit: &RetrievalToolkit, name: &str, arguments: Value) -> Result<String> {
    let documents = match name {
        DESTINATION_TOOL => destination_retriever(toolkit, &arguments).await?,
        EXPERIENCE_TOOL => experience_retriever(toolkit, &arguments).await?,
        _ => return Err(RoamerError::invalid_call(format!("Unknown tool: {}", name))),
    };
    Ok(serde_json::to_string_pretty(&documents)?)
}

async fn destination_retriever(
    toolkit: &RetrievalToolkit,
    args: &Value,
) -> Result<Vec<crate::index::Document>> {
    let query = optional_str(args, "query")?;
    let ids = match args.get("destination_ids") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        RoamerError::invalid_call("'destination_ids' must contain strings")
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => {
            return Err(RoamerError::invalid_call("'destination_ids' must be an array"));
        }
    };
    let top_k = optional_top_k(args)?.unwrap_or(toolkit.destination_top_k());

    let query = DestinationQuery::from_parts(query, ids, Some(top_k))?;
    toolkit.search_destinations(query).await
}

async fn experience_retriever(
    toolkit: &RetrievalToolkit,
    args: &Value,
) -> Result<Vec<crate::index::Document>> {
    let query = optional_str(args, "query")?
        .ok_or_else(|| RoamerError::invalid_call("Missing 'query' argument"))?;
    let destination_id = optional_str(args, "destination_id")?;
    let top_k = optional_top_k(args)?;

    toolkit
        .search_experiences(&query, destination_id.as_deref(), top_k)
        .await
}

fn optional_str(args: &Value, key: &str) -> Result<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RoamerError::invalid_call(format!("'{}' must be a string", key))),
    }
}

fn optional_top_k(args: &Value) -> Result<Option<usize>> {
    match args.get("top_k") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(k) if k >= 1 => Ok(Some(k as usize)),
            _ => Err(RoamerError::invalid_call("'top_k' must be a positive integer")),
        },
    }
}
