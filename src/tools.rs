//! Tool catalog for the airport assistant.
//!
//! Each tool wraps one REST search endpoint and declares an OpenAI
//! function-calling parameter schema. The agent advertises the catalog to
//! the model and dispatches the model's tool calls through [`ToolRegistry`].
//!
//! Tools are stateless: all request state (the backend client with its auth
//! headers) arrives through [`ToolContext`] at execution time.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::BackendClient;

/// A callable the agent may invoke to fetch external data.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"list_flights"`).
    fn name(&self) -> &str;

    /// Free-text description the model reads when choosing a tool.
    fn description(&self) -> &str;

    /// JSON Schema for parameters: `type: "object"`, `properties`, and
    /// optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Execute with the model-provided arguments. The returned string is
    /// fed back to the model verbatim as the tool observation.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String>;
}

/// Bridge handed to tools at execution time.
pub struct ToolContext {
    pub backend: Arc<BackendClient>,
}

impl ToolContext {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

/// Registry of all tools the assistant may call.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The full airport assistant catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchAirportsTool));
        registry.register(Box::new(SearchFlightsByNumberTool));
        registry.register(Box::new(ListFlightsTool));
        registry.register(Box::new(SearchAmenitiesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Render the catalog in the chat-completions `tools` wire format.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Parameter helpers ============

fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn require_str(params: &Value, key: &str) -> Result<String> {
    opt_str(params, key).ok_or_else(|| anyhow::anyhow!("missing required parameter: {}", key))
}

// ============ Result shaping ============

/// Shape a search response for the model.
///
/// Empty result sets become an instruction to tell the user there are no
/// matches; large sets are summarized down to a count plus the first two
/// rows so the observation stays inside the prompt budget.
pub fn summarize_results(kind: &str, rows: &[Value]) -> String {
    const SHOWN: usize = 2;

    if rows.is_empty() {
        return format!(
            "There are no {} matching that query. Let the user know there are no results.",
            kind
        );
    }

    if rows.len() > SHOWN {
        let first: Vec<String> = rows[..SHOWN].iter().map(|r| r.to_string()).collect();
        return format!(
            "There are {} {} matching that query. Here are the first {} results:\n{}",
            rows.len(),
            kind,
            SHOWN,
            first.join(" ")
        );
    }

    rows.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ Search Airports ============

pub struct SearchAirportsTool;

#[async_trait]
impl Tool for SearchAirportsTool {
    fn name(&self) -> &str {
        "search_airports"
    }

    fn description(&self) -> &str {
        "Use this tool to list all airports matching search criteria. \
         Takes at least one of country, city, name, or all and returns all matching airports. \
         The assistant can decide to return the results directly to the user. \
         Do not guess values the user did not provide; omit unknown fields."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "country": { "type": "string", "description": "Country" },
                "city": { "type": "string", "description": "City" },
                "name": { "type": "string", "description": "Airport name" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let query: [(&str, Option<String>); 3] = [
            ("country", opt_str(&params, "country")),
            ("city", opt_str(&params, "city")),
            ("name", opt_str(&params, "name")),
        ];
        let response = ctx.backend.get("/airports/search", &query).await?;
        let rows = response.as_array().cloned().unwrap_or_default();
        Ok(summarize_results("airports", &rows))
    }
}

// ============ Search Flights By Flight Number ============

pub struct SearchFlightsByNumberTool;

#[async_trait]
impl Tool for SearchFlightsByNumberTool {
    fn name(&self) -> &str {
        "search_flights_by_number"
    }

    fn description(&self) -> &str {
        "Use this tool to get info for a specific flight. \
         Takes an airline and flight number and returns info on the flight. \
         Do NOT guess an airline or flight number. \
         A flight number is a two-character airline designator followed by a \
         1 to 4 digit number, e.g. OO123, DL 1234, BA 405, AS 3452. \
         If the tool returns more than one option choose the date closest to today."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "airline": { "type": "string", "description": "Airline unique 2 letter identifier" },
                "flight_number": { "type": "string", "description": "1 to 4 digit number" }
            },
            "required": ["airline", "flight_number"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let airline = require_str(&params, "airline")?;
        let flight_number = require_str(&params, "flight_number")?;
        let query: [(&str, Option<String>); 2] = [
            ("airline", Some(airline)),
            ("flight_number", Some(flight_number)),
        ];
        let response = ctx.backend.get("/flights/search", &query).await?;
        Ok(response.to_string())
    }
}

// ============ List Flights ============

pub struct ListFlightsTool;

#[async_trait]
impl Tool for ListFlightsTool {
    fn name(&self) -> &str {
        "list_flights"
    }

    fn description(&self) -> &str {
        "Use this tool to list all flights matching search criteria. \
         Takes an arrival airport, a departure airport, or both, filters by \
         date and returns all matching flights. \
         The assistant can decide to return the results directly to the user. \
         Omit fields the user did not specify."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "departure_airport": { "type": "string", "description": "Departure airport 3-letter code" },
                "arrival_airport": { "type": "string", "description": "Arrival airport 3-letter code" },
                "date": { "type": "string", "description": "Date of flight departure (YYYY-MM-DD)" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let query: [(&str, Option<String>); 3] = [
            ("departure_airport", opt_str(&params, "departure_airport")),
            ("arrival_airport", opt_str(&params, "arrival_airport")),
            ("date", opt_str(&params, "date")),
        ];
        let response = ctx.backend.get("/flights/search", &query).await?;
        let rows = response.as_array().cloned().unwrap_or_default();
        Ok(summarize_results("flights", &rows))
    }
}

// ============ Search Amenities ============

pub struct SearchAmenitiesTool;

#[async_trait]
impl Tool for SearchAmenitiesTool {
    fn name(&self) -> &str {
        "search_amenities"
    }

    fn description(&self) -> &str {
        "Use this tool to search amenities by name or to recommend airport \
         amenities at SFO. If the user provides flight info, use \
         'search_flights_by_number' first to get gate info and location. \
         Only recommend amenities that are returned by this query. \
         Find amenities close to the user by matching the terminal and then \
         comparing the gate numbers. Gates iterate by letter and number, \
         example A1 A2 A3 B1 B2 B3 C1 C2 C3. Gate A3 is close to A2 and B1."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let query = require_str(&params, "query")?;
        let params: [(&str, Option<String>); 2] = [
            ("top_k", Some("5".to_string())),
            ("query", Some(query)),
        ];
        let response = ctx.backend.get("/amenities/search", &params).await?;
        Ok(response.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 4);
        assert!(registry.find("search_airports").is_some());
        assert!(registry.find("search_flights_by_number").is_some());
        assert!(registry.find("list_flights").is_some());
        assert!(registry.find("search_amenities").is_some());
        assert!(registry.find("book_flight").is_none());
    }

    #[test]
    fn test_definitions_wire_format() {
        let registry = ToolRegistry::with_builtins();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 4);
        for def in &defs {
            assert_eq!(def["type"], "function");
            assert!(def["function"]["name"].is_string());
            assert_eq!(def["function"]["parameters"]["type"], "object");
        }
    }

    #[test]
    fn test_required_params_declared() {
        let registry = ToolRegistry::with_builtins();
        let flights = registry.find("search_flights_by_number").unwrap();
        let schema = flights.parameters_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["airline", "flight_number"]);
    }

    #[test]
    fn test_opt_str_treats_blank_as_unset() {
        let params = serde_json::json!({ "city": "  ", "name": "Goroka", "country": null });
        assert_eq!(opt_str(&params, "city"), None);
        assert_eq!(opt_str(&params, "country"), None);
        assert_eq!(opt_str(&params, "name"), Some("Goroka".to_string()));
    }

    #[test]
    fn test_require_str_missing() {
        let params = serde_json::json!({});
        assert!(require_str(&params, "query").is_err());
    }

    #[test]
    fn test_summarize_empty() {
        let out = summarize_results("flights", &[]);
        assert!(out.contains("no flights matching"));
        assert!(out.contains("no results"));
    }

    #[test]
    fn test_summarize_one_and_two_rows() {
        let rows = vec![serde_json::json!({"flight": 118})];
        let out = summarize_results("flights", &rows);
        assert_eq!(out, rows[0].to_string());

        let rows = vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})];
        let out = summarize_results("flights", &rows);
        assert_eq!(out.lines().count(), 2);
        assert!(!out.contains("Here are the first"));
    }

    #[test]
    fn test_summarize_truncates_large_sets() {
        let rows: Vec<Value> = (0..7).map(|i| serde_json::json!({ "i": i })).collect();
        let out = summarize_results("airports", &rows);
        assert!(out.contains("There are 7 airports"));
        assert!(out.contains("first 2 results"));
        assert!(out.contains("{\"i\":0}"));
        assert!(out.contains("{\"i\":1}"));
        assert!(!out.contains("{\"i\":2}"));
    }
}
