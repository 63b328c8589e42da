//! MCP tool registry and definitions

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::clever::{Course, CoursesClient};
use crate::devices::{DeviceStore, InstalledApp};
use crate::{Error, Result};

const JSON_SCHEMA_DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// Number of courses rendered in the `get_clever_courses` summary table
const COURSE_SUMMARY_ROWS: usize = 5;

/// Collaborators available to tool calls
#[derive(Clone)]
pub struct ToolContext {
    pub devices: Arc<dyn DeviceStore>,
    pub courses: Arc<dyn CoursesClient>,
}

/// One block of tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }
}

/// Result of a successful `tools/call`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub content: Vec<Content>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
        }
    }
}

/// Tool entry as announced by `tools/list`
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Trait for MCP tools
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (used in tools/call)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;
}

/// Registry of available MCP tools.
///
/// Built once at startup and shared read-only; listing order is registration
/// order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn McpTool>>,
    by_name: HashMap<String, usize>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registry holding the gateway's built-in tools
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        register_builtin_tools(&mut registry);
        registry
    }

    /// Register a tool. Names are unique.
    pub fn register(&mut self, tool: Arc<dyn McpTool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// List all tools in MCP format
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn McpTool>> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    /// Get tool count
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    let tools: [Arc<dyn McpTool>; 4] = [
        Arc::new(EchoTool),
        Arc::new(AppsOnDeviceTool),
        Arc::new(CleverCoursesTool),
        Arc::new(AddNumbersTool),
    ];
    for tool in tools {
        if let Err(e) = registry.register(tool) {
            tracing::warn!("Skipping built-in tool: {}", e);
        }
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "$schema": JSON_SCHEMA_DRAFT_07,
        "type": "object",
        "properties": properties,
        "required": required
    })
}

// ============================================================================
// echo
// ============================================================================

pub struct EchoTool;

#[async_trait]
impl McpTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo input text"
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({ "text": { "type": "string" } }), &["text"])
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let text = match args.get("text") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(Error::InvalidParams("Missing text".to_string()));
            }
            Some(other) => other.to_string(),
        };
        Ok(ToolOutput::text(text))
    }
}

// ============================================================================
// add_numbers
// ============================================================================

pub struct AddNumbersTool;

#[async_trait]
impl McpTool for AddNumbersTool {
    fn name(&self) -> &str {
        "add_numbers"
    }

    fn description(&self) -> &str {
        "Add two numbers and return the sum."
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "a": { "type": "number", "description": "The first number" },
                "b": { "type": "number", "description": "The second number" }
            }),
            &["a", "b"],
        )
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let a = coerce_number(args.get("a"));
        let b = coerce_number(args.get("b"));
        Ok(ToolOutput::text(format_number(a + b)))
    }
}

/// Loose numeric coercion: a missing value is NaN, null is 0, booleans are
/// 0/1 and strings are parsed after trimming (empty means 0). Anything that
/// doesn't parse becomes NaN rather than an error.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_numeric_str(s.trim()),
        Some(Value::Array(_)) | Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_numeric_str(s: &str) -> f64 {
    if let Some(value) = parse_radix_literal(s) {
        return value;
    }
    match s {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf"/"nan" spellings that plain numeric text never uses
        _ if s.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) => {
            f64::NAN
        }
        _ => s.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Unsigned `0x`, `0o` and `0b` integer literals. Returns `None` when the
/// text has no such prefix.
fn parse_radix_literal(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'0' {
        return None;
    }
    let radix = match bytes[1] {
        b'x' | b'X' => 16,
        b'o' | b'O' => 8,
        b'b' | b'B' => 2,
        _ => return None,
    };

    let digits = &s[2..];
    if digits.is_empty() {
        return Some(f64::NAN);
    }
    let value = digits
        .chars()
        .try_fold(0.0_f64, |acc, c| {
            c.to_digit(radix)
                .map(|d| acc * f64::from(radix) + f64::from(d))
        })
        .unwrap_or(f64::NAN);
    Some(value)
}

/// Render a number the way the sum has always been reported: integers
/// without a fractional part, `NaN` and `Infinity` spelled out, and
/// exponent notation below 1e-6 or from 1e21 upwards (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    } else if n == f64::INFINITY {
        return "Infinity".to_string();
    } else if n == f64::NEG_INFINITY {
        return "-Infinity".to_string();
    } else if n == 0.0 {
        return "0".to_string();
    }

    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{:e}", n);
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        }
    } else {
        n.to_string()
    }
}

// ============================================================================
// apps_on_device
// ============================================================================

pub struct AppsOnDeviceTool;

#[async_trait]
impl McpTool for AppsOnDeviceTool {
    fn name(&self) -> &str {
        "apps_on_device"
    }

    fn description(&self) -> &str {
        "List apps on a device"
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({ "device_id": { "type": "string" } }), &["device_id"])
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let device_id = match args.get("device_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
            _ => return Err(Error::InvalidParams("Missing device_id".to_string())),
        };

        let apps = ctx.devices.apps_for_device(&device_id).await?;
        tracing::debug!("Device {} has {} applications", device_id, apps.len());

        Ok(ToolOutput::text(render_apps(&device_id, &apps)))
    }
}

pub fn render_apps(device_id: &str, apps: &[InstalledApp]) -> String {
    if apps.is_empty() {
        return format!("No applications found for device {}.", device_id);
    }

    let mut table = String::from(
        "| Application        | Version    | Vendor              | Needs Update |\n",
    );
    table.push_str("|--------------------|------------|---------------------|--------------|\n");
    for app in apps {
        table.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            app.application_name,
            app.app_version,
            app.vendor,
            if app.needs_update { "Yes" } else { "No" }
        ));
    }
    table
}

// ============================================================================
// get_clever_courses
// ============================================================================

pub struct CleverCoursesTool;

#[async_trait]
impl McpTool for CleverCoursesTool {
    fn name(&self) -> &str {
        "get_clever_courses"
    }

    fn description(&self) -> &str {
        "Fetch courses with name, number, and id"
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({}), &[])
    }

    async fn call(&self, _args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let courses = ctx.courses.fetch_courses().await?;
        if let Some(first) = courses.first() {
            tracing::debug!("Sample course data: {:?}", first);
        }
        Ok(ToolOutput::text(render_courses(&courses)))
    }
}

pub fn render_courses(courses: &[Course]) -> String {
    if courses.is_empty() {
        return "No courses were found on the Clever platform.".to_string();
    }

    let mut text = format!(
        "Successfully retrieved {} courses. Showing top {} for summary:\n\n",
        courses.len(),
        COURSE_SUMMARY_ROWS
    );
    text.push_str("| Course Name | Subject | Course ID |\n");
    text.push_str("|-------------|---------|-----------|\n");
    for course in courses.iter().take(COURSE_SUMMARY_ROWS) {
        text.push_str(&format!(
            "| {} | {} | {} |\n",
            course.name.as_deref().unwrap_or_default(),
            course.number.as_deref().unwrap_or_default(),
            course.id.as_deref().unwrap_or_default()
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, needs_update: bool) -> InstalledApp {
        InstalledApp {
            application_name: name.to_string(),
            vendor: "Acme".to_string(),
            app_version: "1.0".to_string(),
            install_date: None,
            last_update: None,
            needs_update,
        }
    }

    fn course(i: usize) -> Course {
        Course {
            name: Some(format!("Course {}", i)),
            number: Some(format!("N{}", i)),
            id: Some(format!("id-{}", i)),
        }
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(Some(&json!(2))), 2.0);
        assert_eq!(coerce_number(Some(&json!("3"))), 3.0);
        assert_eq!(coerce_number(Some(&json!(" 4.5 "))), 4.5);
        assert_eq!(coerce_number(Some(&json!(""))), 0.0);
        assert_eq!(coerce_number(Some(&json!(null))), 0.0);
        assert_eq!(coerce_number(Some(&json!(true))), 1.0);
        assert_eq!(coerce_number(Some(&json!("1e3"))), 1000.0);
        assert!(coerce_number(None).is_nan());
        assert!(coerce_number(Some(&json!("abc"))).is_nan());
        assert!(coerce_number(Some(&json!("inf"))).is_nan());
        assert!(coerce_number(Some(&json!([1]))).is_nan());
        assert_eq!(coerce_number(Some(&json!("-Infinity"))), f64::NEG_INFINITY);
        assert_eq!(coerce_number(Some(&json!("0x10"))), 16.0);
        assert_eq!(coerce_number(Some(&json!(" 0XfF "))), 255.0);
        assert_eq!(coerce_number(Some(&json!("0o17"))), 15.0);
        assert_eq!(coerce_number(Some(&json!("0b101"))), 5.0);
        assert!(coerce_number(Some(&json!("0x"))).is_nan());
        assert!(coerce_number(Some(&json!("0b102"))).is_nan());
        assert!(coerce_number(Some(&json!("-0x10"))).is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-7.0), "-7");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_format_number_exponent_range() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e22), "-2.5e+22");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_render_apps_table() {
        let text = render_apps("dev-9", &[app("Chrome", false), app("Zoom", true)]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "| Application        | Version    | Vendor              | Needs Update |"
        );
        assert_eq!(lines[2], "| Chrome | 1.0 | Acme | No |");
        assert_eq!(lines[3], "| Zoom | 1.0 | Acme | Yes |");
    }

    #[test]
    fn test_render_apps_empty() {
        assert_eq!(
            render_apps("dev-9", &[]),
            "No applications found for device dev-9."
        );
    }

    #[test]
    fn test_render_courses_caps_rows() {
        let courses: Vec<Course> = (1..=8).map(course).collect();
        let text = render_courses(&courses);

        assert!(text.starts_with("Successfully retrieved 8 courses."));
        let rows: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("| Course ") && !l.starts_with("| Course Name"))
            .collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], "| Course 1 | N1 | id-1 |");
        assert!(!text.contains("Course 6"));
    }

    #[test]
    fn test_render_courses_empty() {
        let text = render_courses(&[]);
        assert_eq!(text, "No courses were found on the Clever platform.");
        assert!(!text.contains('|'));
    }

    #[test]
    fn test_registry_order_and_duplicates() {
        let mut registry = ToolRegistry::with_builtin_tools();
        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["echo", "apps_on_device", "get_clever_courses", "add_numbers"]
        );

        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(ref n) if n == "echo"));
        assert_eq!(registry.len(), 4);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_descriptor_serializes_input_schema_key() {
        let registry = ToolRegistry::with_builtin_tools();
        let value = serde_json::to_value(registry.list()).unwrap();
        assert_eq!(value[3]["inputSchema"]["required"], json!(["a", "b"]));
        assert_eq!(value[0]["inputSchema"]["$schema"], JSON_SCHEMA_DRAFT_07);
    }
}
