//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde_json::Value;

use vstudio_core::{Document, ModelSchema, ServiceError, ID_FIELD};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single document
    pub fn print_document(&self, doc: &Document) {
        match self.format {
            OutputFormat::Human => {
                for (field, value) in doc {
                    println!("{:<16} {}", format!("{}:", field), render(value));
                }
            }
            OutputFormat::Json => {
                println!("{}", pretty(&Value::Object(doc.clone())));
            }
            OutputFormat::Quiet => {
                println!("{}", document_id(doc));
            }
        }
    }

    /// Print search results, summarised by the resource's key fields
    pub fn print_documents(&self, docs: &[Document], key_fields: &[&str]) {
        match self.format {
            OutputFormat::Human => {
                if docs.is_empty() {
                    println!("No documents found.");
                    return;
                }
                for doc in docs {
                    println!("{} | {}", document_id(doc), truncate(&summary(doc, key_fields), 70));
                }
                println!("\n{} document(s)", docs.len());
            }
            OutputFormat::Json => {
                let list = Value::Array(docs.iter().cloned().map(Value::Object).collect());
                println!("{}", pretty(&list));
            }
            OutputFormat::Quiet => {
                for doc in docs {
                    println!("{}", document_id(doc));
                }
            }
        }
    }

    /// Print the resource catalogue
    pub fn print_resources(&self, schemas: &[&ModelSchema]) {
        match self.format {
            OutputFormat::Human => {
                for schema in schemas {
                    let kind = if schema.is_embedded() { "embedded" } else { "collection" };
                    println!(
                        "{:<28} {:<10} keys: {}",
                        schema.name,
                        kind,
                        schema.key_fields().join(", ")
                    );
                }
                println!("\n{} resource(s)", schemas.len());
            }
            OutputFormat::Json => {
                let list: Vec<_> = schemas
                    .iter()
                    .map(|schema| {
                        serde_json::json!({
                            "name": schema.name,
                            "collection": schema.collection,
                            "embedded_field": schema.embedded_field,
                            "key_fields": schema.key_fields(),
                            "soft_delete": schema.soft_delete,
                        })
                    })
                    .collect();
                println!("{}", pretty(&Value::Array(list)));
            }
            OutputFormat::Quiet => {
                for schema in schemas {
                    println!("{}", schema.name);
                }
            }
        }
    }

    /// Print a failed operation: the envelope in JSON mode, the message otherwise
    pub fn print_error(&self, err: &ServiceError) {
        match self.format {
            OutputFormat::Json => println!("{}", pretty(&err.envelope())),
            _ => eprintln!("Error: {} [{}]", err.message(), err.location),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn document_id(doc: &Document) -> String {
    doc.get(ID_FIELD).map(render).unwrap_or_else(|| "-".to_string())
}

/// Strings without quotes, everything else as compact JSON
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `field=value` pairs for the key fields present in `doc`
fn summary(doc: &Document, key_fields: &[&str]) -> String {
    key_fields
        .iter()
        .filter_map(|field| doc.get(*field).map(|v| format!("{}={}", field, render(v))))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
