//! Resource command handlers
//!
//! Every catalogued resource shares the same commands; embedded resources
//! additionally take `--parent`.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use vstudio_core::{catalog, Document, ModelSchema, Resources};

use crate::output::Output;

/// Resolve a resource name from the catalogue
pub fn lookup(name: &str) -> Result<&'static ModelSchema> {
    catalog::lookup(name).ok_or_else(|| {
        anyhow!(
            "Unknown resource: '{}'\nRun `vstudio resources` to list them.",
            name
        )
    })
}

/// Parse a JSON object given on the command line
pub fn parse_document(raw: &str, what: &str) -> Result<Document> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid JSON for {}", what))?;
    match value {
        Value::Object(doc) => Ok(doc),
        other => bail!("Expected a JSON object for {}, got: {}", what, other),
    }
}

fn parse_optional(raw: Option<String>, what: &str) -> Result<Document> {
    raw.map_or_else(|| Ok(Document::new()), |raw| parse_document(&raw, what))
}

/// The parent id an embedded resource needs, or none for a top-level one
fn parent_for<'a>(schema: &ModelSchema, parent: Option<&'a str>) -> Result<Option<&'a str>> {
    match (schema.is_embedded(), parent) {
        (true, None) => bail!("{} is an embedded resource; pass --parent <ID>", schema.name),
        (false, Some(_)) => bail!("{} is not an embedded resource; drop --parent", schema.name),
        (_, parent) => Ok(parent),
    }
}

/// List the resource catalogue
pub fn list(output: &Output) -> Result<()> {
    output.print_resources(catalog::MODELS);
    Ok(())
}

pub async fn search(
    resources: &Resources,
    resource: String,
    parent: Option<String>,
    filter: Option<String>,
    unset: Option<String>,
    output: &Output,
) -> Result<()> {
    let schema = lookup(&resource)?;
    let filter = parse_optional(filter, "--filter")?;
    let unset = parse_optional(unset, "--unset")?;

    let docs = match parent_for(schema, parent.as_deref())? {
        Some(parent) => {
            resources
                .search_embedded(schema, parent, filter, unset)
                .await?
        }
        None => resources.search(schema, filter, unset).await?,
    };

    output.print_documents(&docs, &schema.key_fields());
    Ok(())
}

pub async fn create(
    resources: &Resources,
    resource: String,
    body: String,
    parent: Option<String>,
    position: i64,
    output: &Output,
) -> Result<()> {
    let schema = lookup(&resource)?;
    let document = parse_document(&body, "the document")?;

    let created = match parent_for(schema, parent.as_deref())? {
        Some(parent) => {
            resources
                .create_embedded(schema, parent, document, position)
                .await?
        }
        None => resources.create(schema, document).await?,
    };

    output.print_document(&created);
    Ok(())
}

pub async fn update(
    resources: &Resources,
    resource: String,
    id: String,
    body: String,
    parent: Option<String>,
    output: &Output,
) -> Result<()> {
    let schema = lookup(&resource)?;
    let partial = parse_document(&body, "the update")?;

    let updated = match parent_for(schema, parent.as_deref())? {
        Some(parent) => {
            resources
                .update_embedded(schema, parent, &id, partial)
                .await?
        }
        None => resources.update(schema, &id, partial).await?,
    };

    output.print_document(&updated);
    Ok(())
}

pub async fn delete(
    resources: &Resources,
    resource: String,
    id: String,
    parent: Option<String>,
    soft_by: Option<String>,
    output: &Output,
) -> Result<()> {
    let schema = lookup(&resource)?;

    match (parent_for(schema, parent.as_deref())?, soft_by) {
        (Some(_), Some(_)) => bail!("Embedded documents cannot be soft deleted"),
        (Some(parent), None) => {
            resources.delete_embedded(schema, parent, &id).await?;
        }
        (None, Some(actor)) => {
            resources.soft_delete(schema, &id, &actor).await?;
            output.success(&format!("Soft deleted {} {}", schema.name, id));
            return Ok(());
        }
        (None, None) => {
            resources.delete(schema, &id).await?;
        }
    }

    output.success(&format!("Deleted {} {}", schema.name, id));
    Ok(())
}
