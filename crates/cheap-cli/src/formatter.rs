//! Output formatters for catalogs and hashes.

use cheap_core::{is_reserved, Catalog, Hierarchy};
use clap::ValueEnum;
use comfy_table::{Cell, Table};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format a catalog listing.
    fn format_catalogs(&self, catalogs: &[&Catalog]) -> String;

    /// Format one catalog with its hierarchies and aspect defs.
    fn format_catalog(&self, catalog: &Catalog) -> String;

    /// Format a definition hash, with the canonical bytes it was computed from.
    fn format_hash(&self, hash: u64, canonical: &[u8]) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn format_hash_value(hash: u64) -> String {
    format!("{:016x}", hash)
}

/// User-visible hierarchies; the reserved directories are derived.
fn visible_hierarchies(catalog: &Catalog) -> impl Iterator<Item = &Hierarchy> {
    catalog.hierarchies().filter(|h| !is_reserved(h.name()))
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_catalogs(&self, catalogs: &[&Catalog]) -> String {
        if catalogs.is_empty() {
            return "No catalogs".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["id", "species", "strict", "version", "hash", "hierarchies"]);
        for catalog in catalogs {
            table.add_row(vec![
                Cell::new(catalog.id()),
                Cell::new(catalog.species()),
                Cell::new(catalog.is_strict()),
                Cell::new(catalog.version()),
                Cell::new(format_hash_value(catalog.hash())),
                Cell::new(visible_hierarchies(catalog).count()),
            ]);
        }
        format!("{}\n{} catalog(s)", table, catalogs.len())
    }

    fn format_catalog(&self, catalog: &Catalog) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Catalog: {}", catalog.id()));
        lines.push(format!("Species: {}", catalog.species()));
        if let Some(uri) = catalog.uri() {
            lines.push(format!("URI: {}", uri));
        }
        if let Some(upstream) = catalog.upstream() {
            lines.push(format!("Upstream: {}", upstream));
        }
        lines.push(format!("Strict: {}", catalog.is_strict()));
        lines.push(format!("Version: {}", catalog.version()));
        lines.push(format!("Hash: {}", format_hash_value(catalog.hash())));

        let mut hierarchies = Table::new();
        hierarchies.set_header(vec!["hierarchy", "type", "entries", "version"]);
        for hierarchy in visible_hierarchies(catalog) {
            hierarchies.add_row(vec![
                Cell::new(hierarchy.name()),
                Cell::new(hierarchy.hierarchy_type()),
                Cell::new(hierarchy.len()),
                Cell::new(hierarchy.version()),
            ]);
        }
        lines.push(String::new());
        lines.push(hierarchies.to_string());

        let mut defs = Table::new();
        defs.set_header(vec!["aspect def", "property", "type", "flags"]);
        for def in catalog.aspect_defs() {
            for property in def.properties() {
                let mut flags = Vec::new();
                if property.is_nullable() {
                    flags.push("nullable");
                }
                if property.is_removable() {
                    flags.push("removable");
                }
                if property.is_multivalued() {
                    flags.push("multivalued");
                }
                if !property.is_writable() {
                    flags.push("read-only");
                }
                defs.add_row(vec![
                    Cell::new(def.name()),
                    Cell::new(property.name()),
                    Cell::new(property.property_type()),
                    Cell::new(flags.join(", ")),
                ]);
            }
        }
        lines.push(String::new());
        lines.push(defs.to_string());

        lines.join("\n")
    }

    fn format_hash(&self, hash: u64, canonical: &[u8]) -> String {
        format!(
            "{}\n{} canonical byte(s)",
            format_hash_value(hash),
            canonical.len()
        )
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn catalog_summary(catalog: &Catalog) -> serde_json::Value {
        serde_json::json!({
            "id": catalog.id().to_string(),
            "species": catalog.species(),
            "uri": catalog.uri(),
            "upstream": catalog.upstream().map(|id| id.to_string()),
            "strict": catalog.is_strict(),
            "version": catalog.version(),
            "hash": format_hash_value(catalog.hash()),
        })
    }
}

impl Formatter for JsonFormatter {
    fn format_catalogs(&self, catalogs: &[&Catalog]) -> String {
        let rows: Vec<serde_json::Value> = catalogs
            .iter()
            .map(|catalog| Self::catalog_summary(catalog))
            .collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_catalog(&self, catalog: &Catalog) -> String {
        let mut summary = Self::catalog_summary(catalog);
        let hierarchies: Vec<serde_json::Value> = visible_hierarchies(catalog)
            .map(|h| {
                serde_json::json!({
                    "name": h.name(),
                    "type": h.hierarchy_type(),
                    "entries": h.len(),
                    "version": h.version(),
                })
            })
            .collect();
        let defs: Vec<&cheap_core::AspectDef> =
            catalog.aspect_defs().map(|def| &**def).collect();
        if let Some(obj) = summary.as_object_mut() {
            obj.insert("hierarchies".to_string(), serde_json::Value::Array(hierarchies));
            obj.insert(
                "aspect_defs".to_string(),
                serde_json::to_value(defs).unwrap_or(serde_json::Value::Null),
            );
        }
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_hash(&self, hash: u64, canonical: &[u8]) -> String {
        serde_json::json!({
            "hash": format_hash_value(hash),
            "canonical": hex::encode(canonical),
        })
        .to_string()
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({
            "message": message
        })
        .to_string()
    }
}
