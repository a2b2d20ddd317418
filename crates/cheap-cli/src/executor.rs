//! Command execution.

use std::path::Path;

use cheap_core::{CatalogDef, CatalogOptions, EntityId, Species, StorageConfig, Store};
use thiserror::Error;
use tracing::debug;

use crate::formatter::Formatter;
use crate::Command;

/// Execution errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Core library error.
    #[error(transparent)]
    Core(#[from] cheap_core::Error),

    /// File could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Definition file is not a valid catalog definition.
    #[error("invalid definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a catalog definition from its JSON wire form.
pub fn read_def(path: &Path) -> Result<CatalogDef, CliError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Execute a command and return formatted output.
pub fn execute(
    command: &Command,
    data: &Path,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    match command {
        Command::Hash { file } => {
            let def = read_def(file)?;
            Ok(formatter.format_hash(def.hash(), &def.to_canonical_bytes()))
        }
        Command::CreateCatalog {
            def,
            species,
            strict,
            uri,
            upstream,
        } => {
            let mut options = CatalogOptions::new()
                .species(species.parse::<Species>()?)
                .strict(*strict);
            if let Some(path) = def {
                options = options.def(read_def(path)?);
            }
            if let Some(uri) = uri {
                options = options.uri(uri.clone());
            }
            if let Some(upstream) = upstream {
                options = options.upstream(upstream.parse::<EntityId>()?);
            }
            let mut store = open(data)?;
            let id = store.create_catalog(options)?;
            store.close()?;
            Ok(formatter.format_message(&id.to_string()))
        }
        Command::Catalogs => {
            let store = open(data)?;
            let catalogs: Vec<_> = store.catalogs().collect();
            Ok(formatter.format_catalogs(&catalogs))
        }
        Command::Show { id } => {
            let store = open(data)?;
            let id = id.parse::<EntityId>()?;
            let catalog = store
                .catalog(id)
                .ok_or_else(|| cheap_core::Error::not_found("catalog", id))?;
            Ok(formatter.format_catalog(catalog))
        }
        Command::DeleteCatalog { id } => {
            let mut store = open(data)?;
            let id = id.parse::<EntityId>()?;
            store.delete_catalog(id)?;
            store.close()?;
            Ok(formatter.format_message(&format!("deleted {}", id)))
        }
    }
}

fn open(data: &Path) -> Result<Store, CliError> {
    debug!(path = %data.display(), "opening store");
    Ok(Store::open(&StorageConfig::new(data))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{create_formatter, OutputFormat};

    const PEOPLE: &str = r#"{
        "aspect_defs": [{
            "name": "Person",
            "properties": [
                {"name": "firstName", "type": "STRING"},
                {"name": "age", "type": "INT"}
            ]
        }],
        "hierarchy_defs": [{"name": "people", "type": "ENTITY_SET"}]
    }"#;

    #[test]
    fn test_hash_of_definition_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("people.json");
        std::fs::write(&file, PEOPLE).unwrap();

        let formatter = create_formatter(OutputFormat::Json);
        let out = execute(&Command::Hash { file }, dir.path(), &*formatter).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["hash"], "ff05e9ecf4d697e8");
    }

    #[test]
    fn test_create_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let file = dir.path().join("people.json");
        std::fs::write(&file, PEOPLE).unwrap();
        let formatter = create_formatter(OutputFormat::Json);

        let create = Command::CreateCatalog {
            def: Some(file),
            species: "source".to_string(),
            strict: true,
            uri: None,
            upstream: None,
        };
        let out = execute(&create, &data, &*formatter).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        let id = json["message"].as_str().unwrap().to_string();

        let out = execute(&Command::Show { id }, &data, &*formatter).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["strict"], true);
        assert_eq!(json["hash"], "ff05e9ecf4d697e8");
        assert_eq!(json["hierarchies"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_species_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let create = Command::CreateCatalog {
            def: None,
            species: "nebula".to_string(),
            strict: false,
            uri: None,
            upstream: None,
        };
        let formatter = create_formatter(OutputFormat::Table);
        assert!(matches!(
            execute(&create, dir.path(), &*formatter),
            Err(CliError::Core(_))
        ));
    }
}
