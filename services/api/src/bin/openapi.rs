//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI 3 document of the study companion API.
//! Usage: `openapi [OUTPUT]`, defaulting to `openapi.json`.

use api_lib::web::rest::ApiDoc;
use std::path::Path;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, api_doc.to_pretty_json()?)?;
    println!(
        "OpenAPI document with {} paths written to {}",
        api_doc.paths.paths.len(),
        output.display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    write_document(ApiDoc::openapi(), Path::new(&output))
}
