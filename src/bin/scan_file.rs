//! Scan a licence image from disk against the recognition service and print
//! the result. Intended for development against a local service instance:
//!
//! ```text
//! SCAN_API_BASE_URL=http://localhost:8080 cargo run -- photo.jpg
//! ```

use std::path::Path;
use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::EnvFilter;

use licence_scanner::api::{ScanApi, ScanClient};
use licence_scanner::image_guard;
use licence_scanner::types::{CandidateImage, EditableFields, ImageOrigin};
use licence_scanner::validator::validate_local;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: scan_file <image-path>");
        return ExitCode::FAILURE;
    };

    match run(Path::new(&path)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let candidate = CandidateImage {
        media_type: media_type_for(path),
        file_name,
        bytes,
        origin: ImageOrigin::Upload,
    };
    info!(details = %candidate.details(), "submitting image");
    let image = image_guard::admit(candidate)?;

    let client = ScanClient::from_env();
    info!(base_url = client.base_url(), "scanning");
    let result = client.scan(&image).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    let fields = EditableFields::from_scan(&result);
    let validation = match &result.validation {
        Some(validation) => validation.clone(),
        None => validate_local(&fields),
    };
    if validation.blocking_errors.is_empty() {
        println!("validation: ok");
    } else {
        for error in &validation.blocking_errors {
            println!(
                "blocking [{}]: {}",
                error.code,
                error.message.as_deref().unwrap_or("")
            );
        }
    }
    for warning in &validation.warnings {
        println!("warning: {warning}");
    }

    Ok(())
}

fn media_type_for(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg".to_string()),
        "png" => Some("image/png".to_string()),
        "webp" => Some("image/webp".to_string()),
        _ => None,
    }
}
