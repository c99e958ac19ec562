//! # Onshape Exporter CLI
//!
//! Command-line access to BOM retrieval, STL export and shaded views.
//!
//! Credentials come from `ONSHAPE_ACCESS_KEY` and `ONSHAPE_SECRET_KEY`.

use anyhow::{bail, Context, Result};
use onshape_exporter_bom::{BomItem, RevisionType};
use onshape_exporter_client::{ApiResponse, OnshapeClient, ShadedViewOptions};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %command,
        "Starting Onshape exporter"
    );

    let mut client = OnshapeClient::from_env().context("Failed to create Onshape client")?;
    let result = run(&client, command, &args[1..]).await;
    client.close();
    result
}

async fn run(client: &OnshapeClient, command: &str, args: &[String]) -> Result<()> {
    match (command, args) {
        ("bom", [did, wid, eid]) => {
            let table = client
                .fetch_bom(did, wid, eid)
                .await
                .context("Failed to fetch BOM")?;
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        ("export", [did, wvm_type, wvm_id, eid, part_id, configuration, out]) => {
            let wvm_type: RevisionType = wvm_type
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid revision type")?;
            let response = client
                .export_part(did, wvm_type, wvm_id, eid, part_id, configuration)
                .await
                .context("Failed to export part")?;
            write_stl(Path::new(out), response).await?;
        }
        ("shaded-view", [did, wid, eid, out, rest @ ..]) => {
            let options = match rest {
                [] => ShadedViewOptions::default(),
                [height, width] => ShadedViewOptions {
                    output_height: height.parse().context("Invalid height")?,
                    output_width: width.parse().context("Invalid width")?,
                },
                _ => usage(command),
            };
            let response = client
                .get_shaded_view(did, wid, eid, options)
                .await
                .context("Failed to fetch shaded view")?;
            let body = match response {
                ApiResponse::Json(value) => serde_json::to_vec_pretty(&value)?,
                ApiResponse::Raw(bytes) => bytes,
            };
            tokio::fs::write(out, body)
                .await
                .with_context(|| format!("Failed to write {out}"))?;
            tracing::info!(path = %out, "Wrote shaded view");
        }
        ("export-printable", [did, wid, eid, dir]) => {
            export_printable(client, did, wid, eid, Path::new(dir)).await?;
        }
        _ => usage(command),
    }

    Ok(())
}

/// Export every printable BOM line item of an assembly into `dir`.
async fn export_printable(
    client: &OnshapeClient,
    did: &str,
    wid: &str,
    eid: &str,
    dir: &Path,
) -> Result<()> {
    let table = client
        .fetch_bom(did, wid, eid)
        .await
        .context("Failed to fetch BOM")?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut exported = 0;
    for (index, item) in table.iter().enumerate() {
        if !item.is_printable() {
            continue;
        }

        let response = client
            .export_item(&item.source)
            .await
            .with_context(|| format!("Failed to export {}", item.name))?;
        write_stl(&dir.join(stl_file_name(index, item)), response).await?;
        exported += 1;
    }

    tracing::info!(exported, total = table.len(), "Exported printable parts");
    Ok(())
}

async fn write_stl(path: &Path, response: ApiResponse) -> Result<()> {
    let ApiResponse::Raw(bytes) = response else {
        bail!("Expected STL bytes for {}, got a JSON response", path.display());
    };

    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "Wrote STL");
    Ok(())
}

/// `003-Motor_bracket-x2.stl` style name for a line item.
fn stl_file_name(index: usize, item: &BomItem) -> PathBuf {
    let name: String = item
        .name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    PathBuf::from(format!("{index:03}-{name}-x{}.stl", item.quantity))
}

fn usage(command: &str) -> ! {
    eprintln!("Invalid arguments for command: {command}");
    print_help();
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"Onshape Exporter

USAGE:
    onshape-exporter <COMMAND> [ARGS]

COMMANDS:
    bom <did> <wid> <eid>
        Print the normalized bill of materials as JSON
    export <did> <w|v|m> <wvm-id> <eid> <part-id> <configuration> <out.stl>
        Export one part as binary STL
    shaded-view <did> <wid> <eid> <out> [height width]
        Save a trimetric shaded view (default 1200x850)
    export-printable <did> <wid> <eid> <dir>
        Export every PETG part of an assembly as STL
    help
        Show this help message

ENVIRONMENT:
    ONSHAPE_ACCESS_KEY     API access key (required)
    ONSHAPE_SECRET_KEY     API secret key (required)
    ONSHAPE_BASE_URL       API base URL (default https://cad.onshape.com)
    ONSHAPE_TIMEOUT_SECS   Request timeout in seconds
    ONSHAPE_MAX_REDIRECTS  Redirect hop limit (default 5)
    RUST_LOG               Log filter (default info)
"#
    );
}
