use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use composite_engine::{bake, page_sizes, BakeGate, BakeOptions, ImageResolver};
use overlay_model::{ImageRef, Overlay, OverlayId};
use placement_core::{NativeSize, PageGeometryRegistry, SurfaceRect};
use serde::{Deserialize, Serialize};
use signature_store::SignatureStore;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "inkseal-cli")]
#[command(about = "Inkseal CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Bake signature placements into a signed copy of a PDF.
    Sign {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// JSON file describing rendered page geometry and placements.
        #[arg(long)]
        placements: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Fail the bake if it takes longer than this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Manage the saved-signature history.
    History {
        /// Override the history storage directory.
        #[arg(long, global = true)]
        store_root: Option<PathBuf>,
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum HistoryCommands {
    /// List saved signatures, most recent first.
    List,
    /// Save an image file as a reusable signature.
    Add {
        #[arg(value_name = "IMAGE")]
        file: PathBuf,
    },
    /// Move a saved signature to the front of the history.
    Promote {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Delete a saved signature.
    Remove {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageInfoOutput>,
}

#[derive(Debug, Serialize)]
struct PageInfoOutput {
    page: u32,
    width: f32,
    height: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacementsFile {
    #[serde(default)]
    pages: Vec<PageGeometryInput>,
    signatures: Vec<PlacementInput>,
}

/// Rendered geometry captured from the view that positioned the signatures.
/// Native page sizes come from the document itself during the bake, so they
/// are optional here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageGeometryInput {
    page: u32,
    rendered_width: f32,
    rendered_height: f32,
    native_width: Option<f32>,
    native_height: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacementInput {
    image: String,
    page: u32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Resolves placement image references: data URLs inline, anything else as a
/// path relative to the placements file.
struct CliImageResolver {
    base: PathBuf,
}

impl ImageResolver for CliImageResolver {
    fn resolve(&self, image: &ImageRef) -> std::io::Result<Vec<u8>> {
        let reference = image.as_str();

        if reference.starts_with("data:") {
            return signature_store::data_url::decode(reference).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed data URL")
            });
        }

        let path = Path::new(reference);
        if path.is_absolute() {
            fs::read(path)
        } else {
            fs::read(self.base.join(path))
        }
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Sign { file, placements, output, timeout_ms } => {
            run_sign(&file, &placements, output.as_deref(), timeout_ms)
        }
        Commands::History { store_root, command } => {
            let store = history_store(store_root.as_deref())?;
            match command {
                HistoryCommands::List => run_history_list(&store),
                HistoryCommands::Add { file } => run_history_add(&store, &file),
                HistoryCommands::Promote { id } => {
                    store.promote(&id).context("failed to update signature history")
                }
                HistoryCommands::Remove { id } => {
                    store.remove(&id).context("failed to update signature history")
                }
            }
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let bytes = fs::read(file)?;
    let sizes = page_sizes(&bytes).context("failed to open PDF")?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: sizes.len() as u32,
        pages: sizes
            .iter()
            .enumerate()
            .map(|(index, size)| PageInfoOutput {
                page: index as u32 + 1,
                width: size.width,
                height: size.height,
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_sign(
    file: &Path,
    placements_path: &Path,
    output: Option<&Path>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let text = fs::read_to_string(placements_path).with_context(|| {
        format!("failed to read placements file {}", placements_path.display())
    })?;
    let placements: PlacementsFile =
        serde_json::from_str(&text).context("failed to parse placements JSON")?;

    anyhow::ensure!(!placements.signatures.is_empty(), "placements file contains no signatures");

    let mut registry = PageGeometryRegistry::new();
    for page in &placements.pages {
        registry.register(
            page.page,
            SurfaceRect {
                left: 0.0,
                top: 0.0,
                width: page.rendered_width,
                height: page.rendered_height,
            },
            NativeSize {
                width: page.native_width.unwrap_or(page.rendered_width),
                height: page.native_height.unwrap_or(page.rendered_height),
            },
        );
    }

    let overlays: Vec<Overlay> = placements
        .signatures
        .iter()
        .enumerate()
        .map(|(index, input)| Overlay {
            id: OverlayId(index as u64 + 1),
            image: ImageRef(input.image.clone()),
            x: input.x,
            y: input.y,
            width: input.width,
            height: input.height,
            page: input.page,
        })
        .collect();

    for overlay in &overlays {
        anyhow::ensure!(
            overlay.width > 0.0 && overlay.height > 0.0,
            "signature on page {} has non-positive dimensions",
            overlay.page
        );
    }

    let resolver = CliImageResolver {
        base: placements_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    };

    let gate = BakeGate::new();
    let _ticket = gate.try_acquire()?;

    let options = BakeOptions { timeout: timeout_ms.map(Duration::from_millis) };
    let base_bytes = fs::read(file)?;
    let baked = bake(&base_bytes, &overlays, &registry, &resolver, &options)
        .context("failed to bake signatures")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_signed_output(file));
    signature_store::write_document(&output, &baked)
        .with_context(|| format!("failed to write signed PDF to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_history_list(store: &SignatureStore) -> Result<()> {
    let records = store.list().context("failed to read signature history")?;
    let json = serde_json::to_string_pretty(&records)?;
    println!("{json}");

    Ok(())
}

fn run_history_add(store: &SignatureStore, file: &Path) -> Result<()> {
    let bytes =
        fs::read(file).with_context(|| format!("failed to read image {}", file.display()))?;

    let format = image::guess_format(&bytes).context("unrecognized image format")?;
    let mime = format.to_mime_type();

    let record = store
        .add(signature_store::data_url::encode(mime, &bytes))
        .context("failed to save signature")?;

    let json = serde_json::to_string_pretty(&record)?;
    println!("{json}");

    Ok(())
}

fn history_store(root: Option<&Path>) -> Result<SignatureStore> {
    match root {
        Some(root) => Ok(SignatureStore::with_root(root)),
        None => SignatureStore::from_default_project()
            .context("failed to resolve signature store directory"),
    }
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_signed_output(file: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-signed.pdf"))
}
