//! glbridge CLI - tools for working with bridge artifacts
//!
//! Commands:
//!   glbridge inspect <artifact>       - Display imports, exports and binding coverage
//!   glbridge add <artifact> <a> <b>   - Instantiate and call `add`
//!   glbridge run <artifact>           - Drive `render` frames against a surface

use clap::{Parser, Subcommand};
use glbridge::artifact::{ArtifactDigest, ArtifactLocation, Fetch, FsFetcher, FuncSignature, Manifest};
use glbridge::{
    BridgeConfig, FrameDriver, HostSession, IntervalScheduler, Loader, SurfaceHost,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "glbridge")]
#[command(about = "Load and drive glbridge artifacts", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect an artifact and display its imports, exports and binding coverage
    Inspect {
        /// Path or URI of the artifact
        artifact: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Instantiate an artifact and call `add(a, b)`
    Add {
        artifact: String,
        #[arg(allow_hyphen_values = true)]
        a: i32,
        #[arg(allow_hyphen_values = true)]
        b: i32,
    },
    /// Instantiate an artifact and render frames into a surface
    Run {
        artifact: String,

        /// Surface identifier handed to `render`
        #[arg(long, default_value = "canvas")]
        surface: String,

        #[arg(long, default_value = "64")]
        width: u32,

        #[arg(long, default_value = "64")]
        height: u32,

        /// Number of frames to render
        #[arg(long, default_value = "60")]
        frames: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };

    let filter = if cli.verbose {
        "debug"
    } else {
        config.log_filter.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { artifact, json } => inspect_command(&artifact, json).await,
        Commands::Add { artifact, a, b } => add_command(config, artifact, a, b).await,
        Commands::Run {
            artifact,
            surface,
            width,
            height,
            frames,
        } => run_command(config, artifact, &surface, width, height, frames).await,
    }
}

async fn inspect_command(artifact: &str, json: bool) -> anyhow::Result<()> {
    let location = ArtifactLocation::parse(artifact)?;
    let bytes = FsFetcher::new().fetch(&location).await?;
    let digest = ArtifactDigest::of(&bytes);

    let manifest = Manifest::parse(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", location, e))?;

    if json {
        print_json(&manifest, &digest)
    } else {
        print_manifest(&manifest, &digest);
        Ok(())
    }
}

fn format_signature(signature: &Option<FuncSignature>) -> String {
    match signature {
        Some(sig) => sig.to_string(),
        None => "(not a function)".to_string(),
    }
}

fn print_manifest(manifest: &Manifest, digest: &ArtifactDigest) {
    println!("sha256: {digest}");

    if !manifest.imports.is_empty() {
        println!("imports:");
        for import in &manifest.imports {
            println!(
                "  {}.{}: {}",
                import.module,
                import.name,
                format_signature(&import.signature)
            );
        }
    }

    if !manifest.exports.is_empty() {
        println!("exports:");
        for export in &manifest.exports {
            println!("  {}: {}", export.name, format_signature(&export.signature));
        }
    }

    println!("bindings:");
    for (descriptor, ok) in manifest.binding_coverage() {
        let params = descriptor
            .params
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {}({}) -> {}: {}",
            descriptor.name,
            params,
            descriptor.ret.name(),
            if ok { "ok" } else { "missing or mismatched" }
        );
    }
}

fn print_json(manifest: &Manifest, digest: &ArtifactDigest) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "sha256": digest.to_string(),
        "imports": manifest.imports,
        "exports": manifest.exports,
        "bindings": manifest.binding_coverage().iter().map(|(d, ok)| serde_json::json!({
            "name": d.name,
            "params": d.params,
            "ret": d.ret,
            "ok": ok,
        })).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn add_command(config: BridgeConfig, artifact: String, a: i32, b: i32) -> anyhow::Result<()> {
    let loader = Loader::new(config, SurfaceHost::new())?;
    let mut module = loader.instantiate(move || artifact).await?;
    println!("{}", module.add(a, b)?);
    Ok(())
}

async fn run_command(
    config: BridgeConfig,
    artifact: String,
    surface: &str,
    width: u32,
    height: u32,
    frames: u64,
) -> anyhow::Result<()> {
    let surfaces = SurfaceHost::new();
    surfaces.insert(surface, width, height)?;

    let loader = Loader::new(config, surfaces.clone())?;
    let mut session = HostSession::start(loader, move || artifact);

    let driver = FrameDriver::new(surface);
    let refresh_hz = session.loader().config().refresh_hz;
    let mut scheduler = IntervalScheduler::new(refresh_hz).with_frame_limit(frames);
    let report = driver.run_session(&mut session, &mut scheduler).await;

    if let Some(e) = session.failure() {
        anyhow::bail!("instantiation failed: {e}");
    }

    println!(
        "frames: {} drawn: {} failed: {} skipped: {}",
        report.frames, report.drawn, report.failed, report.skipped
    );
    if let Some(reason) = &report.last_failure {
        println!("last failure: {reason}");
    }
    let [r, g, b, a] = surfaces.pixel(surface, width / 2, height / 2)?;
    println!("center pixel: ({r}, {g}, {b}, {a})");
    Ok(())
}
