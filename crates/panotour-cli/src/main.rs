//! Panotour CLI
//!
//! Authoring tools for krpano panoramic tours:
//! - `serve`: upload server that stores panoramas and appends scenes to `tour.xml`
//! - `init`: create the tour directories and an empty tour document
//! - `scene list` / `scene add`: inspect or extend a tour from the command line

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use panotour_storage::{SceneAppendService, SceneFields, TourLayout, TourStore};
use panotour_tour::ScenePolicy;

mod server;

#[derive(Parser)]
#[command(name = "panotour")]
#[command(author, version, about = "Panotour: panoramic tour authoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the upload server.
    ///
    /// Serves:
    /// - `POST <route>` multipart upload (`pano`, `sceneName`, `ath`, `atv`, `linkedscene`)
    /// - `GET /healthz`
    /// - static files from `--root` (viewer pages, `tour.xml`, stored panoramas)
    Serve(ServeArgs),

    /// Create the staging/asset directories and an empty `tour.xml` if missing.
    Init {
        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Inspect or extend the scenes of a tour.
    Scene {
        #[command(subcommand)]
        command: SceneCommands,
    },
}

#[derive(Subcommand)]
enum SceneCommands {
    /// List the scenes of a tour document.
    List {
        /// Tour document to read.
        #[arg(long, default_value = TourLayout::DEFAULT_TOUR_FILE)]
        tour: PathBuf,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Store a local panorama and append a scene for it.
    Add(SceneAddArgs),
}

/// Where the tour lives on disk.
#[derive(Args, Debug, Clone)]
struct LayoutArgs {
    /// Tour root; relative paths below resolve against it.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Tour document.
    #[arg(long, default_value = TourLayout::DEFAULT_TOUR_FILE)]
    tour: PathBuf,

    /// Directory uploads are written to before they are moved.
    #[arg(long, default_value = TourLayout::DEFAULT_STAGING_DIR)]
    staging_dir: PathBuf,

    /// Directory stored panoramas are moved into.
    #[arg(long, default_value = TourLayout::DEFAULT_ASSET_DIR)]
    asset_dir: PathBuf,

    /// Prefix of `<cube url>` values, relative to the tour document.
    #[arg(long, default_value = TourLayout::DEFAULT_ASSET_DIR)]
    asset_url_prefix: String,
}

impl LayoutArgs {
    fn to_layout(&self) -> TourLayout {
        TourLayout {
            root: self.root.clone(),
            tour_file: self.tour.clone(),
            staging_dir: self.staging_dir.clone(),
            asset_dir: self.asset_dir.clone(),
            asset_url_prefix: self.asset_url_prefix.clone(),
        }
    }
}

/// Optional checks on new scenes. All off by default.
#[derive(Args, Debug, Clone, Default)]
struct PolicyArgs {
    /// Reject a scene whose name already exists in the tour.
    #[arg(long)]
    reject_duplicate_names: bool,

    /// Reject hotspot angles that are not finite numbers.
    #[arg(long)]
    require_numeric_angles: bool,

    /// Reject a non-empty `linkedscene` that names no existing scene.
    #[arg(long)]
    require_known_linkedscene: bool,
}

impl PolicyArgs {
    fn to_policy(&self) -> ScenePolicy {
        ScenePolicy {
            reject_duplicate_names: self.reject_duplicate_names,
            require_numeric_angles: self.require_numeric_angles,
            require_known_linkedscene: self.require_known_linkedscene,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Full listen address; overrides `--host`/`--port` (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Bind address.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,

    /// Bind port.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    /// Upload route (`/` or `/upload` in existing deployments).
    #[arg(long, default_value = "/")]
    route: String,

    /// Success response: `redirect` (302 to `--redirect-to`) or `link` (HTML link to `--viewer-url`).
    #[arg(long, default_value = "redirect")]
    response: String,

    /// Redirect target for `--response redirect`.
    #[arg(long, default_value = "/index.html")]
    redirect_to: String,

    /// Tour viewer linked from `--response link`.
    #[arg(long, default_value = "/tour.html")]
    viewer_url: String,

    /// Maximum size of one multipart request body.
    #[arg(long, default_value_t = 256 * 1024 * 1024)]
    max_upload_bytes: u64,

    /// If set, write a small JSON file once the server is listening.
    ///
    /// Useful for scripts/tests to learn the chosen port when `--listen ...:0`.
    #[arg(long)]
    ready_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct SceneAddArgs {
    /// Panorama image to store (copied; the original stays in place).
    #[arg(long)]
    image: PathBuf,

    /// Scene name (also used as title).
    #[arg(long)]
    name: String,

    /// Hotspot horizontal angle.
    #[arg(long, default_value = "0")]
    ath: String,

    /// Hotspot vertical angle.
    #[arg(long, default_value = "0")]
    atv: String,

    /// Scene the hotspot links to.
    #[arg(long, default_value = "")]
    linkedscene: String,

    #[command(flatten)]
    layout: LayoutArgs,

    #[command(flatten)]
    policy: PolicyArgs,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;
    Ok(rt.block_on(future))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve(args) => server::cmd_serve(args),
        Commands::Init { layout } => cmd_init(&layout.to_layout()),
        Commands::Scene { command } => match command {
            SceneCommands::List { tour, json } => cmd_scene_list(&tour, json),
            SceneCommands::Add(args) => cmd_scene_add(args),
        },
    }
}

fn cmd_init(layout: &TourLayout) -> Result<()> {
    let created = block_on(async {
        layout.ensure_dirs().await?;
        layout.init_tour().await
    })??;

    println!(
        "{} {} {}",
        "ok".green().bold(),
        layout.staging_path().display(),
        layout.asset_path().display()
    );
    if created {
        println!("{} {}", "wrote".green().bold(), layout.tour_path().display().to_string().bold());
    } else {
        println!("  {} {} (kept)", "→".cyan(), layout.tour_path().display());
    }
    Ok(())
}

fn cmd_scene_list(tour: &Path, json: bool) -> Result<()> {
    let document = block_on(TourStore::new(tour).load())??;
    let scenes = document.scenes();

    if json {
        println!("{}", serde_json::to_string_pretty(&scenes)?);
        return Ok(());
    }

    println!("{} {} ({} scenes)", "Tour".green().bold(), tour.display(), scenes.len());
    for scene in &scenes {
        println!(
            "  {} {}",
            scene.name.yellow(),
            scene.image_url().unwrap_or("-").cyan()
        );
        for hotspot in &scene.hotspots {
            if hotspot.linkedscene.is_empty() {
                continue;
            }
            println!(
                "    {} {} (ath={}, atv={})",
                "→".cyan(),
                hotspot.linkedscene,
                hotspot.ath,
                hotspot.atv
            );
        }
    }
    Ok(())
}

fn cmd_scene_add(args: SceneAddArgs) -> Result<()> {
    if !args.image.is_file() {
        return Err(anyhow!("scene add: `{}` is not a file", args.image.display()));
    }
    let layout = args.layout.to_layout();
    let service = SceneAppendService::new(&layout, args.policy.to_policy());
    let fields = SceneFields {
        scene_name: args.name,
        ath: args.ath,
        atv: args.atv,
        linkedscene: args.linkedscene,
    };

    let added = block_on(async {
        layout.ensure_dirs().await?;
        let staged = service.assets().stage_copy(&args.image).await?;
        service.append(staged, fields).await
    })??;

    println!(
        "{} scene {} (#{}) → {}",
        "ok".green().bold(),
        added.scene.name.yellow(),
        added.index,
        added.asset.url.cyan()
    );
    Ok(())
}
