use clap::{Parser, Subcommand};
use iiif_server::config::{self, ServerConfig};
use iiif_server::iiif::parse_identifier;
use iiif_server::service::ImageService;
use iiif_server::{output, serve};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "iiif-server")]
#[command(about = "IIIF Image API 2 server backed by ImageMagick")]
#[command(long_about = "\
IIIF Image API 2 server backed by ImageMagick

Source images live flat in the images directory, named by identifier:

  images/
  ├── cat.jpg
  ├── cat.png          # same identifier, second stored format
  └── map.tif

Request grammar:

  /{prefix}/{identifier}/{region}/{size}/{rotation}/{quality}.{format}

  region    full | x,y,w,h | pct:x,y,w,h
  size      full | w, | ,h | w,h | !w,h | pct:n
  rotation  0-360, prefix ! to mirror first
  quality   default | color | gray | bitonal
  format    jpg | tif | png | gif | jp2 | pdf | webp

Rendered responses are cached under the cache directory, one file per
request, and never evicted.

Run 'iiif-server gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (missing file = all defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the IIIF API over HTTP
    Serve {
        /// Listen port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the info.json summary for an identifier
    Info {
        identifier: String,
        /// URL prefix the identifier is published under
        #[arg(long, default_value = "iiif")]
        prefix: String,
        /// Print the raw info.json document
        #[arg(long)]
        json: bool,
    },
    /// Render an image request path, e.g. /iiif/cat/full/full/0/default.jpg
    Render {
        path: String,
        /// Write the image here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show the convert arguments for an image request path without running it
    Plan { path: String },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let load = || config::load_config(&cli.config);

    match cli.command {
        Command::Serve { port } => {
            let mut config = load()?;
            if let Some(port) = port {
                config.server.port = port;
                config.validate()?;
            }
            serve_forever(&config)?;
        }
        Command::Info {
            identifier,
            prefix,
            json,
        } => {
            let service = ImageService::from_config(&load()?);
            let id = parse_identifier(&identifier)?;
            let doc = service.info(&id, &prefix)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                output::print_info(&identifier, &doc);
            }
        }
        Command::Render { path, output: dest } => {
            let service = ImageService::from_config(&load()?);
            let rendered = service.render(&path)?;
            match dest {
                Some(dest) => {
                    std::fs::write(&dest, &rendered.entry.bytes)?;
                    output::print_render(&dest, &rendered);
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&rendered.entry.bytes)?;
                    stdout.flush()?;
                }
            }
            log::info!("Cache: {}", service.cache().stats());
        }
        Command::Plan { path } => {
            let service = ImageService::from_config(&load()?);
            let plan = service.plan(&path)?;
            output::print_plan(&path, &plan);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn serve_forever(config: &ServerConfig) -> Result<(), serve::ServeError> {
    let service = Arc::new(ImageService::from_config(config));
    log::info!(
        "images from {}, cache in {}{}",
        config.images_dir,
        config.cache_dir,
        if config.cache.enabled { "" } else { " (disabled)" }
    );
    serve::run(
        service,
        &config.server.address(),
        config::effective_threads(&config.server),
    )
}
