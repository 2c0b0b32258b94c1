//! Strata CLI
//!
//! Offline front end for the style compiler and tessellator:
//! - `compile`: type-check a style and emit its WGSL programs
//! - `tessellate`: build one decoded tile under a style
//! - `hash`: print a style's cache key
//! - `config`: print the effective configuration

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_gpu::{BuildOutcome, DecodedTile, Tessellator, TileCache};
use strata_style::{compile, parse_style, CompiledStyle, ShaderProgram, StyleHash, StyleSpec, VertexLayout};

use crate::config::StrataConfig;

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Compile map styles to GPU programs and tessellate tiles")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./strata.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a style and report its attribute layout and programs
    Compile {
        /// Style specification (JSON)
        style: PathBuf,

        /// Write `<kind>.vert.wgsl` and `<kind>.frag.wgsl` into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Tessellate a decoded tile (JSON) under a style
    Tessellate {
        style: PathBuf,
        tile: PathBuf,
    },

    /// Print the style hash used as a cache key
    Hash { style: PathBuf },

    /// Print the effective configuration as TOML
    Config,
}

/// JSON view of a compiled style
#[derive(Serialize)]
struct CompileReport<'a> {
    hash: StyleHash,
    layout: VertexLayout,
    uniform_bytes: usize,
    programs: &'a [ShaderProgram],
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = StrataConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config.with_env_overrides();

    match cli.command {
        Command::Compile { style, out, json } => cmd_compile(&style, out.as_deref(), json),
        Command::Tessellate { style, tile } => cmd_tessellate(&config, &style, &tile),
        Command::Hash { style } => {
            let spec = load_style(&style)?;
            let parsed = parse_style(&spec)?;
            println!("{}", parsed.hash());
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_style(path: &Path) -> Result<StyleSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    StyleSpec::from_json_str(&content).with_context(|| format!("Invalid style {}", path.display()))
}

fn compile_style(path: &Path) -> Result<CompiledStyle> {
    let spec = load_style(path)?;
    compile(&spec).with_context(|| format!("Failed to compile {}", path.display()))
}

fn cmd_compile(path: &Path, out: Option<&Path>, json: bool) -> Result<()> {
    let style = compile_style(path)?;
    tracing::info!(style = %style.hash(), "compiled {}", path.display());

    if let Some(dir) = out {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        for program in style.programs() {
            for (stage, source) in [
                ("vert", &program.vertex_source),
                ("frag", &program.fragment_source),
            ] {
                let file = dir.join(format!("{}.{stage}.wgsl", program.kind));
                fs::write(&file, source)
                    .with_context(|| format!("Failed to write {}", file.display()))?;
                tracing::info!("wrote {}", file.display());
            }
        }
    }

    if json {
        let report = CompileReport {
            hash: style.hash(),
            layout: style.plan().vertex_layout(),
            uniform_bytes: style.uniforms().byte_size(),
            programs: style.programs(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("style {}", style.hash());
    println!("  vertex stride: {} bytes", style.plan().vertex_stride_bytes());
    for attribute in style.plan().attributes() {
        println!(
            "  attribute {} ({}, {:?}) at float {}",
            attribute.name, attribute.ty, attribute.quantization, attribute.offset
        );
    }
    println!("  uniform block: {} bytes", style.uniforms().byte_size());
    for property in style.properties() {
        println!("  {} -> {:?}", property.property, property.tier);
    }
    for program in style.programs() {
        println!("  program {}", program.kind);
    }
    Ok(())
}

fn cmd_tessellate(config: &StrataConfig, style_path: &Path, tile_path: &Path) -> Result<()> {
    let style = Arc::new(compile_style(style_path)?);
    let content = fs::read_to_string(tile_path)
        .with_context(|| format!("Failed to read {}", tile_path.display()))?;
    let tile = Arc::new(
        DecodedTile::from_json_str(&content)
            .with_context(|| format!("Invalid tile {}", tile_path.display()))?,
    );

    let cache: TileCache<()> = TileCache::new(
        Tessellator::new(config.tessellation.clone()),
        config.cache.clone(),
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let outcome = runtime.block_on(cache.get_or_build(tile, style))?;

    let BuildOutcome::Ready(buffers) = outcome else {
        anyhow::bail!("tile build was abandoned");
    };

    for warning in &buffers.warnings {
        tracing::warn!("{}", warning);
    }
    println!("tile {} (generation {})", buffers.tile, buffers.generation);
    println!("  features: {}", buffers.feature_count);
    println!("  vertices: {} ({} bytes)", buffers.vertex_count(), buffers.vertex_bytes().len());
    println!("  indices: {}", buffers.indices.len());
    for range in &buffers.draw_ranges {
        println!(
            "  draw {}: indices {}..{}",
            range.kind,
            range.first_index,
            range.first_index + range.index_count
        );
    }
    for symbol in &buffers.symbols {
        println!(
            "  symbol at ({}, {}): icon={:?} text={:?}",
            symbol.position[0], symbol.position[1], symbol.icon, symbol.text
        );
    }
    println!("  warnings: {}", buffers.warnings.len());
    Ok(())
}
