//! repdf CLI - PDF rendering and recompression tool

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use repdf::{
    compress_document_with_stats, load_file_with_options, render_document, CompressOptions,
    ImageFormat, LoadOptions, RenderOptions,
};

#[derive(Parser)]
#[command(name = "repdf")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Render PDF pages to images and recompress PDFs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render each page to an image file
    Render {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory (defaults to <stem>_pages)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Output image format
        #[arg(long, value_enum, default_value = "webp")]
        format: OutputFormat,

        /// Encoding quality (0-100)
        #[arg(short, long, default_value = "80")]
        quality: i64,

        /// Longest output edge in pixels (0 = native size at 150 DPI)
        #[arg(long, default_value = "0")]
        max_edge: u32,

        /// Recover from broken cross-reference data
        #[arg(long)]
        lenient: bool,

        /// Render pages one at a time instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Recompress embedded images to shrink the file
    Compress {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to <stem>_compressed.pdf)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Re-encoding quality (0-100)
        #[arg(short, long, default_value = "80")]
        quality: i64,

        /// Recover from broken cross-reference data
        #[arg(long)]
        lenient: bool,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Lossy WebP
    Webp,
    /// Lossy JPEG
    Jpeg,
    /// Lossless PNG
    Png,
}

impl From<OutputFormat> for ImageFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Webp => ImageFormat::Webp,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            input,
            output,
            format,
            quality,
            max_edge,
            lenient,
            sequential,
        } => cmd_render(
            &input,
            output.as_deref(),
            format,
            quality,
            max_edge,
            lenient,
            sequential,
        ),
        Commands::Compress {
            input,
            output,
            quality,
            lenient,
        } => cmd_compress(&input, output.as_deref(), quality, lenient),
        Commands::Info { input, json } => cmd_info(&input, json),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_options(lenient: bool) -> LoadOptions {
    if lenient {
        LoadOptions::new().lenient()
    } else {
        LoadOptions::new()
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_render(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    quality: i64,
    max_edge: u32,
    lenient: bool,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = output.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        PathBuf::from(format!("{}_pages", stem))
    });
    fs::create_dir_all(&output_dir)?;

    let doc = load_file_with_options(input, load_options(lenient))?;

    let mut options = RenderOptions::new()
        .with_format(format.into())
        .with_quality(quality)
        .with_max_edge_size(max_edge);
    if sequential {
        options = options.sequential();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(format!("Rendering {} pages...", doc.page_count()));
    let output = render_document(&doc, &options);
    pb.finish_and_clear();

    let pb = ProgressBar::new(output.pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message("Writing images...");

    let extension = ImageFormat::from(format).extension();
    for page in &output.pages {
        let filename = format!("page-{:03}.{}", page.index + 1, extension);
        fs::write(output_dir.join(&filename), &page.data)?;
        for warning in &page.warnings {
            log::warn!("page {}: {}", page.index + 1, warning);
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done!");

    println!(
        "\n{} {} pages -> {}",
        "Rendered".green().bold(),
        output.pages.len(),
        output_dir.display()
    );
    for failure in &output.failures {
        println!(
            "  {} page {}: {}",
            "skipped".yellow(),
            failure.index + 1,
            failure.error
        );
    }
    if !output.is_complete() {
        std::process::exit(2);
    }

    Ok(())
}

fn cmd_compress(
    input: &Path,
    output: Option<&Path>,
    quality: i64,
    lenient: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_path = output.map(|p| p.to_path_buf()).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        PathBuf::from(format!("{}_compressed.pdf", stem))
    });

    let doc = load_file_with_options(input, load_options(lenient))?;
    let options = CompressOptions::new().with_quality(quality);

    let pb = ProgressBar::new_spinner();
    pb.set_message("Recompressing images...");
    let (bytes, stats) = compress_document_with_stats(&doc, &options)?;
    pb.finish_and_clear();

    fs::write(&output_path, &bytes)?;

    let saved = stats.bytes_in.saturating_sub(stats.bytes_out);
    let percent = if stats.bytes_in > 0 {
        saved as f64 * 100.0 / stats.bytes_in as f64
    } else {
        0.0
    };
    println!("{} {}", "Saved to".green().bold(), output_path.display());
    println!(
        "  {}: {} -> {} bytes ({:.1}% smaller)",
        "Size".bold(),
        stats.bytes_in,
        stats.bytes_out,
        percent
    );
    println!(
        "  {}: {} recompressed, {} kept",
        "Images".bold(),
        stats.images_recompressed,
        stats.images_kept
    );

    Ok(())
}

fn cmd_info(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Lenient here: metadata should surface even from damaged files.
    let doc = load_file_with_options(input, LoadOptions::new().lenient())?;
    let images = repdf::compress::scan_images(&doc)?;

    if json {
        let value = serde_json::json!({
            "info": doc.info(),
            "images": images,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let info = doc.info();
    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: PDF {}", "Format".bold(), info.pdf_version);
    println!("{}: {}", "Pages".bold(), info.page_count);
    println!(
        "{}: {}",
        "Encrypted".bold(),
        if info.encrypted { "Yes" } else { "No" }
    );

    if let Some(ref title) = info.title {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(ref author) = info.author {
        println!("{}: {}", "Author".bold(), author);
    }
    if let Some(ref subject) = info.subject {
        println!("{}: {}", "Subject".bold(), subject);
    }
    if let Some(ref keywords) = info.keywords {
        println!("{}: {}", "Keywords".bold(), keywords);
    }
    if let Some(ref creator) = info.creator {
        println!("{}: {}", "Creator".bold(), creator);
    }
    if let Some(ref producer) = info.producer {
        println!("{}: {}", "Producer".bold(), producer);
    }
    if let Some(ref created) = info.created {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(ref modified) = info.modified {
        println!("{}: {}", "Modified".bold(), modified);
    }

    println!();
    println!("{}", "Pages".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for (index, page) in doc.pages().iter().enumerate() {
        let (w, h) = page.size_points();
        println!("  {:>3}: {:.0} x {:.0} pt", index + 1, w, h);
    }

    println!();
    println!("{}", "Embedded Images".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    if images.is_empty() {
        println!("  (none)");
    }
    for image in &images {
        println!(
            "  {:>4}: {}x{} {} {}bpc {} ({} bytes)",
            image.object.0,
            image.width,
            image.height,
            image.color_space,
            image.bits_per_component,
            image.filter.as_deref().unwrap_or("raw"),
            image.encoded_len
        );
    }

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "repdf".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("PDF rendering and recompression tool");
    println!();
    println!("Repository: {}", "https://github.com/iyulab/repdf".dimmed());
    println!("License: MIT");
}
