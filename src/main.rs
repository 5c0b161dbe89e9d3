//! Command-line front end for zipserve.
//!
//! Resolves request paths against a data directory the same way the HTTP
//! routes would, and writes response bodies to stdout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tokio::io::AsyncWrite;

use zipserve::cli::Command;
use zipserve::mount::NodeKind;
use zipserve::{
    Archive, Cli, ContentResolver, Method, Mount, Resolution, Status, WriterSender, logging,
    respond,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.log_filter());

    let mount = Mount::new(&cli.data_dir)?.with_extension(cli.extension.as_str());

    match &cli.command {
        Command::Get { path, head, output } => {
            let resolver = ContentResolver::new(mount).with_depth(cli.depth);
            get(&resolver, path, *head, output.as_deref()).await
        }
        Command::List => {
            list(&mount).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Entries { name, long } => {
            entries(&mount, name, *long).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Route one request and deliver the result.
///
/// The status line (and `Location` for redirects) goes to stderr, the body to
/// stdout or `output`. Anything but a 200 exits non-zero.
async fn get(
    resolver: &ContentResolver,
    path: &str,
    head: bool,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let method = if head { Method::Head } else { Method::Get };
    let resolution = resolver.route(method, path).await?;

    let has_body = matches!(resolution, Resolution::Listing(_)) || resolution.file().is_some();
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match output {
        Some(output) if has_body && !head => Box::new(
            tokio::fs::File::create(output)
                .await
                .with_context(|| format!("Failed to create {}", output.display()))?,
        ),
        _ => Box::new(tokio::io::stdout()),
    };

    let mut sender = WriterSender::new(writer);
    let status = respond(&mut sender, &resolution, head).await?;

    eprintln!("{status}");
    if let Some(location) = sender.location() {
        eprintln!("Location: {location}");
    }
    if let Some(length) = sender.content_length() {
        eprintln!("Content-Length: {length}");
    }

    Ok(if status == Status::Ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print the archives found at the mount root.
async fn list(mount: &Mount) -> Result<()> {
    let archives = mount.list_archives().await?;
    for archive in &archives {
        println!(
            "{:>12}  {}  {}",
            format_size(archive.size),
            archive.file_name,
            archive.contents_href()
        );
    }
    eprintln!("{} archives", archives.len());
    Ok(())
}

/// List the entries of `{name}.{ext}`, in archive order.
///
/// The long format is a table with size, compression ratio and timestamps.
async fn entries(mount: &Mount, name: &str, long: bool) -> Result<()> {
    let file_name = mount.archive_file_name(name);
    if mount.inspect(&file_name).await? != Some(NodeKind::File) {
        bail!("No such archive: {}", file_name);
    }

    let mut archive = Archive::open(mount.archive_path(name));
    let entries = archive.find_all(|_| true).await;
    archive.close();
    let entries = entries?;

    if !long {
        for entry in &entries {
            println!("{}", entry.name);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );

    Ok(())
}

/// Space saved by compression, as a right-aligned percentage.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed == 0 || compressed >= uncompressed {
        return "  0%".to_string();
    }
    format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
