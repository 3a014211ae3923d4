use std::io::Write;
use std::sync::Arc;

use media_grabber::cli::{collect_urls, load_urls, Cli, StdinFormatChooser};
use media_grabber::downloader::extractors::YtDlpBackend;
use media_grabber::downloader::tools::ToolManager;
use media_grabber::MediaDownloader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let default_filter = if cli.verbose { "media_grabber=debug,info" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.tools {
        for tool in ToolManager::new().get_all_tools() {
            println!(
                "{:<8} {:<10} {}",
                tool.name,
                tool.version.as_deref().unwrap_or("-"),
                tool.path.as_deref().unwrap_or("not found"),
            );
        }
        return;
    }

    let settings = cli.settings();
    println!("Universal media downloader (videos + images + gifs)");
    println!("Videos will be saved to: {}", settings.videos_dir.display());
    println!("Images will be saved to: {}", settings.images_dir.display());
    if let Some(cookies) = &settings.cookie_file {
        println!("Using cookies from: {}", cookies.display());
    }

    let (urls, from_file) = if cli.inputs.is_empty() {
        print!("Enter URLs or path to file: ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() || line.trim().is_empty() {
            println!("No input provided. Exiting.");
            return;
        }
        load_urls(&line)
    } else {
        collect_urls(&cli.inputs)
    };
    if urls.is_empty() {
        println!("No URLs found. Exiting.");
        return;
    }
    let batch_mode = cli.batch || from_file;

    let backend = if cli.python {
        YtDlpBackend::python_module()
    } else {
        YtDlpBackend::new()
    };
    let downloader = match MediaDownloader::standard(settings, backend) {
        Ok(d) => d.with_chooser(Arc::new(StdinFormatChooser)),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise downloader");
            std::process::exit(1);
        }
    };

    let cancel = downloader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = downloader.run_queue(&urls, batch_mode).await;
    tracing::info!(
        processed = report.processed,
        saved = report.saved.len(),
        nothing_found = report.nothing_found.len(),
        failed = report.failed.len(),
        canceled = report.canceled,
        "done"
    );
}
