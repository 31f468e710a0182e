use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use url::Url;

use scephoto_sync::config::Config;
use scephoto_sync::feed::{DocumentCache, HttpFeedSource};
use scephoto_sync::model::MasterFeedContent;
use scephoto_sync::sync::{ContentCache, DataManager, MediaCache, SyncEvent, UpdateReport};

/// Get the config directory path (~/.config/scephoto/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("scephoto"))
}

#[derive(Parser, Debug)]
#[command(
    name = "scephoto-sync",
    about = "Sync a CSX/SSE/Media RSS photo feed hierarchy"
)]
struct Args {
    /// Config file (defaults to ~/.config/scephoto/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Master feed URI (overrides `feed_uri` in the config file)
    #[arg(long, value_name = "URI")]
    feed: Option<Url>,

    /// Cache directory for feed documents and media
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Only load from the local cache, never touch the network
    #[arg(long)]
    offline: bool,

    /// Download images, thumbnails and description files after the feeds
    #[arg(long)]
    download_media: bool,

    /// Print the merged content tree as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let Some(feed_uri) = args.feed.clone().or_else(|| config.feed_uri.clone()) else {
        eprintln!("Error: No master feed configured.");
        eprintln!();
        eprintln!("Pass one on the command line:");
        eprintln!("  scephoto-sync --feed http://photos.example.com/feeds/master.xml");
        eprintln!();
        eprintln!("Or set `feed_uri` in {}.", config_path.display());
        std::process::exit(1);
    };

    let cache_dir = args
        .cache_dir
        .clone()
        .or_else(|| config.cache_dir.clone())
        .unwrap_or_else(|| config_dir.join("cache"));
    create_private_dir(&cache_dir)?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("scephoto-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let source = HttpFeedSource::new(client)
        .with_timeout(config.request_timeout())
        .with_max_size(config.max_feed_size_bytes)
        .with_backoff(config.retry_backoff());
    let feed_source = source
        .clone()
        .with_cache(DocumentCache::new(cache_dir.join("feeds")));

    let (event_tx, event_rx) = mpsc::channel::<SyncEvent>(256);
    let events = tokio::spawn(log_events(event_rx));

    let manager = DataManager::new(feed_source, feed_uri).with_events(event_tx);
    let (report, content) = if args.download_media || config.download_media {
        let media = MediaCache::new(source, DocumentCache::new(cache_dir.join("media")))
            .with_concurrency(config.max_concurrent_downloads);
        run(manager.with_cache(media), args.offline).await?
    } else {
        run(manager, args.offline).await?
    };

    // All senders are gone once the manager is dropped inside `run`.
    events.await.context("Event logger task failed")?;

    if args.json {
        let tree = serde_json::to_string_pretty(&content).context("Failed to serialize content")?;
        println!("{tree}");
    } else {
        print_summary(&report, content.as_ref());
    }

    if !report.succeeded() {
        std::process::exit(2);
    }
    Ok(())
}

/// Loads the cached tree, then (unless offline) runs one update. Ctrl-C
/// cancels the running pass.
async fn run<C: ContentCache>(
    manager: DataManager<HttpFeedSource, C>,
    offline: bool,
) -> Result<(UpdateReport, Option<MasterFeedContent>)> {
    let cached = manager
        .load_cached_data()
        .await
        .context("Failed to load cached data")?;
    if offline {
        return Ok((cached, manager.content()));
    }

    let update = manager.update();
    tokio::pin!(update);
    let report = tokio::select! {
        report = &mut update => report,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Canceling...");
            manager.cancel();
            update.await
        }
    }
    .context("Update failed")?;

    Ok((report, manager.content()))
}

async fn log_events(mut events: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::UpdateProgressChanged { percent } => {
                tracing::debug!(percent, "Progress");
            }
            SyncEvent::UpdateCompleted {
                error: Some(error), ..
            }
            | SyncEvent::LoadCachedDataCompleted {
                error: Some(error), ..
            } => {
                tracing::warn!(error = %error, "Sync pass finished with errors");
            }
            other => tracing::info!(event = ?other, "Sync event"),
        }
    }
}

fn create_private_dir(dir: &std::path::Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to set cache directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to read cache directory metadata"
                );
            }
        }
    }
    Ok(())
}

fn print_summary(report: &UpdateReport, content: Option<&MasterFeedContent>) {
    match content {
        Some(content) => {
            println!("{}", content.channel.title);
            for gallery in &content.photo_galleries {
                println!(
                    "  {} ({} albums)",
                    gallery.channel.title,
                    gallery.photo_albums.len()
                );
                for album in &gallery.photo_albums {
                    let new = album.photos.iter().filter(|p| p.item.is_new).count();
                    println!(
                        "    {} ({} photos, {} new)",
                        album.channel.title,
                        album.photos.len(),
                        new
                    );
                }
            }
        }
        None => println!("No content loaded."),
    }

    println!();
    println!(
        "{} requests, {} failed, {} media items failed, {:.1}s",
        report.total_requests,
        report.failed_requests,
        report.failed_item_count,
        report.elapsed.as_secs_f64()
    );
    if report.canceled {
        println!("Sync was canceled.");
    }
    if let Some(error) = &report.error {
        println!("First error: {error}");
    }
}
