//! tourdesk - terminal front-end for the tour-operator back office.
//!
//! Lists tours page by page, watches the catalogue with interval refetch
//! and creates tours, all through the tourdesk-core data layer.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tourdesk_core::api::{
    ApiClient, ApiMutation, ApiMutationOptions, BodyShape, TracingNotifier, NOTIFY_TARGET,
};
use tourdesk_core::models::{NewTour, Tour};
use tourdesk_core::storage::{JsonStorage, Stored};
use tourdesk_core::{
    Config, Fetcher, MutationOptions, Page, Paginated, PaginationOptions, Query, QueryCache,
    QueryOptions, QueryState, QueryStatus, Response,
};

// ============================================================================
// Constants
// ============================================================================

/// Cache key prefix shared by every tour listing.
const TOURS_PREFIX: &str = "tours";

/// Polling period for `watch` when neither the argument nor the config sets one.
const DEFAULT_WATCH_SECS: u64 = 30;

/// Storage key remembering the last listed page.
const LAST_PAGE_KEY: &str = "last-tours-page";

const USAGE: &str = "Usage:
  tourdesk tours [page]
  tourdesk watch [secs]
  tourdesk create <title> <duration> <price_adult> <capacity>";

/// Filter used when RUST_LOG is unset: warnings, plus success notifications.
fn default_filter() -> String {
    format!("warn,{}=info", NOTIFY_TARGET)
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tourdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _guard = init_tracing(config.log_dir.as_deref());
    info!(api = %config.api_base_url, "tourdesk starting");

    let mut client = ApiClient::new(config.api_base_url.clone())?;
    if let Some(token) = config.token.clone() {
        client.set_token(token);
    }
    let cache = QueryCache::default();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("tours") => {
            let page = args.get(1).map(|p| parse_arg::<u32>(p, "page")).transpose()?;
            list_tours(&client, &cache, &config, page).await
        }
        Some("watch") => {
            let secs = args.get(1).map(|s| parse_arg::<u64>(s, "secs")).transpose()?;
            watch_tours(&client, &cache, &config, secs).await
        }
        Some("create") => {
            if args.len() != 5 {
                bail!("{}", USAGE);
            }
            let tour = NewTour::basic(
                args[1].clone(),
                args[2].clone(),
                parse_arg::<f64>(&args[3], "price_adult")?,
                parse_arg::<u32>(&args[4], "capacity")?,
            );
            create_tour(&client, &cache, tour).await
        }
        _ => {
            eprintln!("{}", USAGE);
            Ok(())
        }
    }
}

fn parse_arg<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid {}: {:?}", name, value))
}

fn open_storage(config: &Config) -> Option<JsonStorage> {
    let dir = match config.storage_dir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "No storage directory, preferences will not persist");
            return None;
        }
    };
    match JsonStorage::new(dir) {
        Ok(storage) => Some(storage),
        Err(e) => {
            warn!(error = %e, "Failed to open storage");
            None
        }
    }
}

type TourPageFuture = BoxFuture<'static, Result<Response<Page<Tour>>>>;

fn tours_fetcher(client: &ApiClient) -> impl Fn(u32, u32) -> TourPageFuture + Send + Sync + 'static {
    let client = client.clone();
    move |page, size| {
        let client = client.clone();
        async move { client.tours_page(page, size).await.map(Response::Raw) }.boxed()
    }
}

// ===== Commands =====

async fn list_tours(
    client: &ApiClient,
    cache: &QueryCache,
    config: &Config,
    page: Option<u32>,
) -> Result<()> {
    let mut last_page = open_storage(config).map(|storage| Stored::load(storage, LAST_PAGE_KEY, 1u32));
    let page = page
        .or_else(|| last_page.as_ref().map(|stored| *stored.get()))
        .unwrap_or(1);

    let options = PaginationOptions::new()
        .page_size(config.page_size)
        .initial_page(page)
        .key_prefix(TOURS_PREFIX)
        .cache_ttl(config.cache_ttl());
    let mut listing = Paginated::new(cache.clone(), tours_fetcher(client), options);

    listing.load().await;
    if let Some(error) = listing.error() {
        bail!("Failed to load tours: {}", error);
    }

    if listing.total_pages() > 0 && listing.page() > listing.total_pages() {
        println!(
            "Page {} is past the end ({} pages); showing page 1",
            listing.page(),
            listing.total_pages()
        );
        if listing.go_to_page(1).await {
            if let Some(error) = listing.error() {
                bail!("Failed to load tours: {}", error);
            }
        }
    }

    let items = listing.items();
    if items.is_empty() {
        println!("No tours");
    }
    for tour in &items {
        println!("{}", tour.summary_line());
    }
    println!(
        "Page {}/{} ({} tours)",
        listing.page(),
        listing.total_pages().max(1),
        listing.total()
    );

    if let Some(stored) = last_page.as_mut() {
        stored.set(listing.page());
    }
    Ok(())
}

async fn watch_tours(
    client: &ApiClient,
    cache: &QueryCache,
    config: &Config,
    secs: Option<u64>,
) -> Result<()> {
    let secs = secs
        .or(config.refetch_interval_secs)
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_WATCH_SECS);
    let page_size = config.page_size;
    let fetch = tours_fetcher(client);
    let fetcher = Fetcher::new(move || fetch(1, page_size));

    let options = QueryOptions::new()
        .refetch_interval(Duration::from_secs(secs))
        .cache_ttl(config.cache_ttl())
        .on_error(|error| eprintln!("Refresh failed: {}", error));
    let mut query = Query::new(cache.clone(), format!("{}-watch", TOURS_PREFIX), fetcher, options);
    let mut updates = query.subscribe();

    println!("Watching tours every {}s, Ctrl-C to stop", secs);
    let first = query.activate().await;
    updates.mark_unchanged();
    print_watch_state(&first, cache);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print_watch_state(&state, cache);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    query.teardown();
    info!("Stopped watching");
    Ok(())
}

fn print_watch_state(state: &QueryState<Page<Tour>>, cache: &QueryCache) {
    match state.status {
        QueryStatus::Loading => println!("Refreshing..."),
        QueryStatus::Error => {
            println!("Error: {}", state.error_message().unwrap_or_default())
        }
        QueryStatus::Success => {
            if let Some(page) = &state.data {
                let updated = cache
                    .get(&format!("{}-watch", TOURS_PREFIX))
                    .map(|entry| entry.age_display(cache.now()))
                    .unwrap_or_default();
                println!("{} tours (updated {})", page.total, updated);
                for tour in &page.items {
                    println!("  {}", tour.summary_line());
                }
            }
        }
        QueryStatus::Idle => {}
    }
}

async fn create_tour(client: &ApiClient, cache: &QueryCache, tour: NewTour) -> Result<()> {
    let invalidate_cache = cache.clone();
    let callbacks = MutationOptions::new().on_success(move |_created: Tour, _body: Option<NewTour>| {
        let cache = invalidate_cache.clone();
        async move {
            let dropped = cache.invalidate_prefix(TOURS_PREFIX);
            info!(dropped = dropped, "Tour listings invalidated");
        }
    });

    let mutation: ApiMutation<Tour, NewTour> = ApiMutation::new(
        client.clone(),
        "tours",
        ApiMutationOptions::new()
            .shape(BodyShape::Bare)
            .success_message("Tour creado")
            .error_message("No se pudo crear el tour"),
        callbacks,
        Arc::new(TracingNotifier),
    );

    let created = mutation
        .execute(Some(tour))
        .await
        .context("Failed to create tour")?;
    println!("Created {}", created.summary_line());
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tourdesk_core::api::Notifier;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_with_default_filter(emit: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(default_filter()))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_default_filter_shows_success_notifications() {
        let output = logged_with_default_filter(|| TracingNotifier.success("Tour creado"));
        assert!(output.contains("Tour creado"));
    }

    #[test]
    fn test_default_filter_hides_other_info() {
        let output = logged_with_default_filter(|| info!("tourdesk starting"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_parse_arg_names_bad_value() {
        let err = parse_arg::<u32>("dos", "page").unwrap_err();
        assert_eq!(err.to_string(), "Invalid page: \"dos\"");
    }
}
