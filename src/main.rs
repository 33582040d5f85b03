//! requery demo - a scripted walkthrough of the query cache.
//!
//! Replays the flows of the page this replaces against the in-process
//! cache: initial load, manual refetch, add-user mutation with list
//! invalidation, and paging the infinite list to exhaustion. Rendering is
//! subscription-driven: a task subscribes to the list key and reprints the
//! view on every state change the cache publishes.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use requery::cache::{Mutation, QueryClient, QueryKey, QueryStatus};
use requery::config::Config;
use requery::fetch::{FailureInjector, MockApi};
use requery::models::{NewUser, Page, User};
use requery::store::UserStore;
use requery::ui;

/// How long the script waits for a background refetch to settle before
/// moving on.
const SETTLE_TIMEOUT_SECS: u64 = 10;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("requery demo starting");

    let config = Config::from_env();
    let store = Arc::new(UserStore::with_seed_users());
    let api = MockApi::new(
        Arc::clone(&store),
        config.latency(),
        FailureInjector::new(config.failure_rate, config.failure_seed),
    );
    let client = QueryClient::new(config.stale_after());

    // ---- The list query --------------------------------------------------

    let users_key = QueryKey::from("users");
    let users = client.query(users_key.clone(), {
        let api = api.clone();
        move || {
            let api = api.clone();
            async move { api.fetch_users().await }.boxed()
        }
    })?;

    // Subscription-driven rendering: reprint on every published change
    let mut list_sub = users.subscribe();
    let renderer = tokio::spawn(async move {
        while let Ok(state) = list_sub.changed().await {
            println!("{}\n", ui::render_user_list(&state));
        }
    });

    // Initial load (the mount)
    let state = users.ensure().await;
    if state.status == QueryStatus::Error {
        info!("initial fetch failed; retrying via the refetch control");
        users.refetch().await;
    }

    // The "Refetch Users" button
    users.refetch().await;

    // ---- The add-user form -----------------------------------------------

    let add_user: Mutation<NewUser, User> = Mutation::new({
        let api = api.clone();
        move |input: NewUser| {
            let api = api.clone();
            async move { api.create_user(input).await }.boxed()
        }
    })
    .on_success({
        let client = client.clone();
        let key = users_key.clone();
        move |created: &User| {
            info!(id = created.id, "user created; invalidating list");
            client.invalidate(&key);
        }
    });

    println!("{}\n", ui::render_add_user(&add_user.state()));
    let done = add_user
        .mutate(NewUser::new("Dana Lee", "dana@example.com", "Engineer"))
        .await;
    println!("{}\n", ui::render_add_user(&done));

    // Wait for the invalidation-triggered refetch to bring the list up to
    // date (bounded; the injected failure can leave it for a later retry)
    let mut sub = users.subscribe();
    let caught_up = tokio::time::timeout(Duration::from_secs(SETTLE_TIMEOUT_SECS), async {
        loop {
            let state = sub.current();
            let has_new_user = state
                .data
                .as_ref()
                .is_some_and(|users| users.iter().any(|u| u.name == "Dana Lee"));
            if has_new_user && !state.is_fetching {
                return;
            }
            if sub.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    if caught_up.is_err() {
        info!("list refetch did not settle in time; continuing");
    }

    // ---- The infinite list -----------------------------------------------

    let pages = client.infinite_query(
        QueryKey::new(["users", "infinite"]),
        {
            let api = api.clone();
            move |token| {
                let api = api.clone();
                async move { api.fetch_users_page(token).await }.boxed()
            }
        },
        |page: &Page| page.next_page_token,
    )?;

    pages.ensure().await;
    while ui::load_more_enabled(&pages.state()) {
        pages.fetch_next_page().await;
    }
    println!("{}\n", ui::render_user_pages(&pages.state()));

    // Closing dump of the mock store
    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);

    info!("requery demo shutting down");

    // Tear down: dropping the last cache handle closes every subscription
    drop(users);
    drop(pages);
    drop(add_user);
    drop(client);
    let _ = renderer.await;

    Ok(())
}
