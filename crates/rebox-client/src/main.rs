//! `rebox`: opens the configured store, optionally seeds demo data and
//! prints how many records each collection holds.
//!
//! `rebox sign-in <provider> <code>` first completes an OAuth sign-in through
//! the exchange endpoint in `REBOX_OAUTH_EXCHANGE_URL`.

use anyhow::Context;
use rebox_client::{
    init_tracing, open_session, open_store, seed_demo_data, OpenedStore, ReboxConfig,
};
use rebox_store::{Dislike, Filter, Item, Like, Match, Message, Record, Store, StoredUser};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreSummary {
    backend: rebox_shared::Backend,
    current_user: Option<String>,
    users: usize,
    items: usize,
    likes: usize,
    dislikes: usize,
    matches: usize,
    messages: usize,
    unread_messages: usize,
}

#[derive(Debug)]
enum Command {
    Summary,
    SignIn { provider: String, code: String },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    match args.next().as_deref() {
        None | Some("summary") => Ok(Command::Summary),
        Some("sign-in") => {
            let provider = args.next().context("usage: rebox sign-in <provider> <code>")?;
            let code = args.next().context("usage: rebox sign-in <provider> <code>")?;
            Ok(Command::SignIn { provider, code })
        }
        Some(other) => anyhow::bail!("unknown command `{other}`"),
    }
}

async fn count<S: Store, R: Record>(store: &S) -> anyhow::Result<usize> {
    Ok(store.count_where::<R>(&Filter::new()).await?)
}

async fn run<S: Store>(store: S, config: &ReboxConfig, command: Command) -> anyhow::Result<()> {
    if config.seed_demo {
        let report = seed_demo_data(&store).await?;
        if !report.is_empty() {
            info!(
                users = report.users.len(),
                items = report.items.len(),
                "Demo data written"
            );
        }
    }

    let session = open_session(store, config);
    let mut current = session.restore().await?;
    if let Command::SignIn { provider, code } = command {
        current = Some(session.sign_in_with_provider(&provider, &code).await?);
    }

    let store = session.store();
    let summary = StoreSummary {
        backend: store.backend(),
        current_user: current.map(|u| u.name),
        users: count::<S, StoredUser>(store).await?,
        items: count::<S, Item>(store).await?,
        likes: count::<S, Like>(store).await?,
        dislikes: count::<S, Dislike>(store).await?,
        matches: count::<S, Match>(store).await?,
        messages: count::<S, Message>(store).await?,
        unread_messages: store
            .count_where::<Message>(&Filter::new().eq("isRead", false))
            .await?,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting ReBox v{}", env!("CARGO_PKG_VERSION"));

    let command = parse_args(std::env::args().skip(1))?;
    let config = ReboxConfig::from_env();
    info!(?config, "Loaded configuration");

    match open_store(&config).await? {
        OpenedStore::Local(store) => run(store, &config, command).await,
        OpenedStore::Remote(store) => run(store, &config, command).await,
    }
}
