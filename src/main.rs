use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use modfeed::client::{build_http, parse_base_url, HttpQueueClient, QueueKind, Reports, Verifications};
use modfeed::config::{self, Config};
use modfeed::emoji::{render_segments, CatalogScope, EmojiCache, HttpEmojiSource};
use modfeed::model::{age_label, Report, Verification};
use modfeed::store::PageCacheStore;
use modfeed::view::{ActionOutcome, Alerts, ListSnapshot, ListStatus, ModerationView};

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin moderation console for verification and report queues")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Queue {
    Verifications,
    Reports,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scroll through a queue and print every row
    List {
        /// Queue to list; both when omitted
        #[arg(long, value_enum)]
        queue: Option<Queue>,
        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Approve a pending row
    Approve {
        #[arg(long, value_enum)]
        queue: Queue,
        #[arg(long)]
        id: i64,
    },
    /// Reject a pending row
    Reject {
        #[arg(long, value_enum)]
        queue: Queue,
        #[arg(long)]
        id: i64,
    },
    /// Delete the post behind a row
    Delete {
        #[arg(long, value_enum)]
        queue: Queue,
        #[arg(long)]
        id: i64,
    },
    /// Render text with point-store emoji codes replaced
    Emoji {
        text: String,
        /// Only use emojis bought by the current session
        #[arg(long)]
        purchased: bool,
    },
    /// Print an example configuration
    ExampleConfig,
}

#[derive(Debug, Clone, Copy)]
enum Act {
    Approve,
    Reject,
    Delete,
}

struct ConsoleAlerts;

impl Alerts for ConsoleAlerts {
    fn alert(&self, message: &str) {
        error!(alert = message, "user alert raised");
        eprintln!("!! {}", message);
    }
}

/// One printable line per queue row.
trait RowLine {
    fn line(&self) -> String;
}

impl RowLine for Verification {
    fn line(&self) -> String {
        format!(
            "#{:<6} {:<9} user={} detox={}h post={} image={} ({})",
            self.id,
            self.status.as_str(),
            self.subject_nickname.as_deref().unwrap_or("-"),
            self.detox_hours,
            self.post_id.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            self.image_url.as_deref().unwrap_or("-"),
            age_label(self.created_at, Utc::now()),
        )
    }
}

impl RowLine for Report {
    fn line(&self) -> String {
        let title = self
            .reported_post
            .as_ref()
            .and_then(|p| p.title.as_deref())
            .unwrap_or("(post deleted)");
        format!(
            "#{:<6} {:<9} by={} post={} \"{}\" reason: {}",
            self.id,
            self.status.as_str(),
            self.reporter_nickname.as_deref().unwrap_or("-"),
            self.reported_post_id.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            title,
            self.reason,
        )
    }
}

fn new_view<K: QueueKind>(cfg: &Config) -> Result<ModerationView<HttpQueueClient<K>>> {
    let client = HttpQueueClient::<K>::from_config(cfg).context("failed to build queue client")?;
    let store = Arc::new(PageCacheStore::new(Arc::new(client)));
    Ok(ModerationView::new(store, cfg.query_key(K::QUERY_NAME), Arc::new(ConsoleAlerts)))
}

/// Emulate scrolling: report the last row as visible until no page remains.
async fn scroll_to_end<K: QueueKind>(
    view: &mut ModerationView<HttpQueueClient<K>>,
    max_pages: Option<usize>,
    until: impl Fn(&ListSnapshot<K::Item>) -> bool,
) -> ListSnapshot<K::Item> {
    let mut snapshot = view.mount().await;
    let mut pages = 1;
    while snapshot.has_next_page && !until(&snapshot) {
        if max_pages.map(|m| pages >= m).unwrap_or(false) {
            break;
        }
        let Some(last) = view.observed_row() else { break };
        view.on_visibility(last, false).await;
        if !view.on_visibility(last, true).await {
            break;
        }
        let next = view.render().await;
        if next.rows.len() == snapshot.rows.len() {
            // The next page failed or was empty; the scroll does not advance.
            snapshot = next;
            break;
        }
        snapshot = next;
        pages += 1;
    }
    snapshot
}

fn print_snapshot<T: RowLine + modfeed::model::QueueItem>(name: &str, snapshot: &ListSnapshot<T>) {
    match snapshot.status {
        ListStatus::LoadFailed => {
            println!(
                "[{}] could not load queue: {}",
                name,
                snapshot.error.as_deref().unwrap_or("unknown error")
            );
            return;
        }
        ListStatus::Empty => {
            println!("[{}] nothing pending", name);
            return;
        }
        ListStatus::Loading | ListStatus::Ready => {}
    }
    println!(
        "[{}] {} of {} rows, page {}{}",
        name,
        snapshot.rows.len(),
        snapshot.total_count.unwrap_or(0),
        snapshot.current_page.unwrap_or(0),
        if snapshot.has_next_page { " (more available)" } else { "" }
    );
    for row in &snapshot.rows {
        let flags = format!(
            "{}{}{}",
            if row.controls.approve { "A" } else { "-" },
            if row.controls.reject { "R" } else { "-" },
            if row.controls.delete { "D" } else { "-" },
        );
        println!("  [{}] {}", flags, row.item.line());
    }
}

async fn list<K: QueueKind>(cfg: &Config, max_pages: Option<usize>) -> Result<()>
where
    K::Item: RowLine,
{
    let mut view = new_view::<K>(cfg)?;
    let snapshot = scroll_to_end(&mut view, max_pages, |_| false).await;
    print_snapshot(K::QUERY_NAME, &snapshot);
    view.unmount().await;
    Ok(())
}

async fn act<K: QueueKind>(cfg: &Config, act: Act, id: i64) -> Result<()>
where
    K::Item: RowLine,
{
    let mut view = new_view::<K>(cfg)?;
    let snapshot = scroll_to_end(&mut view, None, |s| s.row(id).is_some()).await;
    if snapshot.row(id).is_none() {
        view.unmount().await;
        bail!("row {} is not in the {} queue", id, K::QUERY_NAME);
    }

    let outcome = match act {
        Act::Approve => view.approve(id).await,
        Act::Reject => view.reject(id).await,
        Act::Delete => view.delete(id).await,
    };
    let result = match outcome {
        ActionOutcome::Applied => {
            info!(id, ?act, "action applied");
            let refreshed = view.render().await;
            print_snapshot(K::QUERY_NAME, &refreshed);
            Ok(())
        }
        ActionOutcome::Blocked => {
            println!("{:?} is not available for row {} (control disabled)", act, id);
            Ok(())
        }
        ActionOutcome::Failed(err) => Err(anyhow::Error::new(err).context(format!("{:?} failed", act))),
    };
    view.unmount().await;
    result
}

async fn emoji(cfg: &Config, text: &str, purchased: bool) -> Result<()> {
    if !cfg.emoji.enabled {
        println!("{}", text);
        return Ok(());
    }
    let http = build_http(cfg.api.session_cookie.as_deref(), cfg.api.user_agent.as_deref())?;
    let source = HttpEmojiSource::new(http, parse_base_url(&cfg.api.base_url)?);
    let scope = if purchased { CatalogScope::Purchased } else { CatalogScope::Store };
    let cache = EmojiCache::new(source, scope);
    let catalog = cache.initialize().await;
    let rendered: String = render_segments(text, &catalog)
        .iter()
        .map(|s| s.to_string())
        .collect();
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    match args.command {
        Command::List { queue, max_pages } => match queue {
            Some(Queue::Verifications) => list::<Verifications>(&cfg, max_pages).await,
            Some(Queue::Reports) => list::<Reports>(&cfg, max_pages).await,
            None => {
                // The two queues are independent; load them side by side.
                futures::future::try_join(
                    list::<Verifications>(&cfg, max_pages),
                    list::<Reports>(&cfg, max_pages),
                )
                .await?;
                Ok(())
            }
        },
        Command::Approve { queue, id } => dispatch(&cfg, queue, Act::Approve, id).await,
        Command::Reject { queue, id } => dispatch(&cfg, queue, Act::Reject, id).await,
        Command::Delete { queue, id } => dispatch(&cfg, queue, Act::Delete, id).await,
        Command::Emoji { text, purchased } => emoji(&cfg, &text, purchased).await,
        Command::ExampleConfig => Ok(()),
    }
}

async fn dispatch(cfg: &Config, queue: Queue, action: Act, id: i64) -> Result<()> {
    match queue {
        Queue::Verifications => act::<Verifications>(cfg, action, id).await,
        Queue::Reports => act::<Reports>(cfg, action, id).await,
    }
}
