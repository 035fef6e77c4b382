//! Terminal dashboard for whoever the daemon last recognized.

use anyhow::Result;
use clap::Args;
use facedash_core::{profile, PresenceFile, Profile, ProfileStore, Settings};
use facedash_feeds::{FeedClient, FeedConfig, Headlines, Quote};
use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use crate::stop::StopFlag;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const SAMPLE_MARK: &str = " (sample data)";

#[derive(Args, Debug)]
pub struct DashboardArgs {
    /// Render once and exit
    #[arg(long)]
    pub once: bool,
    /// Seconds between refreshes when the user has not changed
    #[arg(long, default_value_t = 30)]
    pub refresh_secs: u64,
}

/// Live data shown under the profile.
#[derive(Debug, Default)]
pub struct FeedData {
    pub quotes: Vec<Quote>,
    pub headlines: Vec<Headlines>,
}

/// Decides when the dashboard redraws: on a user change or once `period`
/// has passed since the last redraw.
#[derive(Debug)]
pub struct RefreshPolicy {
    period: Duration,
    last_user: Option<String>,
    last_refresh: Option<Instant>,
}

impl RefreshPolicy {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_user: None,
            last_refresh: None,
        }
    }

    /// Whether to redraw now. A `true` answer records the redraw.
    pub fn due(&mut self, user: &str, now: Instant) -> bool {
        let user_changed = self.last_user.as_deref() != Some(user);
        let stale = self
            .last_refresh
            .map_or(true, |t| now.duration_since(t) >= self.period);
        if user_changed || stale {
            if user_changed {
                tracing::info!(user, "user changed");
            }
            self.last_user = Some(user.to_string());
            self.last_refresh = Some(now);
            true
        } else {
            false
        }
    }
}

/// Fetch quotes and headlines for `profile` concurrently.
pub async fn fetch(client: &FeedClient, profile: &Profile) -> FeedData {
    let tickers = if profile.stock_interest {
        profile.stock_tickers.clone()
    } else {
        Vec::new()
    };
    let categories: Vec<String> = if profile.news_interest {
        profile
            .news_categories
            .iter()
            .map(|c| c.as_str().to_string())
            .collect()
    } else {
        Vec::new()
    };

    let (quotes, headlines) = tokio::join!(client.quotes(&tickers), client.headlines(&categories));
    FeedData { quotes, headlines }
}

/// Plain-text dashboard. `None` renders the load error.
pub fn render(profile: Option<&Profile>, data: &FeedData, updated_at: &str) -> String {
    let mut out = String::new();
    let Some(p) = profile else {
        out.push_str("Error loading user data\n");
        return out;
    };

    let _ = writeln!(out, "Welcome, {}!", p.name);
    let _ = writeln!(out, "{}, {} years old", p.gender, p.age);

    out.push_str("\nMy To-Do List\n");
    if p.todo_list.is_empty() {
        out.push_str("  No tasks yet. Enjoy your free time!\n");
    } else {
        for item in &p.todo_list {
            let _ = writeln!(out, "  • {item}");
        }
    }

    if p.stock_interest && !p.stock_tickers.is_empty() {
        out.push_str("\nStock Portfolio\n");
        let _ = writeln!(out, "  {:<8} {:<24} {:>14}  {}", "Symbol", "Name", "Price", "Change");
        for q in &data.quotes {
            let price = match q.price {
                Some(_) => format!("{} {}", q.price_text(), q.currency),
                None => q.price_text(),
            };
            let _ = writeln!(
                out,
                "  {:<8} {:<24} {:>14}  {} ({}){}",
                q.ticker,
                truncate(&q.name, 24),
                price,
                q.change_text(),
                q.percent_text(),
                if q.live { "" } else { SAMPLE_MARK }
            );
        }
        let _ = writeln!(out, "  Updated at {updated_at}");
    }

    out.push_str("\nYour News Headlines\n");
    if p.news_interest {
        for h in &data.headlines {
            let mark = if h.live { "" } else { SAMPLE_MARK };
            let _ = writeln!(out, "  {} News{mark}", h.category);
            if h.titles.is_empty() {
                out.push_str("    No headlines right now.\n");
            }
            for (i, title) in h.titles.iter().enumerate() {
                let _ = writeln!(out, "    {}. {title}", i + 1);
            }
        }
        let _ = writeln!(out, "  Updated at {updated_at}");
    } else {
        out.push_str("  News updates disabled.\n  Enable them in your profile settings.\n");
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}

/// Load the profile to show for `user`, logging load failures.
fn load_profile(store: &ProfileStore, user: &str) -> Option<Profile> {
    match store.load() {
        Ok(profiles) => profile::resolve_for_display(&profiles, user).cloned(),
        Err(e) => {
            tracing::error!(error = %e, path = %store.path().display(), "cannot load profiles");
            None
        }
    }
}

async fn draw(store: &ProfileStore, client: &FeedClient, user: &str, clear: bool) {
    let profile = load_profile(store, user);
    let data = match &profile {
        Some(p) => fetch(client, p).await,
        None => FeedData::default(),
    };
    let now = chrono::Local::now().format("%H:%M:%S").to_string();
    let text = render(profile.as_ref(), &data, &now);
    if clear {
        print!("{CLEAR_SCREEN}");
    }
    print!("{text}");
}

pub async fn run(settings: &Settings, args: &DashboardArgs, stop: &StopFlag) -> Result<()> {
    let presence = PresenceFile::open(settings.presence_path())?;
    let store = ProfileStore::open(settings.people_path());
    let client = FeedClient::new(FeedConfig::from_env())?;

    if args.once {
        draw(&store, &client, &presence.current(), false).await;
        return Ok(());
    }

    let clear = std::io::stdout().is_terminal();
    let mut policy = RefreshPolicy::new(Duration::from_secs(args.refresh_secs.max(1)));
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    tracing::info!(path = %presence.path().display(), "following presence file");

    let stopped = stop.wait();
    tokio::pin!(stopped);
    loop {
        tokio::select! {
            biased;
            _ = &mut stopped => break,
            _ = ticker.tick() => {}
        }
        let user = presence.current();
        if policy.due(&user, Instant::now()) {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                _ = draw(&store, &client, &user, clear) => {}
            }
        }
    }
    Ok(())
}
