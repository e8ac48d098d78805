use anyhow::{Context, Result};
use chrono::NaiveDate;
use cinelist::app::AppState;
use cinelist::auth;
use cinelist::backend::{NewUser, OrderBy};
use cinelist::collection::{TypeFilter, WatchedFilter};
use cinelist::config::Config;
use cinelist::detail::{RatingRow, SlotState, TitleDetail};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Shared movie and series watchlist for small groups
#[derive(Parser)]
#[command(name = "cinelist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session
    Login {
        /// Username or email
        identifier: String,
        #[arg(long, env = "CINELIST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Register {
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, env = "CINELIST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user and their groups
    Whoami,

    /// Make a group the active one
    UseGroup { id: i64 },

    /// Create a group and switch to it
    CreateGroup { name: String },

    /// List the active group's titles
    #[command(alias = "ls")]
    List {
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        size: Option<u32>,
        #[arg(long, value_enum)]
        watched: Option<WatchedArg>,
        /// title, imdbRating, year, runtime, addedAt, watchedAt or "none"
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long, conflicts_with = "desc")]
        asc: bool,
        #[arg(long)]
        desc: bool,
        #[arg(long = "type", value_enum)]
        title_type: Option<TypeArg>,
    },

    /// Add a title to the active group
    #[command(alias = "a")]
    Add { id: String },

    /// Remove a title from the active group
    #[command(alias = "rm")]
    Remove { id: String },

    /// Show ratings, comments and watched status of a title
    #[command(alias = "i")]
    Show {
        id: String,
        #[arg(long)]
        season: Option<String>,
    },

    /// Rate a title (0-10)
    Rate {
        id: String,
        note: f32,
        #[arg(long)]
        season: Option<String>,
    },

    /// Delete your rating (only the season's note for series)
    Unrate {
        id: String,
        #[arg(long)]
        season: Option<String>,
    },

    /// Post a comment
    Comment {
        id: String,
        text: String,
        #[arg(long)]
        season: Option<String>,
    },

    /// Mark a title or season as watched
    Watched {
        id: String,
        #[arg(long)]
        season: Option<String>,
        /// Watch date, YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        unwatched: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WatchedArg {
    All,
    Watched,
    Unwatched,
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    All,
    Movie,
    #[value(alias = "series")]
    Serie,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cinelist=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn check_env() -> Result<()> {
    let required = ["CINELIST_API_URL"];
    for key in required {
        if env::var(key).is_err() {
            anyhow::bail!("Missing required environment variable: {}", key);
        }
    }
    info!("All required environment variables are set");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match dotenv() {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
    init_tracing();
    check_env()?;
    let state = AppState::from_config(Config::from_env()?)?;
    run(&state, cli.command).await
}

async fn run(state: &AppState, command: Commands) -> Result<()> {
    let gateway = state.gateway.as_ref();
    let session = state.session.as_ref();
    match command {
        Commands::Login {
            identifier,
            password,
        } => {
            let grant = auth::login(gateway, session, &identifier, &password).await?;
            println!("Logged in as {}", grant.username);
            match session.group_id() {
                Some(id) => println!("Active group: {id}"),
                None if grant.groups.is_empty() => println!("No group yet, use create-group"),
                None => {
                    println!("Pick a group with use-group:");
                    for g in &grant.groups {
                        println!("  {}  {}", g.id, g.name);
                    }
                }
            }
        }
        Commands::Register {
            username,
            email,
            name,
            password,
        } => {
            let user = auth::register(
                gateway,
                &NewUser {
                    name,
                    username: Some(username),
                    email,
                    password,
                },
            )
            .await?;
            println!("Account {} created, you can log in now", user.username);
        }
        Commands::Logout => {
            auth::logout(session)?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let user = auth::current_user(gateway, session).await?;
            println!("{} ({})", user.display_name(), user.username);
            for g in &user.groups {
                let marker = if session.group_id() == Some(g.id) { "*" } else { " " };
                println!("{marker} {}  {}", g.id, g.name);
            }
        }
        Commands::UseGroup { id } => {
            let group = auth::select_group(gateway, session, id).await?;
            println!("Active group: {}", group.name);
        }
        Commands::CreateGroup { name } => {
            let group = auth::create_group(gateway, session, &name).await?;
            println!("Created group {} ({})", group.name, group.id);
        }
        Commands::List {
            page,
            size,
            watched,
            order_by,
            asc,
            desc,
            title_type,
        } => {
            let mut list = state.collection();
            if let Some(size) = size {
                list.set_page_size(size).await?;
            }
            if let Some(w) = watched {
                list.set_watched_filter(match w {
                    WatchedArg::All => WatchedFilter::All,
                    WatchedArg::Watched => WatchedFilter::Watched,
                    WatchedArg::Unwatched => WatchedFilter::Unwatched,
                })
                .await?;
            }
            if let Some(raw) = order_by {
                let order = match raw.as_str() {
                    "none" => None,
                    other => Some(
                        OrderBy::parse(other)
                            .with_context(|| format!("Unknown sort field: {other}"))?,
                    ),
                };
                list.set_order_by(order).await?;
            }
            if asc || desc {
                list.set_ascending(asc).await?;
            }
            if let Some(t) = title_type {
                list.set_title_type(match t {
                    TypeArg::All => None,
                    TypeArg::Movie => Some(TypeFilter::Movie),
                    TypeArg::Serie => Some(TypeFilter::Series),
                })
                .await?;
            }
            list.refresh().await?;
            if page > 1 {
                list.set_page(page - 1).await?;
            }
            print_list(&list);
        }
        Commands::Add { id } => {
            let mut list = state.collection();
            let preview = list.preview_title(&id).await?;
            if preview.transient {
                warn!("{} could not be looked up", id);
            }
            let title = list.add_title(&id).await?;
            println!("Added {} ({})", title.title, title.id);
        }
        Commands::Remove { id } => {
            let mut list = state.collection();
            list.remove_title(&id).await?;
            println!("Removed {id}");
        }
        Commands::Show { id, season } => {
            let mut detail = state.open_title(&id).await?;
            detail.select_season(season.as_deref())?;
            print_detail(&detail);
            detail.close();
        }
        Commands::Rate { id, note, season } => {
            let me = session.user_id().context("Not logged in")?;
            let mut list = state.collection();
            let mut detail = state.open_title(&id).await?;
            detail.select_season(season.as_deref())?;
            detail.begin_rating_edit(me)?;
            detail.set_rating_buffer(note)?;
            detail.confirm_rating_edit();
            let outcome = detail.save(&mut list).await?;
            println!("Saved {} rating(s)", outcome.ratings_saved);
            print_detail(&detail);
        }
        Commands::Unrate { id, season } => {
            let me = session.user_id().context("Not logged in")?;
            let mut detail = state.open_title(&id).await?;
            detail.select_season(season.as_deref())?;
            detail.request_rating_delete(me)?;
            detail.confirm_rating_delete().await?;
            print_detail(&detail);
        }
        Commands::Comment { id, text, season } => {
            let mut detail = state.open_title(&id).await?;
            detail.select_season(season.as_deref())?;
            detail.set_comment_draft(text);
            detail.add_comment().await?;
            print_detail(&detail);
        }
        Commands::Watched {
            id,
            season,
            date,
            unwatched,
        } => {
            let mut list = state.collection();
            let mut detail = state.open_title(&id).await?;
            detail.select_season(season.as_deref())?;
            detail.set_watched(!unwatched)?;
            if let Some(date) = date {
                detail.begin_watched_date_edit()?;
                detail.set_watched_temp_date(Some(date))?;
                detail.confirm_watched_date_edit();
            }
            let outcome = detail.save(&mut list).await?;
            if !outcome.watched_updated {
                println!("Nothing changed");
            }
            print_detail(&detail);
        }
    }
    Ok(())
}

fn print_list(list: &cinelist::collection::CollectionQuery) {
    if let Some(message) = list.empty_message() {
        println!("{message}");
        return;
    }
    let page = list.current();
    for title in &page.content {
        let seen = if title.watched.watched { "x" } else { " " };
        let notes: Vec<String> = list
            .ratings_for(&title.id)
            .iter()
            .filter_map(|r| r.note.map(|n| format!("{n:.1}")))
            .collect();
        println!(
            "[{seen}] {:<12} {} ({}) {}",
            title.id,
            title.title,
            title.year.as_deref().unwrap_or("?"),
            notes.join(" ")
        );
    }
    println!(
        "page {}/{} ({} titles)",
        page.page + 1,
        page.total_pages.max(1),
        page.total_elements
    );
}

fn print_detail(detail: &TitleDetail) {
    let title = detail.title();
    println!("{} ({})", title.title, title.title_type.as_str());
    if title.is_series() {
        let labels: Vec<&str> = title.seasons.iter().map(|s| s.label.as_str()).collect();
        println!(
            "seasons: {}  selected: {}",
            labels.join(", "),
            detail.season().unwrap_or("-")
        );
    }
    let w = detail.watched().working();
    match (w.watched, w.watched_at) {
        (true, Some(d)) => println!("watched on {d}"),
        (true, None) => println!("watched"),
        (false, _) => println!("not watched"),
    }
    for RatingRow { user, note, state, .. } in detail.rating_rows() {
        let shown = note.map_or("-".to_string(), |n| format!("{n:.1}"));
        let flag = match state {
            SlotState::Staged(_) => " (unsaved)",
            _ => "",
        };
        println!("  {:<16} {shown}{flag}", user.display_name());
    }
    for c in detail.visible_comments() {
        let season = c.season.map(|s| format!("[S{s}] ")).unwrap_or_default();
        let edited = if c.is_edited() { " (edited)" } else { "" };
        println!("  #{} {season}{}{edited}", c.id, c.text);
    }
}
