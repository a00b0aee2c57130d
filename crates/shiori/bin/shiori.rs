#[macro_use]
extern crate log;

use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use shiori::{
    catalogue::{Catalogue, Manga},
    domain::{
        entities::bookmark::Bookmark,
        repositories::key_value::KeyValueRepository,
        services::{
            bookmark::BookmarkService,
            token::{Account, TokenManager},
        },
    },
    infrastructure::{
        config::Config, database, repositories::key_value::KeyValueRepositoryImpl,
    },
};
use shiori_auth::MangaDex;

#[derive(Parser)]
#[clap(version, about = "Read MangaDex titles and keep bookmarks")]
struct Opts {
    /// Path to config file
    #[clap(long)]
    config: Option<String>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate with the configured account
    Login,
    /// Print a valid access token
    Token,
    /// Search titles by name
    Search { title: String },
    /// Most followed titles of the last 30 days
    Popular,
    /// List chapters of a title
    Chapters {
        manga_id: String,
        #[clap(long, default_value_t = 100)]
        limit: i64,
        #[clap(long, default_value_t = 0)]
        offset: i64,
        /// Defaults to the configured language
        #[clap(long)]
        language: Option<String>,
    },
    /// Print page URLs of a chapter and bookmark its first page
    Read {
        manga_id: String,
        chapter_id: String,
        #[clap(long)]
        chapter_number: Option<String>,
        #[clap(long)]
        cover_url: Option<String>,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        data_saver: bool,
    },
    #[clap(subcommand)]
    Bookmark(BookmarkCommand),
}

#[derive(Subcommand)]
enum BookmarkCommand {
    List,
    Show {
        manga_id: String,
    },
    Save {
        manga_id: String,
        chapter_id: String,
        #[clap(long)]
        chapter_number: Option<String>,
        #[clap(long, default_value_t = 0)]
        page: u32,
        #[clap(long)]
        cover_url: Option<String>,
        #[clap(long)]
        title: Option<String>,
    },
    Delete {
        manga_id: String,
    },
    Notes {
        manga_id: String,
        notes: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        if let Ok(shiori_log) = std::env::var("SHIORI_LOG") {
            logger.parse_filters(&format!("shiori={shiori_log},shiori_auth={shiori_log}"));
        }
    }
    logger.init();

    let opts: Opts = Opts::parse();
    let config = Config::open(opts.config)?;

    match opts.command {
        Command::Login => {
            if config.mangadex.is_none() {
                bail!("no MangaDex account configured, set MANGADEX_* or the mangadex section");
            }
            let tokens = token_manager(&config)?;
            let credential = tokens.ensure_authentication().await?;
            if let Some(expires_at) = credential
                .expires_at
                .and_then(DateTime::<Utc>::from_timestamp_millis)
            {
                println!("logged in, token valid until {expires_at}");
            }
        }
        Command::Token => {
            let tokens = token_manager(&config)?;
            tokens.ensure_authentication().await?;
            match tokens.get_access_token().await {
                Some(token) => println!("{token}"),
                None => bail!("no access token available"),
            }
        }
        Command::Search { title } => {
            let catalogue = catalogue(&config).await?;
            print_manga(&catalogue, &catalogue.search_manga(&title).await?);
        }
        Command::Popular => {
            let catalogue = catalogue(&config).await?;
            print_manga(&catalogue, &catalogue.popular_manga().await?);
        }
        Command::Chapters {
            manga_id,
            limit,
            offset,
            language,
        } => {
            let catalogue = catalogue(&config).await?;
            let language = language.as_deref().unwrap_or(&config.language);
            let page = catalogue
                .manga_feed(&manga_id, language, limit, offset)
                .await?;
            for chapter in &page.chapters {
                println!(
                    "{}\tch. {}\t{}",
                    chapter.id,
                    chapter.chapter_number.as_deref().unwrap_or("-"),
                    chapter.title.as_deref().unwrap_or("")
                );
            }
            if page.has_more() {
                let next = page.offset + page.chapters.len() as i64;
                println!(
                    "... {} more, continue with --offset {next}",
                    page.total - next
                );
            }
        }
        Command::Read {
            manga_id,
            chapter_id,
            chapter_number,
            cover_url,
            title,
            data_saver,
        } => {
            let catalogue = catalogue(&config).await?;
            let server = catalogue.at_home_server(&chapter_id).await?;
            let urls = if data_saver {
                server.data_saver_urls()
            } else {
                server.page_urls()
            };
            for url in urls {
                println!("{url}");
            }

            let bookmarks = bookmark_service(&config).await?;
            bookmarks
                .save(
                    &manga_id,
                    &chapter_id,
                    chapter_number.as_deref(),
                    0,
                    cover_url.as_deref(),
                    title.as_deref(),
                )
                .await?;
        }
        Command::Bookmark(command) => {
            let bookmarks = bookmark_service(&config).await?;
            run_bookmark(&bookmarks, command).await?;
        }
    }

    Ok(())
}

/// Without a configured account the manager never holds a token and every
/// catalogue request goes out anonymously.
fn token_manager(config: &Config) -> Result<TokenManager<MangaDex>, anyhow::Error> {
    let mangadex = config.mangadex.clone().unwrap_or_default();
    let endpoint = MangaDex::new(&config.auth_url, mangadex.client_id, mangadex.client_secret)?;

    Ok(TokenManager::new(
        endpoint,
        Account {
            username: mangadex.username,
            password: mangadex.password,
        },
    ))
}

async fn catalogue(config: &Config) -> Result<Catalogue<MangaDex>, anyhow::Error> {
    let tokens = Arc::new(token_manager(config)?);
    if config.mangadex.is_some() {
        if let Err(e) = tokens.ensure_authentication().await {
            warn!("continuing without authentication: {e}");
        }
    }

    Ok(Catalogue::new(tokens, &config.api_url, &config.uploads_url))
}

async fn bookmark_service(
    config: &Config,
) -> Result<BookmarkService<KeyValueRepositoryImpl>, anyhow::Error> {
    let pool = database::establish_connection(&config.database_path, config.create_database).await?;

    Ok(BookmarkService::new(KeyValueRepositoryImpl::new(pool))
        .preserve_notes_on_save(config.preserve_notes_on_save))
}

async fn run_bookmark<R: KeyValueRepository>(
    bookmarks: &BookmarkService<R>,
    command: BookmarkCommand,
) -> Result<(), anyhow::Error> {
    match command {
        BookmarkCommand::List => {
            for bookmark in bookmarks.list().await? {
                print_bookmark(&bookmark);
            }
        }
        BookmarkCommand::Show { manga_id } => match bookmarks.get(&manga_id).await? {
            Some(bookmark) => {
                print_bookmark(&bookmark);
                if !bookmark.notes.is_empty() {
                    println!("\n{}", bookmark.notes);
                }
            }
            None => bail!("no bookmark for {manga_id}"),
        },
        BookmarkCommand::Save {
            manga_id,
            chapter_id,
            chapter_number,
            page,
            cover_url,
            title,
        } => {
            let bookmark = bookmarks
                .save(
                    &manga_id,
                    &chapter_id,
                    chapter_number.as_deref(),
                    page,
                    cover_url.as_deref(),
                    title.as_deref(),
                )
                .await?;
            print_bookmark(&bookmark);
        }
        BookmarkCommand::Delete { manga_id } => bookmarks.delete(&manga_id).await?,
        BookmarkCommand::Notes { manga_id, notes } => {
            bookmarks.update_notes(&manga_id, &notes).await?;
        }
    }

    Ok(())
}

fn print_manga(catalogue: &Catalogue<MangaDex>, manga: &[Manga]) {
    for manga in manga {
        let year = manga.year.map(|y| format!(" ({y})")).unwrap_or_default();
        println!(
            "{}\t{}{year}\t{}",
            manga.id,
            manga.title,
            catalogue.cover_url(manga).unwrap_or_default()
        );
    }
}

fn print_bookmark(bookmark: &Bookmark) {
    println!(
        "{}\t{}\tch. {}\tp. {}\t{}",
        bookmark.manga_id,
        bookmark.title.as_deref().unwrap_or("No Title"),
        bookmark.chapter_number.as_deref().unwrap_or("-"),
        bookmark.page + 1,
        bookmark.date_added.format("%Y-%m-%d %H:%M")
    );
}
