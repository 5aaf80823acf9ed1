//! Roost - a multi-protocol message board client core
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use roost::{
    Board, BoardEvent, BoardHandle, BoardManager, Config, Database, Forum, ParserRegistry,
    board_handle, parser::REQUEST_DEFAULT,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse CLI arguments
    match parse_args()? {
        Command::Boards => list_boards().await,
        Command::Add {
            name,
            url,
            protocol,
            username,
        } => add_board(&name, &url, &protocol, &username).await,
        Command::Remove { name } => remove_board(&name).await,
        Command::Sync { name } => sync_board(&name).await,
        Command::Export => export_boards().await,
        Command::Demo => run_demo().await,
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Boards,
    Add {
        name: String,
        url: String,
        protocol: String,
        username: String,
    },
    Remove {
        name: String,
    },
    Sync {
        name: String,
    },
    Export,
    Demo,
    Help,
    Version,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Boards);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),
        "--demo" | "demo" => Ok(Command::Demo),
        "boards" | "list" => Ok(Command::Boards),

        "add" => {
            let name = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing board name"))?
                .clone();
            let url = args
                .get(3)
                .ok_or_else(|| anyhow::anyhow!("Missing board url"))?
                .clone();
            let protocol = args.get(4).cloned().unwrap_or_else(|| "demo".to_string());
            let username = args.get(5).cloned().unwrap_or_default();
            Ok(Command::Add {
                name,
                url,
                protocol,
                username,
            })
        }

        "remove" | "rm" => {
            let name = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing board name"))?
                .clone();
            Ok(Command::Remove { name })
        }

        "sync" => {
            let name = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing board name"))?
                .clone();
            Ok(Command::Sync { name })
        }

        "export" => Ok(Command::Export),

        other => bail!("Unknown command '{other}'. Try 'roost help'."),
    }
}

fn print_help() {
    println!("roost {} - a multi-protocol message board client core", roost::VERSION);
    println!();
    println!("USAGE:");
    println!("    roost [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    boards                              List configured boards (default)");
    println!("    add <name> <url> [protocol] [user]  Add a board");
    println!("    remove <name>                       Remove a board");
    println!("    sync <name>                         Log in, crawl, and print the forum tree");
    println!("    export                              Dump boards and forum trees as JSON");
    println!("    demo                                Run against the built-in demo board");
    println!("    help                                Show this help");
    println!("    version                             Show the version");
}

fn print_version() {
    println!("roost {}", roost::VERSION);
}

fn open_manager() -> Result<BoardManager> {
    let db = Database::open().context("Could not open the board database")?;
    let manager = BoardManager::new(db);
    manager.load_boards()?;
    Ok(manager)
}

async fn find_board(manager: &BoardManager, name: &str) -> Option<BoardHandle> {
    for handle in manager.boards() {
        if handle.lock().await.name == name {
            return Some(handle);
        }
    }
    None
}

async fn list_boards() -> Result<()> {
    let manager = open_manager()?;

    if manager.board_count() == 0 {
        println!("No boards configured. Add one with 'roost add <name> <url>'.");
        return Ok(());
    }

    for handle in manager.boards() {
        let board = handle.lock().await;
        let forums = board.forum_hash().len();
        println!(
            "{:2}. {} [{}] {} ({} forums{})",
            board.display_order() + 1,
            board.name,
            board.protocol,
            board.url,
            forums,
            if board.enabled { "" } else { ", disabled" },
        );
    }

    Ok(())
}

async fn add_board(name: &str, url: &str, protocol: &str, username: &str) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let manager = open_manager()?;
    let registry = ParserRegistry::with_defaults();

    if find_board(&manager, name).await.is_some() {
        bail!("A board named '{name}' already exists");
    }

    let mut board = Board::new(url);
    board.name = name.to_string();
    board.protocol = protocol.to_string();
    board.username = username.to_string();
    *board.options_mut() = config.board_options();
    board.set_display_order(manager.board_count() as u32);

    // fetch the structure up front when the server is reachable
    if board.connect(&registry).is_ok() {
        board.login()?;
        board.process_completion().await;

        if board.status() == roost::BoardStatus::Online {
            let crawled = board.crawl_root(false).await?;
            println!("Crawled {} forums from {}", crawled.len(), url);
        } else {
            println!("Could not log in to {url}; saving the board offline");
        }
    }

    let handle = board_handle(board);
    manager.create_board(&handle).await?;
    println!("Added board '{name}'");

    Ok(())
}

async fn export_boards() -> Result<()> {
    let manager = open_manager()?;

    let mut exported = Vec::new();
    for handle in manager.boards() {
        let board = handle.lock().await;
        exported.push(serde_json::json!({
            "name": board.name,
            "url": board.url,
            "serviceUrl": board.service_url(),
            "protocol": board.protocol,
            "uuid": board.uuid(),
            "enabled": board.enabled,
            "lastUpdate": board.last_update(),
            "options": board.options(),
            "forums": board.root().map(|root| &root.children),
        }));
    }

    println!("{}", serde_json::to_string_pretty(&exported)?);
    Ok(())
}

async fn remove_board(name: &str) -> Result<()> {
    let manager = open_manager()?;

    let Some(handle) = find_board(&manager, name).await else {
        bail!("No board named '{name}'");
    };

    manager.delete_board(&handle).await?;
    println!("Removed board '{name}'");
    Ok(())
}

async fn sync_board(name: &str) -> Result<()> {
    let manager = open_manager()?;
    let registry = ParserRegistry::with_defaults();

    let Some(handle) = find_board(&manager, name).await else {
        bail!("No board named '{name}'");
    };

    let mut board = handle.lock().await;
    board.connect(&registry)?;
    board.login()?;
    board.process_completion().await;

    if board.status() != roost::BoardStatus::Online {
        bail!("Login to '{name}' failed");
    }
    println!("Logged in to '{}' as {}", board.name, board.username);

    board.crawl_root(false).await?;
    board.update_unread().await;

    if let Some(root) = board.root() {
        println!();
        for child in &root.children {
            print_tree(child, 0);
        }
    }

    Ok(())
}

async fn run_demo() -> Result<()> {
    let registry = ParserRegistry::with_defaults();

    let mut board = Board::new("https://demo.roost.invalid");
    board.name = "Demo Board".to_string();
    board.protocol = "demo".to_string();
    board.username = "guest".to_string();

    board.connect(&registry)?;
    let mut events = board.subscribe();

    board.login()?;
    board.process_completion().await;
    println!("Status: {}", board.status());

    board.crawl_root(true).await?;
    if let Some(root) = board.root() {
        println!();
        for child in &root.children {
            print_tree(child, 0);
        }
    }

    // fetch the first postable forum's threads
    let forum = board
        .forum("10")
        .cloned()
        .context("demo forum missing")?;
    board.request_thread_list(&forum, REQUEST_DEFAULT)?;
    board.process_completion().await;

    while let Ok(event) = events.try_recv() {
        if let BoardEvent::ThreadList { forum, .. } = event {
            println!();
            println!("Threads in '{}':", forum.name);
            for thread in &forum.threads {
                println!(
                    "  {} — {} ({} replies)",
                    thread.title, thread.author, thread.reply_count
                );
            }
        }
    }

    Ok(())
}

fn print_tree(forum: &Forum, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = match forum.forum_type {
        roost::ForumType::Category => "▸",
        roost::ForumType::Forum => "•",
        roost::ForumType::Link => "↗",
    };

    println!("{indent}{marker} {} ({})", forum.name, forum.id);
    for child in &forum.children {
        print_tree(child, depth + 1);
    }
}
