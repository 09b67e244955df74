use std::{
    io::BufRead,
    path::{Path, PathBuf},
    thread,
};

use log::{info, warn};
use tokio::sync::{broadcast::error::RecvError, oneshot};

use reelist::{
    config::load_or_create_config,
    console::{self, ConsoleCommand},
    db_manager::DbManager,
    playback::media::LoggingMediaOutput,
    protocol::{Message, PlaylistItem, SyncMessage},
    services::{spawn_services, ServicesConfig},
    session_storage::{MemoryStore, SessionStorage, TomlFileStore},
};

/// Seeds an empty collection from a JSON array of playlist documents.
fn import_playlist(
    db_manager: &mut DbManager,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if db_manager.count()? > 0 {
        warn!(
            "Playlist collection already populated, not importing {}",
            path.display()
        );
        return Ok(());
    }
    let content = std::fs::read_to_string(path)?;
    let items: Vec<PlaylistItem> = serde_json::from_str(&content)?;
    db_manager.import_items(items)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();
    log::set_max_level(log::LevelFilter::Info);

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_root = dirs::config_dir()
        .ok_or("no user config directory")?
        .join("reelist");
    let config = load_or_create_config(&config_root.join("config.toml"))?;
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .or_else(|| config.logging.level.parse().ok())
        .unwrap_or(log::LevelFilter::Info);
    log::set_max_level(level);

    let database_path = config.storage.resolved_database_path();
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut db_manager = DbManager::new(&database_path)?;
    if let Some(import_path) = std::env::args_os().nth(1).map(PathBuf::from) {
        import_playlist(&mut db_manager, &import_path)?;
    }

    // Timer runtime driving debounced seeks
    let timer_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let timer_handle = timer_runtime.handle().clone();
    let (timer_shutdown_tx, timer_shutdown_rx) = oneshot::channel::<()>();
    thread::spawn(move || {
        timer_runtime.block_on(async {
            let _ = timer_shutdown_rx.await;
        });
    });

    let storage = SessionStorage::new(
        Box::new(MemoryStore::new()),
        Box::new(TomlFileStore::open(
            config.storage.resolved_state_path(&config_root),
        )),
    );
    let mut services = spawn_services(ServicesConfig {
        playback: config.playback.clone(),
        remote: Box::new(db_manager),
        storage,
        media: Box::new(LoggingMediaOutput),
        timer_handle,
    });
    let mut notice_receiver = services
        .take_notice_receiver()
        .ok_or("notice receiver already taken")?;

    // Surface notices on the console
    thread::spawn(move || loop {
        match notice_receiver.blocking_recv() {
            Ok(Message::Notice(notice)) => println!("! {}", notice),
            Ok(Message::Sync(SyncMessage::PersistFailed { doc_id, reason })) => {
                println!("! could not save {}: {}", doc_id, reason)
            }
            Ok(Message::Shutdown) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    });

    println!("{}", console::HELP);
    let seek_step_secs = f64::from(config.playback.seek_step_secs);
    let speed_options = config.playback.speed_options();
    for line in std::io::stdin().lock().lines() {
        match console::parse_command(&line?, seek_step_secs) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Send(message))) => {
                let _ = services.bus_sender.send(message);
            }
            Ok(Some(ConsoleCommand::List)) => {
                println!("{}", console::render_playlist(&services.playlist_receiver.borrow()))
            }
            Ok(Some(ConsoleCommand::Info)) => println!(
                "{}",
                console::render_now_playing(
                    &services.playlist_receiver.borrow(),
                    &services.status_receiver.borrow(),
                    &speed_options,
                )
            ),
            Ok(Some(ConsoleCommand::Help)) => println!("{}", console::HELP),
            Ok(Some(ConsoleCommand::Quit)) => break,
            Err(err) => println!("! {}", err),
        }
    }

    services.shutdown();
    let _ = timer_shutdown_tx.send(());

    info!("Application exiting");
    Ok(())
}
