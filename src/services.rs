use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::debug;
use tokio::{
    runtime::Handle,
    sync::{
        broadcast::{self, Receiver, Sender},
        watch,
    },
};

use crate::{
    config::PlaybackConfig,
    playback::{media::MediaOutput, session::PlaybackStatus},
    player_manager::PlayerManager,
    playlist::store::PlaylistSnapshot,
    protocol::Message,
    remote::RemoteStore,
    session_storage::SessionStorage,
    sync_manager::SyncManager,
};

pub struct ServicesConfig {
    pub playback: PlaybackConfig,
    pub remote: Box<dyn RemoteStore>,
    pub storage: SessionStorage,
    pub media: Box<dyn MediaOutput>,
    /// Runtime that drives the seek debounce timers.
    pub timer_handle: Handle,
}

pub struct RunningServices {
    pub bus_sender: Sender<Message>,
    pub playlist_receiver: watch::Receiver<Arc<PlaylistSnapshot>>,
    pub status_receiver: watch::Receiver<PlaybackStatus>,
    notice_receiver: Option<Receiver<Message>>,
    threads: Vec<JoinHandle<()>>,
}

impl RunningServices {
    /// Bus receiver subscribed before any worker started, so it has seen
    /// every message, including a failed first fetch.
    pub fn take_notice_receiver(&mut self) -> Option<Receiver<Message>> {
        self.notice_receiver.take()
    }

    pub fn shutdown(self) {
        let _ = self.bus_sender.send(Message::Shutdown);
        for thread in self.threads {
            let _ = thread.join();
        }
        debug!("Background services stopped");
    }
}

pub fn spawn_services(config: ServicesConfig) -> RunningServices {
    let ServicesConfig {
        playback,
        remote,
        storage,
        media,
        timer_handle,
    } = config;

    let (bus_sender, _) = broadcast::channel(1024);
    let notice_receiver = bus_sender.subscribe();

    let sync_manager_bus_receiver = bus_sender.subscribe();
    let sync_manager_bus_sender = bus_sender.clone();
    let sync_thread = thread::spawn(move || {
        let mut sync_manager =
            SyncManager::new(remote, sync_manager_bus_receiver, sync_manager_bus_sender);
        sync_manager.run();
    });

    let mut player_manager = PlayerManager::new(
        &playback,
        storage,
        media,
        timer_handle,
        bus_sender.subscribe(),
        bus_sender.clone(),
    );
    let playlist_receiver = player_manager.subscribe_playlist();
    let status_receiver = player_manager.subscribe_status();
    let player_thread = thread::spawn(move || player_manager.run());

    RunningServices {
        bus_sender,
        playlist_receiver,
        status_receiver,
        notice_receiver: Some(notice_receiver),
        threads: vec![player_thread, sync_thread],
    }
}
