//! Line-oriented front end: parses typed commands into bus messages and renders
//! the playlist snapshot and the now-playing panel.

use crate::{
    playback::session::{PlaybackState, PlaybackStatus, VolumeLevel},
    playlist::store::PlaylistSnapshot,
    protocol::{Message, PlaybackMessage, PlaylistMessage},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    #[error("unknown command {0:?}, try `help`")]
    UnknownCommand(String),
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("`{command}`: {value:?} is not a valid {argument}")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    Send(Message),
    List,
    Info,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  list                      show the playlist
  info                      show what is playing
  select <id>               play an item
  reorder <from> <to>       drag by list index
  move <id> <to>            drag by key
  skip <id>                 toggle the skip flag
  play | pause | toggle | k
  seek <secs>               jump to a timestamp
  back | j, fwd | l         jump by the configured step
  speed <rate>              playback speed
  volume <0-100>
  hide | show               toggle the playlist panel
  meta <id> <secs>          media engine: duration known
  time <id> <secs>          media engine: position update
  end <id>                  media engine: natural end
  fail <id> <reason>        media engine: playback error
  quit";

struct Args<'a> {
    command: &'static str,
    parts: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn text(&mut self, argument: &'static str) -> Result<&'a str, ConsoleError> {
        self.parts.next().ok_or(ConsoleError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn parse<T: std::str::FromStr>(&mut self, argument: &'static str) -> Result<T, ConsoleError> {
        let value = self.text(argument)?;
        value.parse().map_err(|_| ConsoleError::InvalidArgument {
            command: self.command,
            argument,
            value: value.to_string(),
        })
    }

    fn rest(self) -> String {
        self.parts.collect::<Vec<_>>().join(" ")
    }
}

fn playlist(message: PlaylistMessage) -> ConsoleCommand {
    ConsoleCommand::Send(Message::Playlist(message))
}

fn playback(message: PlaybackMessage) -> ConsoleCommand {
    ConsoleCommand::Send(Message::Playback(message))
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(
    line: &str,
    seek_step_secs: f64,
) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    let head = head.to_ascii_lowercase();
    let args = |command: &'static str| Args { command, parts };

    let command = match head.as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "info" | "status" | "i" => ConsoleCommand::Info,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        "select" => playlist(PlaylistMessage::SelectItem(
            args("select").text("an item key")?.to_string(),
        )),
        "reorder" => {
            let mut args = args("reorder");
            let from = args.parse("source index")?;
            let to = args.parse("target index")?;
            playlist(PlaylistMessage::ReorderItems { from, to })
        }
        "move" => {
            let mut args = args("move");
            let doc_id = args.text("an item key")?.to_string();
            let to = args.parse("target index")?;
            playlist(PlaylistMessage::MoveItem { doc_id, to })
        }
        "skip" => playlist(PlaylistMessage::ToggleSkip(
            args("skip").text("an item key")?.to_string(),
        )),
        "hide" => playlist(PlaylistMessage::SetPlaylistHidden(true)),
        "show" => playlist(PlaylistMessage::SetPlaylistHidden(false)),
        "play" => playback(PlaybackMessage::Play),
        "pause" => playback(PlaybackMessage::Pause),
        "toggle" | "k" => playback(PlaybackMessage::TogglePlay),
        "seek" => playback(PlaybackMessage::Seek(args("seek").parse("timestamp")?)),
        "back" | "j" => playback(PlaybackMessage::SeekRelative(-seek_step_secs)),
        "fwd" | "l" => playback(PlaybackMessage::SeekRelative(seek_step_secs)),
        "speed" => playback(PlaybackMessage::SetSpeed(args("speed").parse("rate")?)),
        "volume" | "vol" => {
            let mut args = args("volume");
            let level: u8 = args.parse("volume level")?;
            if level > 100 {
                return Err(ConsoleError::InvalidArgument {
                    command: "volume",
                    argument: "volume level",
                    value: level.to_string(),
                });
            }
            playback(PlaybackMessage::SetVolume(level))
        }
        "meta" => {
            let mut args = args("meta");
            let doc_id = args.text("an item key")?.to_string();
            let duration_secs = args.parse("duration")?;
            playback(PlaybackMessage::MetadataReady {
                doc_id,
                duration_secs,
            })
        }
        "time" => {
            let mut args = args("time");
            let doc_id = args.text("an item key")?.to_string();
            let position_secs = args.parse("position")?;
            playback(PlaybackMessage::TimeUpdate {
                doc_id,
                position_secs,
            })
        }
        "end" => playback(PlaybackMessage::Ended {
            doc_id: args("end").text("an item key")?.to_string(),
        }),
        "fail" => {
            let mut args = args("fail");
            let doc_id = args.text("an item key")?.to_string();
            let reason = args.rest();
            playback(PlaybackMessage::PlaybackFailed {
                doc_id,
                reason: if reason.is_empty() {
                    "media error".to_string()
                } else {
                    reason
                },
            })
        }
        _ => return Err(ConsoleError::UnknownCommand(head.to_string())),
    };
    Ok(Some(command))
}

pub fn render_playlist(snapshot: &PlaylistSnapshot) -> String {
    if snapshot.playlist_hidden {
        return "(playlist hidden, `show` to reveal)".to_string();
    }
    if snapshot.is_empty() {
        return "(playlist empty)".to_string();
    }
    snapshot
        .items
        .iter()
        .map(|item| {
            let marker = if snapshot.current_doc_id.as_deref() == Some(item.doc_id.as_str()) {
                '>'
            } else {
                ' '
            };
            let skip = if item.skip { " [skip]" } else { "" };
            format!(
                "{} {:>2}. {} ({}){}",
                marker, item.position, item.title, item.doc_id, skip
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_speed(rate: f32) -> String {
    format!("{}x", rate)
}

/// Title block of the current item followed by the transport line.
pub fn render_now_playing(
    snapshot: &PlaylistSnapshot,
    status: &PlaybackStatus,
    speed_options: &[f32],
) -> String {
    let Some(item) = snapshot.current_item() else {
        return "(nothing selected)".to_string();
    };
    let mut lines = vec![item.title.clone()];
    lines.extend(
        [&item.subtitle, &item.description]
            .into_iter()
            .filter(|text| !text.is_empty())
            .cloned(),
    );

    let state = match status.state {
        PlaybackState::Idle => "stopped",
        PlaybackState::Loading => "loading",
        PlaybackState::Ready | PlaybackState::Paused => "paused",
        PlaybackState::Playing => "playing",
    };
    let volume = match status.volume_level {
        VolumeLevel::Muted => "muted",
        VolumeLevel::Low => "low",
        VolumeLevel::High => "high",
    };
    let mut transport = format!(
        "[{}] {}  speed {}  volume {} ({})",
        state,
        status.timer_text,
        format_speed(status.playback_rate),
        status.volume,
        volume
    );
    if status.buffering {
        transport.push_str("  buffering");
    }
    lines.push(transport);

    if !speed_options.is_empty() {
        let options: Vec<String> = speed_options.iter().copied().map(format_speed).collect();
        lines.push(format!("speeds: {}", options.join(" ")));
    }
    lines.join("\n")
}
