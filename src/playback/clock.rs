//! Elapsed/duration text for the player timeline.

fn split_clock(total_secs: u64) -> (u64, u64, u64) {
    (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60)
}

fn whole_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    }
}

/// `m:ss`, or `h:mm:ss` when `with_hours` is set.
pub fn format_timestamp(seconds: f64, with_hours: bool) -> String {
    let (hr, min, sec) = split_clock(whole_seconds(seconds));
    if with_hours {
        format!("{}:{:02}:{:02}", hr, min, sec)
    } else {
        format!("{}:{:02}", hr * 60 + min, sec)
    }
}

/// `elapsed / duration`; both sides switch to hours once the duration reaches one.
pub fn timer_text(position_secs: f64, duration_secs: f64) -> String {
    let with_hours = whole_seconds(duration_secs.ceil()) >= 3600;
    format!(
        "{} / {}",
        format_timestamp(position_secs, with_hours),
        format_timestamp(duration_secs.ceil(), with_hours)
    )
}
