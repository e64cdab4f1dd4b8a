use std::time::Duration;

/// Elapsed time as `[Time used] h m s`, dropping leading zero units.
pub fn format_time_used(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs_f64();
    let hours = (total_secs / 3600.0) as u64;
    let minutes = ((total_secs % 3600.0) / 60.0) as u64;
    let seconds = total_secs % 60.0;

    match (hours, minutes) {
        (0, 0) => format!("[Time used] {:05.3} s", seconds),
        (0, m) => format!("[Time used] {:02} m {:05.3} s", m, seconds),
        (h, m) => format!("[Time used] {:02} h {:02} m {:05.3} s", h, m, seconds),
    }
}
