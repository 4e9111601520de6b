use chrono::{DateTime, Local};

pub fn format_timestamp(datetime: &DateTime<Local>) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

pub fn format_elapsed(start: &DateTime<Local>, end: &DateTime<Local>) -> String {
    let millis = (*end - *start).num_milliseconds().max(0);
    if millis < 1000 {
        format!("{} ms", millis)
    } else {
        format!("{:.2} s", millis as f64 / 1000.0)
    }
}

/// Tamaño legible para los bloques auxiliares descartados.
pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["bytes", "KiB", "MiB"];
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} bytes", bytes)
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
