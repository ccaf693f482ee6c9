use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    // Drop sub-second noise for anything over a second.
    let d = if d >= Duration::from_secs(1) {
        Duration::from_secs(d.as_secs())
    } else {
        d
    };
    humantime::format_duration(d).to_string()
}

pub(crate) fn format_ms_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.2}ms"),
        None => "-".to_string(),
    }
}

pub(crate) fn format_pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}
