/// Format a lap time in seconds as `M:SS.mmm`, or `N/A` when absent
pub fn format_lap_time(time_seconds: Option<f64>) -> String {
    match time_seconds {
        Some(t) if t.is_finite() => {
            let minutes = (t / 60.).floor();
            let seconds = t - minutes * 60.;
            format!("{}:{:06.3}", minutes as u64, seconds)
        }
        _ => "N/A".to_string(),
    }
}
