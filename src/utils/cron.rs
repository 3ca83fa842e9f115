//! Cron expression helpers

/// Validate cron schedule syntax
pub fn validate_cron_schedule(schedule: &str) -> bool {
    // Basic validation: minute-first (5 fields) or second-first (6 fields)
    matches!(schedule.split_whitespace().count(), 5 | 6)
}

/// Convert a schedule to the seconds-first form the job scheduler expects
pub fn normalize_schedule(schedule: &str) -> String {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}
