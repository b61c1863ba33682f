use feedline_core::entities::BatchPriority;

pub fn parse_priority(s: &str) -> anyhow::Result<BatchPriority> {
    match s.to_ascii_lowercase().as_str() {
        "critical" => Ok(BatchPriority::Critical),
        "high" => Ok(BatchPriority::High),
        "normal" => Ok(BatchPriority::Normal),
        "low" => Ok(BatchPriority::Low),
        "background" => Ok(BatchPriority::Background),
        other => anyhow::bail!("unknown priority '{other}', expected critical|high|normal|low|background"),
    }
}

pub fn priority_str(p: BatchPriority) -> &'static str {
    match p {
        BatchPriority::Critical => "critical",
        BatchPriority::High => "high",
        BatchPriority::Normal => "normal",
        BatchPriority::Low => "low",
        BatchPriority::Background => "background",
    }
}
