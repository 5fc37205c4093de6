//! # report: Notification text
//!
//! Pure formatting of everything the notifiers deliver. Markdown-light so
//! it reads the same in a WeChat markdown card and a Telegram chat.

use chrono::{DateTime, Local, Utc};

use crate::config::FollowConfig;
use crate::engine::router::ExecutionMode;
use crate::models::{ExecutionResult, TradeIntent};

/// Intent lines shown per execution report.
const REPORT_DETAIL_LIMIT: usize = 5;

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Raw detected changes, before any filtering.
pub fn change_summary(intents: &[TradeIntent], at: DateTime<Utc>) -> String {
    let mut text = format!(
        "📊 **Position changes detected** ({})\n\n⏰ Time: {}\n\n",
        intents.len(),
        local(at)
    );
    for (i, intent) in intents.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, intent.summary));
    }
    text
}

pub fn execution_report(
    result: &ExecutionResult,
    config: &FollowConfig,
    mode: ExecutionMode,
    at: DateTime<Utc>,
) -> String {
    let mode_tag = match mode {
        ExecutionMode::DryRun => " [DRY-RUN]",
        ExecutionMode::Live   => "",
    };
    let total = result.success_count + result.failed_count;

    let mut text = format!(
        "🤖 **Bitget follow report** ({}){mode_tag}\n\n\
         ⏰ Time: {}\n\
         📊 Intents: {total}\n\
         ✅ Success: {}\n\
         ❌ Failed: {}\n\
         📉 Scale ratio: {}\n\n",
        result.environment,
        local(at),
        result.success_count,
        result.failed_count,
        config.scale_ratio,
    );

    if let Some(reason) = &result.fatal_error {
        text.push_str(&format!("🛑 Environment unavailable: {reason}\n"));
        return text;
    }

    let unprotected = result.unprotected().count();
    if unprotected > 0 {
        text.push_str(&format!("🚨 {unprotected} position(s) UNPROTECTED, check the account now\n\n"));
    }

    for (i, o) in result.outcomes.iter().take(REPORT_DETAIL_LIMIT).enumerate() {
        let flag = if o.outcome.is_unprotected() {
            "🚨"
        } else if o.outcome.is_success() {
            "✅"
        } else {
            "❌"
        };
        text.push_str(&format!("{}. {flag} {} → {}\n", i + 1, o.summary, o.outcome.describe()));
    }
    if result.outcomes.len() > REPORT_DETAIL_LIMIT {
        text.push_str(&format!("\n... and {} more", result.outcomes.len() - REPORT_DETAIL_LIMIT));
    }
    text
}

pub fn startup_notice(
    api_url: &str,
    monitored_models: &[String],
    interval_secs: u64,
    trading: &str,
    at: DateTime<Utc>,
) -> String {
    let models = if monitored_models.is_empty() {
        "all models".to_string()
    } else {
        monitored_models.join(", ")
    };
    format!(
        "🚀 **Mirrortrade started**\n\n\
         ⏰ Time: {}\n\
         🔗 Source: {api_url}\n\
         👀 Models: {models}\n\
         💱 Trading: {trading}\n\n\
         ✅ Checking positions every {interval_secs}s",
        local(at)
    )
}

pub fn shutdown_notice(at: DateTime<Utc>) -> String {
    format!("🛑 **Mirrortrade stopped**\n\n⏰ Time: {}\n\nShut down cleanly", local(at))
}

pub fn test_notice(at: DateTime<Utc>) -> String {
    format!("🧪 **Mirrortrade test message**\n\n⏰ Time: {}\n\n✅ Channel is working", local(at))
}
