//! Logging for the staking subsystem.
//!
//! Two kinds of records flow through one pipeline: ordinary leveled lines,
//! admitted against a global level threshold, and categorized trace lines
//! (kernel checks, selection benchmarks) admitted against a category mask so
//! the chatty consensus tracers stay silent unless a `-debug=<category>`
//! switch turns them on. A bounded capture buffer lets tests snapshot what
//! was logged.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

/// Trace categories, each a bit in the mask. Independent of the level: a
/// categorized record is admitted iff its bit is set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Category {
    Coinstake = 1 << 0,
    Bench = 1 << 1,
    Validation = 1 << 2,
    Staker = 1 << 3,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coinstake => "coinstake",
            Self::Bench => "bench",
            Self::Validation => "validation",
            Self::Staker => "staker",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "coinstake" => Some(Self::Coinstake),
            "bench" => Some(Self::Bench),
            "validation" => Some(Self::Validation),
            "staker" => Some(Self::Staker),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

static LEVEL_THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);
static CATEGORY_MASK: AtomicU32 = AtomicU32::new(0);
static JSON_FORMAT: AtomicBool = AtomicBool::new(false);
static TIMESTAMPS: AtomicBool = AtomicBool::new(true);
static STDERR_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn set_level(level: Level) {
    LEVEL_THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn set_format(format: Format) {
    JSON_FORMAT.store(format == Format::Json, Ordering::Relaxed);
}

pub fn set_timestamps(enabled: bool) {
    TIMESTAMPS.store(enabled, Ordering::Relaxed);
}

pub fn set_stderr_enabled(enabled: bool) {
    STDERR_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn enable_category(category: Category) {
    CATEGORY_MASK.fetch_or(category as u32, Ordering::Relaxed);
}

pub fn disable_category(category: Category) {
    CATEGORY_MASK.fetch_and(!(category as u32), Ordering::Relaxed);
}

pub fn will_log_category(category: Category) -> bool {
    CATEGORY_MASK.load(Ordering::Relaxed) & (category as u32) != 0
}

/// The single admission gate: categorized records consult the mask alone,
/// plain records the level threshold alone.
pub fn should_log(level: Level, category: Option<Category>) -> bool {
    match category {
        Some(category) => will_log_category(category),
        None => level as u8 <= LEVEL_THRESHOLD.load(Ordering::Relaxed),
    }
}

/// One captured record, category included so tests can assert on trace
/// admission as well as content.
#[derive(Clone, Debug)]
pub struct CapturedLog {
    pub ts_ms: u64,
    pub level: Level,
    pub category: Option<Category>,
    pub target: &'static str,
    pub msg: String,
}

static CAPTURE_CAPACITY: AtomicUsize = AtomicUsize::new(0);
static CAPTURE: OnceLock<Mutex<VecDeque<CapturedLog>>> = OnceLock::new();

/// Capacity 0 disables capture.
pub fn enable_capture(capacity: usize) {
    CAPTURE_CAPACITY.store(capacity, Ordering::Relaxed);
    if capacity > 0 {
        CAPTURE.get_or_init(|| Mutex::new(VecDeque::with_capacity(capacity.min(4096))));
    }
}

pub fn clear_captured_logs() {
    if let Some(buffer) = CAPTURE.get() {
        if let Ok(mut records) = buffer.lock() {
            records.clear();
        }
    }
}

/// The most recent `limit` captured records, oldest first.
pub fn capture_snapshot(limit: usize) -> Vec<CapturedLog> {
    let Some(buffer) = CAPTURE.get() else {
        return Vec::new();
    };
    let Ok(records) = buffer.lock() else {
        return Vec::new();
    };
    let start = records.len().saturating_sub(limit);
    records.iter().skip(start).cloned().collect()
}

/// Render and deliver one admitted record. The macros gate with
/// [`should_log`] before calling, so this only formats what will be seen.
pub fn write_record(
    level: Level,
    category: Option<Category>,
    target: &'static str,
    args: fmt::Arguments<'_>,
) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let ts_ms: u64 = now.as_millis().try_into().unwrap_or(u64::MAX);
    let msg = args.to_string();

    if STDERR_ENABLED.load(Ordering::Relaxed) {
        let mut out = io::stderr().lock();
        if JSON_FORMAT.load(Ordering::Relaxed) {
            let line = json!({
                "ts_ms": ts_ms,
                "level": level.as_str(),
                "category": category.map(Category::as_str),
                "target": target,
                "msg": msg,
            });
            let _ = writeln!(out, "{line}");
        } else {
            if TIMESTAMPS.load(Ordering::Relaxed) {
                let _ = write!(out, "{}.{:03} ", now.as_secs(), now.subsec_millis());
            }
            match category {
                Some(category) => {
                    let _ = writeln!(out, "[{}] {target}: {msg}", category.as_str());
                }
                None => {
                    let _ = writeln!(out, "{} {target}: {msg}", level.as_str());
                }
            }
        }
    }

    let capacity = CAPTURE_CAPACITY.load(Ordering::Relaxed);
    if capacity == 0 {
        return;
    }
    let Some(buffer) = CAPTURE.get() else {
        return;
    };
    let Ok(mut records) = buffer.lock() else {
        return;
    };
    records.push_back(CapturedLog {
        ts_ms,
        level,
        category,
        target,
        msg,
    });
    while records.len() > capacity {
        let _ = records.pop_front();
    }
}

/// Every log macro funnels through here: gate, then render.
#[macro_export]
macro_rules! log_event {
    ($level:expr, $category:expr, $($arg:tt)*) => {{
        if $crate::should_log($level, $category) {
            $crate::write_record($level, $category, module_path!(), format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::log_event!($crate::Level::Error, ::core::option::Option::None, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::log_event!($crate::Level::Warn, ::core::option::Option::None, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::log_event!($crate::Level::Info, ::core::option::Option::None, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        $crate::log_event!($crate::Level::Debug, ::core::option::Option::None, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        $crate::log_event!($crate::Level::Trace, ::core::option::Option::None, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_category {
    ($category:expr, $($arg:tt)*) => {{
        $crate::log_event!(
            $crate::Level::Debug,
            ::core::option::Option::Some($category),
            $($arg)*
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_and_format() {
        assert_eq!(Level::parse("info"), Some(Level::Info));
        assert_eq!(Level::parse("WARN"), Some(Level::Warn));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("nope"), None);
        assert_eq!(Format::parse("text"), Some(Format::Text));
        assert_eq!(Format::parse("JSON"), Some(Format::Json));
        assert_eq!(Format::parse("nope"), None);
    }

    #[test]
    fn parse_category() {
        assert_eq!(Category::parse("coinstake"), Some(Category::Coinstake));
        assert_eq!(Category::parse("Bench"), Some(Category::Bench));
        assert_eq!(Category::parse("nope"), None);
    }

    #[test]
    fn admission_gate_splits_by_record_kind() {
        // Plain records go by level; the default threshold admits Info and
        // rejects Trace.
        assert!(should_log(Level::Info, None));
        assert!(!should_log(Level::Trace, None));

        // Categorized records ignore the level entirely: nothing is admitted
        // until the bit is set, everything at that bit is admitted after.
        assert!(!should_log(Level::Error, Some(Category::Staker)));
        enable_category(Category::Staker);
        assert!(should_log(Level::Trace, Some(Category::Staker)));
        assert!(!should_log(Level::Error, Some(Category::Validation)));
        disable_category(Category::Staker);
        assert!(!should_log(Level::Error, Some(Category::Staker)));
    }

    #[test]
    fn capture_records_category_and_message() {
        set_stderr_enabled(false);
        enable_capture(8);
        clear_captured_logs();

        enable_category(Category::Bench);
        log_category!(Category::Bench, "selected {} packages", 3);
        log_info!("tick {}", 7);
        disable_category(Category::Bench);

        let records = capture_snapshot(8);
        assert!(records
            .iter()
            .any(|r| r.category == Some(Category::Bench) && r.msg == "selected 3 packages"));
        assert!(records
            .iter()
            .any(|r| r.category.is_none() && r.level == Level::Info && r.msg == "tick 7"));
        set_stderr_enabled(true);
    }
}
