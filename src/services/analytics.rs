use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;

use crate::database::DbPool;
use crate::models::download_event::DownloadEvent;
use crate::utils::error::{AppError, AppResult};

/// Charting windows. Short windows bucket by hour, the month view by day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Last12Hours,
    Last24Hours,
    Last30Days,
}

impl Window {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "12h" => Some(Window::Last12Hours),
            "24h" => Some(Window::Last24Hours),
            "30d" => Some(Window::Last30Days),
            _ => None,
        }
    }

    pub fn bucket_count(&self) -> usize {
        match self {
            Window::Last12Hours => 12,
            Window::Last24Hours => 24,
            Window::Last30Days => 30,
        }
    }

    pub fn bucket_width(&self) -> Duration {
        match self {
            Window::Last12Hours | Window::Last24Hours => Duration::hours(1),
            Window::Last30Days => Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesBucket {
    pub bucket_start: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeatmapCell {
    /// 0 = Monday .. 6 = Sunday.
    pub day: u32,
    pub hour: u32,
    pub count: i64,
    pub intensity: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_downloads: i64,
    pub today: i64,
    pub yesterday: i64,
    pub trend_percent: f64,
    pub peak_hour: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileComparison {
    pub file_id: String,
    pub file_name: String,
    pub recent_downloads: i64,
    pub share_count: i64,
    pub total_downloads: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub files: Vec<FileComparison>,
    pub total_recent_downloads: i64,
    pub average_recent_downloads: f64,
}

const COMPARISON_CAP: usize = 6;

fn truncate(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    ts.duration_trunc(width).unwrap_or(ts)
}

/// Fixed-width buckets over a trailing window, zero-filled so the series is
/// always exactly `bucket_count` long regardless of event density.
pub fn bucket_series(
    events: &[DateTime<Utc>],
    window: Window,
    now: DateTime<Utc>,
) -> Vec<SeriesBucket> {
    let width = window.bucket_width();
    let count = window.bucket_count();
    let end = truncate(now, width);
    let start = end - width * (count as i32 - 1);

    let by_bucket: HashMap<DateTime<Utc>, usize> = events
        .iter()
        .map(|ts| truncate(*ts, width))
        .filter(|bucket| *bucket >= start && *bucket <= end)
        .counts();

    (0..count)
        .map(|i| {
            let bucket_start = start + width * (i as i32);
            SeriesBucket {
                bucket_start: bucket_start.to_rfc3339(),
                count: by_bucket.get(&bucket_start).copied().unwrap_or(0) as i64,
            }
        })
        .collect()
}

/// Intensity tiers relative to the hottest cell: 0 for empty, then quartile
/// boundaries at 25/50/75 percent of the maximum.
fn intensity_tier(count: i64, max: i64) -> u8 {
    if count == 0 || max == 0 {
        return 0;
    }

    let ratio = count as f64 / max as f64;
    if ratio <= 0.25 {
        1
    } else if ratio <= 0.5 {
        2
    } else if ratio <= 0.75 {
        3
    } else {
        4
    }
}

/// 7x24 day-of-week by hour-of-day grid over the trailing 7 days. Always
/// yields all 168 cells, an all-zero window included.
pub fn build_heatmap(events: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<HeatmapCell> {
    let since = now - Duration::days(7);

    let by_cell: HashMap<(u32, u32), usize> = events
        .iter()
        .filter(|ts| **ts > since && **ts <= now)
        .map(|ts| (ts.weekday().num_days_from_monday(), ts.hour()))
        .counts();

    let max = by_cell.values().copied().max().unwrap_or(0) as i64;

    (0..7u32)
        .cartesian_product(0..24u32)
        .map(|(day, hour)| {
            let count = by_cell.get(&(day, hour)).copied().unwrap_or(0) as i64;
            HeatmapCell {
                day,
                hour,
                count,
                intensity: intensity_tier(count, max),
            }
        })
        .collect()
}

/// Percent change of today against yesterday.
pub fn trend_percent(yesterday: i64, today: i64) -> f64 {
    if yesterday == 0 {
        if today == 0 { 0.0 } else { 100.0 }
    } else {
        (today - yesterday) as f64 / yesterday as f64 * 100.0
    }
}

/// Busiest hour-of-day over the trailing 7 days; ties go to the lowest hour.
pub fn peak_hour(events: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<u32> {
    let since = now - Duration::days(7);

    let by_hour: HashMap<u32, usize> = events
        .iter()
        .filter(|ts| **ts > since && **ts <= now)
        .map(|ts| ts.hour())
        .counts();

    (0..24u32)
        .filter_map(|hour| by_hour.get(&hour).map(|n| (hour, *n)))
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(hour, _)| hour)
}

/// Sorts descending by recent downloads, caps the list, and computes the
/// aggregates over the full set rather than the capped one.
pub fn build_comparison(mut files: Vec<FileComparison>) -> ComparisonReport {
    files.sort_by(|a, b| b.recent_downloads.cmp(&a.recent_downloads));

    let total_recent: i64 = files.iter().map(|f| f.recent_downloads).sum();
    let average = if files.is_empty() {
        0.0
    } else {
        total_recent as f64 / files.len() as f64
    };

    files.truncate(COMPARISON_CAP);

    ComparisonReport {
        files,
        total_recent_downloads: total_recent,
        average_recent_downloads: average,
    }
}

fn parse_event_times(raw: Vec<String>) -> Vec<DateTime<Utc>> {
    raw.into_iter()
        .filter_map(|s| match DateTime::parse_from_rfc3339(&s) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("Skipping unparseable event timestamp {:?}: {}", s, e);
                None
            }
        })
        .collect()
}

/// Timestamps of every download event against the owner's files, oldest first.
pub async fn load_owner_event_times(
    pool: &DbPool,
    owner_id: &str,
) -> AppResult<Vec<DateTime<Utc>>> {
    let raw: Vec<String> = sqlx::query_scalar(
        "SELECT e.downloaded_at FROM download_events e
         JOIN files f ON e.file_id = f.id
         WHERE f.owner_id = ?
         ORDER BY e.downloaded_at",
    )
    .bind(owner_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(parse_event_times(raw))
}

pub async fn series_for_owner(
    pool: &DbPool,
    owner_id: &str,
    window: Window,
) -> AppResult<Vec<SeriesBucket>> {
    let events = load_owner_event_times(pool, owner_id).await?;
    Ok(bucket_series(&events, window, Utc::now()))
}

pub async fn heatmap_for_owner(pool: &DbPool, owner_id: &str) -> AppResult<Vec<HeatmapCell>> {
    let events = load_owner_event_times(pool, owner_id).await?;
    Ok(build_heatmap(&events, Utc::now()))
}

pub async fn summary_for_owner(pool: &DbPool, owner_id: &str) -> AppResult<AnalyticsSummary> {
    let events = load_owner_event_times(pool, owner_id).await?;
    let now = Utc::now();

    let today_start = truncate(now, Duration::days(1));
    let yesterday_start = today_start - Duration::days(1);

    let today = events.iter().filter(|ts| **ts >= today_start).count() as i64;
    let yesterday = events
        .iter()
        .filter(|ts| **ts >= yesterday_start && **ts < today_start)
        .count() as i64;

    Ok(AnalyticsSummary {
        total_downloads: events.len() as i64,
        today,
        yesterday,
        trend_percent: trend_percent(yesterday, today),
        peak_hour: peak_hour(&events, now),
    })
}

pub async fn comparison_for_owner(pool: &DbPool, owner_id: &str) -> AppResult<ComparisonReport> {
    let since = (Utc::now() - Duration::days(7)).to_rfc3339();

    let rows = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
        "SELECT f.id, f.original_name,
            (SELECT COUNT(*) FROM download_events e WHERE e.file_id = f.id AND e.downloaded_at > ?) AS recent_downloads,
            (SELECT COUNT(*) FROM shared_links l WHERE l.file_id = f.id) AS share_count,
            f.download_count
         FROM files f
         WHERE f.owner_id = ? AND f.is_deleted = 0",
    )
    .bind(&since)
    .bind(owner_id)
    .fetch_all(pool.as_ref())
    .await?;

    let files = rows
        .into_iter()
        .map(
            |(file_id, file_name, recent_downloads, share_count, total_downloads)| FileComparison {
                file_id,
                file_name,
                recent_downloads,
                share_count,
                total_downloads,
            },
        )
        .collect();

    Ok(build_comparison(files))
}

/// Date filters for the event-log export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRange {
    Last7Days,
    Last30Days,
    AllTime,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl ExportRange {
    pub fn bounds(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self {
            ExportRange::Last7Days => (Some(now - Duration::days(7)), None),
            ExportRange::Last30Days => (Some(now - Duration::days(30)), None),
            ExportRange::AllTime => (None, None),
            ExportRange::Custom { start, end } => (Some(*start), Some(*end)),
        }
    }
}

pub async fn load_events_for_export(
    pool: &DbPool,
    owner_id: &str,
    range: ExportRange,
) -> AppResult<Vec<DownloadEvent>> {
    let (start, end) = range.bounds(Utc::now());
    let start = start.map(|ts| ts.to_rfc3339()).unwrap_or_default();
    let end = end
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "9999-12-31T23:59:59+00:00".to_string());

    let events = sqlx::query_as::<_, DownloadEvent>(
        "SELECT e.* FROM download_events e
         JOIN files f ON e.file_id = f.id
         WHERE f.owner_id = ? AND e.downloaded_at >= ? AND e.downloaded_at <= ?
         ORDER BY e.downloaded_at DESC",
    )
    .bind(owner_id)
    .bind(&start)
    .bind(&end)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(events)
}

fn csv_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn events_to_csv(events: &[DownloadEvent]) -> String {
    let mut out = String::from(
        "file_id,shared_link_id,download_method,downloader_ip,downloader_user_agent,downloaded_at\n",
    );

    for event in events {
        let row = [
            event.file_id.as_str(),
            event.shared_link_id.as_deref().unwrap_or(""),
            event.download_method.as_str(),
            event.downloader_ip.as_deref().unwrap_or(""),
            event.downloader_user_agent.as_str(),
            event.downloaded_at.as_str(),
        ]
        .iter()
        .map(|v| csv_quote(v))
        .join(",");

        out.push_str(&row);
        out.push('\n');
    }

    out
}

pub fn events_to_json(events: &[DownloadEvent]) -> AppResult<String> {
    serde_json::to_string_pretty(events)
        .map_err(|e| AppError::Internal(format!("Failed to serialize export: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::download_event::AccessMethod;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_series_zero_filled_length() {
        let now = ts("2026-08-10T15:30:00+00:00");

        for window in [Window::Last12Hours, Window::Last24Hours, Window::Last30Days] {
            let series = bucket_series(&[], window, now);
            assert_eq!(series.len(), window.bucket_count());
            assert!(series.iter().all(|b| b.count == 0));
        }
    }

    #[test]
    fn test_series_counts_land_in_buckets() {
        let now = ts("2026-08-10T15:30:00+00:00");
        let events = vec![
            ts("2026-08-10T15:05:00+00:00"),
            ts("2026-08-10T15:55:00+00:00"),
            ts("2026-08-10T14:59:59+00:00"),
            ts("2026-08-09T15:00:00+00:00"), // outside the 12h window
        ];

        let series = bucket_series(&events, Window::Last12Hours, now);
        assert_eq!(series.len(), 12);
        assert_eq!(series[11].count, 2);
        assert_eq!(series[10].count, 1);
        assert_eq!(series.iter().map(|b| b.count).sum::<i64>(), 3);
    }

    #[test]
    fn test_series_daily_buckets() {
        let now = ts("2026-08-10T15:30:00+00:00");
        let events = vec![
            ts("2026-08-10T01:00:00+00:00"),
            ts("2026-08-09T23:59:00+00:00"),
            ts("2026-07-01T00:00:00+00:00"), // outside 30d
        ];

        let series = bucket_series(&events, Window::Last30Days, now);
        assert_eq!(series.len(), 30);
        assert_eq!(series[29].count, 1);
        assert_eq!(series[28].count, 1);
        assert_eq!(series.iter().map(|b| b.count).sum::<i64>(), 2);
    }

    #[test]
    fn test_heatmap_zero_fill() {
        let cells = build_heatmap(&[], ts("2026-08-10T12:00:00+00:00"));
        assert_eq!(cells.len(), 168);
        assert!(cells.iter().all(|c| c.count == 0 && c.intensity == 0));
    }

    #[test]
    fn test_heatmap_counts_and_intensity() {
        let now = ts("2026-08-10T12:00:00+00:00"); // a Monday
        let events = vec![
            ts("2026-08-10T09:10:00+00:00"),
            ts("2026-08-10T09:20:00+00:00"),
            ts("2026-08-10T09:30:00+00:00"),
            ts("2026-08-10T09:40:00+00:00"),
            ts("2026-08-07T18:05:00+00:00"), // Friday
        ];

        let cells = build_heatmap(&events, now);
        let monday_nine = cells.iter().find(|c| c.day == 0 && c.hour == 9).unwrap();
        assert_eq!(monday_nine.count, 4);
        assert_eq!(monday_nine.intensity, 4);

        let friday_six = cells.iter().find(|c| c.day == 4 && c.hour == 18).unwrap();
        assert_eq!(friday_six.count, 1);
        assert_eq!(friday_six.intensity, 1);
    }

    #[test]
    fn test_heatmap_window_excludes_old_events() {
        let now = ts("2026-08-10T12:00:00+00:00");
        let events = vec![ts("2026-08-01T09:00:00+00:00")];

        let cells = build_heatmap(&events, now);
        assert!(cells.iter().all(|c| c.count == 0));
    }

    #[test]
    fn test_trend_percent_cases() {
        assert_eq!(trend_percent(0, 0), 0.0);
        assert_eq!(trend_percent(0, 5), 100.0);
        assert_eq!(trend_percent(10, 5), -50.0);
        assert_eq!(trend_percent(4, 6), 50.0);
    }

    #[test]
    fn test_peak_hour_lowest_wins_ties() {
        let now = ts("2026-08-10T12:00:00+00:00");
        let events = vec![
            ts("2026-08-09T17:00:00+00:00"),
            ts("2026-08-09T05:00:00+00:00"),
            ts("2026-08-08T05:30:00+00:00"),
            ts("2026-08-08T17:30:00+00:00"),
        ];

        assert_eq!(peak_hour(&events, now), Some(5));
        assert_eq!(peak_hour(&[], now), None);
    }

    #[test]
    fn test_comparison_sorted_and_capped() {
        let files: Vec<FileComparison> = (0..8)
            .map(|i| FileComparison {
                file_id: format!("f{}", i),
                file_name: format!("file-{}.txt", i),
                recent_downloads: i,
                share_count: 1,
                total_downloads: i * 2,
            })
            .collect();

        let report = build_comparison(files);
        assert_eq!(report.files.len(), 6);
        assert_eq!(report.files[0].recent_downloads, 7);
        assert_eq!(report.files[5].recent_downloads, 2);
        // Aggregates cover all files, not just the visible six.
        assert_eq!(report.total_recent_downloads, 28);
        assert!((report.average_recent_downloads - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_comparison_empty() {
        let report = build_comparison(vec![]);
        assert!(report.files.is_empty());
        assert_eq!(report.total_recent_downloads, 0);
        assert_eq!(report.average_recent_downloads, 0.0);
    }

    #[test]
    fn test_csv_export_quoting() {
        let mut event = DownloadEvent::new(
            "file-1".to_string(),
            None,
            AccessMethod::Code,
            Some("10.0.0.1".to_string()),
            "agent \"quoted\"".to_string(),
        );
        event.downloaded_at = "2026-08-10T12:00:00+00:00".to_string();

        let csv = events_to_csv(&[event]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "file_id,shared_link_id,download_method,downloader_ip,downloader_user_agent,downloaded_at"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"file-1\""));
        assert!(row.contains("\"agent \"\"quoted\"\"\""));
        assert!(row.contains("\"code\""));
    }

    #[test]
    fn test_json_export_is_pretty_array() {
        let event = DownloadEvent::new(
            "file-1".to_string(),
            Some("link-1".to_string()),
            AccessMethod::Link,
            None,
            "agent".to_string(),
        );

        let json = events_to_json(&[event]).unwrap();
        assert!(json.starts_with("[\n"));
        let parsed: Vec<DownloadEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].file_id, "file-1");
    }
}
