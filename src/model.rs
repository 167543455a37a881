use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "PENDING",
            ModerationStatus::Approved => "APPROVED",
            ModerationStatus::Rejected => "REJECTED",
        }
    }
}

impl Default for ModerationStatus {
    fn default() -> Self {
        ModerationStatus::Pending
    }
}

/// Outcome a moderator can send to the backend. `PENDING` is never a valid
/// target, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        ModerationStatus::from(*self).as_str()
    }
}

impl From<Decision> for ModerationStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => ModerationStatus::Approved,
            Decision::Rejected => ModerationStatus::Rejected,
        }
    }
}

/// Common view over the rows of a moderation queue.
pub trait QueueItem: Clone + Send + Sync + 'static {
    fn id(&self) -> i64;
    fn status(&self) -> ModerationStatus;
    /// Post that a delete action would remove; `None` once it is gone.
    fn subject_post_id(&self) -> Option<i64>;
}

/// One batch of queue items as returned by a single paginated fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage<T> {
    pub items: Vec<T>,
    pub is_last: bool,
    pub page_number: u32,
    pub total_count: u64,
}

impl<T> QueuePage<T> {
    /// One-based page counter for display. The wire is zero-based.
    pub fn display_number(&self) -> u32 {
        self.page_number + 1
    }
}

/// Spring-style page envelope as it appears on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct WirePage<T> {
    pub content: Vec<T>,
    pub last: bool,
    pub number: u32,
    #[serde(default, rename = "totalElements")]
    pub total_elements: u64,
}

impl<T> From<WirePage<T>> for QueuePage<T> {
    fn from(w: WirePage<T>) -> Self {
        QueuePage {
            items: w.content,
            is_last: w.last,
            page_number: w.number,
            total_count: w.total_elements,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verification {
    #[serde(rename = "verificationId")]
    pub id: i64,
    #[serde(rename = "postId", default)]
    pub post_id: Option<i64>,
    #[serde(rename = "userId")]
    pub subject_user_id: Option<i64>,
    #[serde(rename = "userNickname", default)]
    pub subject_nickname: Option<String>,
    #[serde(rename = "verificationImageUrl", default)]
    pub image_url: Option<String>,
    #[serde(rename = "detoxTime", default)]
    pub detox_hours: i32,
    #[serde(default)]
    pub status: ModerationStatus,
    #[serde(rename = "createdAt", deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl QueueItem for Verification {
    fn id(&self) -> i64 {
        self.id
    }

    fn status(&self) -> ModerationStatus {
        self.status
    }

    fn subject_post_id(&self) -> Option<i64> {
        self.post_id
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportedPostSnapshot {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub author_id: Option<i64>,
    pub author_nickname: Option<String>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Report {
    pub id: i64,
    pub reason: String,
    pub status: ModerationStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub reporter_id: Option<i64>,
    pub reporter_nickname: Option<String>,
    pub reported_post_id: Option<i64>,
    pub reported_post: Option<ReportedPostSnapshot>,
}

impl QueueItem for Report {
    fn id(&self) -> i64 {
        self.id
    }

    fn status(&self) -> ModerationStatus {
        self.status
    }

    fn subject_post_id(&self) -> Option<i64> {
        self.reported_post_id
    }
}

/// Flat report row; the `reportedPost*` columns are folded into a snapshot.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReport {
    report_id: i64,
    #[serde(default)]
    reason: String,
    status: ModerationStatus,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reporter_id: Option<i64>,
    #[serde(default)]
    reporter_nickname: Option<String>,
    #[serde(default)]
    reported_post_id: Option<i64>,
    #[serde(default)]
    reported_post_title: Option<String>,
    #[serde(default)]
    reported_post_content: Option<String>,
    #[serde(default)]
    reported_post_author_id: Option<i64>,
    #[serde(default)]
    reported_post_author_nickname: Option<String>,
    #[serde(default)]
    reported_post_category_name: Option<String>,
    #[serde(default)]
    reported_post_image_url: Option<ImageUrls>,
}

/// The backend sends either a single URL or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImageUrls {
    One(String),
    Many(Vec<String>),
}

impl ImageUrls {
    fn first(self) -> Option<String> {
        match self {
            ImageUrls::One(url) => Some(url),
            ImageUrls::Many(urls) => urls.into_iter().next(),
        }
    }
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let w = WireReport::deserialize(deserializer)?;
        let has_snapshot = w.reported_post_title.is_some()
            || w.reported_post_content.is_some()
            || w.reported_post_author_id.is_some();
        let reported_post = has_snapshot.then(|| ReportedPostSnapshot {
            title: w.reported_post_title,
            content: w.reported_post_content,
            image_url: w.reported_post_image_url.and_then(ImageUrls::first),
            author_id: w.reported_post_author_id,
            author_nickname: w.reported_post_author_nickname,
            category_name: w.reported_post_category_name,
        });
        Ok(Report {
            id: w.report_id,
            reason: w.reason,
            status: w.status,
            created_at: w.created_at,
            reporter_id: w.reporter_id,
            reporter_nickname: w.reporter_nickname,
            reported_post_id: w.reported_post_id,
            reported_post,
        })
    }
}

/// Parse a backend timestamp. Local date-times without an offset are taken
/// as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}

/// Short age label for queue rows: hours for the last day, the date after.
pub fn age_label(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(created_at);
    if age < Duration::hours(24) {
        format!("{}h ago", age.num_hours().max(0))
    } else {
        created_at.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verification_from_wire() {
        let v: Verification = serde_json::from_value(json!({
            "verificationId": 7,
            "postId": 70,
            "userId": 3,
            "status": "PENDING",
            "detoxTime": 5,
            "userNickname": "mina",
            "verificationImageUrl": null,
            "createdAt": "2025-04-30T12:00:00.123456"
        }))
        .unwrap();
        assert_eq!(v.id(), 7);
        assert_eq!(v.subject_post_id(), Some(70));
        assert_eq!(v.detox_hours, 5);
        assert_eq!(v.image_url, None);
        assert_eq!(v.status(), ModerationStatus::Pending);
    }

    #[test]
    fn report_folds_post_snapshot() {
        let r: Report = serde_json::from_value(json!({
            "reportId": 11,
            "reason": "spam",
            "status": "APPROVED",
            "createdAt": "2025-04-30T12:00:00",
            "reporterId": 2,
            "reporterNickname": "kim",
            "reportedPostId": 40,
            "reportedPostTitle": "buy now",
            "reportedPostContent": "...",
            "reportedPostAuthorId": 9,
            "reportedPostAuthorNickname": "seller",
            "reportedPostCategoryName": "free",
            "reportedPostImageUrl": ["https://img/1.png", "https://img/2.png"]
        }))
        .unwrap();
        assert_eq!(r.status(), ModerationStatus::Approved);
        let post = r.reported_post.unwrap();
        assert_eq!(post.title.as_deref(), Some("buy now"));
        assert_eq!(post.image_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(post.author_id, Some(9));
    }

    #[test]
    fn report_without_post_has_no_delete_target() {
        let r: Report = serde_json::from_value(json!({
            "reportId": 12,
            "reason": "abuse",
            "status": "PENDING",
            "reportedPostId": null
        }))
        .unwrap();
        assert_eq!(r.subject_post_id(), None);
        assert!(r.reported_post.is_none());
    }

    #[test]
    fn display_number_is_one_based() {
        let page: QueuePage<()> = QueuePage {
            items: vec![],
            is_last: true,
            page_number: 0,
            total_count: 0,
        };
        assert_eq!(page.display_number(), 1);
    }

    #[test]
    fn age_label_switches_to_date_after_a_day() {
        let now = Utc.with_ymd_and_hms(2025, 5, 2, 12, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2025, 5, 2, 7, 30, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2025, 4, 28, 9, 0, 0).unwrap();
        assert_eq!(age_label(recent, now), "4h ago");
        assert_eq!(age_label(old, now), "2025-04-28");
    }
}
