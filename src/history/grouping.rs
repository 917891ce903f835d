use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::models::chat::Conversation;

/// Recency bucket for the conversation list, by local calendar day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecencyGroup {
    Today,
    Yesterday,
    LastWeek,
}

impl RecencyGroup {
    pub fn label(&self) -> &'static str {
        match self {
            RecencyGroup::Today => "Today",
            RecencyGroup::Yesterday => "Yesterday",
            RecencyGroup::LastWeek => "Last Week",
        }
    }
}

/// Bucket by the local calendar day of `updated_at` relative to `today`.
/// Anything older than yesterday falls into Last Week.
pub fn group_for(updated_at: DateTime<Utc>, today: NaiveDate) -> RecencyGroup {
    let day = updated_at.with_timezone(&Local).date_naive();
    let diff = today.signed_duration_since(day).num_days();
    if diff <= 0 {
        RecencyGroup::Today
    } else if diff == 1 {
        RecencyGroup::Yesterday
    } else {
        RecencyGroup::LastWeek
    }
}

#[derive(Debug, Default)]
pub struct GroupedConversations<'a> {
    pub today: Vec<&'a Conversation>,
    pub yesterday: Vec<&'a Conversation>,
    pub last_week: Vec<&'a Conversation>,
}

impl<'a> GroupedConversations<'a> {
    pub fn is_empty(&self) -> bool {
        self.today.is_empty() && self.yesterday.is_empty() && self.last_week.is_empty()
    }

    pub fn buckets(&self) -> [(RecencyGroup, &[&'a Conversation]); 3] {
        [
            (RecencyGroup::Today, self.today.as_slice()),
            (RecencyGroup::Yesterday, self.yesterday.as_slice()),
            (RecencyGroup::LastWeek, self.last_week.as_slice()),
        ]
    }
}

/// Filter by case-insensitive substring on the title, order by `updated_at`
/// descending, then split into recency buckets.
pub fn group_conversations<'a>(
    conversations: &'a [Conversation],
    search: &str,
    today: NaiveDate,
) -> GroupedConversations<'a> {
    let query = search.trim().to_lowercase();
    let mut filtered: Vec<&Conversation> = conversations
        .iter()
        .filter(|c| query.is_empty() || c.title.to_lowercase().contains(&query))
        .collect();
    filtered.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let mut groups = GroupedConversations::default();
    for convo in filtered {
        match group_for(convo.updated_at, today) {
            RecencyGroup::Today => groups.today.push(convo),
            RecencyGroup::Yesterday => groups.yesterday.push(convo),
            RecencyGroup::LastWeek => groups.last_week.push(convo),
        }
    }
    groups
}
