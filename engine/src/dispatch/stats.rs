//! Campaign statistics aggregation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Campaign;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub counters: Counters,
    #[serde(rename = "chartData")]
    pub chart_data: Vec<DailyActivity>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Counters {
    /// Plain-text campaigns
    #[serde(rename = "totalMessages")]
    pub total_messages: usize,
    /// Flyer campaigns
    #[serde(rename = "totalCampaigns")]
    pub total_campaigns: usize,
    /// Invitations issued: sum of recipient-list lengths of flyer campaigns
    #[serde(rename = "totalInvitations")]
    pub total_invitations: usize,
}

/// Activity of one calendar day (UTC).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyActivity {
    pub date: String,
    pub messages: usize,
    pub flyers: usize,
}

/// Classify and count campaigns, bucketed per calendar day of creation.
pub fn aggregate(campaigns: &[Campaign]) -> Stats {
    let mut counters = Counters {
        total_messages: 0,
        total_campaigns: 0,
        total_invitations: 0,
    };
    // BTreeMap keeps the day buckets in chronological order
    let mut days: BTreeMap<String, DailyActivity> = BTreeMap::new();

    for campaign in campaigns {
        let date = campaign.created_at.format("%Y-%m-%d").to_string();
        let day = days.entry(date.clone()).or_insert_with(|| DailyActivity {
            date,
            messages: 0,
            flyers: 0,
        });

        if campaign.is_flyer() {
            counters.total_campaigns += 1;
            counters.total_invitations += campaign.recipients.len();
            day.flyers += 1;
        } else {
            counters.total_messages += 1;
            day.messages += 1;
        }
    }

    Stats {
        counters,
        chart_data: days.into_values().collect(),
    }
}
