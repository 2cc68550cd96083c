use serde::{Deserialize, Serialize};

/// A campaign as listed by the upstream ad platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_serializes_camel_case() {
        let campaign = Campaign {
            id: "cmp-001".to_string(),
            name: "Summer".to_string(),
            campaign_type: Some("SHOPPING".to_string()),
            status: Some("ELIGIBLE".to_string()),
            daily_budget: Some(50_000.0),
        };
        let json = serde_json::to_value(&campaign).unwrap();
        assert_eq!(json["campaignType"], "SHOPPING");
        assert_eq!(json["dailyBudget"], 50_000.0);
    }

    #[test]
    fn test_campaign_optional_fields_default() {
        let campaign: Campaign =
            serde_json::from_str(r#"{"id":"cmp-002","name":"Fall"}"#).unwrap();
        assert!(campaign.campaign_type.is_none());
        assert!(campaign.daily_budget.is_none());
    }
}
