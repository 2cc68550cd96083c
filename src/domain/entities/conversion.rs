use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Supplementary ("main") conversions for one mall product, sourced from
/// the operator's own order export rather than the ad platform's pixel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainConversion {
    #[serde(default)]
    pub main_conv_cnt: f64,
    #[serde(default)]
    pub main_conv_amt: f64,
}

/// Lookup from `mall_product_id` to its main conversions. Many ads can
/// share a product id; the join is a lookup, never a fold.
pub type ConversionMap = HashMap<String, MainConversion>;

/// One uploaded conversion row, already parsed out of the spreadsheet by
/// the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainConversionRow {
    pub mall_product_id: String,
    #[serde(default)]
    pub main_conv_cnt: f64,
    #[serde(default)]
    pub main_conv_amt: f64,
}

/// Collapse uploaded rows into the per-product lookup. Duplicate product
/// ids accumulate; non-finite amounts are dropped as non-contributing.
pub fn build_conversion_map(rows: &[MainConversionRow]) -> ConversionMap {
    let mut map = ConversionMap::new();
    for row in rows {
        let entry = map.entry(row.mall_product_id.clone()).or_default();
        if row.main_conv_cnt.is_finite() {
            entry.main_conv_cnt += row.main_conv_cnt;
        }
        if row.main_conv_amt.is_finite() {
            entry.main_conv_amt += row.main_conv_amt;
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_conversion_map_accumulates_duplicates() {
        let rows = vec![
            MainConversionRow {
                mall_product_id: "p-1".to_string(),
                main_conv_cnt: 2.0,
                main_conv_amt: 10_000.0,
            },
            MainConversionRow {
                mall_product_id: "p-1".to_string(),
                main_conv_cnt: 1.0,
                main_conv_amt: 5_000.0,
            },
            MainConversionRow {
                mall_product_id: "p-2".to_string(),
                main_conv_cnt: 4.0,
                main_conv_amt: 20_000.0,
            },
        ];
        let map = build_conversion_map(&rows);
        assert_eq!(map.len(), 2);
        assert_eq!(map["p-1"].main_conv_cnt, 3.0);
        assert_eq!(map["p-1"].main_conv_amt, 15_000.0);
        assert_eq!(map["p-2"].main_conv_cnt, 4.0);
    }

    #[test]
    fn test_build_conversion_map_drops_non_finite() {
        let rows = vec![MainConversionRow {
            mall_product_id: "p-1".to_string(),
            main_conv_cnt: f64::NAN,
            main_conv_amt: 8_000.0,
        }];
        let map = build_conversion_map(&rows);
        assert_eq!(map["p-1"].main_conv_cnt, 0.0);
        assert_eq!(map["p-1"].main_conv_amt, 8_000.0);
    }
}
