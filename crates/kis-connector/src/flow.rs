//! 외국인/기관 순매수 요약.
//!
//! 계정과 문서 버전에 따라 응답 키 이름이 달라 후보 키 목록을 순서대로 확인하고,
//! 0이 아닌 첫 값을 사용합니다.

use crate::quote::lenient_number;
use crate::series::SeriesSchema;
use serde::Serialize;
use serde_json::Value;

const FOREIGN_VOLUME_KEYS: &[&str] = &[
    "frgn_ntby_qty",
    "frgn_net_buy_qty",
    "frgn_nt",
    "frgn_sm_netb_qty",
    "frgn_bsop_netqty",
];
const FOREIGN_VALUE_KEYS: &[&str] = &[
    "frgn_ntby_tr_pbmn",
    "frgn_ntby_tr_amt",
    "frgn_net_buy_amt",
    "frgn_sm_netb_tr_am",
    "frgn_bsop_netamt",
];
const INSTITUTION_VOLUME_KEYS: &[&str] = &[
    "orgn_ntby_qty",
    "inst_sum_ntby_qty",
    "org_ntby_qty",
    "inst_net_buy_qty",
];
const INSTITUTION_VALUE_KEYS: &[&str] = &[
    "orgn_ntby_tr_pbmn",
    "orgn_ntby_tr_amt",
    "inst_sum_ntby_tr_amt",
    "org_ntby_tr_amt",
    "inst_net_buy_amt",
];

/// 투자자 한 주체의 순매수.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSide {
    pub net_buy_volume: f64,
    pub net_buy_value: f64,
}

/// 외국인/기관 순매수 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub foreign: FlowSide,
    pub institution: FlowSide,
    /// 값을 읽은 행의 영업일자
    #[serde(rename = "asOf", skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,
}

impl FlowSummary {
    /// 투자자 조회 응답에서 요약 생성.
    ///
    /// `date`(YYYYMMDD)와 영업일자가 같은 행을 우선 사용하고, 없으면 첫 행을 사용합니다.
    /// 읽을 행이 전혀 없으면 `None`.
    pub fn from_payload(payload: &Value, date: Option<&str>, schema: &SeriesSchema) -> Option<Self> {
        let rows = schema.rows(payload);

        let row = date
            .and_then(|d| {
                rows.iter()
                    .copied()
                    .find(|row| schema.report_date(row) == Some(d))
            })
            .or_else(|| rows.first().copied())?;

        Some(Self {
            foreign: FlowSide {
                net_buy_volume: first_non_zero(row, FOREIGN_VOLUME_KEYS),
                net_buy_value: first_non_zero(row, FOREIGN_VALUE_KEYS),
            },
            institution: FlowSide {
                net_buy_volume: first_non_zero(row, INSTITUTION_VOLUME_KEYS),
                net_buy_value: first_non_zero(row, INSTITUTION_VALUE_KEYS),
            },
            as_of: schema.report_date(row).map(str::to_string),
        })
    }
}

fn first_non_zero(row: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .map(|k| lenient_number(row.get(*k)))
        .find(|n| *n != 0.0)
        .unwrap_or(0.0)
}
