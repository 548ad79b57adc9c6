// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn diag(total: u32, conc: u32, rpm: u32, both: u32) -> Diagnosis {
    Diagnosis { total_keys: total, concurrency_ok: conc, rpm_ok: rpm, both_ok: both }
}

#[yare::parameterized(
    no_keys          = { diag(0, 0, 0, 0), BlockReason::NoKeys },
    rate_bound       = { diag(2, 2, 0, 0), BlockReason::Rpm },
    slot_bound       = { diag(2, 0, 2, 0), BlockReason::Concurrency },
    both_exhausted   = { diag(1, 0, 0, 0), BlockReason::ConcurrencyAndRpm },
    split_across     = { diag(2, 1, 1, 0), BlockReason::ConcurrencyAndRpm },
)]
fn diagnosis_reason(d: Diagnosis, expected: BlockReason) {
    assert_eq!(d.reason(), expected);
}

#[test]
fn waiting_turn_serializes_with_state_tag() -> anyhow::Result<()> {
    let status = WaitStatus::WaitingTurn {
        provider: "openai".into(),
        request_id: "r2".into(),
        position: 2,
        head_request_id: "r1".into(),
    };
    let json = serde_json::to_value(&status)?;
    assert_eq!(json["state"], "waiting_turn");
    assert_eq!(json["position"], 2);
    assert_eq!(status.code(), "waiting_turn");
    Ok(())
}

#[test]
fn waiting_key_omits_retry_hint_unless_rate_bound() -> anyhow::Result<()> {
    let status = WaitStatus::WaitingKey {
        provider: "kling".into(),
        request_id: "r1".into(),
        position: Some(1),
        reason: BlockReason::Concurrency,
        retry_after_secs: None,
        diagnosis: diag(1, 0, 1, 0),
    };
    let json = serde_json::to_value(&status)?;
    assert_eq!(json["state"], "waiting_key");
    assert_eq!(json["reason"], "concurrency");
    assert!(json.get("retry_after_secs").is_none());
    assert_eq!(status.code(), "concurrency");
    Ok(())
}

#[test]
fn waiting_rpm_round_trips() -> anyhow::Result<()> {
    let status = WaitStatus::WaitingRpm {
        provider: "legnext".into(),
        credential_id: 7,
        current: 5,
        rpm_limit: 5,
        units: 1,
        retry_after_secs: 12,
    };
    let back: WaitStatus = serde_json::from_str(&serde_json::to_string(&status)?)?;
    assert_eq!(back, status);
    assert_eq!(back.retry_after_secs(), Some(12));
    assert_eq!(back.provider(), "legnext");
    Ok(())
}
