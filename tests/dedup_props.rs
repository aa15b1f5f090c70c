use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;

use unipass_scanner::scan::{DedupDecision, DedupState, DedupWindows, DispatchId, RejectReason};

const TOKENS: [&str; 3] = ["T-alpha", "T-beta", "T-gamma"];

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

struct Pending {
    dispatch: DispatchId,
    done_at: Instant,
    failed: bool,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn burst_of_one_token_within_suppression_dispatches_once(
        gaps in prop::collection::vec(0u64..200, 1..25),
        latency in 1u64..6_000,
    ) {
        let windows = DedupWindows::default();
        let t0 = Instant::now();
        let mut state = DedupState::new();
        let mut now = t0;
        let mut pending: Option<Pending> = None;
        let mut accepted = 0;

        for gap in gaps {
            now += ms(gap);
            if let Some(p) = pending.take_if(|p| p.done_at <= now) {
                prop_assert!(state.complete(p.dispatch, p.failed, p.done_at, &windows));
            }

            if let DedupDecision::Accept(dispatch) = state.evaluate("T1", now, &windows) {
                accepted += 1;
                pending = Some(Pending { dispatch, done_at: now + ms(latency), failed: false });
            }
        }

        prop_assert_eq!(accepted, 1);
    }

    #[test]
    fn mixed_stream_respects_cooldown_exclusivity_and_suppression(
        steps in prop::collection::vec(
            (0u64..1_500, 0usize..TOKENS.len(), 50u64..2_500, any::<bool>()),
            1..80,
        ),
    ) {
        let windows = DedupWindows::default();
        let t0 = Instant::now();
        let mut state = DedupState::new();
        let mut now = t0;
        let mut pending: Option<Pending> = None;
        let mut last_accept_at: Option<Instant> = None;
        // 最近一次接受的码值及其抑制截止时间
        let mut last_token: Option<(&str, Instant)> = None;

        for (gap, index, latency, failed) in steps {
            now += ms(gap);

            if let Some(p) = pending.take_if(|p| p.done_at <= now) {
                prop_assert!(state.complete(p.dispatch, p.failed, p.done_at, &windows));
                if p.failed {
                    if let Some((_, until)) = last_token.as_mut() {
                        *until = (*until).min(p.done_at + windows.error_suppression);
                    }
                }
            }
            prop_assert_eq!(state.is_in_flight(), pending.is_some());

            let token = TOKENS[index];
            match state.evaluate(token, now, &windows) {
                DedupDecision::Accept(dispatch) => {
                    prop_assert!(pending.is_none());
                    if let Some(last) = last_accept_at {
                        prop_assert!(now.duration_since(last) >= windows.cooldown);
                    }
                    if let Some((previous, until)) = last_token {
                        if previous == token {
                            prop_assert!(now >= until);
                        }
                    }

                    last_accept_at = Some(now);
                    last_token = Some((token, now + windows.token_suppression));
                    pending = Some(Pending { dispatch, done_at: now + ms(latency), failed });
                }
                DedupDecision::Reject(RejectReason::InFlight) => {
                    prop_assert!(pending.is_some());
                }
                DedupDecision::Reject(RejectReason::DuplicateToken) => {
                    prop_assert!(pending.is_none());
                    prop_assert_eq!(last_token.map(|(t, _)| t), Some(token));
                }
                DedupDecision::Reject(RejectReason::Cooldown) => {
                    let last = last_accept_at.expect("cooldown without prior accept");
                    prop_assert!(now.duration_since(last) < windows.cooldown);
                }
            }
        }
    }
}
