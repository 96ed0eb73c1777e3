// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! IO-State Aggregator
//!
//! Reduces every worker's declared input/output state to one swarm-wide
//! pair. The worst state wins:
//!
//! - input: `upstream-error` > `out-of-data` > `backpressure` > `ok` > `unknown`
//! - output: `downstream-error` > `blocked` > `throttled` > `ok` > `unknown`

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputState {
    Ok,
    Backpressure,
    OutOfData,
    UpstreamError,
    #[default]
    #[serde(other)]
    Unknown,
}

impl InputState {
    fn severity(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Ok => 1,
            Self::Backpressure => 2,
            Self::OutOfData => 3,
            Self::UpstreamError => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputState {
    Ok,
    Throttled,
    Blocked,
    DownstreamError,
    #[default]
    #[serde(other)]
    Unknown,
}

impl OutputState {
    fn severity(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Ok => 1,
            Self::Throttled => 2,
            Self::Blocked => 3,
            Self::DownstreamError => 4,
        }
    }
}

/// Input/output state as declared by one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoState {
    #[serde(default)]
    pub input: InputState,
    #[serde(default)]
    pub output: OutputState,
}

/// Swarm-wide worst input and output state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkIoState {
    input: InputState,
    output: OutputState,
}

impl WorkIoState {
    pub fn input(&self) -> InputState {
        self.input
    }

    pub fn output(&self) -> OutputState {
        self.output
    }
}

#[derive(Default)]
pub struct IoStateAggregator {
    states: DashMap<(String, String), IoState>,
}

impl IoStateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, role: &str, instance: &str, state: IoState) {
        self.states.insert((role.to_string(), instance.to_string()), state);
    }

    pub fn aggregate_work(&self) -> WorkIoState {
        self.states.iter().fold(WorkIoState::default(), |acc, entry| {
            let state = entry.value();
            WorkIoState {
                input: if state.input.severity() > acc.input.severity() {
                    state.input
                } else {
                    acc.input
                },
                output: if state.output.severity() > acc.output.severity() {
                    state.output
                } else {
                    acc.output
                },
            }
        })
    }

    pub fn clear(&self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(input: InputState, output: OutputState) -> IoState {
        IoState { input, output }
    }

    #[test]
    fn test_worst_input_wins() {
        let agg = IoStateAggregator::new();
        agg.record("gen", "g-1", io(InputState::Ok, OutputState::Ok));
        agg.record("proc", "p-1", io(InputState::Backpressure, OutputState::Ok));
        agg.record("proc", "p-2", io(InputState::UpstreamError, OutputState::Ok));

        assert_eq!(agg.aggregate_work().input(), InputState::UpstreamError);
        assert_eq!(agg.aggregate_work().output(), OutputState::Ok);
    }

    #[test]
    fn test_output_precedence() {
        let agg = IoStateAggregator::new();
        agg.record("a", "1", io(InputState::Unknown, OutputState::Throttled));
        agg.record("b", "1", io(InputState::Unknown, OutputState::Blocked));
        assert_eq!(agg.aggregate_work().output(), OutputState::Blocked);

        agg.record("c", "1", io(InputState::Unknown, OutputState::DownstreamError));
        assert_eq!(agg.aggregate_work().output(), OutputState::DownstreamError);
    }

    #[test]
    fn test_empty_is_unknown() {
        let agg = IoStateAggregator::new();
        let work = agg.aggregate_work();
        assert_eq!(work.input(), InputState::Unknown);
        assert_eq!(work.output(), OutputState::Unknown);
    }

    #[test]
    fn test_latest_report_replaces_previous() {
        let agg = IoStateAggregator::new();
        agg.record("gen", "g-1", io(InputState::OutOfData, OutputState::Ok));
        agg.record("gen", "g-1", io(InputState::Ok, OutputState::Ok));
        assert_eq!(agg.aggregate_work().input(), InputState::Ok);
    }

    #[test]
    fn test_wire_names() {
        let state: IoState =
            serde_json::from_str(r#"{"input": "out-of-data", "output": "downstream-error"}"#).unwrap();
        assert_eq!(state.input, InputState::OutOfData);
        assert_eq!(state.output, OutputState::DownstreamError);

        let odd: IoState = serde_json::from_str(r#"{"input": "sideways"}"#).unwrap();
        assert_eq!(odd.input, InputState::Unknown);
    }

    #[test]
    fn test_unrecognised_states_round_trip_as_unknown() {
        let state: IoState =
            serde_json::from_str(r#"{"input": "draining", "output": "rerouted"}"#).unwrap();
        assert_eq!(state, IoState::default());

        let encoded = serde_json::to_value(state).unwrap();
        assert_eq!(encoded, serde_json::json!({"input": "unknown", "output": "unknown"}));

        let decoded: IoState = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.input, InputState::Unknown);
        assert_eq!(decoded.output, OutputState::Unknown);
    }
}
