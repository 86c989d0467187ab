//! Layout and scenario file schema.

use sb_graph::{SectionKind, TrackDirection};
use sb_interlock::{ControlMode, HoldState, InterlockConfig, SignalKind};
use serde::{Deserialize, Serialize};

/// Layout file version written by this crate.
pub const LAYOUT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layout {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub options: InterlockConfig,
    #[serde(default)]
    pub sections: Vec<SectionDef>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
    #[serde(default)]
    pub signal_types: Vec<SignalTypeDef>,
    #[serde(default)]
    pub signals: Vec<SignalDef>,
    #[serde(default)]
    pub passing_areas: Vec<PassingAreaDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionDef {
    pub name: String,
    pub kind: SectionKind,
    pub length_m: f64,
}

/// Leaving `from` in `from_dir` enters `to` travelling `to_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkDef {
    pub from: String,
    #[serde(default = "ahead")]
    pub from_dir: TrackDirection,
    pub to: String,
    #[serde(default = "ahead")]
    pub to_dir: TrackDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalTypeDef {
    pub name: String,
    /// Function name: NORMAL, DISTANCE, REPEATER, ... or a layout-defined one.
    #[serde(default = "normal_function")]
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_subtype: Option<String>,
    pub aspects: Vec<AspectDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_ahead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_ahead_heads: Option<u32>,
    #[serde(default)]
    pub semaphore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach_control: Option<ApproachControlDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AspectDef {
    /// Aspect name, e.g. STOP or APPROACH_1.
    pub aspect: String,
    pub draw_state: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeedDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_mps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freight_mps: Option<f64>,
    #[serde(default)]
    pub asap: bool,
    #[serde(default)]
    pub reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApproachControlDef {
    pub position_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalDef {
    pub name: String,
    #[serde(default = "plain_signal")]
    pub kind: SignalKind,
    pub section: String,
    #[serde(default = "ahead")]
    pub direction: TrackDirection,
    /// Distance from the section entry; the section end when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_m: Option<f64>,
    pub heads: Vec<HeadDef>,
    #[serde(default)]
    pub allow_part_route: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeadDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    /// Overrides the function of the signal type; NORMAL when neither is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassingAreaDef {
    pub name: String,
    pub paths: Vec<PathDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathDef {
    pub name: String,
    pub route: Vec<StepDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_trains: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDef {
    pub section: String,
    #[serde(default = "ahead")]
    pub direction: TrackDirection,
}

/// Trains and requests to run against a layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default)]
    pub trains: Vec<TrainDef>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainDef {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub mode: ControlMode,
    #[serde(default)]
    pub speed_mps: f64,
    pub route: Vec<StepDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reverse_route: Vec<StepDef>,
    /// Signals the train is timetabled to stop at.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holding_signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDef {
    /// Signal clearance ahead of the train.
    Clear { train: u32 },
    /// Node-control authority for the train.
    ClearNode { train: u32 },
    Advance {
        train: u32,
        #[serde(default = "one")]
        steps: usize,
    },
    Hold {
        signal: String,
        #[serde(default = "manual_lock")]
        hold: HoldState,
    },
    ReleaseHold { signal: String },
    Permission { signal: String },
    Tick {
        #[serde(default)]
        pre_update: bool,
    },
}

fn ahead() -> TrackDirection {
    TrackDirection::Ahead
}

fn normal_function() -> String {
    "NORMAL".to_string()
}

fn plain_signal() -> SignalKind {
    SignalKind::Signal
}

fn one() -> usize {
    1
}

fn manual_lock() -> HoldState {
    HoldState::ManualLock
}
