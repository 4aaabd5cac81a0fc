//! Flight plan file parsing
//!
//! Flight plans are stored in the QGroundControl waypoint text format:
//! ```text
//! QGC WPL 110
//! <index> <current> <frame> <command> <p1> <p2> <p3> <p4> <x> <y> <z> <autocontinue>
//! ```
//!
//! Columns are tab separated; any whitespace is accepted.

use thiserror::Error;

/// Header expected on the first line of a flight plan file
pub const WPL_HEADER: &str = "QGC WPL";

/// Number of columns in a mission item row
pub const WPL_COLUMNS: usize = 12;

/// MAV_CMD ids the summary knows by name
const KNOWN_COMMANDS: &[(u16, &str)] = &[
    (16, "NAV_WAYPOINT"),
    (17, "NAV_LOITER_UNLIM"),
    (19, "NAV_LOITER_TIME"),
    (20, "NAV_RETURN_TO_LAUNCH"),
    (21, "NAV_LAND"),
    (22, "NAV_TAKEOFF"),
    (115, "CONDITION_YAW"),
    (178, "DO_CHANGE_SPEED"),
    (2000, "IMAGE_START_CAPTURE"),
    (2001, "IMAGE_STOP_CAPTURE"),
    (2500, "VIDEO_START_CAPTURE"),
    (2501, "VIDEO_STOP_CAPTURE"),
];

/// Errors that can occur while parsing a flight plan
#[derive(Error, Debug, PartialEq)]
pub enum MissionError {
    #[error("Flight plan is empty")]
    Empty,

    #[error("Invalid flight plan header: {0:?}")]
    InvalidHeader(String),

    #[error("Line {line}: expected {WPL_COLUMNS} columns, found {found}")]
    ColumnCount { line: usize, found: usize },

    #[error("Line {line}: invalid {field} value {value:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// One row of a flight plan
#[derive(Debug, Clone, PartialEq)]
pub struct MissionItem {
    pub index: u16,
    pub current: bool,
    pub frame: u8,
    pub command: u16,
    pub params: [f32; 4],
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f32,
    pub autocontinue: bool,
}

impl MissionItem {
    /// Human-readable command name
    pub fn command_name(&self) -> String {
        command_name(self.command)
    }
}

/// A parsed flight plan
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlightPlan {
    pub version: u32,
    pub items: Vec<MissionItem>,
}

impl FlightPlan {
    /// Parse flight plan text
    pub fn parse(text: &str) -> Result<Self, MissionError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (_, header) = lines.next().ok_or(MissionError::Empty)?;
        let version = header
            .strip_prefix(WPL_HEADER)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .ok_or_else(|| MissionError::InvalidHeader(header.to_string()))?;

        let items = lines
            .map(|(line, row)| parse_item(line, row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { version, items })
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        let commands = self
            .items
            .iter()
            .map(MissionItem::command_name)
            .collect::<Vec<_>>()
            .join(" -> ");
        format!("WPL {} with {} items: {}", self.version, self.items.len(), commands)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn parse_item(line: usize, row: &str) -> Result<MissionItem, MissionError> {
    let cols: Vec<&str> = row.split_whitespace().collect();
    if cols.len() != WPL_COLUMNS {
        return Err(MissionError::ColumnCount {
            line,
            found: cols.len(),
        });
    }

    Ok(MissionItem {
        index: parse_field(line, "index", cols[0])?,
        current: parse_flag(line, "current", cols[1])?,
        frame: parse_field(line, "frame", cols[2])?,
        command: parse_field(line, "command", cols[3])?,
        params: [
            parse_field(line, "param1", cols[4])?,
            parse_field(line, "param2", cols[5])?,
            parse_field(line, "param3", cols[6])?,
            parse_field(line, "param4", cols[7])?,
        ],
        latitude: parse_field(line, "latitude", cols[8])?,
        longitude: parse_field(line, "longitude", cols[9])?,
        altitude_m: parse_field(line, "altitude", cols[10])?,
        autocontinue: parse_flag(line, "autocontinue", cols[11])?,
    })
}

fn parse_field<T: std::str::FromStr>(
    line: usize,
    field: &'static str,
    value: &str,
) -> Result<T, MissionError> {
    value.parse().map_err(|_| MissionError::InvalidField {
        line,
        field,
        value: value.to_string(),
    })
}

fn parse_flag(line: usize, field: &'static str, value: &str) -> Result<bool, MissionError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(MissionError::InvalidField {
            line,
            field,
            value: value.to_string(),
        }),
    }
}

/// Name of a MAV_CMD id, or its number when unknown
pub fn command_name(command: u16) -> String {
    KNOWN_COMMANDS
        .iter()
        .find(|(id, _)| *id == command)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("CMD({})", command))
}
