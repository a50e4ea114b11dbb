//! Iterative traversal over the station tree.
//!
//! All walks use an explicit work stack rather than recursion, so deep
//! surveys cannot blow the call stack. Mutating operations collect the
//! `(station, leg)` pairs first and edit afterwards — the tree is never
//! aliased while it is being walked.

use crate::survey::Survey;
use crate::types::{LegId, StationId};

/// Collect every `(origin station, leg)` pair reachable from `start`,
/// depth-first.
///
/// Legs are visited in their station's insertion order, and a connected
/// leg's subtree is fully visited before its next sibling — the order an
/// exporter walks the centreline in.
pub fn collect_legs(survey: &Survey, start: StationId) -> Vec<(StationId, LegId)> {
    let mut out = Vec::new();
    let mut stack: Vec<(StationId, usize)> = vec![(start, 0)];

    while let Some(&(station_id, index)) = stack.last() {
        let Some(station) = survey.station(station_id) else {
            stack.pop();
            continue;
        };
        if index >= station.legs().len() {
            stack.pop();
            continue;
        }
        if let Some(frame) = stack.last_mut() {
            frame.1 += 1;
        }
        let leg_id = station.legs()[index];
        out.push((station_id, leg_id));
        if let Some(destination) = survey.leg(leg_id).and_then(|leg| leg.destination()) {
            stack.push((destination, 0));
        }
    }

    out
}

/// Collect `start` and every station in its subtree.
pub fn collect_subtree_stations(survey: &Survey, start: StationId) -> Vec<StationId> {
    let mut out = Vec::new();
    let mut stack = vec![start];

    while let Some(station_id) = stack.pop() {
        out.push(station_id);
        if let Some(station) = survey.station(station_id) {
            for &leg_id in station.legs() {
                if let Some(destination) =
                    survey.leg(leg_id).and_then(|leg| leg.destination())
                {
                    stack.push(destination);
                }
            }
        }
    }

    out
}
