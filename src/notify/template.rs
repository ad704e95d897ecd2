//! Notification text

use crate::types::Offense;
use std::time::Duration;

pub fn render_subject(offense: &Offense) -> String {
    format!(
        "Detected a potential failure of SIEM offense autoescalation. [ {} ] - {}",
        offense.id,
        offense.description.trim()
    )
}

pub fn render_body(offense: &Offense, grace_period: Duration) -> String {
    let minutes = grace_period.as_secs() / 60;
    format!(
        "Hello,

A QRadar SIEM offense with monitored autoescalation and closure status is still OPEN {minutes} minutes after it was created.
This probably means the QRadar SOAR plugin failed to escalate the offense to IBM SOAR and it was not closed automatically.
Please check QRADAR SIEM and escalate the offense manually if it has not been escalated. Also check for any IBM SOAR playbook that may have failed to close it.

Offense details:

    Offense ID: {id}
    Offense Description: {description}

    Magnitude: {magnitude}
    Relevance: {relevance}
    Severity: {severity}
    Credibility: {credibility}

    Source network: {source_network}

To stop monitoring this type of offense, remove its description from the watch-list in the offense-watch configuration.

Thank you,
",
        minutes = minutes,
        id = offense.id,
        description = offense.description.trim(),
        magnitude = offense.magnitude,
        relevance = offense.relevance,
        severity = offense.severity,
        credibility = offense.credibility,
        source_network = offense.source_network,
    )
}
