mod agent_types;
mod bead_types;
mod identifiers;
mod mail;
mod reports;
mod review_queue;
mod town_types;

pub(crate) use review_queue::validate_branch;

pub use agent_types::{Agent, AgentFilter, AgentRole, AgentStatus, NewAgent};
pub use bead_types::{
    Bead, BeadFilter, BeadMetadata, BeadPriority, BeadStatus, BeadType, EscalationRequest, NewBead,
    SOURCE_AGENT_KEY, SOURCE_BEAD_KEY,
};
pub use identifiers::{AgentId, BeadId, RigId, TownId};
pub use mail::{MailMessage, NewMail};
pub use reports::{
    DispatchAttempt, DispatchReport, DispatchResult, FireReport, MergeReport, MergeResult, PatrolReport,
    PrimeContext, RigActivity, SlingRequest, SlingResult,
};
pub use review_queue::{NewReviewEntry, ReviewEntry, ReviewStatus};
pub use town_types::{validate_git_url, validate_rig_name, NewRig, Rig, Town, DEFAULT_BRANCH};

/// Closest accepted value for a mistyped enumeration value, if any is near.
pub(crate) fn suggest_closest(input: &str, accepted: &[&str]) -> Option<String> {
    let lowered = input.trim().to_ascii_lowercase();
    accepted
        .iter()
        .map(|candidate| (candidate, strsim::levenshtein(&lowered, candidate)))
        .filter(|(_, distance)| *distance <= 3)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| (*candidate).to_string())
}

/// Parse error message for a closed enumeration.
pub(crate) fn unknown_value(kind: &str, input: &str, accepted: &[&str]) -> String {
    suggest_closest(input, accepted).map_or_else(
        || format!("Unknown {kind}: '{input}' (expected one of {})", accepted.join(", ")),
        |suggestion| format!("Unknown {kind}: '{input}', did you mean '{suggestion}'?"),
    )
}
