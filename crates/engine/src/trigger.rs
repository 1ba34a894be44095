//! Trigger-label propagation.
//!
//! Shared by the Workflow Scheduler and Job Driver: both need the same
//! rule for what attribution their children see.

/// If `trigger_type` already carries a root's attribution (`"Invoked by
/// ..."`), reuse it unchanged; otherwise mint a fresh `"Invoked by
/// <name>"` label. This is what preserves the root's attribution through
/// an arbitrarily deep execution tree instead of re-deriving it at every
/// level.
pub fn child_trigger(trigger_type: &str, name: &str) -> String {
    if trigger_type.starts_with("Invoked by ") {
        trigger_type.to_string()
    } else {
        format!("Invoked by {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_trigger_mints_invoked_by() {
        assert_eq!(child_trigger("Manual", "extract"), "Invoked by extract");
    }

    #[test]
    fn existing_invoked_by_is_preserved() {
        assert_eq!(child_trigger("Invoked by root_job", "nested"), "Invoked by root_job");
    }

    #[test]
    fn scheduled_trigger_mints_invoked_by_too() {
        assert_eq!(child_trigger("Scheduled", "nightly"), "Invoked by nightly");
    }
}
