//! Gathers the facts transition guards consult.

use tracing::{debug, warn};

use super::host::{PullRequestState, ReviewHost};
use super::paths::StagehandPaths;
use super::store::try_load_prd;
use crate::core::workflow::ValidationContext;
use crate::item::Item;

/// Build a [`ValidationContext`] for `item`.
///
/// Every check is independent and tolerant: missing files read as absent, an
/// unreadable requirements document as `None`, and host failures as "no request".
pub fn build_validation_context(
    paths: &StagehandPaths,
    item: &Item,
    host: &dyn ReviewHost,
) -> ValidationContext {
    let item_paths = paths.item(&item.id);
    let has_research = item_paths.research_path.is_file();
    let has_plan = item_paths.plan_path.is_file();
    let prd = try_load_prd(&item_paths.prd_path);

    let (has_pr, pr_merged) = match item.branch.as_deref() {
        Some(branch) => match host.find_request(branch) {
            Ok(Some(pr)) => (
                pr.state != PullRequestState::Closed,
                pr.state == PullRequestState::Merged,
            ),
            Ok(None) => (false, false),
            Err(err) => {
                warn!(branch, err = %err, "pull request lookup failed");
                (false, false)
            }
        },
        None => (false, false),
    };

    debug!(
        item = %item.id,
        has_research,
        has_plan,
        has_prd = prd.is_some(),
        has_pr,
        pr_merged,
        "validation context"
    );
    ValidationContext {
        has_research,
        has_plan,
        prd,
        has_pr,
        pr_merged,
    }
}
