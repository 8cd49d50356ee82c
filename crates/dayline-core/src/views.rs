use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::datetime::format_deadline;
use crate::model::TaskList;

/// Maximum number of entries in the deadline timeline.
pub const TIMELINE_LIMIT: usize = 4;

/// All projections here are pure: recomputed from the collection on demand,
/// never cached, so they cannot go stale against the aggregate.
///
/// Collection sorted by `updated_at` descending. The sort is stable, so ties
/// keep their storage order.
pub fn recency_view(lists: &[TaskList]) -> Vec<&TaskList> {
    let mut sorted: Vec<&TaskList> = lists.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    sorted
}

/// Lists with a deadline, soonest first, capped at [`TIMELINE_LIMIT`].
pub fn timeline_view(lists: &[TaskList]) -> Vec<&TaskList> {
    let mut upcoming: Vec<&TaskList> = lists
        .iter()
        .filter(|list| list.deadline_at.is_some())
        .collect();
    upcoming.sort_by_key(|list| list.deadline_at);
    upcoming.truncate(TIMELINE_LIMIT);
    upcoming
}

/// Resolves the effective active list: the selected id when it still exists,
/// else the first list in storage order, else none.
pub fn active_list(lists: &[TaskList], selected: Option<Uuid>) -> Option<&TaskList> {
    selected
        .and_then(|id| lists.iter().find(|list| list.id == id))
        .or_else(|| lists.first())
}

/// Wall-clock classification of a deadline at evaluation time. The label can
/// flip from due to overdue between two reads with no mutation in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineStatus {
    NoDeadline,
    Due(DateTime<Utc>),
    Overdue(DateTime<Utc>),
}

impl DeadlineStatus {
    pub fn of(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match deadline {
            None => Self::NoDeadline,
            Some(at) if at < now => Self::Overdue(at),
            Some(at) => Self::Due(at),
        }
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self, Self::Overdue(_))
    }

    pub fn label(&self) -> String {
        match self {
            Self::NoDeadline => "No deadline".to_string(),
            Self::Due(at) => format!("Due: {}", format_deadline(*at)),
            Self::Overdue(at) => format!("Overdue: {}", format_deadline(*at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{DeadlineStatus, TIMELINE_LIMIT, active_list, recency_view, timeline_view};
    use crate::model::TaskList;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn list_at(title: &str, updated_offset_mins: i64, deadline: Option<Duration>) -> TaskList {
        let now = fixed_now();
        let mut list = TaskList::new(title.to_string(), deadline.map(|d| now + d), now);
        list.updated_at = now + Duration::minutes(updated_offset_mins);
        list
    }

    #[test]
    fn recency_view_sorts_by_updated_at_descending() {
        let lists = vec![
            list_at("old", 0, None),
            list_at("newest", 20, None),
            list_at("middle", 10, None),
        ];
        let titles: Vec<&str> = recency_view(&lists)
            .iter()
            .map(|list| list.title.as_str())
            .collect();
        assert_eq!(titles, ["newest", "middle", "old"]);
    }

    #[test]
    fn timeline_orders_by_deadline_and_caps_entries() {
        let lists = vec![
            list_at("e", 0, Some(Duration::hours(50))),
            list_at("b", 0, Some(Duration::hours(2))),
            list_at("no-deadline", 0, None),
            list_at("a", 0, Some(Duration::hours(1))),
            list_at("d", 0, Some(Duration::hours(40))),
            list_at("c", 0, Some(Duration::hours(3))),
        ];

        let timeline = timeline_view(&lists);
        assert_eq!(timeline.len(), TIMELINE_LIMIT);
        let titles: Vec<&str> = timeline.iter().map(|list| list.title.as_str()).collect();
        assert_eq!(titles, ["a", "b", "c", "d"]);
    }

    #[test]
    fn active_list_falls_back_to_first_then_none() {
        let lists = vec![list_at("first", 0, None), list_at("second", 5, None)];

        let picked = active_list(&lists, Some(lists[1].id)).expect("selected list");
        assert_eq!(picked.title, "second");

        let fallback = active_list(&lists, Some(Uuid::new_v4())).expect("fallback list");
        assert_eq!(fallback.title, "first");

        assert!(active_list(&[], Some(Uuid::new_v4())).is_none());
        assert!(active_list(&[], None).is_none());
    }

    #[test]
    fn deadline_status_flips_exactly_at_the_stored_instant() {
        let now = fixed_now();
        let deadline = Some(now);

        // At the instant itself the deadline is still due, not overdue.
        assert_eq!(DeadlineStatus::of(deadline, now), DeadlineStatus::Due(now));
        assert!(
            DeadlineStatus::of(deadline, now + Duration::milliseconds(1))
                .is_overdue()
        );
        assert!(!DeadlineStatus::of(deadline, now - Duration::milliseconds(1)).is_overdue());
    }

    #[test]
    fn missing_deadline_is_never_overdue() {
        let status = DeadlineStatus::of(None, fixed_now());
        assert_eq!(status, DeadlineStatus::NoDeadline);
        assert!(!status.is_overdue());
        assert_eq!(status.label(), "No deadline");
    }
}
