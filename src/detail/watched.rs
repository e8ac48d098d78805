use chrono::NaiveDate;

use crate::models::WatchedState;

/// Pending watched flag and date for the open title (or its selected season).
///
/// Nothing here talks to the backend: the detail view sends [`WatchedEditor::pending`]
/// on save and calls [`WatchedEditor::commit`] once the server accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEditor {
    baseline: WatchedState,
    working: WatchedState,
    /// `Some` while the date sub-edit is open; holds the temp date.
    date_edit: Option<Option<NaiveDate>>,
}

impl WatchedEditor {
    pub fn new(baseline: WatchedState) -> Self {
        Self {
            baseline,
            working: baseline,
            date_edit: None,
        }
    }

    /// Start over from a new baseline, dropping any unsaved change.
    pub fn reset(&mut self, baseline: WatchedState) {
        *self = Self::new(baseline);
    }

    pub fn baseline(&self) -> WatchedState {
        self.baseline
    }

    pub fn working(&self) -> WatchedState {
        self.working
    }

    pub fn is_editing_date(&self) -> bool {
        self.date_edit.is_some()
    }

    pub fn temp_date(&self) -> Option<NaiveDate> {
        self.date_edit.flatten()
    }

    /// Marking an unwatched entry as watched without a date stamps `today`. The date
    /// survives un-watching, and an entry that was already watched gets its saved date
    /// back (even when that is no date at all).
    pub fn set_watched(&mut self, watched: bool, today: NaiveDate) {
        if watched && !self.working.watched && self.working.watched_at.is_none() {
            self.working.watched_at = if self.baseline.watched {
                self.baseline.watched_at
            } else {
                Some(today)
            };
        }
        self.working.watched = watched;
    }

    pub fn toggle(&mut self, today: NaiveDate) {
        let next = !self.working.watched;
        self.set_watched(next, today);
    }

    pub fn begin_date_edit(&mut self) {
        if self.date_edit.is_none() {
            self.date_edit = Some(self.working.watched_at);
        }
    }

    /// Returns `false` when no date edit is open.
    pub fn set_temp_date(&mut self, date: Option<NaiveDate>) -> bool {
        match self.date_edit.as_mut() {
            Some(temp) => {
                *temp = date;
                true
            }
            None => false,
        }
    }

    pub fn confirm_date_edit(&mut self) {
        if let Some(date) = self.date_edit.take() {
            self.working.watched_at = date;
            if date.is_some() {
                self.working.watched = true;
            }
        }
    }

    pub fn cancel_date_edit(&mut self) {
        self.date_edit = None;
    }

    /// The state to send, if it differs from the baseline.
    pub fn pending(&self) -> Option<WatchedState> {
        let working = self.working.normalized();
        (working != self.baseline.normalized()).then_some(working)
    }

    pub fn is_dirty(&self) -> bool {
        self.pending().is_some()
    }

    pub fn commit(&mut self) {
        let saved = self.working.normalized();
        self.reset(saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).expect("valid date")
    }

    fn watched_on(d: u32) -> WatchedState {
        WatchedState {
            watched: true,
            watched_at: Some(day(d)),
        }
    }

    #[test]
    fn flip_and_flip_back_is_not_a_change() {
        let mut ed = WatchedEditor::new(watched_on(3));
        ed.toggle(day(20));
        assert!(ed.is_dirty());
        ed.toggle(day(20));
        assert_eq!(ed.pending(), None);
        assert_eq!(ed.working(), watched_on(3));
    }

    #[test]
    fn undated_watched_entry_flipped_back_stays_undated() {
        let undated = WatchedState {
            watched: true,
            watched_at: None,
        };
        let mut ed = WatchedEditor::new(undated);
        ed.toggle(day(20));
        assert!(ed.is_dirty());
        ed.toggle(day(20));
        assert_eq!(ed.working(), undated);
        assert_eq!(ed.pending(), None);

        ed.set_watched(true, day(21));
        assert_eq!(ed.pending(), None);
    }

    #[test]
    fn marking_unwatched_title_stamps_today_and_reverting_is_clean() {
        let mut ed = WatchedEditor::new(WatchedState::default());
        ed.set_watched(true, day(20));
        assert_eq!(ed.pending(), Some(watched_on(20)));
        ed.set_watched(false, day(20));
        assert_eq!(ed.pending(), None);
    }

    #[test]
    fn date_sub_edit_confirms_into_working_value() {
        let mut ed = WatchedEditor::new(watched_on(3));
        ed.begin_date_edit();
        assert_eq!(ed.temp_date(), Some(day(3)));
        assert!(ed.set_temp_date(Some(day(9))));
        assert_eq!(ed.working(), watched_on(3));
        ed.confirm_date_edit();
        assert!(!ed.is_editing_date());
        assert_eq!(ed.pending(), Some(watched_on(9)));
    }

    #[test]
    fn cancelled_date_edit_keeps_prior_value() {
        let mut ed = WatchedEditor::new(watched_on(3));
        ed.begin_date_edit();
        ed.set_temp_date(Some(day(9)));
        ed.cancel_date_edit();
        assert_eq!(ed.working(), watched_on(3));
        assert!(!ed.is_dirty());
        assert!(!ed.set_temp_date(Some(day(1))));
    }

    #[test]
    fn commit_moves_baseline() {
        let mut ed = WatchedEditor::new(WatchedState::default());
        ed.set_watched(true, day(1));
        ed.commit();
        assert_eq!(ed.baseline(), watched_on(1));
        assert!(!ed.is_dirty());
    }
}
