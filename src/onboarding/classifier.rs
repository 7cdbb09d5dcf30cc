//! Graduation-year → status classification.

use chrono::{Datelike, NaiveDate};

use crate::config::StatusCutoff;

use super::model::StatusLabel;

/// Classify with the default June 1 cutoff: a class graduating this year
/// stays active through the end of the spring term.
pub fn classify(year: i32, today: NaiveDate) -> StatusLabel {
    classify_with_cutoff(year, today, StatusCutoff::default())
}

pub fn classify_with_cutoff(year: i32, today: NaiveDate, cutoff: StatusCutoff) -> StatusLabel {
    use std::cmp::Ordering::*;
    match year.cmp(&today.year()) {
        Greater => StatusLabel::Active,
        Less => StatusLabel::Alumni,
        Equal if (today.month(), today.day()) < (cutoff.month, cutoff.day) => StatusLabel::Active,
        Equal => StatusLabel::Alumni,
    }
}
