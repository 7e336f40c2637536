use chrono::NaiveDate;

use crate::state::{fmt_hhmm, SessionState};

/// Today's attendance projected into one display row. Pure: never mutates
/// the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub date: String,
    pub name: String,
    pub ingreso: String,
    pub salida: String,
}

const PLACEHOLDER: &str = "-";

impl SummaryRow {
    pub fn project(state: &SessionState, selected: Option<&str>, today: NaiveDate) -> Self {
        let day = state.day(today);
        let name = selected
            .map(str::to_string)
            .or_else(|| state.name.clone())
            .unwrap_or_else(|| PLACEHOLDER.to_string());

        Self {
            date: today.format("%Y-%m-%d").to_string(),
            name,
            ingreso: day
                .and_then(|d| d.ingreso)
                .map(fmt_hhmm)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            salida: day
                .and_then(|d| d.salida)
                .map(fmt_hhmm)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        }
    }
}
