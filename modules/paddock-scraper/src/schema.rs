// Column schema for the horse results table.
//
// The table is dense and undocumented but positionally stable. Every index
// the scrapers read lives in RESULTS_COLUMNS; nothing else indexes cells.
// Bump RESULTS_SCHEMA_VERSION when the mapping changes.

use scraper::ElementRef;

use crate::extract::{cells, clean_text, select_first};

pub const RESULTS_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultField {
    Date,
    Venue,
    Weather,
    RaceNumber,
    RaceName,
    NumHorses,
    GateNumber,
    HorseNumber,
    Odds,
    Popularity,
    FinishPosition,
    Jockey,
    Weight,
    Distance,
    TrackCondition,
    TrackIndex,
    Time,
    Margin,
    TimeIndex,
    Passing,
    Pace,
    Last3f,
    HorseWeight,
    TrainerComment,
    Note,
    Winner,
    Prize,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub index: usize,
    pub field: ResultField,
    /// Rows too narrow to contain a required column are rejected.
    pub required: bool,
    /// Prefer the text of a link inside the cell over the cell's own text.
    pub prefer_link: bool,
}

const fn col(index: usize, field: ResultField) -> Column {
    Column {
        index,
        field,
        required: true,
        prefer_link: false,
    }
}

const fn optional(index: usize, field: ResultField) -> Column {
    Column {
        index,
        field,
        required: false,
        prefer_link: false,
    }
}

pub const RESULTS_COLUMNS: &[Column] = &[
    col(0, ResultField::Date),
    Column {
        index: 1,
        field: ResultField::Venue,
        required: true,
        prefer_link: true,
    },
    col(2, ResultField::Weather),
    col(3, ResultField::RaceNumber),
    col(4, ResultField::RaceName),
    col(6, ResultField::NumHorses),
    col(7, ResultField::GateNumber),
    col(8, ResultField::HorseNumber),
    col(9, ResultField::Odds),
    col(10, ResultField::Popularity),
    col(11, ResultField::FinishPosition),
    col(12, ResultField::Jockey),
    col(13, ResultField::Weight),
    col(14, ResultField::Distance),
    col(16, ResultField::TrackCondition),
    col(17, ResultField::TrackIndex),
    col(18, ResultField::Time),
    col(19, ResultField::Margin),
    optional(20, ResultField::TimeIndex),
    optional(21, ResultField::Passing),
    optional(22, ResultField::Pace),
    optional(23, ResultField::Last3f),
    optional(24, ResultField::HorseWeight),
    optional(25, ResultField::TrainerComment),
    optional(26, ResultField::Note),
    optional(27, ResultField::Winner),
    optional(28, ResultField::Prize),
];

/// Fewest cells a row may have and still carry every required column.
pub fn min_cells() -> usize {
    RESULTS_COLUMNS
        .iter()
        .filter(|c| c.required)
        .map(|c| c.index + 1)
        .max()
        .unwrap_or(0)
}

/// A row read through the schema.
#[derive(Debug, Clone)]
pub struct SchemaRow {
    values: Vec<(ResultField, String)>,
}

impl SchemaRow {
    pub fn get(&self, field: ResultField) -> &str {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }
}

/// Read a `tr` through the schema. `None` when the row is narrower than
/// [`min_cells`], which callers count as a schema mismatch.
pub fn read_row(row: ElementRef) -> Option<SchemaRow> {
    let tds = cells(row);
    if tds.len() < min_cells() {
        return None;
    }

    let values = RESULTS_COLUMNS
        .iter()
        .map(|c| {
            let value = match tds.get(c.index) {
                None => String::new(),
                Some(&td) if c.prefer_link => select_first(td, "a")
                    .map(clean_text)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| clean_text(td)),
                Some(&td) => clean_text(td),
            };
            (c.field, value)
        })
        .collect();

    Some(SchemaRow { values })
}
